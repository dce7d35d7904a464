//! Public-name generation and collision resolution.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingStrategy {
    /// `{original}{sep}{serverId}` — the default.
    Namespace,
    /// `{serverId}{sep}{original}`.
    Alias,
    /// `{original}` verbatim; collisions resolved by [`CollisionPolicy`].
    None,
    /// Per-server `original -> override` map.
    Aliases,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Reject the later registration; log and drop it.
    Error,
    /// Fall back to the `namespace` form for the colliding entry.
    Prefix,
    /// Append a numeric disambiguator (`_2`, `_3`, ...).
    Rename,
}

#[derive(Debug, Clone)]
pub struct NamingConfig {
    pub strategy: NamingStrategy,
    pub separator: String,
    pub collision_policy: CollisionPolicy,
    /// Only consulted when `strategy == Aliases`: `serverId -> (original -> override)`.
    pub aliases: HashMap<String, HashMap<String, String>>,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            strategy: NamingStrategy::Namespace,
            separator: "_".to_string(),
            collision_policy: CollisionPolicy::Error,
            aliases: HashMap::new(),
        }
    }
}

impl NamingConfig {
    fn candidate(&self, server_id: &str, original: &str) -> String {
        match self.strategy {
            NamingStrategy::Namespace => format!("{original}{}{server_id}", self.separator),
            NamingStrategy::Alias => format!("{server_id}{}{original}", self.separator),
            NamingStrategy::None => original.to_string(),
            NamingStrategy::Aliases => self
                .aliases
                .get(server_id)
                .and_then(|m| m.get(original))
                .cloned()
                .unwrap_or_else(|| original.to_string()),
        }
    }

    /// Resolve the public name for `(server_id, original)` against the set
    /// of names already taken (by any server). Returns `None` when the
    /// collision policy is `error` and a collision occurred — caller logs
    /// and drops the entry.
    pub fn resolve(
        &self,
        server_id: &str,
        original: &str,
        taken: &std::collections::HashSet<String>,
    ) -> Option<String> {
        let candidate = self.candidate(server_id, original);
        if !taken.contains(&candidate) {
            return Some(candidate);
        }

        match self.collision_policy {
            CollisionPolicy::Error => None,
            CollisionPolicy::Prefix => {
                let namespaced = format!("{original}{}{server_id}", self.separator);
                if taken.contains(&namespaced) {
                    None
                } else {
                    Some(namespaced)
                }
            }
            CollisionPolicy::Rename => {
                let mut n = 2;
                loop {
                    let renamed = format!("{candidate}_{n}");
                    if !taken.contains(&renamed) {
                        return Some(renamed);
                    }
                    n += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn namespace_strategy_appends_server_id() {
        let cfg = NamingConfig::default();
        let taken = HashSet::new();
        assert_eq!(
            cfg.resolve("srv1", "echo", &taken).unwrap(),
            "echo_srv1"
        );
    }

    #[test]
    fn alias_strategy_prefixes_server_id() {
        let cfg = NamingConfig {
            strategy: NamingStrategy::Alias,
            ..Default::default()
        };
        let taken = HashSet::new();
        assert_eq!(cfg.resolve("srv1", "echo", &taken).unwrap(), "srv1_echo");
    }

    #[test]
    fn none_strategy_with_error_policy_drops_collision() {
        let cfg = NamingConfig {
            strategy: NamingStrategy::None,
            ..Default::default()
        };
        let mut taken = HashSet::new();
        taken.insert("echo".to_string());
        assert!(cfg.resolve("srv2", "echo", &taken).is_none());
    }

    #[test]
    fn none_strategy_with_prefix_policy_falls_back_to_namespace() {
        let cfg = NamingConfig {
            strategy: NamingStrategy::None,
            collision_policy: CollisionPolicy::Prefix,
            ..Default::default()
        };
        let mut taken = HashSet::new();
        taken.insert("echo".to_string());
        assert_eq!(cfg.resolve("srv2", "echo", &taken).unwrap(), "echo_srv2");
    }

    #[test]
    fn none_strategy_with_rename_policy_appends_numeric_suffix() {
        let cfg = NamingConfig {
            strategy: NamingStrategy::None,
            collision_policy: CollisionPolicy::Rename,
            ..Default::default()
        };
        let mut taken = HashSet::new();
        taken.insert("echo".to_string());
        assert_eq!(cfg.resolve("srv2", "echo", &taken).unwrap(), "echo_2");
    }

    #[test]
    fn aliases_strategy_uses_per_server_override() {
        let mut aliases = HashMap::new();
        let mut srv1 = HashMap::new();
        srv1.insert("echo".to_string(), "say".to_string());
        aliases.insert("srv1".to_string(), srv1);
        let cfg = NamingConfig {
            strategy: NamingStrategy::Aliases,
            aliases,
            ..Default::default()
        };
        let taken = HashSet::new();
        assert_eq!(cfg.resolve("srv1", "echo", &taken).unwrap(), "say");
    }
}
