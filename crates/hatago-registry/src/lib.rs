//! The capability registry: public-name assignment, collision handling,
//! and the toolset hash. A single writer (whoever calls the `register_*`/
//! `unregister_server` methods, normally driven off Supervisor state
//! changes) excludes other writers; readers never block on other readers.

pub mod capability;
pub mod hash;
pub mod naming;

use std::collections::{HashMap, HashSet};

use hatago_support::events::{EventBus, EventKind};
use serde_json::Value;
use tokio::sync::RwLock;

pub use capability::CapabilityStatus;
pub use naming::{CollisionPolicy, NamingConfig, NamingStrategy};

#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub server_id: String,
    pub original_name: String,
    pub public_name: String,
    pub input_schema: Value,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub server_id: String,
    pub uri: String,
    pub public_uri: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PromptEntry {
    pub server_id: String,
    pub original_name: String,
    pub public_name: String,
    pub description: Option<String>,
    pub arguments: Value,
}

#[derive(Default)]
struct Inner {
    tools: HashMap<String, ToolEntry>,
    resources: HashMap<String, ResourceEntry>,
    prompts: HashMap<String, PromptEntry>,
    capability_cache: HashMap<(String, String), CapabilityStatus>,
    revision: u64,
    toolset_hash_full: String,
    toolset_hash_short: String,
}

pub struct Registry {
    naming: NamingConfig,
    inner: RwLock<Inner>,
    events: EventBus,
}

impl Registry {
    pub fn new(naming: NamingConfig, events: EventBus) -> Self {
        Self {
            naming,
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    /// Atomically replace `server_id`'s tool set from the raw `tools/list`
    /// result entries (each a JSON object with at least `name` and
    /// `inputSchema`). Emits `tool:registered`/`tool:unregistered` for the
    /// delta and bumps the toolset revision/hash if anything changed.
    pub async fn register_server_tools(&self, server_id: &str, tools: &[Value]) {
        let mut guard = self.inner.write().await;

        let previous: Vec<String> = guard
            .tools
            .values()
            .filter(|t| t.server_id == server_id)
            .map(|t| t.public_name.clone())
            .collect();
        for name in &previous {
            guard.tools.remove(name);
        }

        let mut sorted_tools: Vec<&Value> = tools.iter().collect();
        sorted_tools.sort_by_key(|t| t.get("name").and_then(Value::as_str).unwrap_or_default());

        let taken: HashSet<String> = guard.tools.keys().cloned().collect();
        let mut taken = taken;
        let mut added = Vec::new();
        for tool in sorted_tools {
            let Some(original) = tool.get("name").and_then(Value::as_str) else {
                continue;
            };
            let schema = tool.get("inputSchema").cloned().unwrap_or(Value::Null);
            let description = tool.get("description").and_then(Value::as_str).map(str::to_string);
            let Some(public_name) = self.naming.resolve(server_id, original, &taken) else {
                tracing::warn!(server = %server_id, tool = %original, "dropping colliding tool registration");
                continue;
            };
            taken.insert(public_name.clone());
            added.push(public_name.clone());
            guard.tools.insert(
                public_name.clone(),
                ToolEntry {
                    server_id: server_id.to_string(),
                    original_name: original.to_string(),
                    public_name,
                    input_schema: schema,
                    description,
                },
            );
        }

        let removed: Vec<String> = previous
            .iter()
            .filter(|name| !added.contains(name))
            .cloned()
            .collect();

        if !added.is_empty() || !removed.is_empty() {
            guard.revision += 1;
            let entries: Vec<(String, Value)> = guard
                .tools
                .values()
                .map(|t| (t.public_name.clone(), t.input_schema.clone()))
                .collect();
            let (full, short) =
                hash::toolset_hash(entries.iter().map(|(n, s)| (n.as_str(), s)));
            guard.toolset_hash_full = full;
            guard.toolset_hash_short = short;
        }
        drop(guard);

        for name in &added {
            self.events.publish(EventKind::ToolRegistered {
                server_id: server_id.to_string(),
                tool_name: name.clone(),
            });
        }
        for name in &removed {
            self.events.publish(EventKind::ToolUnregistered {
                server_id: server_id.to_string(),
                tool_name: name.clone(),
            });
        }
    }

    pub async fn register_server_resources(&self, server_id: &str, resources: &[Value]) {
        let mut guard = self.inner.write().await;
        let previous: Vec<String> = guard
            .resources
            .values()
            .filter(|r| r.server_id == server_id)
            .map(|r| r.public_uri.clone())
            .collect();
        for uri in &previous {
            guard.resources.remove(uri);
        }
        for resource in resources {
            let Some(uri) = resource.get("uri").and_then(Value::as_str) else {
                continue;
            };
            let mime_type = resource
                .get("mimeType")
                .and_then(Value::as_str)
                .map(str::to_string);
            let name = resource.get("name").and_then(Value::as_str).map(str::to_string);
            let description = resource.get("description").and_then(Value::as_str).map(str::to_string);
            // Resources are addressed by URI, not a generated public name;
            // the URI itself is already namespaced per-upstream convention.
            guard.resources.insert(
                uri.to_string(),
                ResourceEntry {
                    server_id: server_id.to_string(),
                    uri: uri.to_string(),
                    public_uri: uri.to_string(),
                    name,
                    description,
                    mime_type,
                },
            );
        }
    }

    pub async fn register_server_prompts(&self, server_id: &str, prompts: &[Value]) {
        let mut guard = self.inner.write().await;
        let previous: Vec<String> = guard
            .prompts
            .values()
            .filter(|p| p.server_id == server_id)
            .map(|p| p.public_name.clone())
            .collect();
        for name in &previous {
            guard.prompts.remove(name);
        }
        let taken: HashSet<String> = guard.prompts.keys().cloned().collect();
        let mut taken = taken;
        for prompt in prompts {
            let Some(original) = prompt.get("name").and_then(Value::as_str) else {
                continue;
            };
            let arguments = prompt.get("arguments").cloned().unwrap_or(Value::Null);
            let description = prompt.get("description").and_then(Value::as_str).map(str::to_string);
            let Some(public_name) = self.naming.resolve(server_id, original, &taken) else {
                continue;
            };
            taken.insert(public_name.clone());
            guard.prompts.insert(
                public_name.clone(),
                PromptEntry {
                    server_id: server_id.to_string(),
                    original_name: original.to_string(),
                    public_name,
                    description,
                    arguments,
                },
            );
        }
    }

    /// Remove every entry (tools/resources/prompts) owned by `server_id`,
    /// e.g. when it leaves `ACTIVE`.
    pub async fn unregister_server(&self, server_id: &str) {
        self.register_server_tools(server_id, &[]).await;
        self.register_server_resources(server_id, &[]).await;
        self.register_server_prompts(server_id, &[]).await;
    }

    pub async fn resolve_public_tool(&self, public_name: &str) -> Option<(String, String)> {
        let guard = self.inner.read().await;
        guard
            .tools
            .get(public_name)
            .map(|t| (t.server_id.clone(), t.original_name.clone()))
    }

    pub async fn resolve_resource(&self, uri: &str) -> Option<(String, String)> {
        let guard = self.inner.read().await;
        guard
            .resources
            .get(uri)
            .map(|r| (r.server_id.clone(), r.uri.clone()))
    }

    pub async fn resolve_public_prompt(&self, public_name: &str) -> Option<(String, String)> {
        let guard = self.inner.read().await;
        guard
            .prompts
            .get(public_name)
            .map(|p| (p.server_id.clone(), p.original_name.clone()))
    }

    pub async fn list_tools(&self) -> Vec<ToolEntry> {
        self.inner.read().await.tools.values().cloned().collect()
    }

    pub async fn list_tool_names(&self) -> Vec<String> {
        self.inner.read().await.tools.keys().cloned().collect()
    }

    pub async fn list_resources(&self) -> Vec<ResourceEntry> {
        self.inner.read().await.resources.values().cloned().collect()
    }

    pub async fn list_prompts(&self) -> Vec<PromptEntry> {
        self.inner.read().await.prompts.values().cloned().collect()
    }

    pub async fn set_capability_status(&self, server_id: &str, method: &str, status: CapabilityStatus) {
        self.inner
            .write()
            .await
            .capability_cache
            .insert((server_id.to_string(), method.to_string()), status);
    }

    pub async fn capability_of(&self, server_id: &str, method: &str) -> CapabilityStatus {
        self.inner
            .read()
            .await
            .capability_cache
            .get(&(server_id.to_string(), method.to_string()))
            .copied()
            .unwrap_or(CapabilityStatus::Unknown)
    }

    /// `(revision, full_hash, truncated_hash)` as of the last write.
    pub async fn toolset_revision(&self) -> (u64, String, String) {
        let guard = self.inner.read().await;
        (
            guard.revision,
            guard.toolset_hash_full.clone(),
            guard.toolset_hash_short.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::new(NamingConfig::default(), EventBus::new(64))
    }

    #[tokio::test]
    async fn registering_tools_assigns_namespaced_public_names() {
        let reg = registry();
        reg.register_server_tools(
            "srv1",
            &[json!({"name": "echo", "inputSchema": {"type": "object"}})],
        )
        .await;
        assert_eq!(
            reg.resolve_public_tool("echo_srv1").await,
            Some(("srv1".to_string(), "echo".to_string()))
        );
    }

    #[tokio::test]
    async fn re_registering_replaces_the_previous_set_atomically() {
        let reg = registry();
        reg.register_server_tools(
            "srv1",
            &[json!({"name": "a", "inputSchema": {}}), json!({"name": "b", "inputSchema": {}})],
        )
        .await;
        reg.register_server_tools("srv1", &[json!({"name": "b", "inputSchema": {}})]).await;

        assert!(reg.resolve_public_tool("a_srv1").await.is_none());
        assert!(reg.resolve_public_tool("b_srv1").await.is_some());
    }

    #[tokio::test]
    async fn unregister_server_clears_all_capability_kinds() {
        let reg = registry();
        reg.register_server_tools("srv1", &[json!({"name": "a", "inputSchema": {}})]).await;
        reg.register_server_resources("srv1", &[json!({"uri": "file:///a"})]).await;
        reg.unregister_server("srv1").await;

        assert!(reg.list_tools().await.is_empty());
        assert!(reg.list_resources().await.is_empty());
    }

    #[tokio::test]
    async fn toolset_hash_and_revision_bump_on_change() {
        let reg = registry();
        let (rev0, ..) = reg.toolset_revision().await;
        reg.register_server_tools(
            "srv1",
            &[json!({"name": "echo", "inputSchema": {"type": "object"}})],
        )
        .await;
        let (rev1, full1, short1) = reg.toolset_revision().await;
        assert!(rev1 > rev0);
        assert_eq!(short1.len(), 16);
        assert!(full1.len() >= 16);
    }

    #[tokio::test]
    async fn capability_cache_defaults_to_unknown() {
        let reg = registry();
        assert_eq!(reg.capability_of("srv1", "resources/list").await, CapabilityStatus::Unknown);
        reg.set_capability_status("srv1", "resources/list", CapabilityStatus::Unsupported).await;
        assert_eq!(reg.capability_of("srv1", "resources/list").await, CapabilityStatus::Unsupported);
    }
}
