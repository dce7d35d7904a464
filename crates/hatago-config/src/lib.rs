//! Validated configuration loading: TOML on disk → `${VAR}` expansion →
//! `GlobalConfig` → per-upstream [`hatago_supervisor::UpstreamConfig`] and
//! a [`hatago_registry::NamingConfig`].

pub mod env;
pub mod server;

use std::collections::HashMap;
use std::path::Path;

use hatago_registry::{CollisionPolicy, NamingConfig, NamingStrategy};
use hatago_supervisor::UpstreamConfig;
use hatago_transport::TransportSpec;
use serde::Deserialize;

pub use server::{ServerConfig, ServerTransport};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config validation failed: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct RawToolNaming {
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    separator: Option<String>,
    #[serde(rename = "collisionPolicy", default)]
    collision_policy: Option<String>,
    #[serde(default)]
    aliases: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawGlobalConfig {
    version: u32,
    #[serde(rename = "logLevel", default = "default_log_level")]
    log_level: String,
    #[serde(rename = "mcpServers", default)]
    mcp_servers: HashMap<String, ServerConfig>,
    #[serde(rename = "toolNaming", default)]
    tool_naming: Option<RawToolNaming>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A validated, fully-resolved hub configuration.
#[derive(Debug)]
pub struct GlobalConfig {
    pub version: u32,
    pub log_level: String,
    pub mcp_servers: HashMap<String, ServerConfig>,
    pub naming: NamingConfig,
}

impl GlobalConfig {
    /// Load and validate `path`: read the file, expand `${VAR}` references
    /// in every string value, parse as TOML, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let expanded = env::expand(&raw_content);
        Self::parse(&expanded)
    }

    pub fn parse(toml_content: &str) -> Result<Self, ConfigError> {
        let raw: RawGlobalConfig = toml::from_str(toml_content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawGlobalConfig) -> Result<Self, ConfigError> {
        if raw.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {} (expected 1)",
                raw.version
            )));
        }
        if raw.mcp_servers.is_empty() {
            tracing::warn!("config declares no mcpServers entries");
        }

        let naming = match raw.tool_naming {
            None => NamingConfig::default(),
            Some(raw_naming) => {
                let strategy = match raw_naming.strategy.as_deref() {
                    None | Some("namespace") => NamingStrategy::Namespace,
                    Some("alias") => NamingStrategy::Alias,
                    Some("none") => NamingStrategy::None,
                    Some("aliases") => NamingStrategy::Aliases,
                    Some(other) => {
                        return Err(ConfigError::Invalid(format!("unknown toolNaming.strategy '{other}'")))
                    }
                };
                let collision_policy = match raw_naming.collision_policy.as_deref() {
                    None | Some("error") => CollisionPolicy::Error,
                    Some("prefix") => CollisionPolicy::Prefix,
                    Some("rename") => CollisionPolicy::Rename,
                    Some(other) => {
                        return Err(ConfigError::Invalid(format!(
                            "unknown toolNaming.collisionPolicy '{other}'"
                        )))
                    }
                };
                NamingConfig {
                    strategy,
                    separator: raw_naming.separator.unwrap_or_else(|| "_".to_string()),
                    collision_policy,
                    aliases: raw_naming.aliases,
                }
            }
        };

        Ok(GlobalConfig {
            version: raw.version,
            log_level: raw.log_level,
            mcp_servers: raw.mcp_servers,
            naming,
        })
    }

    /// Convert every configured server into an [`UpstreamConfig`] ready to
    /// register with the Supervisor.
    pub fn upstream_configs(&self) -> Vec<UpstreamConfig> {
        self.mcp_servers
            .iter()
            .map(|(id, server)| UpstreamConfig {
                id: id.clone(),
                transport: to_transport_spec(&server.transport),
                connect_timeout: std::time::Duration::from_millis(server.timeouts.connect_ms),
                request_timeout: std::time::Duration::from_millis(server.timeouts.request_ms),
                keep_alive: std::time::Duration::from_millis(server.timeouts.keep_alive_ms),
                activation_policy: server.activation_policy,
                idle_policy: server.idle_policy,
                max_restarts: server.max_restarts,
                tags: server.tags.clone(),
            })
            .collect()
    }
}

fn to_transport_spec(transport: &ServerTransport) -> TransportSpec {
    match transport {
        ServerTransport::Stdio { command, args, env, .. } => TransportSpec::Stdio {
            command: command.clone(),
            args: args.clone(),
            env: env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        },
        ServerTransport::Http { url, headers, allow_insecure } => TransportSpec::Http {
            url: url.clone(),
            headers: headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            allow_insecure: *allow_insecure,
        },
        ServerTransport::Sse { url, headers, allow_insecure } => TransportSpec::Sse {
            url: url.clone(),
            headers: headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            allow_insecure: *allow_insecure,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
logLevel = "debug"

[mcpServers.echo]
type = "stdio"
command = "echo-mcp"
args = ["--stdio"]

[mcpServers.weather]
type = "http"
url = "https://weather.example.com/mcp"
"#;

    #[test]
    fn parses_sample_config() {
        let config = GlobalConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.mcp_servers.len(), 2);
        let upstreams = config.upstream_configs();
        assert_eq!(upstreams.len(), 2);
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = GlobalConfig::parse("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn env_expansion_applies_before_parse() {
        unsafe { std::env::set_var("HATAGO_TEST_URL", "https://example.com/mcp") };
        let toml = r#"
version = 1
[mcpServers.svc]
type = "http"
url = "${HATAGO_TEST_URL}"
"#;
        let config = GlobalConfig::parse(&env::expand(toml)).unwrap();
        match &config.mcp_servers["svc"].transport {
            ServerTransport::Http { url, .. } => assert_eq!(url, "https://example.com/mcp"),
            other => panic!("expected http transport, got {other:?}"),
        }
        unsafe { std::env::remove_var("HATAGO_TEST_URL") };
    }

    #[test]
    fn custom_naming_strategy_is_honored() {
        let toml = r#"
version = 1
[toolNaming]
strategy = "alias"
[mcpServers.echo]
command = "echo-mcp"
"#;
        let config = GlobalConfig::parse(toml).unwrap();
        assert_eq!(config.naming.strategy, NamingStrategy::Alias);
    }
}
