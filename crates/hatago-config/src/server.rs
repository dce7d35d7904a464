//! `ServerConfig`: one upstream entry in `mcpServers`. Tagged on `type`,
//! with the untagged-legacy fallback (`command` present, no `type`) the
//! distilled config format still needs to accept.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use hatago_supervisor::{ActivationPolicy, ActivityReset, IdlePolicy};

#[derive(Debug, Clone, PartialEq)]
pub enum ServerTransport {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
        cwd: Option<String>,
    },
    Http {
        url: String,
        headers: HashMap<String, String>,
        allow_insecure: bool,
    },
    Sse {
        url: String,
        headers: HashMap<String, String>,
        allow_insecure: bool,
    },
}

impl ServerTransport {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Http { .. } => "http",
            Self::Sse { .. } => "sse",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerTimeouts {
    pub connect_ms: u64,
    pub request_ms: u64,
    pub keep_alive_ms: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            request_ms: 30_000,
            keep_alive_ms: 300_000,
        }
    }
}

fn default_idle_policy() -> IdlePolicy {
    IdlePolicy {
        idle_timeout: std::time::Duration::from_secs(300),
        min_linger: std::time::Duration::from_secs(30),
        activity_reset: ActivityReset::OnCallEnd,
    }
}

fn default_max_restarts() -> u32 {
    3
}

/// One `mcpServers` entry: transport plus the supervisor-facing policy
/// knobs from §3's config shape.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub transport: ServerTransport,
    pub timeouts: ServerTimeouts,
    pub activation_policy: ActivationPolicy,
    pub idle_policy: IdlePolicy,
    pub max_restarts: u32,
    pub tags: Vec<String>,
}

/// Raw wire shape, deserialized then validated/converted into
/// [`ServerConfig`]. Accepts the legacy untagged-stdio form (`command`
/// present, no `type`).
#[derive(Deserialize)]
struct RawServerConfig {
    #[serde(rename = "type")]
    transport_type: Option<String>,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    cwd: Option<String>,
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    allow_insecure: bool,
    #[serde(default)]
    timeouts: RawTimeouts,
    #[serde(rename = "activationPolicy", default)]
    activation_policy: Option<String>,
    #[serde(rename = "idlePolicy", default)]
    idle_policy: Option<RawIdlePolicy>,
    #[serde(rename = "maxRestarts", default = "default_max_restarts")]
    max_restarts: u32,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize, Default)]
struct RawTimeouts {
    #[serde(rename = "connectMs")]
    connect_ms: Option<u64>,
    #[serde(rename = "requestMs")]
    request_ms: Option<u64>,
    #[serde(rename = "keepAliveMs")]
    keep_alive_ms: Option<u64>,
}

#[derive(Deserialize)]
struct RawIdlePolicy {
    #[serde(rename = "idleTimeoutMs")]
    idle_timeout_ms: Option<u64>,
    #[serde(rename = "minLingerMs")]
    min_linger_ms: Option<u64>,
    #[serde(rename = "activityReset")]
    activity_reset: Option<String>,
}

impl<'de> Deserialize<'de> for ServerConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawServerConfig::deserialize(deserializer)?;

        let transport = match raw.transport_type.as_deref() {
            Some("stdio") | None if raw.command.is_some() => ServerTransport::Stdio {
                command: raw.command.unwrap(),
                args: raw.args,
                env: raw.env,
                cwd: raw.cwd,
            },
            Some("http") => ServerTransport::Http {
                url: raw.url.ok_or_else(|| serde::de::Error::custom("type \"http\" requires 'url'"))?,
                headers: raw.headers,
                allow_insecure: raw.allow_insecure,
            },
            Some("sse") => ServerTransport::Sse {
                url: raw.url.ok_or_else(|| serde::de::Error::custom("type \"sse\" requires 'url'"))?,
                headers: raw.headers,
                allow_insecure: raw.allow_insecure,
            },
            Some(other) => {
                return Err(serde::de::Error::custom(format!(
                    "unknown transport type '{other}' (expected: stdio, http, sse)"
                )))
            }
            None => {
                return Err(serde::de::Error::custom(
                    "missing 'type' field; add type = \"stdio\" (with 'command') or type = \"http\"/\"sse\" (with 'url')",
                ))
            }
        };

        let mut timeouts = ServerTimeouts::default();
        if let Some(ms) = raw.timeouts.connect_ms {
            timeouts.connect_ms = ms;
        }
        if let Some(ms) = raw.timeouts.request_ms {
            timeouts.request_ms = ms;
        }
        if let Some(ms) = raw.timeouts.keep_alive_ms {
            timeouts.keep_alive_ms = ms;
        }

        let activation_policy = match raw.activation_policy.as_deref() {
            None => ActivationPolicy::OnDemand,
            Some("always") => ActivationPolicy::Always,
            Some("onDemand") => ActivationPolicy::OnDemand,
            Some("manual") => ActivationPolicy::Manual,
            Some(other) => {
                return Err(serde::de::Error::custom(format!("unknown activationPolicy '{other}'")))
            }
        };

        let mut idle_policy = default_idle_policy();
        if let Some(raw_idle) = raw.idle_policy {
            if let Some(ms) = raw_idle.idle_timeout_ms {
                idle_policy.idle_timeout = std::time::Duration::from_millis(ms);
            }
            if let Some(ms) = raw_idle.min_linger_ms {
                idle_policy.min_linger = std::time::Duration::from_millis(ms);
            }
            match raw_idle.activity_reset.as_deref() {
                None => {}
                Some("onCallStart") => idle_policy.activity_reset = ActivityReset::OnCallStart,
                Some("onCallEnd") => idle_policy.activity_reset = ActivityReset::OnCallEnd,
                Some(other) => {
                    return Err(serde::de::Error::custom(format!("unknown activityReset '{other}'")))
                }
            }
        }

        Ok(ServerConfig {
            transport,
            timeouts,
            activation_policy,
            idle_policy,
            max_restarts: raw.max_restarts,
            tags: raw.tags,
        })
    }
}
