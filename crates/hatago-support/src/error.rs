//! The hub's closed error taxonomy.
//!
//! Every fallible operation in the core returns `Result<T, HatagoError>`.
//! There is no exception control flow: the Supervisor converts transport
//! errors into state transitions, the Dispatcher converts dispatch-local
//! errors into JSON-RPC responses, and only [`HatagoError::Internal`] ever
//! represents a programmer bug.

use serde::Serialize;

/// The closed set of error kinds named in the error handling design.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HatagoError {
    #[error("config: {0}")]
    Config(String),

    #[error("transport error for '{server_id}': {message}")]
    Transport { server_id: String, message: String },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("'{server_id}' does not support {method}")]
    Capability { server_id: String, method: String },

    #[error("call to '{server_id}' timed out after {timeout_ms}ms")]
    Timeout { server_id: String, timeout_ms: u64 },

    #[error("invalid state transition for '{server_id}': {from} -> {to}")]
    State {
        server_id: String,
        from: String,
        to: String,
    },

    #[error("activation of '{server_id}' denied: {reason}")]
    ActivationDenied { server_id: String, reason: String },

    #[error("upstream '{server_id}' returned error {code}: {message}")]
    Upstream {
        server_id: String,
        code: i64,
        message: String,
    },

    #[error("tool '{name}' not found")]
    ToolNotFound { name: String, suggestions: Vec<String> },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Severity attached to the downstream error shape's `data.severity` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl HatagoError {
    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal(context.into())
    }

    /// The short machine-readable code carried in `data.hatagoCode`.
    pub fn hatago_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_invalid",
            Self::Transport { .. } => "transport_error",
            Self::Protocol(_) => "protocol_error",
            Self::InvalidParams(_) => "invalid_params",
            Self::Capability { .. } => "unsupported_feature",
            Self::Timeout { .. } => "timeout",
            Self::State { .. } => "invalid_state",
            Self::ActivationDenied { .. } => "activation_denied",
            Self::Upstream { .. } => "upstream_error",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::Internal(_) => "internal",
        }
    }

    /// JSON-RPC error code per the §7 mapping.
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Self::ToolNotFound { .. } => -32601,
            Self::Capability { .. } => -32601,
            Self::Config(_) => -32600,
            Self::Protocol(_) => -32600,
            Self::InvalidParams(_) => -32602,
            Self::Timeout { .. } | Self::Internal(_) => -32603,
            Self::State { .. } | Self::ActivationDenied { .. } => -32603,
            Self::Transport { .. } => -32603,
            Self::Upstream { code, .. } => *code,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Internal(_) => Severity::Fatal,
            Self::Transport { .. } | Self::Upstream { .. } => Severity::Error,
            Self::Capability { .. } => Severity::Info,
            _ => Severity::Warning,
        }
    }

    /// Whether a caller may retry the same request later with any hope of
    /// success (used to fill `data.recoverable`).
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport { .. } | Self::ActivationDenied { .. }
        )
    }

    /// Render the downstream JSON-RPC error object described in §7.
    pub fn to_jsonrpc_error(&self, id: serde_json::Value) -> serde_json::Value {
        let mut data = serde_json::json!({
            "hatagoCode": self.hatago_code(),
            "severity": self.severity(),
            "recoverable": self.recoverable(),
        });
        match self {
            Self::Timeout { timeout_ms, .. } => {
                data["timeoutMs"] = serde_json::json!(timeout_ms);
            }
            Self::ToolNotFound { suggestions, .. } => {
                data["suggestions"] = serde_json::json!(suggestions);
            }
            Self::Upstream { server_id, .. } | Self::Transport { server_id, .. } => {
                data["serverId"] = serde_json::json!(server_id);
            }
            _ => {}
        }
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": self.jsonrpc_code(),
                "message": self.to_string(),
                "data": data,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_found_maps_to_method_not_found() {
        let err = HatagoError::ToolNotFound {
            name: "foo".into(),
            suggestions: vec!["fooo".into()],
        };
        assert_eq!(err.jsonrpc_code(), -32601);
        let rendered = err.to_jsonrpc_error(serde_json::json!(1));
        assert_eq!(rendered["error"]["code"], -32601);
        assert_eq!(rendered["error"]["data"]["suggestions"][0], "fooo");
    }

    #[test]
    fn upstream_error_preserves_verbatim_code() {
        let err = HatagoError::Upstream {
            server_id: "srv1".into(),
            code: -32010,
            message: "child exited".into(),
        };
        assert_eq!(err.jsonrpc_code(), -32010);
    }

    #[test]
    fn timeout_carries_elapsed_ms() {
        let err = HatagoError::Timeout {
            server_id: "srv1".into(),
            timeout_ms: 100,
        };
        let rendered = err.to_jsonrpc_error(serde_json::Value::Null);
        assert_eq!(rendered["error"]["data"]["timeoutMs"], 100);
        assert!(err.recoverable());
    }

    #[test]
    fn internal_errors_are_fatal_and_not_recoverable() {
        let err = HatagoError::internal("unreachable state");
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(!err.recoverable());
    }
}
