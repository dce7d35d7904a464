//! Owned transports connecting the hub to a single upstream MCP server:
//! a child process over stdio, or an HTTP endpoint speaking either the
//! streamable-HTTP contract or the legacy SSE handshake.
//!
//! This crate defines its own minimal [`config::TransportConfig`] rather
//! than depending on `hatago-config`, so that crate can sit above this one
//! without creating a cycle.

pub mod config;
pub mod framing;
pub mod http;
pub mod sse;
pub mod ssrf;
pub mod stdio;

use async_trait::async_trait;
use hatago_support::HatagoError;
use serde_json::Value;
use tokio::sync::mpsc;

pub use config::{TransportConfig, TransportTimeouts};

/// A message arriving from the upstream side of a transport, or a
/// notice that the transport has gone away.
#[derive(Debug)]
pub enum TransportEvent {
    Message(Value),
    Closed { reason: String },
}

/// A live connection to one upstream server. Implementations own whatever
/// process/socket/stream resources the connection needs; dropping one
/// without calling [`Transport::close`] is a bug, not an error path, since
/// closing performs an orderly shutdown (e.g. terminating a child process).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one JSON-RPC message (request or notification) upstream.
    async fn send(&self, message: Value) -> Result<(), HatagoError>;

    /// Close the connection. Idempotent.
    async fn close(&self) -> Result<(), HatagoError>;

    /// A short label identifying the transport kind, for logging.
    fn kind(&self) -> &'static str;
}

/// The receiving half returned alongside a [`Transport`] by `connect`:
/// upstream messages and the eventual closure notice arrive here.
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

#[derive(Debug, Clone)]
pub enum TransportSpec {
    Stdio {
        command: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    },
    Http {
        url: String,
        headers: Vec<(String, String)>,
        allow_insecure: bool,
    },
    Sse {
        url: String,
        headers: Vec<(String, String)>,
        allow_insecure: bool,
    },
}

/// Establish a connection per `spec`, returning the sender half and a
/// channel of inbound events. Connection failures are returned directly
/// rather than surfaced only through the event channel, so the caller's
/// retry/backoff logic sees them immediately.
pub async fn connect(
    spec: &TransportSpec,
    timeouts: &TransportTimeouts,
) -> Result<(Box<dyn Transport>, EventReceiver), HatagoError> {
    match spec {
        TransportSpec::Stdio { command, args, env } => {
            stdio::connect(command, args, env, timeouts).await
        }
        TransportSpec::Http {
            url,
            headers,
            allow_insecure,
        } => http::connect(url, headers, *allow_insecure, timeouts).await,
        TransportSpec::Sse {
            url,
            headers,
            allow_insecure,
        } => sse::connect(url, headers, *allow_insecure, timeouts).await,
    }
}
