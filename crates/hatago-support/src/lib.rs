//! Shared primitives used across the hub: the error taxonomy, JSON-RPC value
//! helpers, backoff/jitter, secret redaction, id generation, and the
//! typed event bus.

pub mod backoff;
pub mod error;
pub mod events;
pub mod ids;
pub mod redact;
pub mod rpc;

pub use error::{HatagoError, Severity};
