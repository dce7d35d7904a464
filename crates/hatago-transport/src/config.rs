//! Minimal transport-facing config types.
//!
//! Deliberately small and dependency-free of `hatago-config`: the
//! supervisor and server crates build these from the richer config model,
//! but this crate itself only needs timeouts.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TransportTimeouts {
    pub connect: Duration,
    pub request: Duration,
    pub idle: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(30),
            idle: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub timeouts: TransportTimeouts,
}
