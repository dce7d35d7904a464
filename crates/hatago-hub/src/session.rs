//! A hub-level session: a [`hatago_router::Session`] plus the bits the
//! facade needs that the router doesn't care about — the client's
//! declared capabilities from `initialize`, and a cancellation token
//! tripped on downstream disconnect.

use std::sync::Arc;

use hatago_router::Session as RouterSession;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

pub struct HubSession {
    pub inner: Arc<RouterSession>,
    pub cancel: CancellationToken,
    initialized: tokio::sync::Mutex<bool>,
}

impl HubSession {
    pub fn new() -> Self {
        let id = Ulid::new().to_string();
        Self {
            inner: Arc::new(RouterSession::new(id, Value::Null)),
            cancel: CancellationToken::new(),
            initialized: tokio::sync::Mutex::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Record the client's declared capabilities from `initialize`.
    /// Returns `false` if `initialize` was already called on this session.
    pub async fn mark_initialized(&self) -> bool {
        let mut guard = self.initialized.lock().await;
        if *guard {
            return false;
        }
        *guard = true;
        true
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.lock().await
    }

    pub fn disconnect(&self) {
        self.cancel.cancel();
    }
}

impl Default for HubSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_initialized_is_idempotent() {
        let session = HubSession::new();
        assert!(session.mark_initialized().await);
        assert!(!session.mark_initialized().await);
        assert!(session.is_initialized().await);
    }

    #[test]
    fn disconnect_trips_cancellation() {
        let session = HubSession::new();
        assert!(!session.cancel.is_cancelled());
        session.disconnect();
        assert!(session.cancel.is_cancelled());
    }
}
