//! `GET /metrics` counter snapshot. `active_sessions` and `sse_clients`
//! are maintained directly by the HTTP/stdio listeners as connections come
//! and go; `tool_calls_total`/`tool_errors_total` are counted at the same
//! listeners around each `tools/call` dispatch; `retries_total` is derived
//! by subscribing to the hub's event bus for `ActivationFailed` — the
//! closest available signal for a restart attempt, since the supervisor
//! doesn't publish a dedicated retry event.

use std::sync::atomic::{AtomicU64, Ordering};

use hatago_support::events::{EventBus, EventKind};
use serde_json::{json, Value};

#[derive(Default)]
pub struct Metrics {
    tool_calls_total: AtomicU64,
    tool_errors_total: AtomicU64,
    retries_total: AtomicU64,
    active_sessions: AtomicU64,
    sse_clients: AtomicU64,
}

impl Metrics {
    pub fn spawn(events: EventBus) -> std::sync::Arc<Self> {
        let metrics = std::sync::Arc::new(Self::default());
        let task_metrics = metrics.clone();
        tokio::spawn(async move {
            let mut rx = events.subscribe();
            loop {
                match rx.recv().await {
                    Ok(EventKind::ActivationFailed { .. }) => {
                        task_metrics.retries_total.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        metrics
    }

    /// Record the outcome of one `tools/call` dispatch, observed by the
    /// listener from the JSON-RPC response envelope it just produced.
    pub fn record_tool_call(&self, ok: bool) {
        self.tool_calls_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.tool_errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn session_connected(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_disconnected(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn sse_client_connected(&self) {
        self.sse_clients.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sse_client_disconnected(&self) {
        self.sse_clients.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Value {
        json!({
            "tool_calls_total": self.tool_calls_total.load(Ordering::Relaxed),
            "tool_errors_total": self.tool_errors_total.load(Ordering::Relaxed),
            "retries_total": self.retries_total.load(Ordering::Relaxed),
            "active_sessions": self.active_sessions.load(Ordering::Relaxed),
            "sse_clients": self.sse_clients.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tool_call_updates_both_counters_on_failure() {
        let metrics = Metrics::default();
        metrics.record_tool_call(true);
        metrics.record_tool_call(false);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["tool_calls_total"], 2);
        assert_eq!(snapshot["tool_errors_total"], 1);
    }

    #[tokio::test]
    async fn activation_failed_events_increment_retries() {
        let events = EventBus::new(16);
        let metrics = Metrics::spawn(events.clone());
        events.publish(EventKind::ActivationFailed {
            server_id: "srv1".into(),
            reason: "connect refused".into(),
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(metrics.snapshot()["retries_total"], 1);
    }

    #[test]
    fn session_counter_tracks_connect_and_disconnect() {
        let metrics = Metrics::default();
        metrics.session_connected();
        metrics.session_connected();
        metrics.session_disconnected();
        assert_eq!(metrics.snapshot()["active_sessions"], 1);
    }
}
