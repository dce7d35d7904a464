//! The hub's internal pub-sub bus.
//!
//! Components publish state changes here instead of calling into each
//! other directly; the router, the store's debounced writer, and any
//! future diagnostics surface all subscribe independently.

use serde::Serialize;
use tokio::sync::broadcast;

/// The closed set of event kinds the hub emits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    ToolRegistered {
        server_id: String,
        tool_name: String,
    },
    ToolUnregistered {
        server_id: String,
        tool_name: String,
    },
    ToolCalled {
        server_id: String,
        tool_name: String,
        ok: bool,
    },
    StateChanged {
        server_id: String,
        from: String,
        to: String,
    },
    ActivationStart {
        server_id: String,
    },
    ActivationSuccess {
        server_id: String,
    },
    ActivationFailed {
        server_id: String,
        reason: String,
    },
    IdleScheduled {
        server_id: String,
        after_ms: u64,
    },
    IdleStopped {
        server_id: String,
    },
}

/// Broadcast channel wrapper. Cloning an [`EventBus`] shares the same
/// underlying channel; subscribers that lag behind the buffer simply miss
/// the oldest events rather than blocking publishers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventKind>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventKind> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of active subscribers that
    /// received it; callers never treat "no subscribers" as an error.
    pub fn publish(&self, event: EventKind) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(EventKind::ActivationStart {
            server_id: "srv1".into(),
        });
        let received = rx.recv().await.unwrap();
        matches!(received, EventKind::ActivationStart { server_id } if server_id == "srv1");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        let count = bus.publish(EventKind::IdleStopped {
            server_id: "srv1".into(),
        });
        assert_eq!(count, 0);
    }
}
