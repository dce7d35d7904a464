//! Debounced `notifications/*/list_changed` fan-out.
//!
//! Capability-set changes arrive in bursts (a server activates and
//! registers a dozen tools at once); we coalesce them into a single
//! downstream notification per kind after 100ms of quiet.

use std::time::Duration;

use hatago_support::events::{EventBus, EventKind};
use serde_json::{json, Value};
use tokio::sync::broadcast;

const DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Default, Clone, Copy)]
struct Pending {
    tools: bool,
    resources: bool,
    prompts: bool,
}

impl Pending {
    fn is_empty(&self) -> bool {
        !self.tools && !self.resources && !self.prompts
    }
}

/// Broadcasts downstream `notifications/*/list_changed` messages. Clone
/// to hand a subscriber to each connected session/transport.
#[derive(Clone)]
pub struct ListChangedNotifier {
    tx: broadcast::Sender<Value>,
}

impl ListChangedNotifier {
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.tx.subscribe()
    }
}

/// Spawn the debounce task and return a notifier sessions/transports can
/// subscribe to for downstream delivery.
pub fn spawn(events: EventBus) -> ListChangedNotifier {
    let (tx, _rx) = broadcast::channel(64);
    let notifier = ListChangedNotifier { tx: tx.clone() };

    tokio::spawn(async move {
        let mut rx = events.subscribe();
        let mut pending = Pending::default();

        loop {
            if pending.is_empty() {
                match rx.recv().await {
                    Ok(event) => apply(&mut pending, &event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
                continue;
            }

            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Ok(event) => apply(&mut pending, &event),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
                _ = tokio::time::sleep(DEBOUNCE) => {
                    flush(&tx, &mut pending);
                }
            }
        }
    });

    notifier
}

fn apply(pending: &mut Pending, event: &EventKind) {
    match event {
        EventKind::ToolRegistered { .. } | EventKind::ToolUnregistered { .. } => {
            pending.tools = true;
        }
        EventKind::ActivationSuccess { .. } => {
            pending.tools = true;
            pending.resources = true;
            pending.prompts = true;
        }
        EventKind::StateChanged { to, .. } if to == "INACTIVE" || to == "ERROR" => {
            pending.tools = true;
            pending.resources = true;
            pending.prompts = true;
        }
        _ => {}
    }
}

fn flush(tx: &broadcast::Sender<Value>, pending: &mut Pending) {
    if pending.tools {
        let _ = tx.send(json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}));
    }
    if pending.resources {
        let _ = tx.send(json!({"jsonrpc": "2.0", "method": "notifications/resources/list_changed"}));
    }
    if pending.prompts {
        let _ = tx.send(json!({"jsonrpc": "2.0", "method": "notifications/prompts/list_changed"}));
    }
    *pending = Pending::default();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn tool_registration_emits_debounced_list_changed() {
        let events = EventBus::new(64);
        let notifier = spawn(events.clone());
        let mut rx = notifier.subscribe();

        events.publish(EventKind::ToolRegistered {
            server_id: "srv1".into(),
            tool_name: "echo_srv1".into(),
        });
        events.publish(EventKind::ToolRegistered {
            server_id: "srv1".into(),
            tool_name: "ping_srv1".into(),
        });

        let message = tokio::time::timeout(StdDuration::from_millis(500), rx.recv())
            .await
            .expect("notification within debounce window")
            .unwrap();
        assert_eq!(message["method"], "notifications/tools/list_changed");

        assert!(tokio::time::timeout(StdDuration::from_millis(150), rx.recv())
            .await
            .is_err());
    }
}
