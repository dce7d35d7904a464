//! Per-upstream connection actor.
//!
//! Owns the live [`Transport`] and its inbound event channel. JSON-RPC
//! requests the actor originates are correlated to their response by id;
//! anything else arriving on the transport (notifications, unmatched
//! responses after a timeout) is forwarded to `notify_tx` for the router
//! to fan out as progress or list-changed events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hatago_support::HatagoError;
use hatago_transport::{EventReceiver, Transport, TransportEvent};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

enum ActorCommand {
    Call {
        request: Value,
        id: Value,
        respond_to: oneshot::Sender<Result<Value, HatagoError>>,
    },
    /// A call timed out downstream; drop its pending entry and make a
    /// best-effort attempt to tell the upstream to stop working on it.
    Cancel {
        id: Value,
    },
    Shutdown,
}

pub struct ActorHandle {
    server_id: String,
    commands: mpsc::Sender<ActorCommand>,
    ids: AtomicU64,
}

impl ActorHandle {
    /// Send `method`/`params` as a JSON-RPC request and wait for the
    /// matching response (by id), or `HatagoError::Timeout` if none
    /// arrives within `timeout`.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: std::time::Duration,
    ) -> Result<Value, HatagoError> {
        let call_id = self.ids.fetch_add(1, Ordering::Relaxed);
        let id = Value::from(call_id);
        let request = hatago_support::rpc::request(id.clone(), method, params);

        let (respond_to, response_rx) = oneshot::channel();
        self.commands
            .send(ActorCommand::Call {
                request,
                id,
                respond_to,
            })
            .await
            .map_err(|_| HatagoError::Transport {
                server_id: self.server_id.clone(),
                message: "connection actor is gone".into(),
            })?;

        match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HatagoError::Transport {
                server_id: self.server_id.clone(),
                message: "connection actor dropped response channel".into(),
            }),
            Err(_) => {
                let _ = self.commands.send(ActorCommand::Cancel { id }).await;
                Err(HatagoError::Timeout {
                    server_id: self.server_id.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(ActorCommand::Shutdown).await;
    }
}

/// Spawn the actor loop, returning a handle for issuing calls and a
/// channel of unsolicited messages (notifications, and responses that
/// arrived after their caller already timed out).
pub fn spawn(
    server_id: String,
    transport: Arc<dyn Transport>,
    mut events: EventReceiver,
    notify_tx: mpsc::Sender<(String, Value)>,
) -> ActorHandle {
    let (commands_tx, mut commands_rx) = mpsc::channel::<ActorCommand>(64);
    let task_server_id = server_id.clone();

    tokio::spawn(async move {
        let server_id = task_server_id;
        let mut pending: HashMap<String, oneshot::Sender<Result<Value, HatagoError>>> =
            HashMap::new();

        loop {
            tokio::select! {
                cmd = commands_rx.recv() => {
                    match cmd {
                        Some(ActorCommand::Call { request, id, respond_to }) => {
                            if let Err(e) = transport.send(request).await {
                                let _ = respond_to.send(Err(e));
                                continue;
                            }
                            pending.insert(id_key(&id), respond_to);
                        }
                        Some(ActorCommand::Cancel { id }) => {
                            if pending.remove(&id_key(&id)).is_some() {
                                let notification = hatago_support::rpc::notification(
                                    "notifications/cancelled",
                                    serde_json::json!({ "requestId": id }),
                                );
                                let _ = transport.send(notification).await;
                            }
                        }
                        Some(ActorCommand::Shutdown) | None => {
                            let _ = transport.close().await;
                            return;
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(TransportEvent::Message(value)) => {
                            if let Some(id) = hatago_support::rpc::id_of(&value) {
                                let key = id_key(id);
                                if let Some(sender) = pending.remove(&key) {
                                    let outcome = if let Some(error) = value.get("error") {
                                        Err(HatagoError::Upstream {
                                            server_id: server_id.clone(),
                                            code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                                            message: error.get("message").and_then(Value::as_str).unwrap_or("upstream error").to_string(),
                                        })
                                    } else {
                                        Ok(value.get("result").cloned().unwrap_or(Value::Null))
                                    };
                                    let _ = sender.send(outcome);
                                    continue;
                                }
                            }
                            let _ = notify_tx.send((server_id.clone(), value)).await;
                        }
                        Some(TransportEvent::Closed { reason }) => {
                            tracing::warn!(server = %server_id, %reason, "upstream transport closed");
                            for (_, sender) in pending.drain() {
                                let _ = sender.send(Err(HatagoError::Transport {
                                    server_id: server_id.clone(),
                                    message: reason.clone(),
                                }));
                            }
                            return;
                        }
                        None => return,
                    }
                }
            }
        }
    });

    ActorHandle {
        server_id,
        commands: commands_tx,
        ids: AtomicU64::new(1),
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// A transport that records every message it's asked to send and
    /// never responds, so calls through it always time out.
    struct SilentTransport {
        sent: Arc<StdMutex<Vec<Value>>>,
    }

    #[async_trait]
    impl Transport for SilentTransport {
        async fn send(&self, message: Value) -> Result<(), HatagoError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn close(&self) -> Result<(), HatagoError> {
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "silent"
        }
    }

    #[tokio::test]
    async fn timeout_sends_best_effort_cancelled_notification_and_drops_pending_entry() {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let transport: Arc<dyn Transport> = Arc::new(SilentTransport { sent: sent.clone() });
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (notify_tx, _notify_rx) = mpsc::channel(8);

        let handle = spawn("mock".into(), transport, events_rx, notify_tx);

        let err = handle
            .call("tools/call", serde_json::json!({}), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, HatagoError::Timeout { .. }));

        // give the actor loop a beat to process the Cancel command it
        // was sent right after the timeout fired.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2, "expected the original call plus a cancelled notification");
        assert_eq!(sent[1]["method"], "notifications/cancelled");
        assert_eq!(sent[1]["params"]["requestId"], serde_json::json!(1));
    }
}
