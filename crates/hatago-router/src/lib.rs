//! Ties the Supervisor and Capability Registry together: keeps the
//! registry in sync with upstream activation/state changes, fans upstream
//! progress notifications back to the originating session, and exposes
//! the `tools/call` / `resources/read` / `prompts/get` dispatch
//! procedures.

pub mod dispatch;
pub mod session;
pub mod suggest;

use std::collections::HashMap;
use std::sync::Arc;

use hatago_registry::{CapabilityStatus, Registry};
use hatago_support::events::{EventBus, EventKind};
use hatago_support::ids::ProgressTokenGenerator;
use hatago_support::HatagoError;
use hatago_supervisor::Supervisor;
use serde_json::Value;
use tokio::sync::RwLock;

pub use dispatch::Dispatcher;
pub use session::Session;

pub struct Router {
    supervisor: Arc<Supervisor>,
    registry: Arc<Registry>,
    progress_tokens: ProgressTokenGenerator,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Router {
    /// Build a router and spawn its two background tasks: one keeping the
    /// registry in sync with Supervisor state changes, one fanning
    /// upstream progress notifications out to sessions.
    pub fn spawn(supervisor: Arc<Supervisor>, registry: Arc<Registry>, events: EventBus) -> Arc<Self> {
        let router = Arc::new(Self {
            supervisor,
            registry,
            progress_tokens: ProgressTokenGenerator::new(),
            sessions: RwLock::new(HashMap::new()),
        });

        router.clone().spawn_registry_sync(events);
        router.clone().spawn_progress_forwarder();
        router
    }

    fn spawn_registry_sync(self: Arc<Self>, events: EventBus) {
        tokio::spawn(async move {
            let mut rx = events.subscribe();
            loop {
                match rx.recv().await {
                    Ok(EventKind::ActivationSuccess { server_id }) => {
                        self.sync_registry(&server_id).await;
                    }
                    Ok(EventKind::StateChanged { server_id, to, .. }) => {
                        if to == "INACTIVE" || to == "ERROR" || to == "IDLING" || to == "STOPPING" {
                            self.registry.unregister_server(&server_id).await;
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }

    async fn sync_registry(&self, server_id: &str) {
        let Some(caps) = self.supervisor.capabilities_of(server_id).await else {
            return;
        };
        self.registry.register_server_tools(server_id, &caps.tools).await;
        self.registry
            .register_server_resources(server_id, &caps.resources)
            .await;
        self.registry.register_server_prompts(server_id, &caps.prompts).await;
        self.registry
            .set_capability_status(
                server_id,
                "resources/list",
                if caps.resources.is_empty() {
                    CapabilityStatus::Unknown
                } else {
                    CapabilityStatus::Supported
                },
            )
            .await;
    }

    fn spawn_progress_forwarder(self: Arc<Self>) {
        tokio::spawn(async move {
            let Some(mut rx) = self.supervisor.take_notifications().await else {
                return;
            };
            while let Some((server_id, message)) = rx.recv().await {
                if hatago_support::rpc::method_of(&message) != Some("notifications/progress") {
                    continue;
                }
                let Some(params) = message.get("params") else { continue };
                let Some(upstream_token) = params.get("progressToken").and_then(Value::as_str) else {
                    continue;
                };
                let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
                for session in sessions {
                    if let Some(public_token) = session.public_token_for(&server_id, upstream_token).await {
                        let mut forwarded = params.clone();
                        if let Some(obj) = forwarded.as_object_mut() {
                            obj.insert("progressToken".to_string(), Value::String(public_token.clone()));
                        }
                        session.push_progress(public_token, forwarded).await;
                    }
                }
            }
        });
    }

    pub async fn register_session(&self, session: Arc<Session>) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    pub async fn remove_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher {
            supervisor: &self.supervisor,
            registry: &self.registry,
            progress_tokens: &self.progress_tokens,
        }
    }

    pub async fn call_tool(
        &self,
        session: &Session,
        public_name: &str,
        arguments: Value,
        progress_token: Option<Value>,
    ) -> Result<Value, HatagoError> {
        self.dispatcher().call_tool(session, public_name, arguments, progress_token).await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Value, HatagoError> {
        self.dispatcher().read_resource(uri).await
    }

    pub async fn list_resource_templates(&self) -> Result<Value, HatagoError> {
        self.dispatcher().list_resource_templates().await
    }

    pub async fn get_prompt(&self, public_name: &str, arguments: Value) -> Result<Value, HatagoError> {
        self.dispatcher().get_prompt(public_name, arguments).await
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }
}
