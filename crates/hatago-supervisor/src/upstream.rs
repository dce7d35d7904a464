//! The state machine, activation contract, and idle reaper for a single
//! upstream connection.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hatago_support::backoff::compute_delay;
use hatago_support::events::{EventBus, EventKind};
use hatago_support::HatagoError;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::actor::{self, ActorHandle};
use crate::config::{ActivationPolicy, ActivityReset, UpstreamConfig};
use crate::state::UpstreamState;

const PROTOCOL_VERSION: &str = "2025-06-18";
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Raw capability lists discovered during activation, before the
/// Capability Registry assigns public names.
#[derive(Debug, Default, Clone)]
pub struct DiscoveredCapabilities {
    pub tools: Vec<Value>,
    pub resources: Vec<Value>,
    pub prompts: Vec<Value>,
}

type ActivationOutcome = Result<(), String>;

/// Why an activation is being requested. Gates against `activationPolicy`
/// per the policy table in [`Upstream::policy_permits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSource {
    /// A downstream `tools/call`, `resources/read`, or `prompts/get`.
    ToolCall,
    /// An explicit operator/admin activation request.
    Manual,
    /// Hub startup, activating `always`-policy upstreams.
    Startup,
    /// Automatic activation because another upstream depends on this one.
    Dependency,
}

struct Mutable {
    state: UpstreamState,
    actor: Option<Arc<ActorHandle>>,
    capabilities: DiscoveredCapabilities,
    last_activity: Instant,
    last_failure_reason: Option<String>,
    restart_count: u32,
    idle_task: Option<JoinHandle<()>>,
}

pub struct Upstream {
    pub config: UpstreamConfig,
    mutable: Mutex<Mutable>,
    ref_count: AtomicU32,
    activation_inflight: Mutex<Option<watch::Receiver<Option<ActivationOutcome>>>>,
    events: EventBus,
    notify_tx: mpsc::Sender<(String, Value)>,
}

impl Upstream {
    pub fn new(config: UpstreamConfig, events: EventBus, notify_tx: mpsc::Sender<(String, Value)>) -> Self {
        Self {
            config,
            mutable: Mutex::new(Mutable {
                state: UpstreamState::Inactive,
                actor: None,
                capabilities: DiscoveredCapabilities::default(),
                last_activity: Instant::now(),
                last_failure_reason: None,
                restart_count: 0,
                idle_task: None,
            }),
            ref_count: AtomicU32::new(0),
            activation_inflight: Mutex::new(None),
            events,
            notify_tx,
        }
    }

    pub async fn state(&self) -> UpstreamState {
        self.mutable.lock().await.state
    }

    pub async fn capabilities(&self) -> DiscoveredCapabilities {
        self.mutable.lock().await.capabilities.clone()
    }

    /// Ensure the upstream is `ACTIVE`, activating it if necessary
    /// (respecting the `activationPolicy`/`source` gate in
    /// [`Self::policy_permits`]), and bump its ref count. Callers must pair
    /// this with [`Self::release`].
    pub async fn acquire(
        self: &Arc<Self>,
        source: ActivationSource,
    ) -> Result<Arc<ActorHandle>, HatagoError> {
        let actor = self.ensure_active(source).await?;
        self.ref_count.fetch_add(1, Ordering::AcqRel);
        if self.config.idle_policy.activity_reset == ActivityReset::OnCallStart {
            self.mutable.lock().await.last_activity = Instant::now();
        }
        Ok(actor)
    }

    /// `activate iff (policy=always ∧ source∈{startup,dependency}) or
    /// (policy=onDemand) or (policy=manual ∧ source=manual)`.
    fn policy_permits(&self, source: ActivationSource) -> bool {
        match self.config.activation_policy {
            ActivationPolicy::Always => {
                matches!(source, ActivationSource::Startup | ActivationSource::Dependency)
            }
            ActivationPolicy::OnDemand => true,
            ActivationPolicy::Manual => source == ActivationSource::Manual,
        }
    }

    /// Release a ref acquired via [`Self::acquire`]; schedules an idle
    /// check once the ref count reaches zero.
    pub async fn release(self: &Arc<Self>) {
        let prev = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        if self.config.idle_policy.activity_reset == ActivityReset::OnCallEnd {
            self.mutable.lock().await.last_activity = Instant::now();
        }
        if prev == 1 && self.config.activation_policy == ActivationPolicy::OnDemand {
            self.schedule_idle_check().await;
        }
    }

    async fn ensure_active(
        self: &Arc<Self>,
        source: ActivationSource,
    ) -> Result<Arc<ActorHandle>, HatagoError> {
        loop {
            {
                let guard = self.mutable.lock().await;
                if guard.state == UpstreamState::Active {
                    if let Some(actor) = guard.actor.clone() {
                        return Ok(actor);
                    }
                }
            }
            if !self.policy_permits(source) {
                return Err(HatagoError::ActivationDenied {
                    server_id: self.config.id.clone(),
                    reason: format!(
                        "activationPolicy {:?} does not permit activation from source {source:?}",
                        self.config.activation_policy
                    ),
                });
            }
            self.activate_single_flight().await?;
        }
    }

    async fn activate_single_flight(self: &Arc<Self>) -> Result<(), HatagoError> {
        let maybe_rx = {
            let mut slot = self.activation_inflight.lock().await;
            if let Some(rx) = slot.as_ref() {
                Some(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                *slot = Some(rx);
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let outcome = this.activate().await;
                    let _ = tx.send(Some(outcome));
                    *this.activation_inflight.lock().await = None;
                });
                None
            }
        };

        let mut rx = match maybe_rx {
            Some(rx) => rx,
            None => self
                .activation_inflight
                .lock()
                .await
                .clone()
                .expect("just inserted"),
        };

        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome.map_err(|reason| HatagoError::Transport {
                    server_id: self.config.id.clone(),
                    message: reason,
                });
            }
            if rx.changed().await.is_err() {
                return Err(HatagoError::Internal(
                    "activation watch channel closed without an outcome".into(),
                ));
            }
        }
    }

    async fn activate(self: &Arc<Self>) -> ActivationOutcome {
        let current = self.state().await;
        if current == UpstreamState::Error {
            self.wait_out_cooldown(current).await;
        }

        self.transition(UpstreamState::Activating).await.map_err(|e| e.to_string())?;
        self.events.publish(EventKind::ActivationStart {
            server_id: self.config.id.clone(),
        });

        match self.connect_and_handshake().await {
            Ok(()) => {
                self.transition(UpstreamState::Active).await.map_err(|e| e.to_string())?;
                self.mutable.lock().await.restart_count = 0;
                self.events.publish(EventKind::ActivationSuccess {
                    server_id: self.config.id.clone(),
                });
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();
                self.mutable.lock().await.last_failure_reason = Some(reason.clone());
                let _ = self.transition(UpstreamState::Error).await;
                self.events.publish(EventKind::ActivationFailed {
                    server_id: self.config.id.clone(),
                    reason: reason.clone(),
                });
                Err(reason)
            }
        }
    }

    async fn wait_out_cooldown(self: &Arc<Self>, _current: UpstreamState) {
        let restart_count = {
            let mut guard = self.mutable.lock().await;
            guard.restart_count += 1;
            guard.restart_count
        };
        if restart_count > self.config.max_restarts {
            return;
        }
        let _ = self.transition(UpstreamState::Cooldown).await;
        let delay = compute_delay(restart_count, BACKOFF_INITIAL, BACKOFF_MAX);
        tokio::time::sleep(delay).await;
    }

    async fn connect_and_handshake(self: &Arc<Self>) -> Result<(), HatagoError> {
        let restart_count = self.mutable.lock().await.restart_count;
        if restart_count > self.config.max_restarts {
            return Err(HatagoError::ActivationDenied {
                server_id: self.config.id.clone(),
                reason: format!("exceeded maxRestarts ({})", self.config.max_restarts),
            });
        }

        let timeouts = hatago_transport::TransportTimeouts {
            connect: self.config.connect_timeout,
            request: self.config.request_timeout,
            idle: self.config.keep_alive,
        };
        let (transport, events) = hatago_transport::connect(&self.config.transport, &timeouts).await?;
        let transport: Arc<dyn hatago_transport::Transport> = Arc::from(transport);

        let actor = Arc::new(actor::spawn(
            self.config.id.clone(),
            Arc::clone(&transport),
            events,
            self.notify_tx.clone(),
        ));

        actor
            .call(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "hatago", "version": env!("CARGO_PKG_VERSION")},
                }),
                self.config.connect_timeout,
            )
            .await?;
        actor
            .call("notifications/initialized", json!({}), self.config.connect_timeout)
            .await
            .ok();

        let tools = Self::discover(&actor, "tools/list", "tools", self.config.request_timeout).await;
        let resources =
            Self::discover(&actor, "resources/list", "resources", self.config.request_timeout).await;
        let prompts =
            Self::discover(&actor, "prompts/list", "prompts", self.config.request_timeout).await;

        let mut guard = self.mutable.lock().await;
        guard.actor = Some(actor);
        guard.capabilities = DiscoveredCapabilities {
            tools,
            resources,
            prompts,
        };
        Ok(())
    }

    /// Call a `*/list` discovery method, treating `-32601` (method not
    /// found) as "server does not support this capability" rather than a
    /// fatal activation error.
    async fn discover(actor: &ActorHandle, method: &str, key: &str, timeout: Duration) -> Vec<Value> {
        match actor.call(method, json!({}), timeout).await {
            Ok(result) => result
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            Err(HatagoError::Upstream { code, .. }) if code == -32601 => Vec::new(),
            Err(err) => {
                tracing::debug!(%method, %err, "discovery call failed, treating as empty");
                Vec::new()
            }
        }
    }

    async fn transition(self: &Arc<Self>, next: UpstreamState) -> Result<(), HatagoError> {
        let (from, actor_to_close) = {
            let mut guard = self.mutable.lock().await;
            guard.state.validate_transition(next, &self.config.id)?;
            let from = guard.state;
            guard.state = next;
            let actor_to_close = if next.has_transport() {
                None
            } else {
                guard.actor.take()
            };
            (from, actor_to_close)
        };
        if let Some(actor) = actor_to_close {
            actor.shutdown().await;
        }
        self.events.publish(EventKind::StateChanged {
            server_id: self.config.id.clone(),
            from: from.label().to_string(),
            to: next.label().to_string(),
        });
        Ok(())
    }

    async fn schedule_idle_check(self: &Arc<Self>) {
        let after = self.config.idle_policy.idle_timeout;
        self.events.publish(EventKind::IdleScheduled {
            server_id: self.config.id.clone(),
            after_ms: after.as_millis() as u64,
        });

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if this.ref_count.load(Ordering::Acquire) > 0 {
                return;
            }
            let elapsed = this.mutable.lock().await.last_activity.elapsed();
            if elapsed < this.config.idle_policy.min_linger {
                return;
            }
            if this.state().await != UpstreamState::Active {
                return;
            }
            if this.transition(UpstreamState::Idling).await.is_err() {
                return;
            }
            let _ = this.transition(UpstreamState::Stopping).await;
            let _ = this.transition(UpstreamState::Inactive).await;
            this.events.publish(EventKind::IdleStopped {
                server_id: this.config.id.clone(),
            });
        });

        let mut guard = self.mutable.lock().await;
        if let Some(old) = guard.idle_task.replace(handle) {
            old.abort();
        }
    }

    pub async fn shutdown(self: &Arc<Self>) {
        let state = self.state().await;
        if state == UpstreamState::Inactive {
            return;
        }
        let _ = self.transition(UpstreamState::Stopping).await;
        let _ = self.transition(UpstreamState::Inactive).await;
    }
}
