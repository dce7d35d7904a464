//! Per-upstream state machine, activation, restart/backoff, and idle
//! reaping. One [`Supervisor`] owns every registered [`Upstream`] for the
//! lifetime of the hub.

pub mod actor;
pub mod config;
pub mod state;
pub mod upstream;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hatago_support::events::EventBus;
use hatago_support::HatagoError;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

pub use config::{ActivationPolicy, ActivityReset, IdlePolicy, UpstreamConfig};
pub use state::UpstreamState;
pub use upstream::{ActivationSource, DiscoveredCapabilities, Upstream};

/// Owns the registered set of upstreams and the channel their connection
/// actors forward unsolicited notifications onto.
pub struct Supervisor {
    upstreams: RwLock<HashMap<String, Arc<Upstream>>>,
    events: EventBus,
    notify_tx: mpsc::Sender<(String, Value)>,
    notify_rx: tokio::sync::Mutex<Option<mpsc::Receiver<(String, Value)>>>,
}

impl Supervisor {
    pub fn new(events: EventBus) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(1024);
        Self {
            upstreams: RwLock::new(HashMap::new()),
            events,
            notify_tx,
            notify_rx: tokio::sync::Mutex::new(Some(notify_rx)),
        }
    }

    /// Take the receiver of `(server_id, message)` notifications forwarded
    /// up from every upstream's connection actor. Call once; intended for
    /// the router.
    pub async fn take_notifications(&self) -> Option<mpsc::Receiver<(String, Value)>> {
        self.notify_rx.lock().await.take()
    }

    pub async fn register(&self, config: UpstreamConfig) {
        let id = config.id.clone();
        let upstream = Arc::new(Upstream::new(config, self.events.clone(), self.notify_tx.clone()));
        self.upstreams.write().await.insert(id, upstream);
    }

    pub async fn get(&self, server_id: &str) -> Option<Arc<Upstream>> {
        self.upstreams.read().await.get(server_id).cloned()
    }

    pub async fn server_ids(&self) -> Vec<String> {
        self.upstreams.read().await.keys().cloned().collect()
    }

    /// Activate every `always`-policy upstream; called once at hub
    /// startup.
    pub async fn activate_always_on(&self) {
        let upstreams: Vec<Arc<Upstream>> = self.upstreams.read().await.values().cloned().collect();
        for upstream in upstreams {
            if upstream.config.activation_policy == ActivationPolicy::Always {
                if let Err(err) = upstream.acquire(ActivationSource::Startup).await {
                    tracing::warn!(server = %upstream.config.id, %err, "always-on activation failed");
                } else {
                    // Always-on upstreams are never released by ref count;
                    // they stay active independent of caller-held refs.
                }
            }
        }
    }

    pub async fn state_of(&self, server_id: &str) -> Option<UpstreamState> {
        match self.get(server_id).await {
            Some(upstream) => Some(upstream.state().await),
            None => None,
        }
    }

    pub async fn capabilities_of(&self, server_id: &str) -> Option<DiscoveredCapabilities> {
        match self.get(server_id).await {
            Some(upstream) => Some(upstream.capabilities().await),
            None => None,
        }
    }

    /// Ensure `server_id` is active (subject to the `activationPolicy`
    /// gate for `source`), issue `method`/`params` against it, and release
    /// the acquired ref regardless of outcome.
    pub async fn call(
        &self,
        server_id: &str,
        method: &str,
        params: Value,
        source: ActivationSource,
    ) -> Result<Value, HatagoError> {
        let upstream = self.get(server_id).await.ok_or_else(|| HatagoError::Internal(
            format!("unknown upstream '{server_id}'"),
        ))?;
        let actor = upstream.acquire(source).await?;
        let result = actor.call(method, params, upstream.config.request_timeout).await;
        upstream.release().await;
        result
    }

    /// Deactivate every upstream in parallel, hard-closing anything still
    /// open after `deadline`.
    pub async fn shutdown_all(&self, deadline: Duration) {
        let upstreams: Vec<Arc<Upstream>> = self.upstreams.read().await.values().cloned().collect();
        let handles: Vec<_> = upstreams
            .into_iter()
            .map(|upstream| tokio::spawn(async move { upstream.shutdown().await }))
            .collect();

        let joined = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(deadline, joined).await.is_err() {
            tracing::warn!("upstream shutdown deadline exceeded; some transports force-closed");
        }
    }
}
