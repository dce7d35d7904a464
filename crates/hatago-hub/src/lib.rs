//! The hub facade: the downstream-facing JSON-RPC method table, session
//! lifecycle, and debounced list-changed notifications, sitting on top of
//! the Router/Registry/Supervisor stack.

pub mod facade;
pub mod notify;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use hatago_registry::Registry;
use hatago_router::Router;
use hatago_support::events::EventBus;
use hatago_supervisor::Supervisor;

pub use facade::HubFacade;
pub use session::HubSession;

/// Build the hub's core stack (Supervisor, Registry, Router, Facade) and
/// activate `always`-policy upstreams. Callers register upstream configs
/// on the returned [`Supervisor`] before or after this call.
pub struct Hub {
    pub supervisor: Arc<Supervisor>,
    pub registry: Arc<Registry>,
    pub router: Arc<Router>,
    pub facade: Arc<HubFacade>,
    events: EventBus,
}

impl Hub {
    pub fn new(naming: hatago_registry::NamingConfig) -> Self {
        let events = EventBus::default();
        let supervisor = Arc::new(Supervisor::new(events.clone()));
        let registry = Arc::new(Registry::new(naming, events.clone()));
        let router = Router::spawn(supervisor.clone(), registry.clone(), events.clone());
        let notifier = notify::spawn(events.clone());
        let facade = Arc::new(HubFacade::new(router.clone(), notifier));
        Self {
            supervisor,
            registry,
            router,
            facade,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Activate every `always`-policy upstream; call once after all
    /// upstreams are registered, before accepting downstream connections.
    pub async fn start(&self) {
        self.supervisor.activate_always_on().await;
    }

    /// Deactivate all upstreams, waiting up to `deadline` before forcing
    /// transports closed.
    pub async fn shutdown(&self, deadline: Duration) {
        self.supervisor.shutdown_all(deadline).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatago_registry::NamingConfig;
    use serde_json::json;

    #[tokio::test]
    async fn hub_initializes_and_serves_empty_tools_list() {
        let hub = Hub::new(NamingConfig::default());
        hub.start().await;

        let session = HubSession::new();
        let response = hub
            .facade
            .handle(&session, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
            .await
            .unwrap();
        assert_eq!(response["result"]["serverInfo"]["name"], "hatago");

        let response = hub
            .facade
            .handle(&session, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .await
            .unwrap();
        assert_eq!(response["result"]["tools"], json!([]));
    }
}
