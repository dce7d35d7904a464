//! The downstream-facing JSON-RPC method table: `initialize`,
//! `tools/list`, `tools/call`, `resources/*`, `prompts/*`, `ping`.
//!
//! [`HubFacade::handle`] is transport-agnostic — `hatago-server` drives it
//! from both the HTTP and stdio downstream listeners.

use std::sync::Arc;
use std::time::Duration;

use hatago_registry::Registry;
use hatago_router::Router;
use hatago_support::rpc;
use hatago_support::HatagoError;
use serde_json::{json, Value};

use crate::notify::ListChangedNotifier;
use crate::session::HubSession;

const PROTOCOL_VERSION: &str = "2025-06-18";

pub struct HubFacade {
    router: Arc<Router>,
    notifier: ListChangedNotifier,
    server_name: String,
    server_version: String,
}

impl HubFacade {
    pub fn new(router: Arc<Router>, notifier: ListChangedNotifier) -> Self {
        Self {
            router,
            notifier,
            server_name: "hatago".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn subscribe_list_changed(&self) -> tokio::sync::broadcast::Receiver<Value> {
        self.notifier.subscribe()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.router.registry()
    }

    /// Handle a single downstream JSON-RPC message. Returns `None` for
    /// notifications (no response expected) and for cancelled requests
    /// (the session disconnected mid-call).
    pub async fn handle(&self, session: &HubSession, request: Value) -> Option<Value> {
        if rpc::is_notification(&request) {
            self.handle_notification(session, &request).await;
            return None;
        }

        let id = rpc::id_of(&request).cloned().unwrap_or(Value::Null);
        let method = rpc::method_of(&request).unwrap_or_default().to_string();
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        let outcome = tokio::select! {
            result = self.dispatch(session, &method, params) => result,
            _ = session.cancel.cancelled() => return None,
        };

        Some(match outcome {
            Ok(result) => rpc::response(id, result),
            Err(err) => err.to_jsonrpc_error(id),
        })
    }

    async fn handle_notification(&self, session: &HubSession, request: &Value) {
        if rpc::method_of(request) == Some("notifications/cancelled") {
            session.disconnect();
        }
    }

    async fn dispatch(&self, session: &HubSession, method: &str, params: Value) -> Result<Value, HatagoError> {
        let _permit = session.inner.acquire_inflight().await;
        match method {
            "initialize" => self.handle_initialize(session).await,
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(session, params).await,
            "resources/list" => self.handle_resources_list().await,
            "resources/read" => self.handle_resources_read(params).await,
            "resources/templates/list" => self.router.list_resource_templates().await,
            "prompts/list" => self.handle_prompts_list().await,
            "prompts/get" => self.handle_prompts_get(params).await,
            _ => Err(HatagoError::Protocol(format!("unknown method '{method}'"))),
        }
    }

    async fn handle_initialize(&self, session: &HubSession) -> Result<Value, HatagoError> {
        if !session.mark_initialized().await {
            return Err(HatagoError::Protocol("initialize already called on this session".into()));
        }
        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {}, "resources": {}, "prompts": {} },
            "serverInfo": { "name": self.server_name, "version": self.server_version },
        }))
    }

    async fn handle_tools_list(&self) -> Result<Value, HatagoError> {
        let mut tools: Vec<Value> = self
            .registry()
            .list_tools()
            .await
            .into_iter()
            .map(|t| {
                let mut entry = json!({
                    "name": t.public_name,
                    "inputSchema": t.input_schema,
                });
                if let Some(description) = t.description {
                    entry["description"] = Value::String(description);
                }
                entry
            })
            .collect();
        tools.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        let (revision, _full_hash, short_hash) = self.registry().toolset_revision().await;
        Ok(json!({
            "tools": tools,
            "_meta": { "toolset_hash": short_hash, "revision": revision },
        }))
    }

    async fn handle_tools_call(&self, session: &HubSession, params: Value) -> Result<Value, HatagoError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| HatagoError::InvalidParams("tools/call requires a string 'name'".into()))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let progress_token = rpc::progress_token(&params).cloned();

        self.router
            .call_tool(&session.inner, &name, arguments, progress_token)
            .await
    }

    async fn handle_resources_list(&self) -> Result<Value, HatagoError> {
        let resources: Vec<Value> = self
            .registry()
            .list_resources()
            .await
            .into_iter()
            .map(|r| {
                let mut entry = json!({ "uri": r.public_uri });
                if let Some(name) = r.name {
                    entry["name"] = Value::String(name);
                }
                if let Some(description) = r.description {
                    entry["description"] = Value::String(description);
                }
                if let Some(mime_type) = r.mime_type {
                    entry["mimeType"] = Value::String(mime_type);
                }
                entry
            })
            .collect();
        Ok(json!({ "resources": resources }))
    }

    async fn handle_resources_read(&self, params: Value) -> Result<Value, HatagoError> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| HatagoError::InvalidParams("resources/read requires a string 'uri'".into()))?;
        self.router.read_resource(uri).await
    }

    async fn handle_prompts_list(&self) -> Result<Value, HatagoError> {
        let prompts: Vec<Value> = self
            .registry()
            .list_prompts()
            .await
            .into_iter()
            .map(|p| {
                let mut entry = json!({ "name": p.public_name, "arguments": p.arguments });
                if let Some(description) = p.description {
                    entry["description"] = Value::String(description);
                }
                entry
            })
            .collect();
        Ok(json!({ "prompts": prompts }))
    }

    async fn handle_prompts_get(&self, params: Value) -> Result<Value, HatagoError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| HatagoError::InvalidParams("prompts/get requires a string 'name'".into()))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        self.router.get_prompt(&name, arguments).await
    }
}

/// How long the hub waits for in-flight upstream calls to settle during
/// shutdown before forcing transports closed.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;
    use hatago_registry::NamingConfig;
    use hatago_supervisor::Supervisor;
    use hatago_support::events::EventBus;

    async fn facade() -> (HubFacade, Arc<Registry>) {
        let events = EventBus::new(64);
        let supervisor = Arc::new(Supervisor::new(events.clone()));
        let registry = Arc::new(Registry::new(NamingConfig::default(), events.clone()));
        let router = Router::spawn(supervisor, registry.clone(), events.clone());
        let notifier = crate::notify::spawn(events);
        (HubFacade::new(router, notifier), registry)
    }

    #[tokio::test]
    async fn initialize_then_double_initialize_errors() {
        let (facade, _registry) = facade().await;
        let session = HubSession::new();

        let response = facade
            .handle(&session, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .await
            .unwrap();
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);

        let response = facade
            .handle(&session, json!({"jsonrpc": "2.0", "id": 2, "method": "initialize", "params": {}}))
            .await
            .unwrap();
        assert!(response.get("error").is_some());
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let (facade, _registry) = facade().await;
        let session = HubSession::new();
        let response = facade
            .handle(&session, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn tools_list_reflects_registry_contents() {
        let (facade, registry) = facade().await;
        registry
            .register_server_tools("srv1", &[json!({"name": "echo", "inputSchema": {"type": "object"}})])
            .await;
        let session = HubSession::new();
        let response = facade
            .handle(&session, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
            .await
            .unwrap();
        assert_eq!(response["result"]["tools"][0]["name"], "echo_srv1");
        assert!(response["result"]["_meta"]["toolset_hash"].is_string());
    }

    #[tokio::test]
    async fn unknown_method_returns_jsonrpc_error() {
        let (facade, _registry) = facade().await;
        let session = HubSession::new();
        let response = facade
            .handle(&session, json!({"jsonrpc": "2.0", "id": 1, "method": "bogus/method"}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let (facade, _registry) = facade().await;
        let session = HubSession::new();
        let response = facade
            .handle(&session, json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(response.is_none());
    }
}
