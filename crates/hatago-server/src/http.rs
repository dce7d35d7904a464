//! Streamable-HTTP downstream endpoint: `POST/DELETE/GET /mcp`, `GET /sse`,
//! `GET /health`, `GET /metrics`.
//!
//! Modeled on `csa-mcp-hub/src/serve.rs`'s `HttpEndpoint` (`axum::serve` +
//! graceful shutdown via a `CancellationToken`), generalized from
//! SSE-only hosting to the full streamable-HTTP contract.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{DefaultBodyLimit, State};
use bytes::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router as AxumRouter;
use futures::stream::{self, Stream};
use hatago_hub::{Hub, HubSession};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::metrics::Metrics;

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const PROTOCOL_VERSION: &str = "2024-11-05";
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

struct AppState {
    hub: Arc<Hub>,
    sessions: RwLock<HashMap<String, Arc<HubSession>>>,
    metrics: Arc<Metrics>,
    started_at: Instant,
}

/// The bound streamable-HTTP endpoint. `shutdown` triggers a graceful
/// `axum::serve` stop; `join` resolves once the server task exits.
pub struct HttpEndpoint {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    server_task: tokio::task::JoinHandle<()>,
}

impl HttpEndpoint {
    pub async fn start(bind_addr: SocketAddr, hub: Arc<Hub>) -> std::io::Result<Self> {
        let metrics = Metrics::spawn(hub.events().clone());
        let state = Arc::new(AppState {
            hub,
            sessions: RwLock::new(HashMap::new()),
            metrics,
            started_at: Instant::now(),
        });

        let app = AxumRouter::new()
            .route("/mcp", get(get_mcp).post(post_mcp).delete(delete_mcp))
            .route("/sse", get(get_sse))
            .route("/health", get(get_health))
            .route("/metrics", get(get_metrics))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();

        let server_task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    server_shutdown.cancelled().await;
                })
                .await
            {
                tracing::warn!(%error, "hatago HTTP endpoint stopped with error");
            }
        });

        Ok(Self {
            addr: local_addr,
            shutdown,
            server_task,
        })
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.server_task.await {
            tracing::debug!(%error, "hatago HTTP endpoint join failed");
        }
    }
}

fn protocol_version_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(PROTOCOL_VERSION_HEADER),
        HeaderValue::from_static(PROTOCOL_VERSION),
    );
    headers
}

fn session_id_header(value: &str) -> Option<(HeaderName, HeaderValue)> {
    HeaderValue::from_str(value)
        .ok()
        .map(|hv| (HeaderName::from_static(SESSION_HEADER), hv))
}

async fn post_mcp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                protocol_version_headers(),
                axum::Json(json!({
                    "jsonrpc": "2.0",
                    "id": Value::Null,
                    "error": {"code": -32700, "message": format!("invalid JSON-RPC request: {error}")},
                })),
            );
        }
    };

    let existing_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let is_initialize = hatago_support::rpc::method_of(&request) == Some("initialize");

    let (session, response_header) = match existing_id {
        Some(id) => {
            let found = state.sessions.read().await.get(&id).cloned();
            match found {
                Some(session) => (session, None),
                None => {
                    return (
                        StatusCode::NOT_FOUND,
                        protocol_version_headers(),
                        axum::Json(json!({
                            "jsonrpc": "2.0",
                            "id": Value::Null,
                            "error": {"code": -32001, "message": format!("unknown session '{id}'")},
                        })),
                    );
                }
            }
        }
        None if is_initialize => {
            let session = Arc::new(HubSession::new());
            let id = session.id().to_string();
            state.sessions.write().await.insert(id.clone(), session.clone());
            state.metrics.session_connected();
            (session, session_id_header(&id))
        }
        None => (Arc::new(HubSession::new()), None),
    };

    let is_tool_call = hatago_support::rpc::method_of(&request) == Some("tools/call");
    let response = state.hub.facade.handle(&session, request).await;

    if let Some(ref envelope) = response {
        if is_tool_call {
            state.metrics.record_tool_call(envelope.get("error").is_none());
        }
    }

    let mut header_map = protocol_version_headers();
    if let Some((name, value)) = response_header {
        header_map.insert(name, value);
    }

    match response {
        Some(envelope) => (StatusCode::OK, header_map, axum::Json(envelope)),
        None => (StatusCode::ACCEPTED, header_map, axum::Json(json!({}))),
    }
}

async fn delete_mcp(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
        return StatusCode::BAD_REQUEST;
    };
    let removed = state.sessions.write().await.remove(id);
    match removed {
        Some(session) => {
            session.disconnect();
            state.metrics.session_disconnected();
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn get_mcp(State(state): State<Arc<AppState>>, headers: HeaderMap) -> axum::response::Response {
    let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
        return (StatusCode::METHOD_NOT_ALLOWED, protocol_version_headers()).into_response();
    };
    let Some(session) = state.sessions.read().await.get(id).cloned() else {
        return (StatusCode::NOT_FOUND, protocol_version_headers()).into_response();
    };
    (protocol_version_headers(), session_event_stream(state, session)).into_response()
}

async fn get_sse(State(state): State<Arc<AppState>>, headers: HeaderMap) -> axum::response::Response {
    let id = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    let session = match id {
        Some(id) => state.sessions.read().await.get(id).cloned(),
        None => None,
    };
    let Some(session) = session else {
        return (StatusCode::BAD_REQUEST, protocol_version_headers()).into_response();
    };
    (protocol_version_headers(), session_event_stream(state, session)).into_response()
}

/// Decrements the `sse_clients` gauge when the stream is dropped (client
/// disconnect), since `Sse` gives us no disconnect callback otherwise.
struct SseGuard(Arc<Metrics>);

impl Drop for SseGuard {
    fn drop(&mut self) {
        self.0.sse_client_disconnected();
    }
}

fn session_event_stream(
    state: Arc<AppState>,
    session: Arc<HubSession>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    state.metrics.sse_client_connected();
    let guard = SseGuard(state.metrics.clone());
    let list_changed_rx = state.hub.facade.subscribe_list_changed();

    let stream = stream::unfold(
        (session, list_changed_rx, guard, std::collections::VecDeque::new()),
        |(session, mut rx, guard, mut pending)| async move {
            loop {
                if let Some(payload) = pending.pop_front() {
                    let event = Event::default().event("message").data(payload.to_string());
                    return Some((Ok(event), (session, rx, guard, pending)));
                }
                tokio::select! {
                    drained = async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        session.inner.drain_progress().await
                    } => {
                        pending.extend(drained);
                        if let Some(payload) = pending.pop_front() {
                            let event = Event::default().event("message").data(payload.to_string());
                            return Some((Ok(event), (session, rx, guard, pending)));
                        }
                    }
                    received = rx.recv() => {
                        match received {
                            Ok(message) => {
                                let event = Event::default().event("message").data(message.to_string());
                                return Some((Ok(event), (session, rx, guard, pending)));
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
                        }
                    }
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn get_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "healthy",
        "uptime": state.started_at.elapsed().as_secs(),
    }))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if std::env::var("HATAGO_METRICS").as_deref() != Ok("1") {
        return StatusCode::NOT_FOUND.into_response();
    }
    axum::Json(state.metrics.snapshot()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatago_registry::NamingConfig;

    async fn spawn_test_endpoint() -> HttpEndpoint {
        let hub = Arc::new(Hub::new(NamingConfig::default()));
        hub.start().await;
        HttpEndpoint::start("127.0.0.1:0".parse().unwrap(), hub).await.unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_healthy() {
        let endpoint = spawn_test_endpoint().await;
        let url = format!("http://{}/health", endpoint.addr);
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        endpoint.shutdown().await;
    }

    #[tokio::test]
    async fn initialize_then_tools_list_round_trips_session_header() {
        let endpoint = spawn_test_endpoint().await;
        let client = reqwest::Client::new();
        let url = format!("http://{}/mcp", endpoint.addr);

        let init_response = client
            .post(&url)
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(init_response.headers().get("mcp-protocol-version").unwrap(), "2024-11-05");
        let session_id = init_response
            .headers()
            .get("mcp-session-id")
            .expect("session header set on initialize")
            .to_str()
            .unwrap()
            .to_string();

        let list_response = client
            .post(&url)
            .header("mcp-session-id", session_id)
            .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .send()
            .await
            .unwrap();
        let body: Value = list_response.json().await.unwrap();
        assert_eq!(body["result"]["tools"], json!([]));

        endpoint.shutdown().await;
    }

    #[tokio::test]
    async fn delete_unknown_session_returns_404() {
        let endpoint = spawn_test_endpoint().await;
        let client = reqwest::Client::new();
        let url = format!("http://{}/mcp", endpoint.addr);
        let response = client
            .delete(&url)
            .header("mcp-session-id", "does-not-exist")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        endpoint.shutdown().await;
    }

    #[tokio::test]
    async fn metrics_endpoint_is_gated_by_env_var() {
        unsafe { std::env::remove_var("HATAGO_METRICS") };
        let endpoint = spawn_test_endpoint().await;
        let url = format!("http://{}/metrics", endpoint.addr);
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 404);
        endpoint.shutdown().await;
    }
}
