//! Legacy SSE transport for MCP servers predating streamable-HTTP:
//!
//! 1. `GET <url>` opens an SSE stream.
//! 2. The server sends an `endpoint` event naming a relative path to POST
//!    JSON-RPC requests to.
//! 3. Responses and server-initiated notifications arrive as `message`
//!    events on the same SSE stream. `ping`/heartbeat events reset an
//!    idle timer without producing a message.

use async_trait::async_trait;
use futures::StreamExt;
use hatago_support::HatagoError;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ssrf;
use crate::{EventReceiver, Transport, TransportEvent, TransportTimeouts};

pub struct SseTransport {
    client: Client,
    post_url: String,
    headers: Vec<(String, String)>,
    cancel: CancellationToken,
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, message: Value) -> Result<(), HatagoError> {
        let mut request = self
            .client
            .post(&self.post_url)
            .header("Content-Type", "application/json");
        for (key, value) in &self.headers {
            if key.eq_ignore_ascii_case("content-type") {
                continue;
            }
            request = request.header(key.as_str(), value.as_str());
        }
        let response = request
            .json(&message)
            .send()
            .await
            .map_err(|e| HatagoError::Transport {
                server_id: self.post_url.clone(),
                message: format!("POST failed: {e}"),
            })?;
        if !response.status().is_success() {
            return Err(HatagoError::Transport {
                server_id: self.post_url.clone(),
                message: format!("upstream returned status {}", response.status()),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), HatagoError> {
        self.cancel.cancel();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sse"
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let scheme_end = base.find("://").map(|i| i + 3).unwrap_or(0);
    let authority_end = base[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i)
        .unwrap_or(base.len());
    format!("{}{}", &base[..authority_end], path)
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
        .build()
        .map_err(|e| HatagoError::Internal(format!("failed to build HTTP client: {e}")))?;

    let mut request = client.get(url);
    for (key, value) in headers {
        request = request.header(key.as_str(), value.as_str());
    }
    let response = request.send().await.map_err(|e| HatagoError::Transport {
        server_id: url.to_string(),
        message: format!("failed to open SSE stream: {e}"),
    })?;
    if !response.status().is_success() {
        return Err(HatagoError::Transport {
            server_id: url.to_string(),
            message: format!("SSE endpoint returned status {}", response.status()),
        });
    }

    let mut stream = sse_stream::SseStream::from_byte_stream(response.bytes_stream());
    let post_path = loop {
        match stream.next().await {
            Some(Ok(event)) => {
                if event.event.as_deref().unwrap_or("message") == "endpoint" {
                    if let Some(data) = event.data {
                        break data.trim().to_string();
                    }
                }
            }
            Some(Err(e)) => {
                return Err(HatagoError::Transport {
                    server_id: url.to_string(),
                    message: format!("SSE stream error waiting for endpoint: {e}"),
                });
            }
            None => {
                return Err(HatagoError::Transport {
                    server_id: url.to_string(),
                    message: "SSE stream ended before endpoint event".into(),
                });
            }
        }
    };
    let post_url = join_url(url, &post_path);

    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let reader_cancel = cancel.clone();
    let server_label = url.to_string();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => return,
                event = stream.next() => {
                    match event {
                        Some(Ok(event)) => {
                            let kind = event.event.as_deref().unwrap_or("message");
                            match kind {
                                "message" => {
                                    let Some(data) = event.data else { continue };
                                    if data.trim().is_empty() {
                                        continue;
                                    }
                                    match serde_json::from_str::<Value>(data.trim()) {
                                        Ok(value) => {
                                            if tx.send(TransportEvent::Message(value)).await.is_err() {
                                                return;
                                            }
                                        }
                                        Err(e) => {
                                            tracing::warn!(server = %server_label, %e, "malformed SSE message");
                                        }
                                    }
                                }
                                "ping" | "endpoint" => {}
                                other => {
                                    tracing::debug!(server = %server_label, kind = %other, "ignoring SSE event type");
                                }
                            }
                        }
                        Some(Err(e)) => {
                            let _ = tx
                                .send(TransportEvent::Closed { reason: format!("SSE stream error: {e}") })
                                .await;
                            return;
                        }
                        None => {
                            let _ = tx
                                .send(TransportEvent::Closed { reason: "SSE stream ended".into() })
                                .await;
                            return;
                        }
                    }
                }
            }
        }
    });

    let transport = SseTransport {
        client,
        post_url,
        headers: headers.to_vec(),
        cancel,
    };

    Ok((Box::new(transport), rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_resolves_relative_path_against_base_authority() {
        let joined = join_url("http://host:1234/sse", "/messages?sessionId=xyz");
        assert_eq!(joined, "http://host:1234/messages?sessionId=xyz");
    }

    #[test]
    fn join_url_leaves_absolute_urls_untouched() {
        let joined = join_url("http://host:1234/sse", "https://other/messages");
        assert_eq!(joined, "https://other/messages");
    }
}
