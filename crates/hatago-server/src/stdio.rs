//! Downstream stdio listener: the same newline-delimited JSON-RPC framing
//! contract used for upstream stdio connections (`hatago_transport::framing`),
//! driving the single session a stdio-hosted hub process ever has.

use std::sync::Arc;

use hatago_hub::{Hub, HubSession};
use hatago_transport::framing::{FramedLine, LineFramer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Serve the hub over stdin/stdout until stdin closes. One process, one
/// session — there is no `Mcp-Session-Id` concept over stdio.
pub async fn serve_stdio(hub: Arc<Hub>) -> std::io::Result<()> {
    let session = Arc::new(HubSession::new());
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut framer = LineFramer::new();
    let mut read_buf = [0u8; 8192];

    let mut list_changed_rx = hub.facade.subscribe_list_changed();

    loop {
        tokio::select! {
            read_result = stdin.read(&mut read_buf) => {
                let bytes_read = read_result?;
                if bytes_read == 0 {
                    break;
                }
                for framed in framer.push(&read_buf[..bytes_read]) {
                    match framed {
                        FramedLine::Message(request) => {
                            if let Some(response) = hub.facade.handle(&session, request).await {
                                write_line(&mut stdout, &response).await?;
                            }
                        }
                        FramedLine::Malformed { error, .. } => {
                            tracing::warn!(%error, "dropping malformed downstream stdio line");
                        }
                    }
                }
                drain_session_progress(&session, &mut stdout).await?;
            }
            changed = list_changed_rx.recv() => {
                if let Ok(message) = changed {
                    write_line(&mut stdout, &message).await?;
                }
            }
        }
    }

    session.disconnect();
    Ok(())
}

async fn drain_session_progress(
    session: &HubSession,
    stdout: &mut (impl AsyncWriteExt + Unpin),
) -> std::io::Result<()> {
    for payload in session.inner.drain_progress().await {
        write_line(stdout, &payload).await?;
    }
    Ok(())
}

async fn write_line(
    stdout: &mut (impl AsyncWriteExt + Unpin),
    value: &serde_json::Value,
) -> std::io::Result<()> {
    let mut payload = serde_json::to_string(value).expect("JSON-RPC envelopes always serialize");
    payload.push('\n');
    stdout.write_all(payload.as_bytes()).await?;
    stdout.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatago_registry::NamingConfig;

    #[tokio::test]
    async fn line_framer_round_trips_a_single_initialize_request() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}\n");
        assert_eq!(lines.len(), 1);
        assert!(matches!(lines[0], FramedLine::Message(_)));
    }

    #[tokio::test]
    async fn hub_facade_handles_a_request_built_from_framed_line() {
        let hub = Arc::new(Hub::new(NamingConfig::default()));
        hub.start().await;
        let session = Arc::new(HubSession::new());

        let mut framer = LineFramer::new();
        let lines = framer.push(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n");
        let FramedLine::Message(request) = lines.into_iter().next().unwrap() else {
            panic!("expected a parsed message");
        };
        let response = hub.facade.handle(&session, request).await.unwrap();
        assert_eq!(response["result"], serde_json::json!({}));
    }
}
