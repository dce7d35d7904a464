//! Stdio transport: an upstream MCP server run as a child process,
//! speaking newline-delimited JSON-RPC over stdin/stdout.

use std::process::Stdio as StdStdio;
use std::sync::Arc;

use async_trait::async_trait;
use hatago_support::HatagoError;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use crate::framing::{FramedLine, LineFramer};
use crate::{EventReceiver, Transport, TransportEvent, TransportTimeouts};

pub struct StdioTransport {
    stdin: Mutex<tokio::process::ChildStdin>,
    child: Arc<Mutex<Child>>,
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: Value) -> Result<(), HatagoError> {
        let mut line = serde_json::to_vec(&message)
            .map_err(|e| HatagoError::Protocol(format!("failed to serialize message: {e}")))?;
        line.push(b'\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(&line)
            .await
            .map_err(|e| HatagoError::Transport {
                server_id: String::new(),
                message: format!("stdin write failed: {e}"),
            })
    }

    async fn close(&self) -> Result<(), HatagoError> {
        let mut child = self.child.lock().await;
        kill_child_process_group(&mut child);
        let _ = child.wait().await;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "stdio"
    }
}

pub async fn connect(
    command: &str,
    args: &[String],
    env: &[(String, String)],
    _timeouts: &TransportTimeouts,
) -> Result<(Box<dyn Transport>, EventReceiver), HatagoError> {
    let mut cmd = Command::new(command);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.stdin(StdStdio::piped());
    cmd.stdout(StdStdio::piped());
    cmd.stderr(StdStdio::piped());
    cmd.kill_on_drop(true);

    // Isolate the child in its own process group so a kill can reach any
    // grandchildren it spawns.
    // SAFETY: setsid() is async-signal-safe and runs before exec.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(|e| HatagoError::Transport {
        server_id: command.to_string(),
        message: format!("failed to spawn '{command}': {e}"),
    })?;

    let stdout = child.stdout.take().ok_or_else(|| HatagoError::Internal(
        "child process did not expose stdout".into(),
    ))?;
    let stdin = child.stdin.take().ok_or_else(|| HatagoError::Internal(
        "child process did not expose stdin".into(),
    ))?;
    if let Some(mut stderr) = child.stderr.take() {
        let command = command.to_string();
        tokio::spawn(async move {
            let mut buf = Vec::new();
            if stderr.read_to_end(&mut buf).await.is_ok() && !buf.is_empty() {
                tracing::debug!(server = %command, stderr = %String::from_utf8_lossy(&buf), "child stderr");
            }
        });
    }

    let child = Arc::new(Mutex::new(child));

    let (tx, rx) = mpsc::channel(64);
    let command_label = command.to_string();
    tokio::spawn(read_loop(stdout, tx, command_label, child.clone()));

    let transport = StdioTransport {
        stdin: Mutex::new(stdin),
        child,
    };

    Ok((Box::new(transport), rx))
}

/// Kill every process in the child's process group (it was placed in its
/// own via `setsid()` at spawn), falling back to a single-process kill if
/// the pid is unavailable.
fn kill_child_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: kill() is async-signal-safe; negative pid targets the
            // whole process group.
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
            return;
        }
    }
    let _ = child.start_kill();
}

/// Render a child's exit status as the `reason` string carried by
/// `TransportEvent::Closed`.
fn describe_exit(status: std::io::Result<std::process::ExitStatus>) -> String {
    match status {
        Ok(status) => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return format!("child exited via signal {signal}");
                }
            }
            match status.code() {
                Some(0) => "child exited normally".to_string(),
                Some(code) => format!("child exited with code {code}"),
                None => "child exited with unknown status".to_string(),
            }
        }
        Err(e) => format!("failed to read child exit status: {e}"),
    }
}

async fn read_loop(
    mut stdout: tokio::process::ChildStdout,
    tx: mpsc::Sender<TransportEvent>,
    server_label: String,
    child: Arc<Mutex<Child>>,
) {
    let mut framer = LineFramer::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => {
                let status = child.lock().await.wait().await;
                let reason = describe_exit(status);
                tracing::debug!(server = %server_label, %reason, "stdio upstream stdout closed");
                let _ = tx.send(TransportEvent::Closed { reason }).await;
                return;
            }
            Ok(n) => {
                for framed in framer.push(&chunk[..n]) {
                    match framed {
                        FramedLine::Message(value) => {
                            if tx.send(TransportEvent::Message(value)).await.is_err() {
                                return;
                            }
                        }
                        FramedLine::Malformed { raw, error } => {
                            tracing::warn!(server = %server_label, %error, line = %raw, "skipping malformed stdio line");
                        }
                    }
                }
            }
            Err(e) => {
                let _ = tx
                    .send(TransportEvent::Closed {
                        reason: format!("stdout read error: {e}"),
                    })
                    .await;
                return;
            }
        }
    }
}
