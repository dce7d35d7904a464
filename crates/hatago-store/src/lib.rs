//! Optional persisted per-upstream state: `{lastStartedAt, lastStoppedAt,
//! lastFailureAt, lastFailureReason, restartCount, discoveredToolNames[]}`,
//! debounced to one write per second. Consulted only for display at
//! startup — the hub always re-discovers capabilities by handshake rather
//! than trusting the stored record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const FILE_NAME: &str = "upstreams.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpstreamRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub discovered_tool_names: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    upstreams: HashMap<String, UpstreamRecord>,
}

/// File-backed state store with a debounced background writer: any number
/// of `record_*` calls within `FLUSH_INTERVAL` of each other collapse into
/// a single atomic write.
pub struct FileStateStore {
    path: PathBuf,
    records: Arc<RwLock<HashMap<String, UpstreamRecord>>>,
    dirty_tx: mpsc::UnboundedSender<()>,
}

impl FileStateStore {
    /// Load any existing state file at `dir/upstreams.json` (for display
    /// purposes only) and spawn the debounced writer.
    pub async fn open(dir: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(FILE_NAME);
        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<StateFile>(&content).unwrap_or_default().upstreams,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err),
        };

        let records = Arc::new(RwLock::new(existing));
        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();
        spawn_writer(path.clone(), records.clone(), dirty_rx);

        Ok(Self {
            path,
            records,
            dirty_tx,
        })
    }

    /// Records as loaded/last written, for startup display.
    pub async fn snapshot(&self) -> HashMap<String, UpstreamRecord> {
        self.records.read().await.clone()
    }

    pub async fn record_start(&self, server_id: &str) {
        self.mutate(server_id, |record| {
            record.last_started_at = Some(Utc::now());
        })
        .await;
    }

    pub async fn record_stop(&self, server_id: &str) {
        self.mutate(server_id, |record| {
            record.last_stopped_at = Some(Utc::now());
        })
        .await;
    }

    pub async fn record_failure(&self, server_id: &str, reason: &str) {
        self.mutate(server_id, |record| {
            record.last_failure_at = Some(Utc::now());
            record.last_failure_reason = Some(reason.to_string());
        })
        .await;
    }

    pub async fn record_restart_count(&self, server_id: &str, count: u32) {
        self.mutate(server_id, |record| {
            record.restart_count = count;
        })
        .await;
    }

    pub async fn record_discovered_tools(&self, server_id: &str, names: Vec<String>) {
        self.mutate(server_id, |record| {
            record.discovered_tool_names = names;
        })
        .await;
    }

    async fn mutate(&self, server_id: &str, f: impl FnOnce(&mut UpstreamRecord)) {
        let mut guard = self.records.write().await;
        let record = guard.entry(server_id.to_string()).or_default();
        f(record);
        drop(guard);
        let _ = self.dirty_tx.send(());
    }

    /// Force an immediate write, bypassing the debounce window. Intended
    /// for clean shutdown.
    pub async fn flush(&self) -> std::io::Result<()> {
        let snapshot = self.records.read().await.clone();
        write_atomic(&self.path, &snapshot).await
    }
}

fn spawn_writer(
    path: PathBuf,
    records: Arc<RwLock<HashMap<String, UpstreamRecord>>>,
    mut dirty_rx: mpsc::UnboundedReceiver<()>,
) {
    tokio::spawn(async move {
        loop {
            if dirty_rx.recv().await.is_none() {
                return;
            }
            // Drain anything else that piled up, then wait out the
            // debounce window before writing.
            tokio::time::sleep(FLUSH_INTERVAL).await;
            while dirty_rx.try_recv().is_ok() {}

            let snapshot = records.read().await.clone();
            if let Err(err) = write_atomic(&path, &snapshot).await {
                tracing::warn!(%err, path = %path.display(), "failed to persist upstream state");
            }
        }
    });
}

async fn write_atomic(path: &Path, records: &HashMap<String, UpstreamRecord>) -> std::io::Result<()> {
    let file = StateFile {
        upstreams: records.clone(),
    };
    let content = serde_json::to_string_pretty(&file).expect("UpstreamRecord always serializes");
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, content.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_start_then_flush_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        store.record_start("srv1").await;
        store.record_discovered_tools("srv1", vec!["echo".into()]).await;
        store.flush().await.unwrap();

        let content = tokio::fs::read_to_string(dir.path().join("upstreams.json")).await.unwrap();
        let parsed: StateFile = serde_json::from_str(&content).unwrap();
        assert!(parsed.upstreams["srv1"].last_started_at.is_some());
        assert_eq!(parsed.upstreams["srv1"].discovered_tool_names, vec!["echo"]);
    }

    #[tokio::test]
    async fn reopening_loads_previously_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStateStore::open(dir.path()).await.unwrap();
            store.record_failure("srv1", "connect refused").await;
            store.flush().await.unwrap();
        }

        let store = FileStateStore::open(dir.path()).await.unwrap();
        let snapshot = store.snapshot().await;
        assert_eq!(
            snapshot["srv1"].last_failure_reason.as_deref(),
            Some("connect refused")
        );
    }

    #[tokio::test]
    async fn debounced_writer_coalesces_rapid_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        for n in 0..5u32 {
            store.record_restart_count("srv1", n).await;
        }
        tokio::time::sleep(FLUSH_INTERVAL + Duration::from_millis(200)).await;

        let content = tokio::fs::read_to_string(dir.path().join("upstreams.json")).await.unwrap();
        let parsed: StateFile = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.upstreams["srv1"].restart_count, 4);
    }
}
