use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hatago_config::GlobalConfig;
use hatago_hub::Hub;
use hatago_store::FileStateStore;
use tokio::signal;
use tracing::info;

use crate::cli::ServeTransport;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

pub async fn run(
    config_path: &Path,
    transport: ServeTransport,
    http_bind: &str,
    state_dir: Option<PathBuf>,
) -> Result<()> {
    let config = GlobalConfig::load(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if let Some(dir) = &state_dir {
        let store = FileStateStore::open(dir)
            .await
            .with_context(|| format!("opening state store at {}", dir.display()))?;
        for (id, record) in store.snapshot().await {
            tracing::debug!(server_id = %id, ?record, "loaded persisted upstream state");
        }
    }

    let hub = Arc::new(Hub::new(config.naming.clone()));
    for upstream in config.upstream_configs() {
        hub.supervisor.register(upstream).await;
    }

    info!(upstreams = config.mcp_servers.len(), "starting hatago hub");
    hub.start().await;

    match transport {
        ServeTransport::Stdio => {
            tokio::select! {
                result = hatago_server::serve_stdio(hub.clone()) => result?,
                _ = signal::ctrl_c() => {
                    info!("received interrupt, shutting down");
                }
            }
        }
        ServeTransport::Http => {
            let addr = http_bind
                .parse()
                .with_context(|| format!("invalid bind address {http_bind}"))?;
            let endpoint = hatago_server::HttpEndpoint::start(addr, hub.clone())
                .await
                .with_context(|| format!("binding http endpoint on {http_bind}"))?;
            info!(addr = %http_bind, "streamable-http endpoint listening");
            signal::ctrl_c().await.ok();
            info!("received interrupt, shutting down");
            endpoint.shutdown().await;
        }
    }

    hub.shutdown(SHUTDOWN_DEADLINE).await;
    Ok(())
}
