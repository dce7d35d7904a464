use std::path::Path;

use anyhow::{Context, Result};
use hatago_config::GlobalConfig;

pub fn validate(config_path: &Path) -> Result<()> {
    let config = GlobalConfig::load(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    println!("config ok: {}", config_path.display());
    println!("  log level: {}", config.log_level);
    println!("  upstreams: {}", config.mcp_servers.len());
    for id in config.mcp_servers.keys() {
        println!("    - {id}");
    }
    Ok(())
}
