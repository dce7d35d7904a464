//! Environment diagnostics: config discovery and validation, no upstream
//! processes are spawned.

use std::env;
use std::path::Path;

use anyhow::Result;
use hatago_config::GlobalConfig;

pub fn run(config_path: &Path) -> Result<()> {
    println!("=== Hatago Environment Check ===");
    println!("Platform: {} {}", env::consts::OS, env::consts::ARCH);
    println!("Version:  {}", env!("CARGO_PKG_VERSION"));
    println!("Config:   {}", config_path.display());
    println!();

    println!("=== Config ===");
    match GlobalConfig::load(config_path) {
        Ok(config) => {
            println!("status: ok");
            println!("log level: {}", config.log_level);
            println!("upstreams configured: {}", config.mcp_servers.len());
            for (id, server) in &config.mcp_servers {
                println!("  - {id}: {:?}", server.transport);
            }
        }
        Err(error) => {
            println!("status: INVALID");
            println!("reason: {error}");
        }
    }

    Ok(())
}
