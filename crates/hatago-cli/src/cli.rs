use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Build version string combining Cargo.toml version and, when available,
/// a git describe baked in at build time.
fn build_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[derive(Parser)]
#[command(name = "hatago", version = build_version())]
#[command(about = "Hatago: a Model-Context-Protocol hub that federates upstream MCP servers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the hub config file (defaults to the platform config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the hub and serve downstream clients.
    Serve {
        /// Downstream transport to host.
        #[arg(long, value_enum, default_value = "stdio")]
        transport: ServeTransport,

        /// Bind address for the streamable-HTTP transport.
        #[arg(long, default_value = "127.0.0.1:4820")]
        http_bind: String,

        /// Directory for persisted upstream state (disabled if omitted).
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Validate a config file without starting the hub.
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },

    /// Report the hub's view of its environment: config path, upstream
    /// reachability is not probed, only configuration sanity.
    Doctor,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Parse and validate the config file, printing a summary.
    Validate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ServeTransport {
    Stdio,
    Http,
}
