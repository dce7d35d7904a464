use anyhow::Result;
use clap::Parser;

mod cli;
mod config_cmd;
mod doctor;
mod paths;
mod serve;

#[cfg(test)]
mod tests;

use cli::{Cli, Commands, ConfigCommands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(paths::default_config_path)
        .ok_or_else(|| anyhow::anyhow!("could not determine a default config path"))?;

    match cli.command {
        Commands::Serve {
            transport,
            http_bind,
            state_dir,
        } => {
            serve::run(&config_path, transport, &http_bind, state_dir).await?;
        }
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Validate => {
                config_cmd::validate(&config_path)?;
            }
        },
        Commands::Doctor => {
            doctor::run(&config_path)?;
        }
    }

    Ok(())
}
