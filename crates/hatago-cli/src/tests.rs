use clap::Parser;

use crate::cli::{Cli, Commands, ConfigCommands, ServeTransport};

const SAMPLE: &str = r#"
version = 1
logLevel = "debug"

[mcpServers.echo]
type = "stdio"
command = "echo-mcp"
args = ["--stdio"]
"#;

#[test]
fn serve_defaults_to_stdio_transport() {
    let cli = Cli::parse_from(["hatago", "serve"]);
    match cli.command {
        Commands::Serve { transport, .. } => assert_eq!(transport, ServeTransport::Stdio),
        _ => panic!("expected Serve"),
    }
}

#[test]
fn serve_accepts_http_transport_and_bind_override() {
    let cli = Cli::parse_from([
        "hatago",
        "serve",
        "--transport",
        "http",
        "--http-bind",
        "0.0.0.0:9999",
    ]);
    match cli.command {
        Commands::Serve {
            transport,
            http_bind,
            ..
        } => {
            assert_eq!(transport, ServeTransport::Http);
            assert_eq!(http_bind, "0.0.0.0:9999");
        }
        _ => panic!("expected Serve"),
    }
}

#[test]
fn config_validate_subcommand_parses() {
    let cli = Cli::parse_from(["hatago", "config", "validate"]);
    assert!(matches!(
        cli.command,
        Commands::Config {
            cmd: ConfigCommands::Validate
        }
    ));
}

#[test]
fn config_validate_reports_ok_for_a_sample_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    assert!(crate::config_cmd::validate(&path).is_ok());
}

#[test]
fn config_validate_fails_for_an_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "version = 2\n").unwrap();
    assert!(crate::config_cmd::validate(&path).is_err());
}

#[test]
fn doctor_runs_against_a_missing_config_without_panicking() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.toml");
    assert!(crate::doctor::run(&path).is_ok());
}
