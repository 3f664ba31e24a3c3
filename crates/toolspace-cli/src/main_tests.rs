// crates/toolspace-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and startup warnings.
// Purpose: Keep the command surface and operator warnings stable.
// Dependencies: toolspace-cli main helpers
// ============================================================================

//! ## Overview
//! Parses representative command lines and checks which startup warnings a
//! config produces.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use clap::Parser;
use toolspace_config::BootstrapTokenConfig;
use toolspace_config::ServerTransport;
use toolspace_config::ToolspaceConfig;

use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::startup_warnings;
use super::system_tool_table;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn with_bootstrap(mut config: ToolspaceConfig) -> ToolspaceConfig {
    config.bootstrap_tokens.push(BootstrapTokenConfig {
        token: "bootstrap-admin-token-01".to_string(),
        role: "admin".to_string(),
        description: String::new(),
    });
    config
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn parses_serve_with_config() {
    let cli = Cli::try_parse_from(["toolspace", "serve", "--config", "/etc/toolspace.toml"]).unwrap();
    match cli.command {
        Commands::Serve(command) => assert_eq!(command.config, Some(PathBuf::from("/etc/toolspace.toml"))),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parses_config_subcommands() {
    let cli = Cli::try_parse_from(["toolspace", "config", "example"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config {
            command: ConfigCommand::Example
        }
    ));
    let cli = Cli::try_parse_from(["toolspace", "config", "check"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config {
            command: ConfigCommand::Check(_)
        }
    ));
}

#[test]
fn rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["toolspace", "launch"]).is_err());
    assert!(Cli::try_parse_from(["toolspace"]).is_err());
}

#[test]
fn quiet_config_has_no_warnings() {
    let config = with_bootstrap(ToolspaceConfig::default());
    assert!(startup_warnings(&config).is_empty());
}

#[test]
fn missing_bootstrap_tokens_warn() {
    let warnings = startup_warnings(&ToolspaceConfig::default());
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("no bootstrap tokens"));
}

#[test]
fn public_bind_and_disabled_audit_warn() {
    let mut config = with_bootstrap(ToolspaceConfig::default());
    config.server.transport = ServerTransport::Http;
    config.server.bind = Some("0.0.0.0:8650".to_string());
    config.server.audit.enabled = false;
    let warnings = startup_warnings(&config);
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].contains("non-loopback"));
    assert!(warnings[1].contains("audit"));

    config.server.bind = Some("127.0.0.1:8650".to_string());
    assert_eq!(startup_warnings(&config).len(), 1);
}

#[test]
fn system_tool_table_lists_every_tool() {
    let table = system_tool_table();
    let rows = table.as_array().unwrap();
    assert_eq!(rows.len(), toolspace_mcp::SystemTool::all().len());
    assert!(rows.iter().any(|row| row["name"] == "admin_token_create" && row["group"] == "admin"));
}
