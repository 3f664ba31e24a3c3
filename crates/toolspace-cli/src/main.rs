// crates/toolspace-cli/src/main.rs
// ============================================================================
// Module: Toolspace CLI Entry Point
// Description: Command dispatcher for the Toolspace MCP server and config tools.
// Purpose: Run the server and inspect configuration from the command line.
// Dependencies: clap, toolspace-config, toolspace-core, toolspace-mcp, tokio.
// ============================================================================

//! ## Overview
//! The Toolspace CLI starts the MCP server and offers offline helpers for
//! configuration and token generation. Startup warnings are written to
//! stderr here and nowhere else; the library crates stay silent.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde_json::json;
use thiserror::Error;
use toolspace_config::ServerTransport;
use toolspace_config::ToolspaceConfig;
use toolspace_config::config_toml_example;
use toolspace_core::Token;
use toolspace_mcp::McpServer;
use toolspace_mcp::SystemTool;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "toolspace", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Toolspace MCP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Token utilities.
    Token {
        /// Selected token subcommand.
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// System tool reference.
    Tools {
        /// Selected tools subcommand.
        #[command(subcommand)]
        command: ToolsCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to toolspace.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file.
    Check(ConfigCheckCommand),
    /// Print an annotated example config.
    Example,
}

/// Configuration for `config check`.
#[derive(Args, Debug)]
struct ConfigCheckCommand {
    /// Optional config file path (defaults to toolspace.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Token subcommands.
#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Print a fresh random token suitable for `[[bootstrap_tokens]]`.
    Generate,
}

/// Tools subcommands.
#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// Print the reserved system tools with their groups as JSON.
    List,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Token {
            command: TokenCommand::Generate,
        } => command_token_generate(),
        Commands::Tools {
            command: ToolsCommand::List,
        } => command_tools_list(),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = ToolspaceConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    for warning in startup_warnings(&config) {
        write_stderr_line(&warning).map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let server =
        McpServer::from_config(config).map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Returns operator warnings for a validated config.
fn startup_warnings(config: &ToolspaceConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.server.transport == ServerTransport::Http
        && let Ok(addr) = config.server.bind_addr()
        && !addr.ip().is_loopback()
    {
        warnings.push(format!(
            "toolspace: WARNING: http transport bound to non-loopback address {addr}; bearer tokens travel \
             unencrypted unless TLS terminates upstream"
        ));
    }
    if config.bootstrap_tokens.is_empty() {
        warnings.push(
            "toolspace: WARNING: no bootstrap tokens configured; no caller can authenticate".to_string(),
        );
    }
    if !config.server.audit.enabled {
        warnings.push("toolspace: WARNING: request audit logging is disabled".to_string());
    }
    warnings
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Check(command) => command_config_check(&command),
        ConfigCommand::Example => {
            write_stdout_line(config_toml_example().trim_end())
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Executes the config check command.
fn command_config_check(command: &ConfigCheckCommand) -> CliResult<ExitCode> {
    let config = ToolspaceConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    write_stdout_line(&format!(
        "config ok: {} roles, {} bootstrap tokens",
        config.role_table().len(),
        config.bootstrap_tokens.len()
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Token and Tools Commands
// ============================================================================

/// Prints a freshly generated token.
fn command_token_generate() -> CliResult<ExitCode> {
    write_stdout_line(Token::generate().as_str()).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints the system tool reference.
fn command_tools_list() -> CliResult<ExitCode> {
    let rendered = serde_json::to_string_pretty(&system_tool_table())
        .map_err(|err| CliError::new(format!("failed to render tools: {err}")))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Builds the JSON system tool table.
fn system_tool_table() -> serde_json::Value {
    let tools: Vec<serde_json::Value> = SystemTool::all()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.as_str(),
                "group": tool.group(),
                "mutates": tool.mutates(),
                "description": tool.description(),
            })
        })
        .collect();
    serde_json::Value::Array(tools)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
