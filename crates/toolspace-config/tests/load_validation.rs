//! Config load validation tests for toolspace-config.
// toolspace-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use toolspace_config::ServerTransport;
use toolspace_config::ToolspaceConfig;

mod common;

type TestResult = Result<(), String>;

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    common::assert_invalid(ToolspaceConfig::load(Some(Path::new(&long_path))), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    common::assert_invalid(
        ToolspaceConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&vec![b'#'; 1_048_577]).map_err(|err| err.to_string())?;
    common::assert_invalid(ToolspaceConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    common::assert_invalid(ToolspaceConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_malformed_toml() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(b"[server\ntransport = ").map_err(|err| err.to_string())?;
    common::assert_invalid(ToolspaceConfig::load(Some(file.path())), "config parse error")
}

#[test]
fn load_reports_missing_file_as_io_error() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("missing.toml");
    common::assert_invalid(ToolspaceConfig::load(Some(&path)), "config io error")
}

#[test]
fn load_reads_valid_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(b"[server]\ntransport = \"http\"\nbind = \"127.0.0.1:9000\"\n")
        .map_err(|err| err.to_string())?;
    let config = ToolspaceConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.server.transport != ServerTransport::Http {
        return Err("expected http transport".to_string());
    }
    let addr = config.server.bind_addr().map_err(|err| err.to_string())?;
    if addr.port() != 9000 {
        return Err(format!("unexpected bind port {}", addr.port()));
    }
    Ok(())
}
