// toolspace-config/src/config.rs
// ============================================================================
// Module: Toolspace Configuration
// Description: Configuration loading and validation for Toolspace servers.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: toolspace-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. The role table starts from
//! the built-in roles; `[[roles]]` entries replace a role's groups and
//! `[[groups]]` entries add a group to each listed role.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use toolspace_core::ControlPlaneConfig;
use toolspace_core::GroupName;
use toolspace_core::MessageBusConfig;
use toolspace_core::OrganizationConfig;
use toolspace_core::RoleName;
use toolspace_core::TaskQueueConfig;
use toolspace_core::TokenStoreConfig;
use toolspace_core::runtime::default_role_table;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "toolspace.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "TOOLSPACE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum request body size accepted by the server.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Maximum number of role entries.
pub(crate) const MAX_ROLES: usize = 128;
/// Maximum number of group entries.
pub(crate) const MAX_GROUPS: usize = 256;
/// Maximum number of bootstrap tokens.
pub(crate) const MAX_BOOTSTRAP_TOKENS: usize = 64;
/// Maximum length of a bootstrap token.
pub(crate) const MAX_TOKEN_LENGTH: usize = 256;
/// Minimum length of a bootstrap token.
pub(crate) const MIN_TOKEN_LENGTH: usize = 16;
/// Maximum length of a role or group name.
pub(crate) const MAX_NAME_LENGTH: usize = 64;
/// Maximum token ttl in seconds (one year).
pub(crate) const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;
/// Maximum cleanup interval in seconds (one day).
pub(crate) const MAX_CLEANUP_INTERVAL_SECS: u64 = 24 * 60 * 60;
/// Maximum tasks retained per user-space.
pub(crate) const MAX_TASKS_PER_SPACE: usize = 100_000;
/// Maximum pending messages per token.
pub(crate) const MAX_PENDING_PER_TOKEN: usize = 100_000;
/// Maximum received-message history per token.
pub(crate) const MAX_HISTORY_PER_TOKEN: usize = 10_000;
/// Maximum members per component.
pub(crate) const MAX_MEMBERS: usize = 10_000;
/// Maximum number of components.
pub(crate) const MAX_COMPONENTS: usize = 10_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Toolspace server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolspaceConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Token lifetime configuration.
    #[serde(default)]
    pub tokens: TokensConfig,
    /// Role overrides applied on top of the built-in roles.
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    /// Groups added to existing or new roles.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    /// Tokens preloaded at startup.
    #[serde(default)]
    pub bootstrap_tokens: Vec<BootstrapTokenConfig>,
    /// User-space limits.
    #[serde(default)]
    pub user_space: UserSpaceConfig,
    /// Message bus limits.
    #[serde(default)]
    pub message_bus: MessagingConfig,
    /// Organization limits.
    #[serde(default)]
    pub organization: OrgConfig,
}

impl ToolspaceConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.tokens.validate()?;
        self.user_space.validate()?;
        self.message_bus.validate()?;
        self.organization.validate()?;
        self.validate_roles()?;
        self.validate_bootstrap_tokens()
    }

    /// Returns the effective role table: built-in roles, then `[[roles]]`
    /// replacements, then `[[groups]]` additions.
    #[must_use]
    pub fn role_table(&self) -> BTreeMap<RoleName, BTreeSet<GroupName>> {
        let mut table = default_role_table();
        for role in &self.roles {
            table.insert(RoleName::new(role.name.trim()), role.groups.iter().map(|g| GroupName::new(g.trim())).collect());
        }
        for group in &self.groups {
            for role in &group.roles {
                table.entry(RoleName::new(role.trim())).or_default().insert(GroupName::new(group.name.trim()));
            }
        }
        table
    }

    /// Converts the configuration into control plane inputs.
    #[must_use]
    pub fn control_plane_config(&self) -> ControlPlaneConfig {
        ControlPlaneConfig {
            tokens: TokenStoreConfig {
                default_ttl_ms: self.tokens.default_ttl_secs.map(secs_to_millis),
                max_ttl_ms: self.tokens.max_ttl_secs.map(secs_to_millis),
            },
            roles: self.role_table(),
            task_queue: TaskQueueConfig {
                max_tasks: self.user_space.max_tasks_per_space,
            },
            message_bus: MessageBusConfig {
                max_pending_per_token: self.message_bus.max_pending_per_token,
                default_ttl_ms: self.message_bus.default_ttl_secs.map(secs_to_millis),
                history_per_token: self.message_bus.history_per_token,
            },
            organization: OrganizationConfig {
                default_max_members: self.organization.default_max_members,
                max_components: self.organization.max_components,
            },
        }
    }

    /// Validates role and group entries.
    fn validate_roles(&self) -> Result<(), ConfigError> {
        if self.roles.len() > MAX_ROLES {
            return Err(ConfigError::Invalid(format!("roles exceeds max entries ({MAX_ROLES})")));
        }
        if self.groups.len() > MAX_GROUPS {
            return Err(ConfigError::Invalid(format!("groups exceeds max entries ({MAX_GROUPS})")));
        }
        let mut seen = BTreeSet::new();
        for role in &self.roles {
            validate_name("roles.name", &role.name)?;
            if !seen.insert(role.name.trim()) {
                return Err(ConfigError::Invalid(format!("duplicate role name: {}", role.name.trim())));
            }
            if role.groups.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "role {} must list at least one group",
                    role.name.trim()
                )));
            }
            for group in &role.groups {
                validate_name("roles.groups", group)?;
            }
        }
        for group in &self.groups {
            validate_name("groups.name", &group.name)?;
            if group.roles.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "group {} must list at least one role",
                    group.name.trim()
                )));
            }
            for role in &group.roles {
                validate_name("groups.roles", role)?;
            }
        }
        Ok(())
    }

    /// Validates bootstrap tokens without echoing their values.
    fn validate_bootstrap_tokens(&self) -> Result<(), ConfigError> {
        if self.bootstrap_tokens.len() > MAX_BOOTSTRAP_TOKENS {
            return Err(ConfigError::Invalid(format!(
                "bootstrap_tokens exceeds max entries ({MAX_BOOTSTRAP_TOKENS})"
            )));
        }
        let roles = self.role_table();
        let mut seen = BTreeSet::new();
        for (index, entry) in self.bootstrap_tokens.iter().enumerate() {
            let token = entry.token.trim();
            if token.len() < MIN_TOKEN_LENGTH || token.len() > MAX_TOKEN_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "bootstrap_tokens[{index}].token must be {MIN_TOKEN_LENGTH}-{MAX_TOKEN_LENGTH} bytes"
                )));
            }
            if token.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "bootstrap_tokens[{index}].token must not contain whitespace"
                )));
            }
            if !seen.insert(token) {
                return Err(ConfigError::Invalid(format!("bootstrap_tokens[{index}].token is a duplicate")));
            }
            if !roles.contains_key(&RoleName::new(entry.role.trim())) {
                return Err(ConfigError::Invalid(format!(
                    "bootstrap_tokens[{index}].role references unknown role: {}",
                    entry.role.trim()
                )));
            }
        }
        Ok(())
    }
}

/// Server transport types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// Content-Length framed JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// JSON-RPC over HTTP `POST /rpc`.
    Http,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Transport type.
    #[serde(default)]
    pub transport: ServerTransport,
    /// Bind address for the HTTP transport.
    #[serde(default)]
    pub bind: Option<String>,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: ServerTransport::Stdio,
            bind: None,
            max_body_bytes: default_max_body_bytes(),
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validates server transport configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be greater than zero".to_string()));
        }
        if self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_body_bytes must be at most {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        self.audit.validate()?;
        if self.transport == ServerTransport::Http {
            self.bind_addr()?;
        }
        Ok(())
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address is missing or malformed.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or_default().trim();
        if bind.is_empty() {
            return Err(ConfigError::Invalid("http transport requires bind address".to_string()));
        }
        bind.parse().map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))
    }
}

/// Audit logging configuration for server requests.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerAuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines); stderr when absent.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

/// Token lifetime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TokensConfig {
    /// Ttl applied when token creation omits one.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
    /// Upper bound on requested ttls.
    #[serde(default)]
    pub max_ttl_secs: Option<u64>,
    /// Interval between expired-token sweeps.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: None,
            max_ttl_secs: None,
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl TokensConfig {
    /// Validates ttl bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in
            [("tokens.default_ttl_secs", self.default_ttl_secs), ("tokens.max_ttl_secs", self.max_ttl_secs)]
        {
            if let Some(value) = value {
                validate_range(field, value, 1, MAX_TTL_SECS)?;
            }
        }
        if let (Some(default), Some(max)) = (self.default_ttl_secs, self.max_ttl_secs)
            && default > max
        {
            return Err(ConfigError::Invalid(
                "tokens.default_ttl_secs must not exceed tokens.max_ttl_secs".to_string(),
            ));
        }
        validate_range("tokens.cleanup_interval_secs", self.cleanup_interval_secs, 1, MAX_CLEANUP_INTERVAL_SECS)
    }
}

/// Role entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    /// Role name.
    pub name: String,
    /// Groups the role resolves to.
    pub groups: Vec<String>,
}

/// Group entry.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Group name.
    pub name: String,
    /// Roles granted the group.
    pub roles: Vec<String>,
}

/// Token preloaded at startup.
#[derive(Clone, Deserialize)]
pub struct BootstrapTokenConfig {
    /// Token value (secret).
    pub token: String,
    /// Role the token carries.
    pub role: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

impl std::fmt::Debug for BootstrapTokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapTokenConfig")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .field("description", &self.description)
            .finish()
    }
}

/// User-space limits.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSpaceConfig {
    /// Maximum tasks retained per user-space.
    #[serde(default = "default_max_tasks_per_space")]
    pub max_tasks_per_space: usize,
}

impl Default for UserSpaceConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_space: default_max_tasks_per_space(),
        }
    }
}

impl UserSpaceConfig {
    /// Validates task limits.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_range("user_space.max_tasks_per_space", self.max_tasks_per_space, 1, MAX_TASKS_PER_SPACE)
    }
}

/// Message bus limits.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// Maximum pending messages per destination.
    #[serde(default = "default_max_pending_per_token")]
    pub max_pending_per_token: usize,
    /// Ttl applied when the publisher omits one.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
    /// Received messages retained per token for replies.
    #[serde(default = "default_history_per_token")]
    pub history_per_token: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_pending_per_token: default_max_pending_per_token(),
            default_ttl_secs: None,
            history_per_token: default_history_per_token(),
        }
    }
}

impl MessagingConfig {
    /// Validates bus limits.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_range(
            "message_bus.max_pending_per_token",
            self.max_pending_per_token,
            1,
            MAX_PENDING_PER_TOKEN,
        )?;
        validate_range("message_bus.history_per_token", self.history_per_token, 1, MAX_HISTORY_PER_TOKEN)?;
        if let Some(ttl) = self.default_ttl_secs {
            validate_range("message_bus.default_ttl_secs", ttl, 1, MAX_TTL_SECS)?;
        }
        Ok(())
    }
}

/// Organization limits.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgConfig {
    /// Member limit for components that do not set one.
    #[serde(default = "default_max_members")]
    pub default_max_members: usize,
    /// Maximum number of components.
    #[serde(default = "default_max_components")]
    pub max_components: usize,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            default_max_members: default_max_members(),
            max_components: default_max_components(),
        }
    }
}

impl OrgConfig {
    /// Validates organization limits.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_range("organization.default_max_members", self.default_max_members, 1, MAX_MEMBERS)?;
        validate_range("organization.max_components", self.max_components, 1, MAX_COMPONENTS)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI, env, or default.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a role or group name.
fn validate_name(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length ({MAX_NAME_LENGTH})")));
    }
    Ok(())
}

/// Validates an inclusive numeric range.
fn validate_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(ConfigError::Invalid(format!("{field} must be between {min} and {max}")));
    }
    Ok(())
}

/// Converts seconds to milliseconds, saturating.
const fn secs_to_millis(secs: u64) -> u64 {
    secs.saturating_mul(1_000)
}

/// Default max request body size in bytes.
pub(crate) const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default audit logging enabled flag.
pub(crate) const fn default_audit_enabled() -> bool {
    true
}

/// Default expired-token sweep interval in seconds.
pub(crate) const fn default_cleanup_interval_secs() -> u64 {
    60
}

/// Default tasks retained per user-space.
pub(crate) const fn default_max_tasks_per_space() -> usize {
    1_000
}

/// Default pending messages per destination.
pub(crate) const fn default_max_pending_per_token() -> usize {
    1_000
}

/// Default received-message history per token.
pub(crate) const fn default_history_per_token() -> usize {
    256
}

/// Default members per component.
pub(crate) const fn default_max_members() -> usize {
    100
}

/// Default component limit.
pub(crate) const fn default_max_components() -> usize {
    1_000
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

    use super::*;

    #[test]
    fn validate_path_rejects_long_component() {
        let long = "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
        assert!(validate_path(Path::new(&long)).is_err());
        assert!(validate_path(Path::new("toolspace.toml")).is_ok());
    }

    #[test]
    fn resolve_path_prefers_explicit_path() {
        let path = resolve_path(Some(Path::new("custom.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("custom.toml"));
    }

    #[test]
    fn validate_range_is_inclusive() {
        assert!(validate_range("x", 1_u64, 1, 2).is_ok());
        assert!(validate_range("x", 2_u64, 1, 2).is_ok());
        assert!(validate_range("x", 3_u64, 1, 2).unwrap_err().to_string().contains("between 1 and 2"));
    }

    #[test]
    fn secs_to_millis_saturates() {
        assert_eq!(secs_to_millis(2), 2_000);
        assert_eq!(secs_to_millis(u64::MAX), u64::MAX);
    }
}
