//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use corluma_config::ConfigError;
use corluma_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach device at {address}: {reason}")]
    #[diagnostic(
        code(corluma::connection_failed),
        help("Check that the device is powered on and on the same network.")
    )]
    ConnectionFailed { address: String, reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(corluma::timeout),
        help("Raise discovery.timeout in the config file.")
    )]
    Timeout { seconds: u64 },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("{family} device '{identifier}' not found")]
    #[diagnostic(
        code(corluma::not_found),
        help("Run: corluma devices list --family {family}")
    )]
    NotFound { family: String, identifier: String },

    #[error("Cannot save devices to {path}: {message}")]
    #[diagnostic(
        code(corluma::persistence),
        help("Check permissions on the data directory, or set data_dir in the config file.")
    )]
    Persistence { path: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(corluma::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(corluma::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(corluma::config),
        help("Run: corluma config path to find the file being read.")
    )]
    Config(Box<figment::Error>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(corluma::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Discovery stopped unexpectedly")]
    #[diagnostic(code(corluma::service_stopped))]
    ServiceStopped,

    #[error("Internal error: {0}")]
    #[diagnostic(code(corluma::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cannot render output: {0}")]
    #[diagnostic(code(corluma::render))]
    Render(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ServiceStopped => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { address, reason } => {
                CliError::ConnectionFailed { address, reason }
            }
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                family: "any".into(),
                identifier,
            },
            CoreError::Persistence { path, message } => CliError::Persistence {
                path: path.display().to_string(),
                message,
            },
            CoreError::ServiceStopped => CliError::ServiceStopped,
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Serialization(e) => CliError::Render(e.to_string()),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
