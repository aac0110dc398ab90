// ── Core error types ──
//
// Errors surfaced to consumers of corluma-core. The discovery engine
// itself never fails a tick: probe and packet problems are logged and
// retried. These variants cover the edges around it: building the probe
// client, persisting records, and talking to a service task that has
// already shut down.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach device at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Cannot persist devices to {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    // ── Service errors ───────────────────────────────────────────────
    #[error("Discovery service has stopped")]
    ServiceStopped,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

// ── Conversion from probe-layer errors ───────────────────────────────

impl From<corluma_api::Error> for CoreError {
    fn from(err: corluma_api::Error) -> Self {
        use corluma_api::Error as ApiError;

        match err {
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        address: e
                            .url()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::ClientBuild(message) => CoreError::Config { message },
            ApiError::Unauthorized { message } => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("unauthorized: {message}"),
            },
            ApiError::Device { code, description } => {
                CoreError::Internal(format!("Device error {code}: {description}"))
            }
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            ApiError::Io(e) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("socket error: {e}"),
            },
            ApiError::Ssdp(reason) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("SSDP: {reason}"),
            },
        }
    }
}
