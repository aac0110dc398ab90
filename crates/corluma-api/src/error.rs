use thiserror::Error;

/// Top-level error type for the `corluma-api` crate.
///
/// Covers every failure mode of the probe layer: HTTP transport, device
/// API errors, response decoding, and the SSDP socket. `corluma-core`
/// maps these into its own error type; the discovery engine itself only
/// logs them.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    // ── Device API ──────────────────────────────────────────────────
    /// The device rejected the credentials (Hue error type 1, Nanoleaf 401/403).
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Structured error reported by the device API.
    #[error("Device error {code}: {description}")]
    Device { code: i64, description: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Broadcast ───────────────────────────────────────────────────
    /// Socket-level failure on the SSDP listener.
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// SSDP setup failed for a reason other than plain I/O.
    #[error("SSDP error: {0}")]
    Ssdp(String),
}

impl Error {
    /// Returns `true` if the device refused the credentials and a new
    /// pairing is needed.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if this is a transient error that the next
    /// discovery tick will simply retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Build a `Deserialization` error from a serde failure and the body
    /// that caused it.
    pub(crate) fn decode(err: &serde_json::Error, body: &str) -> Self {
        Self::Deserialization {
            message: err.to_string(),
            body: body.to_owned(),
        }
    }
}
