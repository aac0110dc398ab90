// ── Runtime discovery configuration ──
//
// These types describe *how* discovery runs: timer periods, the startup
// grace window, probe timeouts and where each family's records live.
// They never touch disk. The CLI builds them (usually through
// corluma-config) and hands them in.

use std::path::PathBuf;
use std::time::Duration;

use corluma_api::probe::NUPNP_URL;
use corluma_api::{ProtocolFamily, SsdpConfig, TransportConfig};
use url::Url;

use crate::error::CoreError;

/// Default period of the discovery timer for both families.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(2500);
/// Minimum gap between two directory (NUPnP) lookups.
pub const DEFAULT_DIRECTORY_INTERVAL: Duration = Duration::from_secs(8);
/// Discovery is forced on for this long after the service starts.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(120);

/// Configuration for one protocol family's discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub family: ProtocolFamily,
    /// Period of the polling timer.
    pub tick_interval: Duration,
    /// Rate limit for the directory lookup (Hue only).
    pub directory_interval: Duration,
    /// Window after start-up during which stop requests are ignored.
    pub startup_grace: Duration,
    /// JSON file holding found and not-found records.
    pub save_path: PathBuf,
    /// Addresses to add as manual IPs once the engine is up.
    pub manual_ips: Vec<String>,
}

impl DiscoveryConfig {
    /// Defaults for `family`, persisting to `save_path`.
    pub fn new(family: ProtocolFamily, save_path: impl Into<PathBuf>) -> Self {
        Self {
            family,
            tick_interval: DEFAULT_TICK_INTERVAL,
            directory_interval: DEFAULT_DIRECTORY_INTERVAL,
            startup_grace: DEFAULT_STARTUP_GRACE,
            save_path: save_path.into(),
            manual_ips: Vec::new(),
        }
    }

    /// Default file name for a family's records inside `data_dir`.
    pub fn default_save_path(family: ProtocolFamily, data_dir: &std::path::Path) -> PathBuf {
        data_dir.join(format!("{}.json", family.save_name()))
    }
}

/// Settings shared by every engine: HTTP probe and SSDP listener.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub transport: TransportConfig,
    /// Hue cloud directory, parsed by [`NetworkConfig::nupnp_url`].
    pub nupnp_url: String,
    /// Announced to Hue bridges when pairing.
    pub app_name: String,
    pub ssdp: SsdpConfig,
    /// Skip binding the SSDP socket entirely (manual IPs and the
    /// directory still work).
    pub disable_broadcast: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            nupnp_url: NUPNP_URL.into(),
            app_name: "Corluma".into(),
            ssdp: SsdpConfig::default(),
            disable_broadcast: false,
        }
    }
}

impl NetworkConfig {
    /// The directory URL, or a config error if it does not parse.
    pub fn nupnp_url(&self) -> Result<Url, CoreError> {
        Url::parse(&self.nupnp_url).map_err(|e| CoreError::Config {
            message: format!("invalid directory URL {}: {e}", self.nupnp_url),
        })
    }
}
