//! Shared configuration for the Corluma CLI.
//!
//! A TOML file at the platform config dir, layered with `CORLUMA_*`
//! environment variables, and translation into the runtime types of
//! `corluma_core` ([`NetworkConfig`], [`DiscoveryConfig`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use corluma_core::{DiscoveryConfig, NetworkConfig, ProtocolFamily};

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "CORLUMA_CONFIG";
/// Prefix for environment overrides (`CORLUMA_DATA_DIR`, `CORLUMA_DISCOVERY__TICK_MS`).
pub const ENV_PREFIX: &str = "CORLUMA_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Where saved devices live. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Settings shared by every family.
    #[serde(default)]
    pub discovery: DiscoverySection,

    #[serde(default)]
    pub hue: FamilySection,

    #[serde(default)]
    pub nanoleaf: FamilySection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoverySection {
    /// Polling period in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Minimum seconds between two Hue directory lookups.
    #[serde(default = "default_directory_secs")]
    pub directory_secs: u64,

    /// Seconds after start-up during which discovery cannot be stopped.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Hue cloud directory.
    #[serde(default = "default_nupnp_url")]
    pub nupnp_url: String,

    /// Name announced to Hue bridges when pairing.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Listen for SSDP broadcasts.
    #[serde(default = "default_true")]
    pub broadcast: bool,

    /// Seconds between SSDP searches.
    #[serde(default = "default_search_secs")]
    pub search_secs: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            directory_secs: default_directory_secs(),
            grace_secs: default_grace_secs(),
            timeout: default_timeout(),
            nupnp_url: default_nupnp_url(),
            app_name: default_app_name(),
            broadcast: true,
            search_secs: default_search_secs(),
        }
    }
}

fn default_tick_ms() -> u64 {
    2500
}
fn default_directory_secs() -> u64 {
    8
}
fn default_grace_secs() -> u64 {
    120
}
fn default_timeout() -> u64 {
    5
}
fn default_nupnp_url() -> String {
    NetworkConfig::default().nupnp_url
}
fn default_app_name() -> String {
    "Corluma".into()
}
fn default_true() -> bool {
    true
}
fn default_search_secs() -> u64 {
    10
}

/// Per-family settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FamilySection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Overrides `discovery.tick_ms` for this family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_ms: Option<u64>,

    /// Addresses to probe even if nothing announces them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manual_ips: Vec<String>,
}

impl Default for FamilySection {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: None,
            manual_ips: Vec::new(),
        }
    }
}

// ── Translation to runtime config ───────────────────────────────────

impl Config {
    pub fn family(&self, family: ProtocolFamily) -> &FamilySection {
        match family {
            ProtocolFamily::Hue => &self.hue,
            ProtocolFamily::Nanoleaf => &self.nanoleaf,
        }
    }

    /// Families with `enabled = true`, Hue first.
    pub fn enabled_families(&self) -> Vec<ProtocolFamily> {
        [ProtocolFamily::Hue, ProtocolFamily::Nanoleaf]
            .into_iter()
            .filter(|f| self.family(*f).enabled)
            .collect()
    }

    /// Directory for saved device files.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Saved-device file of `family`.
    pub fn save_path(&self, family: ProtocolFamily) -> PathBuf {
        DiscoveryConfig::default_save_path(family, &self.data_dir())
    }

    /// Probe and listener settings.
    pub fn network_config(&self) -> Result<NetworkConfig, ConfigError> {
        let d = &self.discovery;
        if d.timeout == 0 {
            return Err(ConfigError::Validation {
                field: "discovery.timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        if d.search_secs == 0 {
            return Err(ConfigError::Validation {
                field: "discovery.search_secs".into(),
                reason: "must be at least 1 second".into(),
            });
        }

        let mut network = NetworkConfig {
            nupnp_url: d.nupnp_url.clone(),
            app_name: d.app_name.clone(),
            disable_broadcast: !d.broadcast,
            ..NetworkConfig::default()
        };
        if network.nupnp_url().is_err() {
            return Err(ConfigError::Validation {
                field: "discovery.nupnp_url".into(),
                reason: format!("invalid URL: {}", d.nupnp_url),
            });
        }
        network.transport.timeout = Duration::from_secs(d.timeout);
        network.ssdp.search_interval = Duration::from_secs(d.search_secs);
        Ok(network)
    }

    /// Engine settings for `family`.
    pub fn discovery_config(&self, family: ProtocolFamily) -> Result<DiscoveryConfig, ConfigError> {
        let section = self.family(family);
        let tick_ms = section.tick_ms.unwrap_or(self.discovery.tick_ms);
        if tick_ms == 0 {
            return Err(ConfigError::Validation {
                field: format!("{family}.tick_ms"),
                reason: "must be greater than zero".into(),
            });
        }

        let mut config = DiscoveryConfig::new(family, self.save_path(family));
        config.tick_interval = Duration::from_millis(tick_ms);
        config.directory_interval = Duration::from_secs(self.discovery.directory_secs);
        config.startup_grace = Duration::from_secs(self.discovery.grace_secs);
        config.manual_ips.clone_from(&section.manual_ips);
        Ok(config)
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "corluma", "corluma")
}

/// Resolve the config file path: `CORLUMA_CONFIG`, else the platform
/// config dir.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform data dir for saved devices.
pub fn default_data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn home_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("corluma");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults, then `path` (if it exists), then `CORLUMA_*` env vars.
///
/// Nested keys use a double underscore: `CORLUMA_DISCOVERY__TICK_MS`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["config"]));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
