// ── Connection records ──
//
// One `ConnectionRecord` per physical bridge or controller. Bucket
// membership is not stored on the record; it is implied by which
// collection in `RecordBuckets` holds it.

use chrono::{DateTime, Utc};
use corluma_api::ProtocolFamily;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Per-record connection sub-state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthState {
    /// Nothing has answered at this address yet.
    #[default]
    AwaitingResponse,
    /// The device answered but refuses to hand out or accept a token,
    /// usually until the user presses the link/power button.
    AwaitingCredentials,
    /// A token is known; waiting for a full connection test to pass.
    TestingConnection,
    /// Identity and credentials are both confirmed.
    Connected,
}

/// Summary of one light behind a Hue bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightSummary {
    pub uniqueid: String,
    pub index: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub swversion: String,
    #[serde(default, rename = "hardwareType")]
    pub hardware_type: String,
}

/// A known (or suspected) device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub family: ProtocolFamily,
    /// Bare host, scheme stripped. May be empty until discovered.
    pub ip: String,
    pub port: u16,
    /// Auth token (Nanoleaf) or username (Hue). Empty until paired.
    #[serde(skip)]
    pub auth_token: String,
    /// Serial number (Nanoleaf) or bridge id (Hue).
    serial: String,
    /// User-editable name.
    pub display_name: String,
    /// Name reported by the device itself.
    pub hardware_name: String,
    pub mac_address: String,
    pub api_version: String,
    pub firmware: String,
    pub model: String,
    pub manufacturer: String,
    pub lights: Vec<LightSummary>,
    pub ip_verified: bool,
    pub auth_state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl ConnectionRecord {
    pub fn new(family: ProtocolFamily, ip: impl Into<String>, port: u16) -> Self {
        Self {
            family,
            ip: ip.into(),
            port,
            auth_token: String::new(),
            serial: String::new(),
            display_name: String::new(),
            hardware_name: String::new(),
            mac_address: String::new(),
            api_version: String::new(),
            firmware: String::new(),
            model: String::new(),
            manufacturer: String::new(),
            lights: Vec::new(),
            ip_verified: false,
            auth_state: AuthState::AwaitingResponse,
            last_seen: None,
        }
    }

    /// Serial number or bridge id; empty until known.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Set the serial if it is still empty.
    ///
    /// Returns `false` when a different serial is already recorded; a
    /// non-empty serial never changes.
    pub fn set_serial(&mut self, serial: &str) -> bool {
        if self.serial.is_empty() {
            self.serial = serial.to_owned();
            true
        } else {
            self.serial == serial
        }
    }

    /// Builder-style variant of [`set_serial`](Self::set_serial).
    #[must_use]
    pub fn with_serial(mut self, serial: &str) -> Self {
        self.set_serial(serial);
        self
    }

    pub fn has_token(&self) -> bool {
        !self.auth_token.is_empty()
    }

    pub fn has_serial(&self) -> bool {
        !self.serial.is_empty()
    }

    /// Serial when known, IP otherwise.
    pub fn key(&self) -> &str {
        if self.serial.is_empty() {
            &self.ip
        } else {
            &self.serial
        }
    }

    /// Whether `key` names this record by serial or by IP.
    pub fn matches_key(&self, key: &str) -> bool {
        (!self.serial.is_empty() && self.serial.eq_ignore_ascii_case(key))
            || (!self.ip.is_empty() && self.ip == key)
    }

    /// Display name, falling back to the hardware name, then the key.
    pub fn label(&self) -> &str {
        if !self.display_name.is_empty() {
            &self.display_name
        } else if !self.hardware_name.is_empty() {
            &self.hardware_name
        } else {
            self.key()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.auth_state == AuthState::Connected
    }
}
