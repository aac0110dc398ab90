// ── Record persistence ──
//
// Each protocol family keeps its own JSON array on disk. Loading is
// tolerant: every entry is decoded on its own and the ones missing a
// required field (or carrying the wrong type) are dropped. Saving
// rewrites the whole array, but only when it differs from what was last
// written, and goes through a temp file plus rename.

use std::fs;
use std::path::{Path, PathBuf};

use corluma_api::{normalize_host, ProtocolFamily};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{AuthState, ConnectionRecord, LightSummary};

// ── On-disk entry formats ────────────────────────────────────────────

/// One Hue bridge in `hue.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HueEntry {
    id: String,
    #[serde(rename = "IP")]
    ip: String,
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "customName")]
    custom_name: String,
    #[serde(default)]
    api: String,
    #[serde(default)]
    macaddress: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    lights: Vec<LightSummary>,
}

/// One Nanoleaf controller in `nanoleaf.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LeafEntry {
    name: String,
    #[serde(rename = "IP")]
    ip: String,
    port: u16,
    serial: String,
    auth: String,
    #[serde(rename = "hardwareName")]
    hardware_name: String,
}

impl HueEntry {
    fn from_record(r: &ConnectionRecord) -> Self {
        Self {
            id: r.serial().to_owned(),
            ip: r.ip.clone(),
            username: r.auth_token.clone(),
            name: r.hardware_name.clone(),
            custom_name: r.display_name.clone(),
            api: r.api_version.clone(),
            macaddress: r.mac_address.clone(),
            port: (r.port != ProtocolFamily::Hue.default_port()).then_some(r.port),
            lights: r.lights.clone(),
        }
    }

    fn into_record(self) -> ConnectionRecord {
        let (ip, embedded_port) = normalize_host(&self.ip);
        let port = self
            .port
            .or(embedded_port)
            .unwrap_or(ProtocolFamily::Hue.default_port());
        let mut r = ConnectionRecord::new(ProtocolFamily::Hue, ip, port)
            .with_serial(&self.id.to_lowercase());
        r.auth_token = self.username;
        r.hardware_name = self.name;
        r.display_name = self.custom_name;
        r.api_version = self.api;
        r.mac_address = self.macaddress;
        r.lights = self.lights;
        r
    }
}

impl LeafEntry {
    fn from_record(r: &ConnectionRecord) -> Self {
        Self {
            name: r.display_name.clone(),
            ip: r.ip.clone(),
            port: r.port,
            serial: r.serial().to_owned(),
            auth: r.auth_token.clone(),
            hardware_name: r.hardware_name.clone(),
        }
    }

    fn into_record(self) -> ConnectionRecord {
        let (ip, _) = normalize_host(&self.ip);
        let mut r =
            ConnectionRecord::new(ProtocolFamily::Nanoleaf, ip, self.port).with_serial(&self.serial);
        r.auth_token = self.auth;
        r.display_name = self.name;
        r.hardware_name = self.hardware_name;
        r
    }
}

fn encode(record: &ConnectionRecord) -> Result<Value, serde_json::Error> {
    match record.family {
        ProtocolFamily::Hue => serde_json::to_value(HueEntry::from_record(record)),
        ProtocolFamily::Nanoleaf => serde_json::to_value(LeafEntry::from_record(record)),
    }
}

fn decode(family: ProtocolFamily, value: Value) -> Result<ConnectionRecord, serde_json::Error> {
    let mut record = match family {
        ProtocolFamily::Hue => serde_json::from_value::<HueEntry>(value)?.into_record(),
        ProtocolFamily::Nanoleaf => serde_json::from_value::<LeafEntry>(value)?.into_record(),
    };
    if record.has_token() {
        record.auth_state = AuthState::TestingConnection;
    }
    Ok(record)
}

// ── PersistenceStore ─────────────────────────────────────────────────

/// Backing file for one family's found and not-found records.
#[derive(Debug)]
pub struct PersistenceStore {
    family: ProtocolFamily,
    path: PathBuf,
    last_saved: Option<Vec<Value>>,
}

impl PersistenceStore {
    pub fn new(family: ProtocolFamily, path: impl Into<PathBuf>) -> Self {
        Self {
            family,
            path: path.into(),
            last_saved: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn family(&self) -> ProtocolFamily {
        self.family
    }

    /// Read every valid entry from disk.
    ///
    /// A missing file is an empty set. An unreadable file or one that is
    /// not a JSON array is logged and treated as empty.
    pub fn load(&mut self) -> Vec<ConnectionRecord> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no saved devices");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read saved devices");
                return Vec::new();
            }
        };

        let entries = match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                warn!(path = %self.path.display(), "saved devices file is not a JSON array");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "saved devices file is not valid JSON");
                return Vec::new();
            }
        };

        let total = entries.len();
        let records: Vec<ConnectionRecord> = entries
            .into_iter()
            .filter_map(|entry| match decode(self.family, entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(family = %self.family, error = %e, "dropping malformed saved device");
                    None
                }
            })
            .collect();

        debug!(
            family = %self.family,
            loaded = records.len(),
            dropped = total - records.len(),
            "loaded saved devices"
        );
        // Whatever survived validation is the baseline for the next diff.
        self.last_saved = records.iter().map(encode).collect::<Result<_, _>>().ok();
        records
    }

    /// Write `records` if they differ from the last saved set.
    ///
    /// Returns `Ok(false)` when nothing changed.
    pub fn save<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a ConnectionRecord>,
    ) -> Result<bool, CoreError> {
        let entries = records
            .into_iter()
            .map(encode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::persistence(&self.path, e))?;

        if self.last_saved.as_ref() == Some(&entries) {
            return Ok(false);
        }

        let body = serde_json::to_string_pretty(&entries)
            .map_err(|e| CoreError::persistence(&self.path, e))?;
        write_atomic(&self.path, body.as_bytes())?;

        info!(
            family = %self.family,
            path = %self.path.display(),
            count = entries.len(),
            "saved devices"
        );
        self.last_saved = Some(entries);
        Ok(true)
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CoreError::persistence(path, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(|e| CoreError::persistence(path, e))?;
    fs::rename(&tmp, path).map_err(|e| CoreError::persistence(path, e))
}
