// Device API response types
//
// Models for the small JSON documents returned by Hue bridges, the
// NUPnP directory, and Nanoleaf controllers. Fields use
// `#[serde(default)]` wherever firmware versions disagree about
// presence; anything required for discovery is left mandatory so that a
// malformed document fails to decode and is ignored by the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ── Hue result envelope ──────────────────────────────────────────────

/// One element of the array a Hue bridge returns for writes and errors:
/// `[{"success": {...}}]` or `[{"error": {...}}]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HueResult {
    Success(serde_json::Value),
    Error(HueApiError),
}

/// Error object inside a Hue result array.
#[derive(Debug, Clone, Deserialize)]
pub struct HueApiError {
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
}

impl HueApiError {
    /// "unauthorized user": the username is unknown to the bridge.
    pub const UNAUTHORIZED_USER: i64 = 1;
    /// "link button not pressed": pairing is waiting on the user.
    pub const LINK_BUTTON_NOT_PRESSED: i64 = 101;

    pub fn is_unauthorized(&self) -> bool {
        self.kind == Self::UNAUTHORIZED_USER
    }

    pub fn is_link_button(&self) -> bool {
        self.kind == Self::LINK_BUTTON_NOT_PRESSED
    }

    pub fn into_error(self) -> Error {
        if self.is_unauthorized() {
            Error::Unauthorized {
                message: self.description,
            }
        } else {
            Error::Device {
                code: self.kind,
                description: self.description,
            }
        }
    }
}

/// Payload of a successful `POST /api` pairing request.
#[derive(Debug, Clone, Deserialize)]
pub struct HueUsername {
    pub username: String,
}

// ── Hue full state ───────────────────────────────────────────────────

/// The subset of `GET /api/<username>` used by discovery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HueFullState {
    #[serde(default)]
    pub config: Option<HueConfig>,
    /// Lights keyed by bridge index. Values stay raw so that one odd
    /// light does not poison the whole document.
    #[serde(default)]
    pub lights: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HueConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub apiversion: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub bridgeid: String,
}

/// A light as listed in the bridge's full state.
#[derive(Debug, Clone, Deserialize)]
pub struct HueLight {
    pub uniqueid: String,
    pub name: String,
    #[serde(default)]
    pub swversion: String,
    #[serde(default, rename = "type")]
    pub light_type: String,
}

// ── NUPnP directory ──────────────────────────────────────────────────

/// Entry returned by the vendor's cloud directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NupnpEntry {
    pub id: String,
    pub internalipaddress: String,
    #[serde(default)]
    pub port: Option<u16>,
}

// ── Nanoleaf ─────────────────────────────────────────────────────────

/// Reply to `POST /api/v1/new` while the controller is in pairing mode.
#[derive(Debug, Clone, Deserialize)]
pub struct LeafAuthReply {
    pub auth_token: String,
}

/// Controller information from `GET /api/v1/<token>/`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafInfo {
    pub name: String,
    pub serial_no: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub firmware_version: String,
    #[serde(default)]
    pub model: String,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn hue_result_array_decodes_both_variants() {
        let body = json!([
            { "success": { "username": "abc" } },
            { "error": { "type": 101, "address": "", "description": "link button not pressed" } }
        ]);
        let results: Vec<HueResult> = serde_json::from_value(body).unwrap();
        assert!(matches!(&results[0], HueResult::Success(v) if v["username"] == "abc"));
        match &results[1] {
            HueResult::Error(e) => assert!(e.is_link_button()),
            HueResult::Success(_) => panic!("expected error variant"),
        }
    }

    #[test]
    fn unauthorized_maps_to_error_variant() {
        let err = HueApiError {
            kind: 1,
            address: "/".into(),
            description: "unauthorized user".into(),
        };
        assert!(err.into_error().is_unauthorized());
    }

    #[test]
    fn leaf_info_requires_serial() {
        let ok = json!({ "name": "Canvas 7C", "serialNo": "S19124C8036", "model": "NL29" });
        let info: LeafInfo = serde_json::from_value(ok).unwrap();
        assert_eq!(info.serial_no, "S19124C8036");
        assert!(info.firmware_version.is_empty());

        let missing = json!({ "name": "Canvas 7C" });
        assert!(serde_json::from_value::<LeafInfo>(missing).is_err());
    }
}
