// ── Hue bridge rules ──
//
// Bridges announce themselves over SSDP with an `IpBridge` server string
// and a `hue-bridgeid` header. Pairing replies and errors come back as
// `[{"success": …}]` / `[{"error": …}]` arrays; the full state is a
// plain object.

use corluma_api::models::{HueFullState, HueLight, HueResult, HueUsername, NupnpEntry};
use corluma_api::{normalize_host, ProbeResponse, ProtocolFamily, SsdpPacket};
use serde_json::Value;
use tracing::debug;

use super::rules::{
    sender_ip, Candidate, ConnectionReply, CredentialReply, DeviceIdentity, FamilyRules,
};
use crate::model::LightSummary;

#[derive(Debug, Clone, Copy, Default)]
pub struct HueRules;

impl FamilyRules for HueRules {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Hue
    }

    fn parse_broadcast(&self, packet: &SsdpPacket) -> Option<Candidate> {
        if !packet.contains(ProtocolFamily::Hue.broadcast_marker()) {
            return None;
        }
        Some(Candidate {
            ip: sender_ip(packet),
            port: None,
            id: packet
                .header("hue-bridgeid")
                .filter(|id| !id.is_empty())
                .map(str::to_lowercase),
            hardware_name: None,
        })
    }

    fn read_credentials(&self, response: &ProbeResponse) -> CredentialReply {
        let results: Vec<HueResult> = match response.decode() {
            Ok(results) => results,
            Err(e) => return CredentialReply::Unrecognized(e.to_string()),
        };
        match results.into_iter().next() {
            Some(HueResult::Success(value)) => match serde_json::from_value::<HueUsername>(value) {
                Ok(user) if !user.username.is_empty() => CredentialReply::Token(user.username),
                Ok(_) => CredentialReply::Unrecognized("empty username".into()),
                Err(e) => CredentialReply::Unrecognized(e.to_string()),
            },
            Some(HueResult::Error(err)) => {
                debug!(code = err.kind, description = %err.description, "bridge refused pairing");
                CredentialReply::AwaitingUser
            }
            None => CredentialReply::Unrecognized("empty result array".into()),
        }
    }

    fn read_connection(&self, response: &ProbeResponse) -> ConnectionReply {
        let value: Value = match response.decode() {
            Ok(value) => value,
            Err(e) => return ConnectionReply::Unrecognized(e.to_string()),
        };

        if value.is_array() {
            let results: Vec<HueResult> = serde_json::from_value(value).unwrap_or_default();
            return match results.first() {
                Some(HueResult::Error(err)) if err.is_unauthorized() => ConnectionReply::Unauthorized,
                Some(HueResult::Error(err)) => ConnectionReply::Unrecognized(format!(
                    "bridge error {}: {}",
                    err.kind, err.description
                )),
                _ => ConnectionReply::Unrecognized("unexpected result array".into()),
            };
        }
        if !value.is_object() {
            return ConnectionReply::Unrecognized("full state is not an object".into());
        }

        let state: HueFullState = match serde_json::from_value(value) {
            Ok(state) => state,
            Err(e) => return ConnectionReply::Unrecognized(e.to_string()),
        };
        let config = state.config.unwrap_or_default();
        ConnectionReply::Verified(DeviceIdentity {
            serial: config.bridgeid.to_lowercase(),
            hardware_name: config.name,
            mac_address: config.mac,
            api_version: config.apiversion,
            lights: Some(light_summaries(&state.lights)),
            ..DeviceIdentity::default()
        })
    }

    fn read_directory(&self, response: &ProbeResponse) -> Vec<Candidate> {
        let entries: Vec<NupnpEntry> = match response.decode() {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "unreadable directory reply");
                return Vec::new();
            }
        };
        entries
            .into_iter()
            .filter_map(|entry| {
                let (ip, embedded_port) = normalize_host(&entry.internalipaddress);
                if ip.is_empty() {
                    return None;
                }
                Some(Candidate {
                    ip,
                    port: entry.port.or(embedded_port),
                    id: (!entry.id.is_empty()).then(|| entry.id.to_lowercase()),
                    hardware_name: None,
                })
            })
            .collect()
    }

    fn cross_tests_pending(&self) -> bool {
        true
    }
}

/// Lights keyed by bridge index; entries that do not decode are skipped.
fn light_summaries(lights: &std::collections::BTreeMap<String, Value>) -> Vec<LightSummary> {
    let mut out: Vec<LightSummary> = lights
        .iter()
        .filter_map(|(index, value)| {
            let index = index.parse::<u32>().ok()?;
            let light = serde_json::from_value::<HueLight>(value.clone()).ok()?;
            Some(LightSummary {
                uniqueid: light.uniqueid,
                index,
                name: light.name,
                swversion: light.swversion,
                hardware_type: light.light_type,
            })
        })
        .collect();
    out.sort_by_key(|light| light.index);
    out
}
