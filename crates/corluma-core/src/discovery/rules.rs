// ── Protocol rules ──
//
// The engine is the same for every family; what differs is how a
// broadcast packet is recognised and how a probe reply is read. Each
// family implements `FamilyRules` and the engine dispatches through it.

use corluma_api::{ProbeResponse, ProtocolFamily, SsdpPacket};

use crate::model::LightSummary;

/// A device seen on the network, before it is matched against buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub ip: String,
    pub port: Option<u16>,
    /// Serial or bridge id, if the source carried one.
    pub id: Option<String>,
    /// Name the device announces for itself.
    pub hardware_name: Option<String>,
}

impl Candidate {
    pub fn at(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Self::default()
        }
    }
}

/// How a device answered a request for credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialReply {
    /// A new token or username.
    Token(String),
    /// The device is there but wants the user to press its button.
    AwaitingUser,
    /// Not a reply this family understands.
    Unrecognized(String),
}

/// Everything a successful connection test tells us about a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Serial or bridge id. Empty when the device did not report one.
    pub serial: String,
    pub hardware_name: String,
    pub mac_address: String,
    pub api_version: String,
    pub firmware: String,
    pub model: String,
    pub manufacturer: String,
    /// `None` when the family does not report lights.
    pub lights: Option<Vec<LightSummary>>,
}

/// How a device answered a full connection test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionReply {
    Verified(DeviceIdentity),
    /// Token rejected.
    Unauthorized,
    Unrecognized(String),
}

/// Family-specific parsing used by [`DiscoveryEngine`](super::DiscoveryEngine).
pub trait FamilyRules: Send + Sync + std::fmt::Debug {
    fn family(&self) -> ProtocolFamily;

    /// Extract a candidate from a broadcast packet, if it is one of ours.
    fn parse_broadcast(&self, packet: &SsdpPacket) -> Option<Candidate>;

    fn read_credentials(&self, response: &ProbeResponse) -> CredentialReply;

    fn read_connection(&self, response: &ProbeResponse) -> ConnectionReply;

    /// Candidates listed by a directory lookup.
    fn read_directory(&self, _response: &ProbeResponse) -> Vec<Candidate> {
        Vec::new()
    }

    /// Whether records without a token should be tried with the tokens of
    /// other not-found records.
    fn cross_tests_pending(&self) -> bool {
        false
    }
}

/// Rules for `family`.
pub fn rules_for(family: ProtocolFamily) -> Box<dyn FamilyRules> {
    match family {
        ProtocolFamily::Hue => Box::new(super::hue::HueRules),
        ProtocolFamily::Nanoleaf => Box::new(super::nanoleaf::LeafRules),
    }
}

/// Canonical string form of a packet sender.
pub(crate) fn sender_ip(packet: &SsdpPacket) -> String {
    packet.sender.to_canonical().to_string()
}
