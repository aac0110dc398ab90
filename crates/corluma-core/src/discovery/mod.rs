// Discovery engines and the per-family rules they dispatch through.

pub mod engine;
pub mod hue;
pub mod nanoleaf;
pub mod rules;

pub use engine::{DiscoveryEngine, DiscoverySnapshot};
pub use rules::{
    rules_for, Candidate, ConnectionReply, CredentialReply, DeviceIdentity, FamilyRules,
};
