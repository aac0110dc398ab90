// corluma-api: HTTP and SSDP probes for smart-lighting bridges and controllers

pub mod address;
pub mod error;
pub mod family;
pub mod hue;
pub mod models;
pub mod nanoleaf;
pub mod probe;
pub mod ssdp;
pub mod transport;

pub use address::normalize_host;
pub use error::Error;
pub use family::ProtocolFamily;
pub use probe::{HttpProbe, ProbeKind, ProbeOutcome, ProbeRequest, ProbeResponse};
pub use ssdp::{PacketBus, SsdpConfig, SsdpListener, SsdpPacket};
pub use transport::TransportConfig;
