// Protocol families handled by the discovery layer.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A family of lighting hubs that share one discovery protocol.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProtocolFamily {
    /// Philips Hue bridges.
    Hue,
    /// Nanoleaf Aurora / Canvas controllers.
    Nanoleaf,
}

impl ProtocolFamily {
    /// Port used when none is known for a device.
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Hue => 80,
            Self::Nanoleaf => 16021,
        }
    }

    /// Substring that identifies this family's SSDP payloads.
    pub const fn broadcast_marker(self) -> &'static str {
        match self {
            Self::Hue => "IpBridge",
            Self::Nanoleaf => "nanoleaf_aurora",
        }
    }

    /// Prefix for generated display names (`"Bridge 2"`, `"Nanoleaf 1"`).
    pub const fn name_prefix(self) -> &'static str {
        match self {
            Self::Hue => "Bridge ",
            Self::Nanoleaf => "Nanoleaf ",
        }
    }

    /// File stem of the persisted device list.
    pub const fn save_name(self) -> &'static str {
        match self {
            Self::Hue => "hue",
            Self::Nanoleaf => "nanoleaf",
        }
    }

    /// Whether this family has a cloud directory fallback (NUPnP).
    pub const fn has_directory(self) -> bool {
        matches!(self, Self::Hue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Hue".parse::<ProtocolFamily>().ok(), Some(ProtocolFamily::Hue));
        assert_eq!(
            "NANOLEAF".parse::<ProtocolFamily>().ok(),
            Some(ProtocolFamily::Nanoleaf)
        );
        assert!("lifx".parse::<ProtocolFamily>().is_err());
    }

    #[test]
    fn displays_lowercase() {
        assert_eq!(ProtocolFamily::Nanoleaf.to_string(), "nanoleaf");
    }
}
