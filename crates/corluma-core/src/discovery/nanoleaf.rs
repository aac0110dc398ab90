// ── Nanoleaf controller rules ──
//
// Controllers answer SSDP with `ST: nanoleaf_aurora:light` and carry
// their address in `Location: http://<ip>:<port>`. Pairing is a POST to
// `/api/v1/new` that only succeeds while the power button is held;
// otherwise the controller answers 403.

use corluma_api::models::{LeafAuthReply, LeafInfo};
use corluma_api::{normalize_host, ProbeResponse, ProtocolFamily, SsdpPacket};

use super::rules::{Candidate, ConnectionReply, CredentialReply, DeviceIdentity, FamilyRules};

#[derive(Debug, Clone, Copy, Default)]
pub struct LeafRules;

impl FamilyRules for LeafRules {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Nanoleaf
    }

    fn parse_broadcast(&self, packet: &SsdpPacket) -> Option<Candidate> {
        if !packet.contains(ProtocolFamily::Nanoleaf.broadcast_marker()) {
            return None;
        }
        let (ip, port) = normalize_host(packet.header("location")?);
        if ip.is_empty() {
            return None;
        }
        Some(Candidate {
            ip,
            port,
            // `nl-deviceid` is not the serial; identity waits for the info reply.
            id: None,
            hardware_name: packet
                .header("nl-devicename")
                .filter(|name| !name.is_empty())
                .map(str::to_owned),
        })
    }

    fn read_credentials(&self, response: &ProbeResponse) -> CredentialReply {
        match response.status {
            401 | 403 => CredentialReply::AwaitingUser,
            _ if response.is_success() => match response.decode::<LeafAuthReply>() {
                Ok(reply) if !reply.auth_token.is_empty() => CredentialReply::Token(reply.auth_token),
                Ok(_) => CredentialReply::Unrecognized("empty auth_token".into()),
                Err(e) => CredentialReply::Unrecognized(e.to_string()),
            },
            status => CredentialReply::Unrecognized(format!("HTTP {status}")),
        }
    }

    fn read_connection(&self, response: &ProbeResponse) -> ConnectionReply {
        match response.status {
            401 | 403 => ConnectionReply::Unauthorized,
            _ if response.is_success() => match response.decode::<LeafInfo>() {
                Ok(info) => ConnectionReply::Verified(DeviceIdentity {
                    serial: info.serial_no,
                    hardware_name: info.name,
                    firmware: info.firmware_version,
                    model: info.model,
                    manufacturer: info.manufacturer,
                    ..DeviceIdentity::default()
                }),
                Err(e) => ConnectionReply::Unrecognized(e.to_string()),
            },
            status => ConnectionReply::Unrecognized(format!("HTTP {status}")),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use corluma_api::ProbeRequest;
    use std::net::IpAddr;
    use url::Url;

    const ANNOUNCE: &str = "HTTP/1.1 200 OK\r\n\
        Cache-Control: max-age=60\r\n\
        ST: nanoleaf_aurora:light\r\n\
        Location: http://10.0.0.3:16021\r\n\
        nl-deviceid: 5E:2E:EA:8B:12:3C\r\n\
        nl-devicename: Light Panels 55:4f:cc\r\n\r\n";

    fn reply(status: u16, body: &str) -> ProbeResponse {
        ProbeResponse {
            request: ProbeRequest::test_connection(ProtocolFamily::Nanoleaf, "10.0.0.3", 16021, "tok"),
            url: Url::parse("http://10.0.0.3:16021/api/v1/tok/").unwrap(),
            status,
            body: body.into(),
        }
    }

    #[test]
    fn location_gives_ip_and_port() {
        let packet = SsdpPacket::new(IpAddr::from([10, 0, 0, 99]), ANNOUNCE);
        let candidate = LeafRules.parse_broadcast(&packet).unwrap();
        assert_eq!(candidate.ip, "10.0.0.3");
        assert_eq!(candidate.port, Some(16021));
        assert_eq!(candidate.hardware_name.as_deref(), Some("Light Panels 55:4f:cc"));
    }

    #[test]
    fn empty_location_is_ignored() {
        let packet = SsdpPacket::new(
            IpAddr::from([10, 0, 0, 99]),
            "ST: nanoleaf_aurora:light\r\nLocation: http://\r\n\r\n",
        );
        assert!(LeafRules.parse_broadcast(&packet).is_none());
    }

    #[test]
    fn forbidden_pairing_waits_for_user() {
        assert_eq!(LeafRules.read_credentials(&reply(403, "")), CredentialReply::AwaitingUser);
        assert_eq!(
            LeafRules.read_credentials(&reply(200, r#"{"auth_token":"tok"}"#)),
            CredentialReply::Token("tok".into())
        );
    }

    #[test]
    fn info_reply_verifies() {
        let body = r#"{"name":"Light Panels 55:4f:cc","serialNo":"S16332A3407","manufacturer":"Nanoleaf","firmwareVersion":"3.1.5","model":"NL22"}"#;
        let ConnectionReply::Verified(identity) = LeafRules.read_connection(&reply(200, body)) else {
            panic!("expected verified");
        };
        assert_eq!(identity.serial, "S16332A3407");
        assert_eq!(identity.model, "NL22");
        assert!(identity.lights.is_none());

        assert_eq!(LeafRules.read_connection(&reply(401, "")), ConnectionReply::Unauthorized);
        assert!(matches!(
            LeafRules.read_connection(&reply(200, "{}")),
            ConnectionReply::Unrecognized(_)
        ));
    }
}
