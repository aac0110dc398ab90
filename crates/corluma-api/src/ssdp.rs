//! SSDP broadcast listener.
//!
//! Binds the SSDP multicast group and publishes every datagram it hears
//! through a [`PacketBus`] ([`tokio::sync::broadcast`] underneath). While
//! at least one discovery engine is subscribed, an `M-SEARCH` is sent on
//! a fixed interval so devices answer even if their periodic `NOTIFY`
//! announcements are far apart.
//!
//! Payloads are semi-structured text. [`SsdpPacket::header`] does a plain
//! line scan; there is no attempt at a full HTTP-over-UDP parser.
//!
//! # Example
//!
//! ```rust,ignore
//! use corluma_api::{PacketBus, SsdpConfig, SsdpListener};
//! use tokio_util::sync::CancellationToken;
//!
//! let bus = PacketBus::new();
//! let cancel = CancellationToken::new();
//! let _listener = SsdpListener::bind(SsdpConfig::default(), bus.clone(), cancel.clone()).await?;
//!
//! let mut rx = bus.subscribe();
//! while let Ok(packet) = rx.recv().await {
//!     if packet.contains("IpBridge") {
//!         println!("hue bridge at {}", packet.sender);
//!     }
//! }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// SSDP multicast group.
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
/// SSDP well-known port.
pub const SSDP_PORT: u16 = 1900;

const PACKET_CHANNEL_CAPACITY: usize = 256;
const MAX_DATAGRAM: usize = 2048;

// ── SsdpPacket ───────────────────────────────────────────────────────

/// One received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpPacket {
    pub sender: IpAddr,
    pub payload: String,
}

impl SsdpPacket {
    pub fn new(sender: IpAddr, payload: impl Into<String>) -> Self {
        Self {
            sender,
            payload: payload.into(),
        }
    }

    /// Whether the payload mentions `marker` anywhere.
    pub fn contains(&self, marker: &str) -> bool {
        self.payload.contains(marker)
    }

    /// Value of the first header line named `name` (case-insensitive).
    ///
    /// Lines are split on CR/LF and the value is everything after the
    /// first colon, trimmed.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .split(['\r', '\n'])
            .filter(|line| !line.is_empty())
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| value.trim())
            })
    }
}

// ── PacketBus ────────────────────────────────────────────────────────

/// Fan-out channel between the listener and discovery engines.
///
/// Engines subscribe while running and drop their receiver when they
/// stop; the listener only searches actively while someone is listening.
#[derive(Debug, Clone)]
pub struct PacketBus {
    tx: broadcast::Sender<Arc<SsdpPacket>>,
}

impl Default for PacketBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(PACKET_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Get a new receiver for the packet stream.
    ///
    /// A receiver that falls behind gets
    /// [`broadcast::error::RecvError::Lagged`] and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SsdpPacket>> {
        self.tx.subscribe()
    }

    /// Publish a packet to all current subscribers. Dropped silently if
    /// nobody is listening.
    pub fn publish(&self, packet: SsdpPacket) {
        let _ = self.tx.send(Arc::new(packet));
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ── SsdpConfig ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// Local port to bind; falls back to an ephemeral port if taken.
    pub bind_port: u16,
    /// How often to send `M-SEARCH` while subscribed.
    pub search_interval: Duration,
    /// `ST:` header of the search request.
    pub search_target: String,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            bind_port: SSDP_PORT,
            search_interval: Duration::from_secs(10),
            search_target: "ssdp:all".into(),
        }
    }
}

// ── SsdpListener ─────────────────────────────────────────────────────

/// Handle to the background listener task.
pub struct SsdpListener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl SsdpListener {
    /// Bind the socket, join the multicast group and spawn the listen loop.
    ///
    /// Returns immediately; the loop runs until `cancel` fires.
    pub async fn bind(
        config: SsdpConfig,
        bus: PacketBus,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let socket = bind_socket(config.bind_port).await?;
        if let Err(e) = socket.join_multicast_v4(SSDP_MULTICAST_ADDR, Ipv4Addr::UNSPECIFIED) {
            tracing::warn!(error = %e, "could not join SSDP multicast group, relying on M-SEARCH replies");
        }
        let local_addr = socket.local_addr()?;
        tracing::info!(%local_addr, "SSDP listener bound");

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            listen_loop(socket, bus, config, task_cancel).await;
        });

        Ok(Self { local_addr, cancel })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn bind_socket(port: u16) -> Result<UdpSocket, Error> {
    match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await {
        Ok(socket) => Ok(socket),
        Err(e) if port != 0 => {
            tracing::warn!(port, error = %e, "SSDP port unavailable, using an ephemeral port");
            Ok(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?)
        }
        Err(e) => Err(Error::Io(e)),
    }
}

fn m_search(target: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST_ADDR}:{SSDP_PORT}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 2\r\n\
         ST: {target}\r\n\r\n"
    )
}

// ── Background loop ──────────────────────────────────────────────────

async fn listen_loop(
    socket: UdpSocket,
    bus: PacketBus,
    config: SsdpConfig,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut search = tokio::time::interval(config.search_interval);
    search.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let group = SocketAddr::from((SSDP_MULTICAST_ADDR, SSDP_PORT));
    let request = m_search(&config.search_target);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = search.tick() => {
                if bus.subscriber_count() > 0 {
                    if let Err(e) = socket.send_to(request.as_bytes(), group).await {
                        tracing::debug!(error = %e, "M-SEARCH send failed");
                    }
                }
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => {
                    let payload = String::from_utf8_lossy(&buf[..len]).into_owned();
                    tracing::trace!(sender = %from, len, "SSDP datagram");
                    bus.publish(SsdpPacket::new(from.ip(), payload));
                }
                Err(e) => tracing::warn!(error = %e, "SSDP receive failed"),
            }
        }
    }

    tracing::debug!("SSDP loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUE_NOTIFY: &str = "NOTIFY * HTTP/1.1\r\n\
        HOST: 239.255.255.250:1900\r\n\
        CACHE-CONTROL: max-age=100\r\n\
        LOCATION: http://192.168.1.20:80/description.xml\r\n\
        SERVER: Linux/3.14.0 UPnP/1.0 IpBridge/1.41.0\r\n\
        hue-bridgeid: 001788FFFE23BFC2\r\n\r\n";

    #[test]
    fn header_lookup_is_case_insensitive() {
        let packet = SsdpPacket::new(IpAddr::from([192, 168, 1, 20]), HUE_NOTIFY);
        assert!(packet.contains("IpBridge"));
        assert_eq!(packet.header("HUE-BRIDGEID"), Some("001788FFFE23BFC2"));
        assert_eq!(
            packet.header("location"),
            Some("http://192.168.1.20:80/description.xml")
        );
        assert_eq!(packet.header("nl-devicename"), None);
    }

    #[test]
    fn m_search_is_well_formed() {
        let msg = m_search("ssdp:all");
        assert!(msg.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(msg.contains("ST: ssdp:all\r\n"));
        assert!(msg.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let bus = PacketBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(SsdpPacket::new(IpAddr::from([10, 0, 0, 1]), "dropped"));

        let mut rx = bus.subscribe();
        bus.publish(SsdpPacket::new(IpAddr::from([10, 0, 0, 2]), "hello"));
        let packet = rx.recv().await.expect("packet");
        assert_eq!(packet.payload, "hello");
    }

    #[tokio::test]
    async fn listener_publishes_received_datagrams() {
        let bus = PacketBus::new();
        let cancel = CancellationToken::new();
        let config = SsdpConfig {
            bind_port: 0,
            ..SsdpConfig::default()
        };
        let listener = SsdpListener::bind(config, bus.clone(), cancel.clone())
            .await
            .expect("bind");
        let mut rx = bus.subscribe();

        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, listener.local_addr().port()));
        let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.expect("sender");
        sender.send_to(HUE_NOTIFY.as_bytes(), target).await.expect("send");

        let packet = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let p = rx.recv().await.expect("recv");
                if p.contains("IpBridge") {
                    return p;
                }
            }
        })
        .await
        .expect("timed out");
        assert_eq!(packet.sender, IpAddr::from(Ipv4Addr::LOCALHOST));
        listener.shutdown();
    }
}
