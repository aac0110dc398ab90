#![allow(clippy::unwrap_used)]
// Integration tests for `DiscoveryHandle`: the async driver wired to a
// wiremock device and an in-memory packet bus.

use std::net::IpAddr;
use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use corluma_api::{normalize_host, HttpProbe, PacketBus, SsdpPacket};
use corluma_core::{Bucket, CoreError, DiscoveryConfig, DiscoveryHandle, DiscoveryState, ProtocolFamily};

// ── Helpers ─────────────────────────────────────────────────────────

fn probe() -> HttpProbe {
    HttpProbe::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9/api/nupnp").unwrap(),
        "Corluma",
    )
}

fn config(family: ProtocolFamily, dir: &tempfile::TempDir) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::new(
        family,
        DiscoveryConfig::default_save_path(family, dir.path()),
    );
    config.tick_interval = Duration::from_millis(50);
    config
}

async fn wait_for_state(handle: &DiscoveryHandle, wanted: DiscoveryState) {
    let mut rx = handle.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {wanted}, last {}", handle.state()))
        .unwrap();
}

// ── Pairing end to end ──────────────────────────────────────────────

#[tokio::test]
async fn test_manual_nanoleaf_is_paired_and_saved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth_token": "tok" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tok/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Light Panels 55:4f:cc",
            "serialNo": "S16332A3407",
            "model": "NL22"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(ProtocolFamily::Nanoleaf, &dir);
    cfg.manual_ips.push(server.uri());
    let handle = DiscoveryHandle::spawn(cfg, probe(), PacketBus::new(), false);
    assert_eq!(handle.state(), DiscoveryState::LookingForPrevious);

    wait_for_state(&handle, DiscoveryState::AllConnected).await;

    let snapshot = handle.snapshot().await.unwrap();
    let (host, port) = normalize_host(&server.uri());
    assert_eq!(snapshot.found.len(), 1);
    assert_eq!(snapshot.found[0].serial(), "S16332A3407");
    assert_eq!(snapshot.found[0].ip, host);
    assert_eq!(Some(snapshot.found[0].port), port);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("nanoleaf.json")).unwrap())
            .unwrap();
    assert_eq!(saved[0]["serial"], "S16332A3407");
    assert_eq!(saved[0]["auth"], "tok");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_forbidden_pairing_keeps_looking() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let handle = DiscoveryHandle::spawn(
        config(ProtocolFamily::Nanoleaf, &dir),
        probe(),
        PacketBus::new(),
        false,
    );
    assert!(handle.add_manual_ip(&server.uri()).await.unwrap());
    assert!(!handle.add_manual_ip(&server.uri()).await.unwrap());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, DiscoveryState::LookingForPrevious);
    assert_eq!(snapshot.not_found.len(), 1);
    assert!(snapshot.not_found[0].ip_verified);

    handle.shutdown().await;
}

// ── Broadcasts ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_broadcast_packet_adds_unknown_bridge() {
    let dir = tempfile::tempdir().unwrap();
    let bus = PacketBus::new();
    let handle = DiscoveryHandle::spawn(config(ProtocolFamily::Hue, &dir), probe(), bus.clone(), false);

    // Wait until the task has subscribed.
    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    bus.publish(SsdpPacket::new(
        IpAddr::from([192, 0, 2, 20]),
        "HTTP/1.1 200 OK\r\nSERVER: Linux/3.14.0 UPnP/1.0 IpBridge/1.41.0\r\nhue-bridgeid: 001788FFFE23BFC2\r\n\r\n",
    ));
    wait_for_state(&handle, DiscoveryState::UnknownFound).await;

    let snapshot = handle.snapshot().await.unwrap();
    let (bucket, record) = snapshot.records().next().unwrap();
    assert_eq!(bucket, Bucket::Unknown);
    assert_eq!(record.ip, "192.0.2.20");
    assert_eq!(record.serial(), "001788fffe23bfc2");
    assert_eq!(record.display_name, "Bridge 1");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_listener_failure_reports_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let handle = DiscoveryHandle::spawn(
        config(ProtocolFamily::Nanoleaf, &dir),
        probe(),
        PacketBus::new(),
        true,
    );
    assert_eq!(handle.state(), DiscoveryState::ConnectionError);
    handle.add_manual_ip("192.0.2.7").await.unwrap();
    wait_for_state(&handle, DiscoveryState::LookingForPrevious).await;
    handle.shutdown().await;
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_stop_is_deferred_until_grace_ends() {
    let dir = tempfile::tempdir().unwrap();
    let handle = DiscoveryHandle::spawn(
        config(ProtocolFamily::Nanoleaf, &dir),
        probe(),
        PacketBus::new(),
        false,
    );

    handle.stop().await.unwrap();
    assert!(handle.snapshot().await.unwrap().running);

    tokio::time::sleep(Duration::from_secs(121)).await;
    assert!(!handle.snapshot().await.unwrap().running);

    handle.start().await.unwrap();
    assert!(handle.snapshot().await.unwrap().running);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_keeps_running_after_grace() {
    let dir = tempfile::tempdir().unwrap();
    let handle = DiscoveryHandle::spawn(
        config(ProtocolFamily::Nanoleaf, &dir),
        probe(),
        PacketBus::new(),
        false,
    );
    handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(121)).await;
    assert!(handle.snapshot().await.unwrap().running);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_remove_and_rename_after_shutdown_fail() {
    let dir = tempfile::tempdir().unwrap();
    let handle = DiscoveryHandle::spawn(
        config(ProtocolFamily::Hue, &dir),
        probe(),
        PacketBus::new(),
        false,
    );
    handle.add_manual_ip("192.0.2.30").await.unwrap();
    assert!(handle.rename("192.0.2.30", "Upstairs").await.unwrap());
    assert!(matches!(
        handle.remove("192.0.2.99").await,
        Err(CoreError::DeviceNotFound { .. })
    ));
    let removed = handle.remove("192.0.2.30").await.unwrap();
    assert_eq!(removed.display_name, "Upstairs");

    handle.shutdown().await;
    assert!(matches!(
        handle.snapshot().await,
        Err(CoreError::ServiceStopped)
    ));
}
