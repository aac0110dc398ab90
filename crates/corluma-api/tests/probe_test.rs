#![allow(clippy::unwrap_used)]
// Integration tests for `HttpProbe` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use corluma_api::models::{HueResult, HueUsername, LeafAuthReply, LeafInfo, NupnpEntry};
use corluma_api::{
    normalize_host, Error, HttpProbe, ProbeKind, ProbeOutcome, ProbeRequest, ProtocolFamily,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpProbe, String, u16) {
    let server = MockServer::start().await;
    let nupnp = Url::parse(&format!("{}/api/nupnp", server.uri())).unwrap();
    let probe = HttpProbe::with_client(reqwest::Client::new(), nupnp, "Corluma");
    let (host, port) = normalize_host(&server.uri());
    (server, probe, host, port.unwrap())
}

fn response(outcome: ProbeOutcome) -> corluma_api::ProbeResponse {
    match outcome {
        ProbeOutcome::Response(r) => r,
        ProbeOutcome::Failed { error, .. } => panic!("expected a response, got {error:?}"),
    }
}

// ── Hue ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hue_pairing_posts_device_type() {
    let (server, probe, host, port) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_json(json!({ "devicetype": "Corluma#corluma device" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "success": { "username": "83b7780291a6ceffbe0bd049104df" } }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let req = ProbeRequest::request_credentials(ProtocolFamily::Hue, &host, port);
    let resp = response(probe.execute(req.clone()).await);

    assert!(resp.is_success());
    assert_eq!(resp.request, req);
    let results: Vec<HueResult> = resp.decode().unwrap();
    let HueResult::Success(value) = &results[0] else {
        panic!("expected success");
    };
    let user: HueUsername = serde_json::from_value(value.clone()).unwrap();
    assert_eq!(user.username, "83b7780291a6ceffbe0bd049104df");
}

#[tokio::test]
async fn test_hue_full_state_uses_username_path() {
    let (server, probe, host, port) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/secret-user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "config": { "name": "Philips hue", "apiversion": "1.41.0", "mac": "00:17:88:23:bf:c2", "bridgeid": "001788FFFE23BFC2" },
            "lights": {}
        })))
        .mount(&server)
        .await;

    let req = ProbeRequest::test_connection(ProtocolFamily::Hue, &host, port, "secret-user");
    let resp = response(probe.execute(req).await);

    assert_eq!(resp.status, 200);
    assert!(resp.url.path().ends_with("/api/secret-user"));
    assert!(resp.body.contains("bridgeid"));
}

#[tokio::test]
async fn test_directory_probe_hits_configured_url() {
    let (server, probe, _, _) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/nupnp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "001788fffe23bfc2", "internalipaddress": "192.168.1.20" }
        ])))
        .mount(&server)
        .await;

    let req = ProbeRequest::directory(ProtocolFamily::Hue);
    assert_eq!(probe.url_for(&req).unwrap(), *probe.nupnp_url());
    let resp = response(probe.execute(req).await);
    let entries: Vec<NupnpEntry> = resp.decode().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].internalipaddress, "192.168.1.20");
}

// ── Nanoleaf ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_nanoleaf_pairing_forbidden_is_a_response() {
    let (server, probe, host, port) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let req = ProbeRequest::request_credentials(ProtocolFamily::Nanoleaf, &host, port);
    let resp = response(probe.execute(req).await);
    assert_eq!(resp.status, 403);
    assert!(!resp.is_success());
}

#[tokio::test]
async fn test_nanoleaf_pairing_and_info() {
    let (server, probe, host, port) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth_token": "tok123" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tok123/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Light Panels 55:4f:cc",
            "serialNo": "S16332A3407",
            "manufacturer": "Nanoleaf",
            "firmwareVersion": "3.1.5",
            "model": "NL22"
        })))
        .mount(&server)
        .await;

    let pair = response(
        probe
            .execute(ProbeRequest::request_credentials(ProtocolFamily::Nanoleaf, &host, port))
            .await,
    );
    let auth: LeafAuthReply = pair.decode().unwrap();
    assert_eq!(auth.auth_token, "tok123");

    let req = ProbeRequest::test_connection(ProtocolFamily::Nanoleaf, &host, port, &auth.auth_token);
    assert_eq!(req.kind, ProbeKind::TestConnection);
    let info: LeafInfo = response(probe.execute(req).await).decode().unwrap();
    assert_eq!(info.serial_no, "S16332A3407");
    assert_eq!(info.firmware_version, "3.1.5");
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_malformed_body_fails_to_decode() {
    let (server, probe, host, port) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tok/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let req = ProbeRequest::test_connection(ProtocolFamily::Nanoleaf, &host, port, "tok");
    let resp = response(probe.execute(req).await);
    let result = resp.decode::<LeafInfo>();
    assert!(
        matches!(result, Err(Error::Deserialization { ref body, .. }) if body == "{not json"),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_unreachable_host_is_a_failure() {
    let probe = HttpProbe::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9/api/nupnp").unwrap(),
        "Corluma",
    );
    // Port 9 (discard) is closed on test machines; connection is refused.
    let req = ProbeRequest::request_credentials(ProtocolFamily::Hue, "127.0.0.1", 9);
    match probe.execute(req.clone()).await {
        ProbeOutcome::Failed { request, error } => {
            assert_eq!(request, req);
            assert!(error.is_transient(), "expected transient error, got {error:?}");
        }
        ProbeOutcome::Response(r) => panic!("unexpected response: {r:?}"),
    }
}
