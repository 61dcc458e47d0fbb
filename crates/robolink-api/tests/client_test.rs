// Integration tests for `DeviceClient` using wiremock.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use robolink_api::{CommandRequest, DeviceClient, Error, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DeviceClient) {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();
    let client = DeviceClient::new(base, &TransportConfig::with_timeout(Duration::from_secs(2)))
        .unwrap();
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_move_command() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/move/forward"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "Moving forward" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let env = client
        .execute(&CommandRequest::get("/move/forward"))
        .await
        .unwrap();

    assert!(env.success);
    assert_eq!(env.status, 200);
    assert_eq!(env.message.as_deref(), Some("Moving forward"));
    assert_eq!(env.data, Some(json!({ "status": "Moving forward" })));
}

#[tokio::test]
async fn test_post_command_sends_params_as_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/commands/set_suction"))
        .and(body_json(json!({ "level": "max" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "data": { "level": "max" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let env = client
        .execute(&CommandRequest::post(
            "/commands/set_suction",
            json!({ "level": "max" }),
        ))
        .await
        .unwrap();

    assert!(env.success);
    assert_eq!(env.data, Some(json!({ "level": "max" })));
}

#[tokio::test]
async fn test_probe_hits_root() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "message": "Robot control API running" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let env = client.probe().await.unwrap();
    assert!(env.success);
    assert_eq!(env.message.as_deref(), Some("Robot control API running"));
}

#[tokio::test]
async fn test_base_path_is_preserved() {
    let server = MockServer::start().await;
    let base = Url::parse(&format!("{}/robot", server.uri())).unwrap();
    let client = DeviceClient::with_client(reqwest::Client::new(), base, Duration::from_secs(2));

    Mock::given(method("GET"))
        .and(path("/robot/toggle/vacuum"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "vacuum toggled" })))
        .expect(1)
        .mount(&server)
        .await;

    let env = client
        .execute(&CommandRequest::get("/toggle/vacuum"))
        .await
        .unwrap();
    assert!(env.success);
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_rejection_is_not_an_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/move/sideways"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid direction" })),
        )
        .mount(&server)
        .await;

    let env = client
        .execute(&CommandRequest::get("/move/sideways"))
        .await
        .unwrap();

    assert!(!env.success);
    assert_eq!(env.status, 400);
    assert_eq!(env.message.as_deref(), Some("Invalid direction"));
}

#[tokio::test]
async fn test_plain_text_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    let env = client.execute(&CommandRequest::get("/status")).await.unwrap();
    assert!(env.success);
    assert_eq!(env.data, None);
}

#[tokio::test]
async fn test_request_deadline() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let err = client
        .execute(&CommandRequest::get("/status").with_timeout(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::Timeout { timeout_ms: 50 }),
        "expected Timeout, got: {err:?}"
    );
    assert!(err.is_transient());
    assert!(err.is_unreachable());
}

#[tokio::test]
async fn test_unreachable_device() {
    // Bind-then-drop to get a port nothing is listening on.
    let server = MockServer::builder().start().await;
    let base = Url::parse(&server.uri()).unwrap();
    drop(server);

    let client = DeviceClient::new(base, &TransportConfig::with_timeout(Duration::from_secs(2)))
        .unwrap();
    let err = client.probe().await.unwrap_err();

    assert!(err.is_unreachable(), "expected unreachable, got: {err:?}");
}
