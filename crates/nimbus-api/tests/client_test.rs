// Integration tests for `NimbusClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nimbus_api::{
    Error, EventMode, EventStream, NimbusClient, PairingRequest, RequestExecutor, RetryPolicy,
};

// ── Helpers ─────────────────────────────────────────────────────────

const SERIAL: &str = "ABC123";

fn no_wait(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
    }
}

async fn setup_with(retry: RetryPolicy) -> (MockServer, NimbusClient) {
    let server = MockServer::start().await;
    let executor = RequestExecutor::with_client(reqwest::Client::new(), retry);
    let client = NimbusClient::with_executor(
        Url::parse(&server.uri()).unwrap(),
        SecretString::from("pairing-secret".to_string()),
        executor,
    )
    .unwrap();
    (server, client)
}

async fn setup() -> (MockServer, NimbusClient) {
    setup_with(no_wait(1)).await
}

async fn mount_token(server: &MockServer, expires_in: i64, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v0/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=pairing-secret"))
        .and(body_string_contains("client_id=app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "bearer",
            "expires_in": expires_in
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn snapshot_body() -> serde_json::Value {
    json!({
        "isOnline": true,
        "timeSinceLastContact": "00:00:04.1234",
        "lastStatusUpdate": "2025-03-07T16:35:07.3687629+00:00",
        "lastKnownState": {
            "UserAirconSettings": { "isOn": true, "Mode": "COOL" }
        }
    })
}

// ── Token lifecycle ─────────────────────────────────────────────────

#[tokio::test]
async fn test_token_reused_while_valid() {
    let (server, client) = setup().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/status/latest"))
        .and(query_param("serial", SERIAL))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
        .expect(3)
        .mount(&server)
        .await;

    for _ in 0..3 {
        let snapshot = client.get_snapshot(SERIAL).await.unwrap();
        assert!(snapshot.is_online);
        assert_eq!(snapshot.last_known_state["UserAirconSettings"]["Mode"], "COOL");
    }
    assert!(client.tokens().expires_at().await.is_some());
}

#[tokio::test]
async fn test_token_inside_leeway_refreshed_every_call() {
    let (server, client) = setup().await;
    // Expires in 30s: already inside the 60s leeway when issued.
    mount_token(&server, 30, 2).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/status/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
        .expect(2)
        .mount(&server)
        .await;

    client.get_snapshot(SERIAL).await.unwrap();
    client.get_snapshot(SERIAL).await.unwrap();
}

#[tokio::test]
async fn test_token_refresh_failure_is_authentication_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v0/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let err = client.get_snapshot(SERIAL).await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "got: {err:?}");
    assert!(client.tokens().expires_at().await.is_none());
}

#[tokio::test]
async fn test_token_missing_field_is_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v0/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "expires_in": 3600 })))
        .mount(&server)
        .await;

    let err = client.list_systems().await.unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_token_lifetime_out_of_range_is_rejected() {
    let (server, client) = setup().await;
    mount_token(&server, i64::MAX, 1).await;

    let err = client.get_snapshot(SERIAL).await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "got: {err:?}");
    assert!(client.tokens().expires_at().await.is_none());
}

#[tokio::test]
async fn test_negative_token_lifetime_is_rejected() {
    let (server, client) = setup().await;
    mount_token(&server, -5, 1).await;

    let err = client.list_systems().await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "got: {err:?}");
}

// ── Serialization ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_calls_are_serialized() {
    let (server, client) = setup().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/status/latest"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(snapshot_body())
                .set_delay(Duration::from_millis(300)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let started = Instant::now();
    let (first, second) = tokio::join!(client.get_snapshot(SERIAL), client.get_snapshot(SERIAL));
    let elapsed = started.elapsed();

    first.unwrap();
    second.unwrap();
    assert!(
        elapsed >= Duration::from_millis(600),
        "two calls overlapped: finished in {elapsed:?}"
    );
}

#[tokio::test]
async fn test_unauthorized_response_forces_refresh() {
    let (server, client) = setup().await;
    mount_token(&server, 3600, 2).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/status/latest"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/status/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
        .mount(&server)
        .await;

    let err = client.get_snapshot(SERIAL).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    client.get_snapshot(SERIAL).await.unwrap();
}

// ── Retry behaviour ─────────────────────────────────────────────────

#[tokio::test]
async fn test_bad_request_not_retried() {
    let (server, client) = setup_with(no_wait(3)).await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/status/latest"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad serial"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.get_snapshot(SERIAL).await.unwrap_err();
    match err {
        Error::Status { status, body, .. } => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad serial");
        }
        other => panic!("expected Status error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_retried_until_exhausted() {
    let (server, client) = setup_with(no_wait(3)).await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/status/latest"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client.get_snapshot(SERIAL).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_transient_failure_recovers() {
    let (server, client) = setup_with(no_wait(3)).await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/status/latest"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/status/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = client.get_snapshot(SERIAL).await.unwrap();
    assert_eq!(snapshot.last_status_update, "2025-03-07T16:35:07.3687629+00:00");
}

// ── Systems ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_systems() {
    let (server, client) = setup().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems"))
        .and(query_param("includeNeo", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {
                "ac-system": [
                    { "serial": "ABC123", "description": "Upstairs", "type": "aSystem" },
                    { "serial": "XYZ789" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let systems = client.list_systems().await.unwrap();
    assert_eq!(systems.len(), 2);
    assert_eq!(systems[0].serial, "ABC123");
    assert_eq!(systems[1].description, None);
}

// ── Events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_newer_events_carry_cursor() {
    let (server, client) = setup().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/events/newer"))
        .and(query_param("serial", SERIAL))
        .and(query_param("newerThanEventId", "evt-41"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                {
                    "id": "evt-42",
                    "timestamp": "2025-03-07T16:36:00.1+00:00",
                    "type": "status-change-broadcast",
                    "data": { "UserAirconSettings.isOn": false }
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client
        .get_events(SERIAL, EventMode::Newer, Some("evt-41"))
        .await
        .unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].kind, "status-change-broadcast");
    assert_eq!(page.events[0].data["UserAirconSettings.isOn"], false);
}

#[tokio::test]
async fn test_cursor_required_for_relative_queries() {
    let (_server, client) = setup().await;

    let err = client
        .get_events(SERIAL, EventMode::Older, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)), "got: {err:?}");
}

#[tokio::test]
async fn test_event_stream_follows_cursor() {
    let (server, client) = setup().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/events/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                { "id": "e2", "timestamp": "2025-03-07T16:35:08.0+00:00", "type": "status-change-broadcast", "data": {} },
                { "id": "e1", "timestamp": "2025-03-07T16:35:07.0+00:00", "type": "full-status-broadcast", "data": {} }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/client/ac-systems/events/newer"))
        .and(query_param("newerThanEventId", "e2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                { "id": "e3", "timestamp": "2025-03-07T16:35:09.0+00:00", "type": "status-change-broadcast", "data": {} }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut stream = EventStream::new(&client, SERIAL);
    let first: Vec<_> = stream.next_batch().await.unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(first, vec!["e1", "e2"]);
    assert_eq!(stream.cursor(), Some("e2"));

    let second: Vec<_> = stream.next_batch().await.unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(second, vec!["e3"]);
    assert_eq!(stream.cursor(), Some("e3"));
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fan_mode_command_body() {
    let (server, client) = setup().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("POST"))
        .and(path("/api/v0/client/ac-systems/cmds/send"))
        .and(query_param("serial", SERIAL))
        .and(body_json(json!({
            "command": {
                "type": "set-settings",
                "UserAirconSettings.FanMode": "HIGH+CONT"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "correlationId": "c-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.set_fan_mode(SERIAL, "HIGH", true).await.unwrap();
    assert_eq!(resp["correlationId"], "c-1");
}

#[tokio::test]
async fn test_command_with_empty_response_body() {
    let (server, client) = setup().await;
    mount_token(&server, 3600, 1).await;

    Mock::given(method("POST"))
        .and(path("/api/v0/client/ac-systems/cmds/send"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let resp = client.turn_off(SERIAL).await.unwrap();
    assert!(resp.is_null());
}

// ── Pairing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pairing_is_unauthenticated() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v0/client/user-devices"))
        .and(body_string_contains("username=user%40example.com"))
        .and(body_string_contains("deviceName=nimbus-cli"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pairingToken": "long-lived"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = client
        .request_pairing_token(&PairingRequest {
            username: "user@example.com".into(),
            password: SecretString::from("hunter2".to_string()),
            client: "ios".into(),
            device_name: "nimbus-cli".into(),
            device_unique_id: "dev-1".into(),
        })
        .await
        .unwrap();
    assert_eq!(token.expose_secret(), "long-lived");
}
