use fieldsync_sync::{
    parse_content_map, ContentApi, FieldChange, HttpContentApi, RemoteConfig, SyncError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> RemoteConfig {
    RemoteConfig {
        content_endpoint: format!("{}/content", server.uri()),
        save_endpoint: format!("{}/save", server.uri()),
        api_token: Some("service-token".to_string()),
    }
}

// ── Construction ────────────────────────────────────────────────

#[test]
fn requires_content_endpoint() {
    let result = HttpContentApi::new(RemoteConfig::default());
    assert!(matches!(result, Err(SyncError::Config(_))));
}

// ── Content map parsing ─────────────────────────────────────────

#[test]
fn parse_stringifies_scalars_and_skips_the_rest() {
    let map = parse_content_map(json!({
        "hero_title": "Hello",
        "count": 3,
        "enabled": true,
        "gone": null,
        "nested": { "x": 1 },
        "list": [1, 2]
    }))
    .unwrap();

    assert_eq!(map.len(), 3);
    assert_eq!(map["hero_title"], "Hello");
    assert_eq!(map["count"], "3");
    assert_eq!(map["enabled"], "true");
}

#[test]
fn parse_rejects_non_object() {
    assert!(matches!(
        parse_content_map(json!(["a"])),
        Err(SyncError::Malformed(_))
    ));
}

// ── Fetch ───────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_returns_content_map() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content"))
        .and(header("Cache-Control", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hero_title": "Hello",
            "hero_subtitle": "World"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpContentApi::new(config_for(&server)).unwrap();
    let content = api.fetch_content().await.unwrap();

    assert_eq!(content["hero_title"], "Hello");
    assert_eq!(content["hero_subtitle"], "World");
}

#[tokio::test]
async fn fetch_maps_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let api = HttpContentApi::new(config_for(&server)).unwrap();
    let err = api.fetch_content().await.unwrap_err();
    assert!(matches!(err, SyncError::Status { status: 502 }));
}

#[tokio::test]
async fn fetch_rejects_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let api = HttpContentApi::new(config_for(&server)).unwrap();
    assert!(matches!(
        api.fetch_content().await,
        Err(SyncError::Malformed(_))
    ));
}

#[tokio::test]
async fn fetch_reports_network_error() {
    let api = HttpContentApi::new(RemoteConfig {
        content_endpoint: "http://127.0.0.1:1/content".to_string(),
        ..Default::default()
    })
    .unwrap();
    assert!(matches!(
        api.fetch_content().await,
        Err(SyncError::Network(_))
    ));
}

// ── Save ────────────────────────────────────────────────────────

#[tokio::test]
async fn save_posts_changes_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/save"))
        .and(header("Authorization", "Bearer service-token"))
        .and(body_json(json!({
            "changes": [{ "field_name": "hero_title", "field_value": "Hello" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpContentApi::new(config_for(&server)).unwrap();
    let response = api
        .save_changes(&[FieldChange::new("hero_title", "Hello")])
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.message, None);
}

#[tokio::test]
async fn save_surfaces_rejection_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/save"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": false, "message": "locked" })),
        )
        .mount(&server)
        .await;

    let api = HttpContentApi::new(config_for(&server)).unwrap();
    let response = api.save_changes(&[FieldChange::new("a", "b")]).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("locked"));
}

#[tokio::test]
async fn save_maps_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/save"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let api = HttpContentApi::new(config_for(&server)).unwrap();
    let err = api.save_changes(&[FieldChange::new("a", "b")]).await.unwrap_err();
    assert!(matches!(err, SyncError::Status { status: 500 }));
}

#[tokio::test]
async fn save_without_endpoint_is_config_error() {
    let server = MockServer::start().await;
    let api = HttpContentApi::new(RemoteConfig {
        save_endpoint: String::new(),
        ..config_for(&server)
    })
    .unwrap();
    let err = api.save_changes(&[]).await.unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}
