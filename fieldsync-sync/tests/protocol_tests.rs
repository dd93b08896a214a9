use fieldsync_sync::{
    BridgeConfig, Envelope, FieldChange, InboundMessage, OutboundMessage, ProtocolError,
    DEFAULT_HANDSHAKE_SCHEDULE_MS,
};
use fieldsync_types::BatchId;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

// ── Inbound parsing ─────────────────────────────────────────────

#[test]
fn parses_unit_messages() {
    for (kind, expected) in [
        ("connection-test", InboundMessage::ConnectionTest),
        ("enable-editing", InboundMessage::EnableEditing),
        ("disable-editing", InboundMessage::DisableEditing),
        ("refresh-content", InboundMessage::RefreshContent),
    ] {
        let parsed = InboundMessage::from_value(json!({ "type": kind })).unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.kind(), kind);
    }
}

#[test]
fn parses_content_changed() {
    let msg = InboundMessage::from_json(
        r#"{"type":"content-changed","field":"hero_title","value":"Draft"}"#,
    )
    .unwrap();
    assert_eq!(
        msg,
        InboundMessage::ContentChanged {
            field: "hero_title".to_string(),
            value: "Draft".to_string(),
        }
    );
}

#[test]
fn parses_apply_saved_changes() {
    let msg = InboundMessage::from_value(json!({
        "type": "apply-saved-changes",
        "savedChanges": [
            { "field_name": "hero_title", "field_value": "Hello" },
            { "field_name": "cta_label", "field_value": "Go" }
        ]
    }))
    .unwrap();

    assert_eq!(
        msg,
        InboundMessage::ApplySavedChanges {
            saved_changes: vec![
                FieldChange::new("hero_title", "Hello"),
                FieldChange::new("cta_label", "Go"),
            ],
        }
    );
}

#[test]
fn rejects_unknown_type() {
    let err = InboundMessage::from_value(json!({ "type": "delete-everything" })).unwrap_err();
    assert_eq!(err, ProtocolError::UnknownType("delete-everything".to_string()));
}

#[test]
fn rejects_missing_type() {
    let err = InboundMessage::from_value(json!({ "field": "a" })).unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn rejects_non_string_type() {
    let err = InboundMessage::from_value(json!({ "type": 7 })).unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn rejects_missing_payload() {
    let err = InboundMessage::from_value(json!({ "type": "content-changed", "field": "a" }))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn rejects_blank_field_key() {
    let err = InboundMessage::from_value(json!({
        "type": "apply-saved-changes",
        "savedChanges": [{ "field_name": "  ", "field_value": "x" }]
    }))
    .unwrap_err();
    assert_eq!(err, ProtocolError::InvalidField("  ".to_string()));
}

#[test]
fn rejects_invalid_json() {
    assert!(matches!(
        InboundMessage::from_json("{not json"),
        Err(ProtocolError::Malformed(_))
    ));
}

// ── Outbound encoding ───────────────────────────────────────────

#[test]
fn iframe_ready_wire_shape() {
    let msg = OutboundMessage::iframe_ready(&["content-sync".to_string()]);
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "iframe-ready");
    assert_eq!(value["capabilities"], json!(["content-sync"]));
    assert!(value["timestamp"].as_u64().unwrap() > 0);
}

#[test]
fn content_saved_uses_camel_case_batch_id() {
    let batch_id = BatchId::new();
    let msg = OutboundMessage::ContentSaved {
        fields: vec!["hero_title".to_string()],
        success: true,
        batch_id: Some(batch_id),
    };
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "content-saved");
    assert_eq!(value["batchId"], json!(batch_id.to_string()));
    assert_eq!(value["success"], true);
}

#[test]
fn error_omits_missing_details() {
    let value = serde_json::to_value(OutboundMessage::error("boom", None)).unwrap();
    assert_eq!(value, json!({ "type": "error", "message": "boom" }));
}

#[test]
fn outbound_kinds() {
    assert_eq!(OutboundMessage::connection_ok(&[]).kind(), "connection-ok");
    assert_eq!(OutboundMessage::error("x", None).kind(), "error");
}

#[test]
fn envelope_deserializes() {
    let envelope: Envelope = serde_json::from_str(
        r#"{"origin":"https://cms.example.com","data":{"type":"connection-test"}}"#,
    )
    .unwrap();
    assert_eq!(envelope.origin, "https://cms.example.com");
    assert_eq!(envelope.data["type"], "connection-test");
}

// ── Config ──────────────────────────────────────────────────────

#[test]
fn config_defaults() {
    let config = BridgeConfig::default();
    assert_eq!(config.sync_interval(), Duration::from_secs(60));
    assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
    assert_eq!(config.grace_period(), Duration::from_secs(30));
    assert_eq!(config.save_max_attempts, 3);
    assert_eq!(config.save_retry_delay(), Duration::from_secs(1));
    assert_eq!(config.save_timeout(), config.fetch_timeout());
    assert_eq!(config.retry_policy().attempt_timeout, Duration::from_secs(10));
    assert_eq!(
        config.handshake_schedule_ms,
        DEFAULT_HANDSHAKE_SCHEDULE_MS.to_vec()
    );
    assert!(config.capabilities.contains(&"apply-saved-changes".to_string()));
}

#[test]
fn config_partial_json_fills_defaults() {
    let config: BridgeConfig = serde_json::from_value(json!({
        "origin": "site-a",
        "allowed_origins": ["https://cms.example.com"],
        "remote": { "content_endpoint": "https://api.example.com/content" },
        "grace_period_ms": 5000
    }))
    .unwrap();

    assert_eq!(config.origin, "site-a");
    assert_eq!(config.grace_period(), Duration::from_secs(5));
    assert_eq!(config.sync_interval_ms, 60_000);
    assert_eq!(config.remote.save_endpoint, "");
    assert_eq!(config.remote.api_token, None);
}

#[test]
fn trusted_origin_ignores_trailing_slash() {
    let config = BridgeConfig {
        allowed_origins: vec!["https://cms.example.com/".to_string()],
        ..Default::default()
    };
    assert!(config.is_trusted_origin("https://cms.example.com"));
    assert!(config.is_trusted_origin("https://cms.example.com/"));
    assert!(!config.is_trusted_origin("https://evil.example.com"));
    assert!(!config.is_trusted_origin(""));
}
