use serde_json::json;

use super::*;

// ==================== ConnectionOptions Tests ====================

#[test]
fn test_drops_are_terminal_unless_reconnect_is_enabled() {
    let opts = ConnectionOptions::default();
    assert!(!opts.auto_reconnect);
    assert!(opts.max_reconnect_attempts.is_none());

    let opts = opts.with_auto_reconnect(true).with_max_reconnect_attempts(Some(5));
    assert!(opts.auto_reconnect);
    assert_eq!(opts.max_reconnect_attempts, Some(5));
    assert_eq!(opts.reconnect_delay_ms, 1_000);
}

#[test]
fn test_reconnect_backoff_doubles_then_caps() {
    let opts = ConnectionOptions::new()
        .with_reconnect_delay_ms(500)
        .with_max_reconnect_delay_ms(3_000);

    let waits: Vec<u128> = (0..5).map(|n| opts.reconnect_delay(n).as_millis()).collect();
    assert_eq!(waits, vec![500, 1_000, 2_000, 3_000, 3_000]);
    // shift overflow must not wrap back to a short wait
    assert_eq!(opts.reconnect_delay(200).as_millis(), 3_000);
}

#[test]
fn test_connection_options_partial_json() {
    let opts: ConnectionOptions =
        serde_json::from_value(json!({ "auto_reconnect": true, "reconnect_delay_ms": 250 })).unwrap();
    assert_eq!(
        opts,
        ConnectionOptions::new()
            .with_auto_reconnect(true)
            .with_reconnect_delay_ms(250)
    );
}

// ==================== AuthTokens Tests ====================

#[test]
fn test_auth_tokens_camel_case() {
    let tokens: AuthTokens =
        serde_json::from_value(json!({"accessToken": "1234abcd", "idToken": "longer_token"})).unwrap();
    assert_eq!(tokens.access_token, "1234abcd");
    assert_eq!(tokens.id_token.as_deref(), Some("longer_token"));
}

#[test]
fn test_auth_tokens_without_id_token() {
    let tokens: AuthTokens = serde_json::from_value(json!({"accessToken": "abc"})).unwrap();
    assert!(tokens.id_token.is_none());
}

// ==================== DocumentMetadata Tests ====================

#[test]
fn test_document_metadata_from_json() {
    let doc = DocumentMetadata::from_json(&json!({
        "name": "test_doc",
        "fileType": "text/plain",
        "content": "/docs/test_doc",
        "contentSize": 8000
    }))
    .unwrap();
    assert_eq!(doc.name, "test_doc");
    assert_eq!(doc.file_type.as_deref(), Some("text/plain"));
    assert_eq!(doc.content.as_deref(), Some("/docs/test_doc"));
    assert_eq!(doc.content_size, Some(8000));
}

// ==================== WsRequest Tests ====================

#[test]
fn test_validate_request_shape() {
    let value = serde_json::to_value(WsRequest::validate("tok")).unwrap();
    assert_eq!(
        value,
        json!({"op": "validate", "resourceName": "system.credentials", "object": "tok"})
    );
}

#[test]
fn test_subscribe_request_carries_request_id_and_params() {
    let params = json!({"persistent": true});
    let request = WsRequest::subscribe(
        Some("tok"),
        "/topics/test/reliable",
        params.as_object(),
    );
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["accessToken"], "tok");
    assert_eq!(value["op"], "subscribe");
    assert_eq!(value["resourceName"], "events");
    assert_eq!(value["resourceId"], "/topics/test/reliable");
    assert_eq!(value["parameters"]["requestId"], "/topics/test/reliable");
    assert_eq!(value["parameters"]["persistent"], true);
}

#[test]
fn test_acknowledge_request_echoes_identifiers() {
    let body = json!({"path": "/topics/t/publish", "partitionId": 3, "sequenceId": 17, "value": {}});
    let request = WsRequest::acknowledge("/topics/t", "sub-name-1", &body).unwrap();
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["op"], "acknowledge");
    assert_eq!(value["resourceId"], "/topics/t");
    assert_eq!(value["parameters"]["subscriptionName"], "sub-name-1");
    assert_eq!(value["parameters"]["requestId"], "/topics/t");
    assert_eq!(value["parameters"]["partitionId"], 3);
    assert_eq!(value["parameters"]["sequenceId"], 17);
    assert!(value.get("accessToken").is_none());
}

#[test]
fn test_acknowledge_requires_sequence_id() {
    let body = json!({"partitionId": 3});
    let result = WsRequest::acknowledge("/topics/t", "sub", &body);
    assert!(matches!(result, Err(crate::VantiqError::ValidationError(_))));
}

// ==================== SubscriptionMessage Tests ====================

#[test]
fn test_subscription_message_parses_frame() {
    let msg: SubscriptionMessage = serde_json::from_value(json!({
        "status": 200,
        "headers": {"X-Request-Id": "/topics/test/pythonsdk/topic"},
        "body": {"name": "sub-1234"}
    }))
    .unwrap();
    assert_eq!(msg.status, 200);
    assert_eq!(msg.request_id(), Some("/topics/test/pythonsdk/topic"));
    assert_eq!(msg.subscription_name(), Some("sub-1234"));
    assert!(msg.is_success());
}

#[test]
fn test_subscription_message_header_lookup_is_case_insensitive() {
    let msg: SubscriptionMessage = serde_json::from_value(json!({
        "status": 200,
        "headers": {"x-request-id": "/types/TestType/insert"}
    }))
    .unwrap();
    assert_eq!(msg.request_id(), Some("/types/TestType/insert"));
    assert!(msg.body.is_null());
}

#[test]
fn test_subscription_message_stringifies_odd_headers() {
    let msg: SubscriptionMessage = serde_json::from_value(json!({
        "status": 200,
        "headers": {"X-Request-Id": ["/topics/a"], "X-Count": 3}
    }))
    .unwrap();
    assert_eq!(msg.request_id(), Some("/topics/a"));
    assert_eq!(msg.header("x-count"), Some("3"));
}

#[test]
fn test_subscription_event_kind() {
    let msg: SubscriptionMessage = serde_json::from_value(json!({"status": 200})).unwrap();
    assert_eq!(SubscriptionEvent::Connect(msg.clone()).kind(), "connect");
    assert_eq!(SubscriptionEvent::Message(msg).kind(), "message");
}
