//! Resource operations against a mock REST surface.

mod common;

use serde_json::json;
use vantiq_link::models::UNKNOWN_RESOURCE_CODE;
use vantiq_link::{resources, QueryParams, ResponseBody, VantiqError};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn last_query(server: &MockServer) -> Option<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .last()
        .and_then(|request| request.url.query().map(str::to_string))
}

#[tokio::test]
async fn test_select_sends_canonical_query_and_reads_count() {
    let server = common::mock_http().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/resources/custom/TestType"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Total-Count", "42")
                .set_body_json(json!([{ "id": 1 }, { "id": 2 }])),
        )
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let query = QueryParams::new()
        .props(["id"])
        .filter(json!({ "id": { "$gt": 0 } }))
        .sort(json!({ "id": 1 }))
        .option("required", "true")
        .limit(2);
    let response = client.select("TestType", &query).await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.count, Some(42));
    assert_eq!(response.body.as_array().map(|rows| rows.len()), Some(2));
    assert_eq!(
        last_query(&server).await.as_deref(),
        Some(
            "count=true&limit=2&props=%5B%22id%22%5D&required=true\
             &sort=%7B%22id%22%3A1%7D&where=%7B%22id%22%3A%7B%22%24gt%22%3A0%7D%7D"
        )
    );
}

#[tokio::test]
async fn test_select_without_count_leaves_count_unset() {
    let server = common::mock_http().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/resources/types"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Total-Count", "9")
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let response = client.select(resources::TYPES, &QueryParams::new()).await.unwrap();
    assert!(response.is_success());
    assert_eq!(response.count, None);
    assert!(response.body.is_empty());
    assert_eq!(last_query(&server).await, None);
}

#[tokio::test]
async fn test_count_uses_header_and_empties_body() {
    let server = common::mock_http().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/resources/custom/TestType"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Total-Count", "3")
                .set_body_json(json!([{ "_id": "a" }])),
        )
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let response = client
        .count("TestType", Some(&json!({ "name": "x" })))
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(response.count, Some(3));
    assert!(matches!(response.body, ResponseBody::Empty));
    assert_eq!(
        last_query(&server).await.as_deref(),
        Some("count=true&limit=1&props=%5B%22_id%22%5D&where=%7B%22name%22%3A%22x%22%7D")
    );
}

#[tokio::test]
async fn test_unknown_resource_kind() {
    let server = common::mock_http().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/resources/junkola"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!([{
            "code": "io.vantiq.type.system.resource.unknown",
            "message": "The resource junkola is not recognized.",
            "params": ["junkola"]
        }])))
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let response = client.select("system.junkola", &QueryParams::new()).await.unwrap();

    assert!(!response.is_success());
    assert_eq!(response.status_code, 404);
    assert_eq!(response.errors.len(), 1);
    let error = response.first_error().unwrap();
    assert_eq!(error.code, UNKNOWN_RESOURCE_CODE);
    assert_eq!(error.params, vec!["junkola".to_string()]);

    assert!(matches!(
        response.error_for_status(),
        Err(VantiqError::UnknownResource(_))
    ));
}

#[tokio::test]
async fn test_unparseable_error_body_gets_generic_error() {
    let server = common::mock_http().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/resources/types/Missing"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let response = client.select_one(resources::TYPES, "Missing").await.unwrap();
    assert!(!response.is_success());
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].code, vantiq_link::models::GENERIC_ERROR_CODE);
    assert_eq!(response.errors[0].message, "upstream exploded");
}

#[tokio::test]
async fn test_insert_update_and_upsert() {
    let server = common::mock_http().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/resources/custom/TestType"))
        .and(query_param("upsert", "true"))
        .and(body_json(json!({ "id": 1, "name": "upserted" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "name": "upserted" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/resources/custom/TestType"))
        .and(body_json(json!({ "id": 1, "name": "first" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "_id": "abc" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/resources/custom/TestType/abc"))
        .and(body_json(json!({ "name": "second" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "name": "second" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let inserted = client
        .insert("TestType", &json!({ "id": 1, "name": "first" }))
        .await
        .unwrap();
    let id = inserted.body.as_object().unwrap()["_id"].as_str().unwrap().to_string();

    let updated = client
        .update("TestType", &id, &json!({ "name": "second" }))
        .await
        .unwrap();
    assert_eq!(updated.body.as_object().unwrap()["name"], "second");

    let upserted = client
        .upsert("TestType", &json!({ "id": 1, "name": "upserted" }))
        .await
        .unwrap();
    assert!(upserted.is_success());
}

#[tokio::test]
async fn test_delete_reports_count() {
    let server = common::mock_http().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/resources/custom/TestType"))
        .respond_with(ResponseTemplate::new(200).insert_header("X-Total-Count", "2"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/resources/custom/TestType/abc"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let response = client
        .delete("TestType", Some(&json!({ "name": "ratherUnlikelyName" })))
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.count, Some(2));
    assert_eq!(
        last_query(&server).await.as_deref(),
        Some("count=true&where=%7B%22name%22%3A%22ratherUnlikelyName%22%7D")
    );

    let one = client.delete_one("TestType", "abc").await.unwrap();
    assert!(one.is_success());
    assert!(matches!(one.body, ResponseBody::Empty));
}

#[tokio::test]
async fn test_execute_normalizes_missing_params() {
    let server = common::mock_http().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/resources/procedures/echo"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("no args")))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/resources/procedures/echo"))
        .and(body_json(json!({ "x": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let none = client.execute("echo", None).await.unwrap();
    assert!(matches!(none.body, ResponseBody::Scalar(_)));
    client.execute("echo", Some(&serde_json::Value::Null)).await.unwrap();

    let with_args = client.execute("echo", Some(&json!({ "x": 1 }))).await.unwrap();
    assert_eq!(with_args.body.to_json(), Some(json!(1)));
}

#[tokio::test]
async fn test_publish_targets() {
    let server = common::mock_http().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/resources/topics/test/pythonsdk/topic"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/resources/services/com.example.Svc/inbound"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let topic = client
        .publish(resources::TOPICS, "/test/pythonsdk/topic", &json!({ "n": 1 }))
        .await
        .unwrap();
    assert!(topic.is_success());

    let service = client
        .publish(resources::SERVICES, "com.example.Svc/inbound", &json!({ "n": 2 }))
        .await
        .unwrap();
    assert!(service.is_success());

    let err = client
        .publish(resources::TYPES, "TestType", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, VantiqError::ValidationError(_)));
}

#[tokio::test]
async fn test_namespace_users() {
    let server = common::mock_http().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/resources/namespaces/demo/authorizedUsers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "username": "alice" }])))
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let users = client.get_namespace_users("demo").await.unwrap();
    assert!(users.is_success());
    assert_eq!(users.body.as_array().unwrap()[0]["username"], "alice");
}

#[tokio::test]
async fn test_binary_body_passthrough() {
    let server = common::mock_http().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/resources/custom/Blob/raw"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![0u8, 159, 146, 150], "application/octet-stream"),
        )
        .mount(&server)
        .await;

    let client = common::client_for(&server.uri());
    let response = client.select_one("Blob", "raw").await.unwrap();
    match response.body {
        ResponseBody::Bytes(bytes) => assert_eq!(&bytes[..], &[0u8, 159, 146, 150]),
        other => panic!("Expected bytes, got {:?}", other),
    }
}
