//! HTTP surface tests: status codes, wire shapes, and the tamper path.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use meridian_bridge::{
    api, AppState, BridgeMetrics, BrokerGateway, ExclusionSeed, InMemoryBroker,
    InMemoryObjectStore, RecordStore, SendPipeline, StorageWorkerPool,
};
use meridian_crypto::{EncryptionService, LocalKeyProvider};
use meridian_exclusion::ExclusionEngine;

struct Rig {
    app: Router,
    broker: Arc<InMemoryBroker>,
    store: Arc<InMemoryObjectStore>,
    exclusion: Arc<ExclusionEngine>,
}

fn rig() -> Rig {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryObjectStore::new());
    let crypto = Arc::new(EncryptionService::new(Arc::new(LocalKeyProvider::new(
        [11u8; 32],
    ))));
    let records = Arc::new(RecordStore::new(
        store.clone(),
        Some(crypto),
        "solace-messages",
    ));
    let exclusion = Arc::new(ExclusionEngine::new());
    let metrics = Arc::new(BridgeMetrics::new());
    let workers = Arc::new(StorageWorkerPool::new(4, 64, metrics.clone()));
    let pipeline = Arc::new(SendPipeline::new(
        exclusion.clone(),
        broker.clone() as Arc<dyn BrokerGateway>,
        workers,
        records.clone(),
        metrics.clone(),
    ));

    let app = api::router(Arc::new(AppState {
        pipeline,
        records,
        exclusion: exclusion.clone(),
        metrics,
    }));

    Rig {
        app,
        broker,
        store,
        exclusion,
    }
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_store(store: &InMemoryObjectStore, count: usize) {
    for _ in 0..100 {
        if store.blob_count("solace-messages") >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("store never reached {count} blobs");
}

const UETR_RULE: &str = r#"[{
    "name": "uetr-exclusion",
    "extractorType": "PATTERN",
    "extractorConfig": ":121:([0-9a-f-]+)|1",
    "excludedIdentifiers": "97ed4827-7b6f-4491-a06f-2f5f8a5c8d3f",
    "priority": 10
}]"#;

#[tokio::test]
async fn test_send_returns_sent_and_stores() {
    let rig = rig();
    let response = rig
        .app
        .clone()
        .oneshot(post_json(
            "/api/messages",
            r#"{"content":"hello","destination":"bridge/orders","correlationId":"c-1"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "SENT");
    assert_eq!(json["destination"], "bridge/orders");
    let message_id = json["messageId"].as_str().unwrap().to_string();

    assert_eq!(rig.broker.published_to("bridge/orders").len(), 1);
    wait_for_store(&rig.store, 1).await;

    // Retrieval returns the decrypted view
    let fetched = rig
        .app
        .clone()
        .oneshot(get(&format!("/api/storage/messages/{message_id}")))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let record = body_json(fetched).await;
    assert_eq!(record["content"], "hello");
    assert_eq!(record["originalStatus"], "SENT");
}

#[tokio::test]
async fn test_excluded_uetr_returns_202_and_no_publish() {
    let rig = rig();
    ExclusionSeed::load(&rig.exclusion, UETR_RULE).unwrap();

    let body = serde_json::json!({
        "content": ":20:FT1:121:97ed4827-7b6f-4491-a06f-2f5f8a5c8d3f:23B:CRED",
        "destination": "bridge/orders"
    });
    let response = rig
        .app
        .clone()
        .oneshot(post_json("/api/messages", &body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "EXCLUDED");
    assert_eq!(rig.broker.published_count(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(rig.store.blob_count("solace-messages"), 0);
}

#[tokio::test]
async fn test_unlisted_uetr_is_sent() {
    let rig = rig();
    ExclusionSeed::load(&rig.exclusion, UETR_RULE).unwrap();

    let body = serde_json::json!({
        "content": ":20:FT1:121:11111111-2222-3333-4444-555555555555:23B:CRED",
        "destination": "bridge/orders"
    });
    let response = rig
        .app
        .clone()
        .oneshot(post_json("/api/messages", &body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "SENT");
    assert_eq!(rig.broker.published_count(), 1);
}

#[tokio::test]
async fn test_hl7_wildcard_exclusion() {
    let rig = rig();
    ExclusionSeed::load(
        &rig.exclusion,
        r#"[{
            "name": "hl7-test",
            "extractorType": "DELIMITED",
            "extractorConfig": "|MSH|9",
            "excludedIdentifiers": "MSG12345,TESTMSG*"
        }]"#,
    )
    .unwrap();

    let hl7 = |id: &str| {
        serde_json::json!({
            "content": format!(
                "MSH|^~\\&|HIS|HOSPITAL|LAB|LABSYSTEM|20251014||ADT^A01|{id}|P|2.5"
            ),
            "destination": "bridge/hl7"
        })
        .to_string()
    };

    let excluded = rig
        .app
        .clone()
        .oneshot(post_json("/api/messages", &hl7("MSG12345")))
        .await
        .unwrap();
    assert_eq!(excluded.status(), StatusCode::ACCEPTED);

    let sent = rig
        .app
        .clone()
        .oneshot(post_json("/api/messages", &hl7("MSG99999")))
        .await
        .unwrap();
    assert_eq!(sent.status(), StatusCode::OK);
    assert_eq!(body_json(sent).await["status"], "SENT");
}

#[tokio::test]
async fn test_validation_is_400() {
    let rig = rig();
    let response = rig
        .app
        .clone()
        .oneshot(post_json(
            "/api/messages",
            r#"{"content":"","destination":"d"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_record_is_404() {
    let rig = rig();
    let response = rig
        .app
        .clone()
        .oneshot(get(
            "/api/storage/messages/00000000-0000-0000-0000-000000000000",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tampered_record_is_500_without_crypto_details() {
    let rig = rig();
    let response = rig
        .app
        .clone()
        .oneshot(post_json(
            "/api/messages",
            r#"{"content":"tamper target","destination":"bridge/orders"}"#,
        ))
        .await
        .unwrap();
    let message_id = body_json(response).await["messageId"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_store(&rig.store, 1).await;

    // Flip one byte of the stored encryptedContent base64
    let blob = format!("message-{message_id}.json");
    assert!(rig.store.corrupt_blob("solace-messages", &blob, |bytes| {
        let text = String::from_utf8(bytes.clone()).unwrap();
        let marker = "\"encryptedContent\":\"";
        let start = text.find(marker).unwrap() + marker.len();
        bytes[start] = if bytes[start] == b'A' { b'B' } else { b'A' };
    }));

    let response = rig
        .app
        .clone()
        .oneshot(get(&format!("/api/storage/messages/{message_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    let error = json["error"].as_str().unwrap();
    // Generic message only: no plaintext, no crypto detail
    assert!(!error.to_lowercase().contains("tamper"));
    assert!(!error.contains("tamper target"));
    assert_eq!(error, "failed to read stored record");
}

#[tokio::test]
async fn test_republish_allocates_new_id() {
    let rig = rig();
    let response = rig
        .app
        .clone()
        .oneshot(post_json(
            "/api/messages",
            r#"{"content":"again","destination":"bridge/orders"}"#,
        ))
        .await
        .unwrap();
    let original_id = body_json(response).await["messageId"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_store(&rig.store, 1).await;

    let response = rig
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/storage/messages/{original_id}/republish"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "REPUBLISHED");
    let new_id = json["messageId"].as_str().unwrap();
    assert_ne!(new_id, original_id);

    wait_for_store(&rig.store, 2).await;
    let fetched = rig
        .app
        .clone()
        .oneshot(get(&format!("/api/storage/messages/{new_id}")))
        .await
        .unwrap();
    let record = body_json(fetched).await;
    assert_eq!(record["originalStatus"], "REPUBLISHED");
    assert_eq!(record["content"], "again");
}

#[tokio::test]
async fn test_delete_then_404() {
    let rig = rig();
    let response = rig
        .app
        .clone()
        .oneshot(post_json(
            "/api/messages",
            r#"{"content":"bye","destination":"bridge/orders"}"#,
        ))
        .await
        .unwrap();
    let id = body_json(response).await["messageId"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_store(&rig.store, 1).await;

    let deleted = rig
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/storage/messages/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let gone = rig
        .app
        .clone()
        .oneshot(get(&format!("/api/storage/messages/{id}")))
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rule_crud_and_diagnostics() {
    let rig = rig();

    // Create
    let created = rig
        .app
        .clone()
        .oneshot(post_json(
            "/api/exclusions/rules",
            r#"{
                "name": "fixed-head",
                "extractorType": "FIXED_POSITION",
                "extractorConfig": "0|3",
                "excludedIdentifiers": "BAD",
                "priority": 5
            }"#,
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);
    let rule = body_json(created).await;
    let rule_id = rule["ruleId"].as_str().unwrap().to_string();

    // Diagnostic endpoint sees it
    let test = rig
        .app
        .clone()
        .oneshot(post_json(
            "/api/exclusions/test",
            r#"{"content":"BAD payload"}"#,
        ))
        .await
        .unwrap();
    let verdict = body_json(test).await;
    assert_eq!(verdict["excluded"], true);
    assert_eq!(verdict["matchedRuleId"], rule_id.as_str());
    assert_eq!(verdict["matchedId"], "BAD");

    // Stats reflect the table
    let stats = rig
        .app
        .clone()
        .oneshot(get("/api/exclusions/stats"))
        .await
        .unwrap();
    let stats = body_json(stats).await;
    assert_eq!(stats["totalRules"], 1);
    assert_eq!(stats["activeRules"], 1);
    assert_eq!(stats["extractorsAvailable"].as_array().unwrap().len(), 4);

    // Delete, then 404
    let deleted = rig
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/exclusions/rules/{rule_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let missing = rig
        .app
        .clone()
        .oneshot(get(&format!("/api/exclusions/rules/{rule_id}")))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_global_id_management() {
    let rig = rig();

    let added = rig
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/exclusions/ids/GLOBAL-77")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(added.status(), StatusCode::OK);

    let listed = rig
        .app
        .clone()
        .oneshot(get("/api/exclusions/ids"))
        .await
        .unwrap();
    let ids = body_json(listed).await;
    assert_eq!(ids.as_array().unwrap().len(), 1);
    assert_eq!(ids[0], "GLOBAL-77");

    let removed = rig
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/exclusions/ids/GLOBAL-77")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(removed.status(), StatusCode::OK);

    let missing = rig
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/exclusions/ids/GLOBAL-77")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_status_and_metrics() {
    let rig = rig();

    let health = rig
        .app
        .clone()
        .oneshot(get("/api/messages/health"))
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_json(health).await["status"], "UP");

    let status = rig
        .app
        .clone()
        .oneshot(get("/api/storage/status"))
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::OK);
    let text = to_bytes(status.into_body(), 1 << 16).await.unwrap();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("enabled"));
    assert!(text.contains("solace-messages"));

    rig.app
        .clone()
        .oneshot(post_json(
            "/api/messages",
            r#"{"content":"m","destination":"d"}"#,
        ))
        .await
        .unwrap();
    let metrics = rig
        .app
        .clone()
        .oneshot(get("/api/metrics"))
        .await
        .unwrap();
    let snapshot = body_json(metrics).await;
    assert_eq!(snapshot["messagesSent"], 1);
}
