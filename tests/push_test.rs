use axum::{
    Json, Router,
    body::Body,
    http::{Request, StatusCode, header},
    routing::post,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt; // for `oneshot`

use filegate::api::{self, AppState};
use filegate::blacklist::{BlacklistClient, BlacklistVerdict, StaticBlacklist};
use filegate::config::{BlacklistConfig, ConfigResolver, RuleSet};
use filegate::processors::ProcessorRegistry;
use filegate::storage::StorageClient;
use filegate::worker::EventHandler;

const RULES: &str = r#"{
    "csv": {
        "output_suffix": ".processed.csv",
        "transform_id": "csv_normalize",
        "max_size_bytes": "1MB"
    },
    "json": {
        "output_suffix": ".min.json",
        "transform_id": "json_compact",
        "max_size_bytes": 1024
    }
}"#;

fn resolver() -> Arc<ConfigResolver> {
    let registry = Arc::new(ProcessorRegistry::with_defaults());
    let rules = RuleSet::parse(RULES.as_bytes(), &registry).expect("test rules are valid");
    Arc::new(ConfigResolver::from_rules(rules, registry))
}

/// Builds a push router around the given blacklist with isolated storage
fn build_app(blacklist: Arc<dyn filegate::blacklist::BlacklistCheck>) -> (Router, StorageClient) {
    let storage = StorageClient::in_memory();
    let handler = EventHandler::builder()
        .resolver(resolver())
        .blacklist(blacklist)
        .storage(storage.clone())
        .output_bucket("processed")
        .build();

    let app = api::router(AppState::new(handler, 64 * 1024), 4);
    (app, storage)
}

/// Pub/Sub push envelope around a GCS object notification
fn push_envelope(bucket: &str, name: &str) -> Value {
    let notification = json!({
        "bucket": bucket,
        "name": name,
        "timeCreated": "2024-05-01T12:00:00Z",
    });
    json!({
        "message": {
            "data": BASE64.encode(notification.to_string()),
            "messageId": "1",
            "publishTime": "2024-05-01T12:00:01Z",
        },
        "subscription": "projects/test/subscriptions/uploads",
    })
}

async fn post_json(app: Router, body: String) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_json(app: Router, uri: &str) -> Value {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Stand-in blacklist API: denies identifiers containing "blocked"
async fn start_blacklist_server() -> String {
    async fn lookup(Json(request): Json<Value>) -> Json<Value> {
        let identifier = request["identifier"].as_str().unwrap_or_default();
        if identifier.contains("blocked") {
            Json(json!({"verdict": "deny", "reason": "malware_signature"}))
        } else {
            Json(json!({"verdict": "allow"}))
        }
    }

    let app = Router::new().route("/lookup", post(lookup));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/lookup")
}

fn blacklist_client(endpoint: String) -> BlacklistClient {
    let config = BlacklistConfig {
        endpoint,
        api_key: Some("test-key".to_string()),
        request_timeout_ms: 500,
        base_backoff_ms: 10,
        max_backoff_ms: 20,
        total_budget_ms: 1000,
        ..BlacklistConfig::default()
    };
    BlacklistClient::new(&config).expect("valid blacklist config")
}

#[tokio::test]
async fn test_allowed_upload_is_processed() {
    let endpoint = start_blacklist_server().await;
    let (app, storage) = build_app(Arc::new(blacklist_client(endpoint)));
    storage
        .put("uploads", "report.csv", b" id , name \n1, Ada \n".to_vec())
        .await
        .unwrap();

    let (status, body) = post_json(app, push_envelope("uploads", "report.csv").to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["output_key"], "report.csv.processed.csv");
    assert_eq!(body["reused"], false);

    let output = storage
        .get("processed", "report.csv.processed.csv")
        .await
        .unwrap();
    assert_eq!(output.as_ref(), b"id,name\n1,Ada\n");
}

#[tokio::test]
async fn test_denied_upload_is_acked_without_output() {
    let endpoint = start_blacklist_server().await;
    let (app, storage) = build_app(Arc::new(blacklist_client(endpoint)));
    storage
        .put("uploads", "blocked/report.csv", b"a,b\n".to_vec())
        .await
        .unwrap();

    let (status, body) =
        post_json(app, push_envelope("uploads", "blocked/report.csv").to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["reason"]["code"], "denied");
    assert_eq!(body["reason"]["detail"], "malware_signature");
    assert!(
        !storage
            .exists("processed", "blocked/report.csv.processed.csv")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_unreachable_blacklist_requests_redelivery() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (app, storage) = build_app(Arc::new(blacklist_client(format!("http://{addr}/lookup"))));
    storage
        .put("uploads", "report.csv", b"a,b\n".to_vec())
        .await
        .unwrap();

    let (status, body) = post_json(app, push_envelope("uploads", "report.csv").to_string()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"]["kind"], "blacklist_unavailable");
    assert_eq!(body["error"]["retryable"], true);
    assert!(
        !storage
            .exists("processed", "report.csv.processed.csv")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_malformed_payload_is_acked() {
    let (app, _storage) = build_app(Arc::new(StaticBlacklist::allow_all()));

    let (status, body) = post_json(app, "{\"message\": {}}".to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"]["kind"], "decode_error");
    assert_eq!(body["error"]["retryable"], false);
}

#[tokio::test]
async fn test_direct_notification_for_unknown_type_is_skipped() {
    let blacklist = Arc::new(StaticBlacklist::allow_all());
    let (app, _storage) = build_app(blacklist.clone());

    let payload = json!({"bucket": "uploads", "fileName": "photo.png"});
    let (status, body) = post_json(app, payload.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["reason"]["code"], "no_matching_rule");
    assert_eq!(blacklist.calls(), 0);
}

#[tokio::test]
async fn test_oversized_request_body_is_rejected() {
    let (app, _storage) = build_app(Arc::new(StaticBlacklist::allow_all()));

    let padding = "x".repeat(128 * 1024);
    let payload = json!({"bucket": "uploads", "name": "a.csv", "padding": padding});
    let (status, body) = post_json(app, payload.to_string()).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (app, storage) = build_app(Arc::new(StaticBlacklist::new(BlacklistVerdict::Allowed)));
    storage
        .put("uploads", "data.json", b"{ \"a\" : 1 }".to_vec())
        .await
        .unwrap();

    let health = get_json(app.clone(), "/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["rules"], 2);

    let (status, body) = post_json(app.clone(), push_envelope("uploads", "data.json").to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output_key"], "data.json.min.json");
    assert_eq!(
        storage.get("processed", "data.json.min.json").await.unwrap().as_ref(),
        br#"{"a":1}"#
    );

    // Redelivery reuses the stored output
    let (_, body) = post_json(app.clone(), push_envelope("uploads", "data.json").to_string()).await;
    assert_eq!(body["reused"], true);

    let metrics = get_json(app, "/metrics").await;
    assert_eq!(metrics["events_received"], 2);
    assert_eq!(metrics["events_completed"], 2);
    assert_eq!(metrics["outputs_reused"], 1);
}
