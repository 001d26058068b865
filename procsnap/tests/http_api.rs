//! HTTP surface against an ephemeral-port server.

use std::sync::Arc;

use procsnap::{router, AppState, Store};
use reqwest::StatusCode;
use serde_json::{json, Value};

const KEY: &str = "http-secret";

async fn spawn_collector() -> (String, Arc<Store>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let app = router(AppState::new(store.clone(), KEY));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api"), store)
}

fn example_payload() -> Value {
    json!({
        "hostname": "web-01",
        "timestamp": "2024-05-01T12:00:00Z",
        "system": {
            "os": "Linux 6.1.0", "processor": "AMD EPYC", "cores": 4, "threads": 8,
            "ram_gb": 16.0, "used_ram_gb": 6.0, "free_ram_gb": 10.0,
            "storage_free_gb": 200.0, "storage_total_gb": 250.0, "storage_used_gb": 50.0
        },
        "processes": [
            {"pid": 1, "ppid": null, "name": "systemd", "cpu": 0.5, "memory": 12.3,
             "cmdline": "/sbin/init", "username": "root"}
        ]
    })
}

#[tokio::test]
async fn post_then_latest() {
    let (base, _) = spawn_collector().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/latest/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "No data"}));

    let resp = client
        .post(format!("{base}/process-data/"))
        .header("Authorization", format!("Token {KEY}"))
        .json(&example_payload())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"message": "Data saved"}));

    let resp = client.get(format!("{base}/latest/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["processes"][0]["pid"], json!(1));
    assert_eq!(body["system"]["ram_gb"], json!(16.0));
    assert_eq!(body["timestamp"], json!("2024-05-01T12:00:00.000000Z"));
}

#[tokio::test]
async fn wrong_token_is_401_and_stores_nothing() {
    let (base, store) = spawn_collector().await;
    let client = reqwest::Client::new();
    for auth in [None, Some("Token nope"), Some(KEY)] {
        let mut req = client
            .post(format!("{base}/process-data/"))
            .json(&example_payload());
        if let Some(a) = auth {
            req = req.header("Authorization", a);
        }
        let resp = req.send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{auth:?}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "Unauthorized"}));
    }
    assert_eq!(store.snapshot_count().unwrap(), 0);
}

#[tokio::test]
async fn invalid_payload_is_400_with_field_map() {
    let (base, store) = spawn_collector().await;
    let mut payload = example_payload();
    payload["hostname"] = Value::Null;
    payload["processes"][0]["cpu"] = json!("hot");

    let resp = reqwest::Client::new()
        .post(format!("{base}/process-data/"))
        .header("Authorization", format!("Token {KEY}"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["hostname"].is_array(), "{body}");
    assert!(body["processes[0].cpu"].is_array(), "{body}");
    assert_eq!(store.snapshot_count().unwrap(), 0);
}

#[tokio::test]
async fn malformed_json_is_400_non_field_error() {
    let (base, _) = spawn_collector().await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/process-data/"))
        .header("Authorization", format!("Token {KEY}"))
        .header("Content-Type", "application/json")
        .body("{\"hostname\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["non_field_errors"].is_array(), "{body}");
}
