//! REST API tests against a router served on an ephemeral port

mod common;

use std::net::SocketAddr;

use common::harness;
use local_kube::api::{router, AppStatusView, AppView, ApiError, HealthResponse, LogEntryResponse};
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn serve(h: &common::Harness) -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(h.orch.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn is_elapsed_time(s: &str) -> bool {
    let Some((minutes, rest)) = s.split_once('m') else {
        return false;
    };
    let Some(seconds) = rest.strip_suffix('s') else {
        return false;
    };
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    digits(minutes) && digits(seconds)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health() {
    let h = harness();
    let base = serve(&h).await;

    let resp: HealthResponse = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp.status, "ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_list_stop() {
    let h = harness();
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/app/start", base))
        .json(&json!({ "app": "hello:8080" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], 1);
    assert_eq!(body["app"], "hello:8080");
    assert_eq!(body["port"], 8080);
    assert_eq!(body["docker-instance"], "hello_8080");
    let service_port = body["service-port"].as_u64().unwrap();
    assert!((49152..=65535).contains(&service_port));
    let started: AppView = serde_json::from_value(body).unwrap();

    let listed: Vec<AppStatusView> = client
        .get(format!("{}/app/list", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].app, started);

    let stopped: AppStatusView = client
        .post(format!("{}/app/stop", base))
        .json(&json!({ "id": 1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stopped.app, started);
    assert!(is_elapsed_time(&stopped.elapsed_time), "{}", stopped.elapsed_time);

    let listed: Vec<Value> = client
        .get(format!("{}/app/list", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.is_empty());
    assert!(!h.driver.is_live("hello_8080"));

    let logs: Vec<LogEntryResponse> = client
        .get(format!("{}/logs/1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let events: Vec<_> = logs.iter().map(|l| l.event.as_str()).collect();
    assert_eq!(events, vec!["started", "stopped"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_statuses() {
    let h = harness();
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/app/stop", base))
        .json(&json!({ "id": 999 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let err: ApiError = resp.json().await.unwrap();
    assert_eq!(err.error, "NotFound");

    let resp = client
        .post(format!("{}/app/start", base))
        .json(&json!({ "app": "no-port" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/app/start", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/app/stop", base))
        .json(&json!({ "id": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_after_shutdown_is_unavailable() {
    let h = harness();
    let base = serve(&h).await;
    let orch = h.orch.clone();
    tokio::task::spawn_blocking(move || orch.shutdown()).await.unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{}/app/start", base))
        .json(&json!({ "app": "late:8080" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
}

#[test]
fn test_elapsed_time_shape() {
    assert!(is_elapsed_time("0m0s"));
    assert!(is_elapsed_time("12m59s"));
    assert!(!is_elapsed_time("m0s"));
    assert!(!is_elapsed_time("1h2m3s"));
}
