//! Integration tests for api-automate
//!
//! Each test starts a small local HTTP service and drives the workspace and
//! sequencer against it.

use api_automate::automation::{create_shared_sequencer, RunState, SharedSequencer, StepStatus};
use api_automate::collection::CollectionDocument;
use api_automate::config::{AppConfig, AutomationConfig, SharedConfig};
use api_automate::executor::HttpExecutor;
use api_automate::templates::OverrideField;
use api_automate::transcript::create_shared_transcript;
use api_automate::workspace::{create_shared_workspace, SharedWorkspace};
use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

type SequencerSlot = Arc<Mutex<Option<SharedSequencer>>>;

async fn login() -> impl axum::response::IntoResponse {
    (
        [(header::SET_COOKIE, "XSRF-TOKEN=x1; Path=/")],
        Json(json!({"token": "abc"})),
    )
}

async fn protected(headers: HeaderMap) -> StatusCode {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let xsrf = headers.get("x-xsrf-token").and_then(|v| v.to_str().ok());
    if bearer == Some("Bearer abc") && xsrf == Some("x1") {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_millis(1000)).await;
    "late"
}

async fn ok() -> &'static str {
    "ok"
}

/// Asks the running sequencer to stop while this request is in flight
async fn trigger_stop(State(slot): State<SequencerSlot>) -> StatusCode {
    let stopped = slot.lock().as_ref().map_or(false, |s| s.stop());
    if stopped {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    }
}

async fn echo_delete(RawQuery(query): RawQuery, body: String) -> Json<Value> {
    Json(json!({"query": query, "body": body}))
}

async fn spawn_service(slot: SequencerSlot) -> SocketAddr {
    let app = Router::new()
        .route("/login", post(login))
        .route("/protected", get(protected))
        .route("/slow", get(slow))
        .route("/ok", get(ok))
        .route("/stop", get(trigger_stop))
        .route("/items", delete(echo_delete))
        .with_state(slot);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn collection(addr: SocketAddr) -> CollectionDocument {
    serde_json::from_value(json!({
        "info": {"name": "Local"},
        "variable": [{"key": "baseUrl", "value": format!("http://{}", addr)}],
        "item": [{"name": "Flow", "item": [
            {"name": "Login", "request": {
                "method": "POST",
                "url": "{{baseUrl}}/login",
                "body": {"mode": "raw", "raw": "{\"user\": \"demo\"}"}
            }},
            {"name": "Protected", "request": {"method": "GET", "url": "{{baseUrl}}/protected"}},
            {"name": "Slow", "request": {"method": "GET", "url": "{{baseUrl}}/slow"}},
            {"name": "Ok", "request": {"method": "GET", "url": "{{baseUrl}}/ok"}},
            {"name": "Stop", "request": {"method": "GET", "url": "{{baseUrl}}/stop"}},
            {"name": "Remove", "request": {"method": "DELETE", "url": "{{baseUrl}}/items"}},
            {"name": "Broken", "request": {
                "method": "POST",
                "url": "{{baseUrl}}/login",
                "body": {"mode": "raw", "raw": "user=demo"}
            }}
        ]}]
    }))
    .unwrap()
}

struct Harness {
    workspace: SharedWorkspace,
    sequencer: SharedSequencer,
}

async fn harness(timeout_ms: u64) -> Harness {
    let slot: SequencerSlot = Arc::new(Mutex::new(None));
    let addr = spawn_service(slot.clone()).await;

    let mut config = AppConfig::default();
    config.http.timeout_ms = timeout_ms;
    config.automation = AutomationConfig::immediate();
    let shared_config = SharedConfig::new(config.clone());

    let transcript = create_shared_transcript(config.transcript.max_entries);
    let workspace = create_shared_workspace(&config, transcript);
    workspace.write().import_document(collection(addr), None);

    let executor = HttpExecutor::new(&config.http).unwrap();
    let sequencer = create_shared_sequencer(workspace.clone(), executor, shared_config);
    *slot.lock() = Some(sequencer.clone());

    Harness {
        workspace,
        sequencer,
    }
}

fn enqueue(workspace: &SharedWorkspace, names: &[&str]) {
    let mut ws = workspace.write();
    for name in names {
        let key = ws.key(&format!("Flow - {}", name)).unwrap();
        ws.enqueue(&key).unwrap();
    }
}

#[tokio::test]
async fn test_timeout_does_not_abort_run() {
    let h = harness(200).await;
    enqueue(&h.workspace, &["Ok", "Slow", "Login"]);

    let summary = h.sequencer.run().await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert!(!summary.cancelled);
    assert_eq!(summary.steps[1].status_code, None);
    assert!(summary.steps[1]
        .error
        .as_deref()
        .unwrap()
        .contains("timeout"));
    assert_eq!(h.sequencer.state(), RunState::Completed);

    let ws = h.workspace.read();
    let statuses: Vec<StepStatus> = ws.queue().entries().iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Success, StepStatus::Failure, StepStatus::Success]
    );
    let transcript = ws.transcript().render();
    assert!(transcript.contains("Running: Flow - Slow"));
    assert!(transcript.contains("Automation completed"));
}

#[tokio::test]
async fn test_unsendable_step_is_recorded_and_run_continues() {
    let h = harness(5_000).await;
    enqueue(&h.workspace, &["Ok", "Broken", "Login"]);

    let summary = h.sequencer.run().await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.steps[1].status_code, None);
    assert_eq!(summary.steps[1].latency_ms, 0.0);
    assert!(summary.steps[1].error.as_deref().unwrap().contains("invalid body"));
    assert_eq!(summary.steps[2].status_code, Some(200));
    assert_eq!(h.sequencer.state(), RunState::Completed);

    let ws = h.workspace.read();
    let statuses: Vec<StepStatus> = ws.queue().entries().iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Success, StepStatus::Failure, StepStatus::Success]
    );
    assert!(ws.transcript().render().contains("Flow - Broken: invalid body"));
    assert_eq!(ws.session().bearer_token.as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_stop_skips_remaining_steps() {
    let h = harness(5_000).await;
    enqueue(&h.workspace, &["Stop", "Ok", "Protected"]);

    let summary = h.sequencer.run().await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.steps[0].status_code, Some(200));
    assert_eq!(h.sequencer.state(), RunState::Idle);

    let ws = h.workspace.read();
    let statuses: Vec<StepStatus> = ws.queue().entries().iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Success, StepStatus::Pending, StepStatus::Pending]
    );
    assert!(ws.transcript().render().contains("Automation stopped by user"));
}

#[tokio::test]
async fn test_tokens_flow_from_login_to_later_steps() {
    let h = harness(5_000).await;
    enqueue(&h.workspace, &["Protected", "Login", "Ok"]);

    // Before login the protected call is rejected
    let summary = h.sequencer.run().await.unwrap();
    assert_eq!(summary.steps[0].status_code, Some(401));
    assert_eq!(summary.steps[1].status_code, Some(200));

    {
        let ws = h.workspace.read();
        assert_eq!(ws.session().bearer_token.as_deref(), Some("abc"));
        assert_eq!(ws.session().xsrf_token.as_deref(), Some("x1"));
    }

    // Tokens persist into the next run
    let summary = h.sequencer.run().await.unwrap();
    assert_eq!(summary.steps[0].status_code, Some(200));
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_single_send_uses_session_tokens() {
    let h = harness(5_000).await;
    let (login, protected) = {
        let ws = h.workspace.read();
        (ws.key("Flow - Login").unwrap(), ws.key("Flow - Protected").unwrap())
    };

    let exchange = h.sequencer.send(&login).await.unwrap();
    assert!(exchange.is_success());

    let exchange = h.sequencer.send(&protected).await.unwrap();
    assert_eq!(exchange.outcome.status(), Some(200));
    assert_eq!(
        exchange.request.headers.get("Authorization").map(String::as_str),
        Some("Bearer abc")
    );
}

#[tokio::test]
async fn test_delete_sends_body_or_params() {
    let h = harness(5_000).await;
    let key = h.workspace.read().key("Flow - Remove").unwrap();

    h.workspace
        .write()
        .save_override(OverrideField::Params, &key, r#"{"id": "7"}"#)
        .unwrap();
    let exchange = h.sequencer.send(&key).await.unwrap();
    let echoed: Value =
        serde_json::from_str(&exchange.response.as_ref().unwrap().body).unwrap();
    assert_eq!(echoed["query"], "id=7");
    assert_eq!(echoed["body"], "");

    h.workspace
        .write()
        .save_override(OverrideField::Body, &key, r#"{"id": 7}"#)
        .unwrap();
    let exchange = h.sequencer.send(&key).await.unwrap();
    let echoed: Value =
        serde_json::from_str(&exchange.response.as_ref().unwrap().body).unwrap();
    assert_eq!(echoed["query"], Value::Null);
    assert_eq!(echoed["body"], r#"{"id":7}"#);
}

#[tokio::test]
async fn test_unreachable_host_is_an_outcome() {
    let h = harness(1_000).await;
    let key = h.workspace.read().key("Flow - Ok").unwrap();
    h.workspace
        .write()
        .save_override(OverrideField::BaseUrl, &key, "http://127.0.0.1:9")
        .unwrap();

    let exchange = h.sequencer.send(&key).await.unwrap();
    assert!(!exchange.is_success());
    assert!(exchange.response.is_none());
}
