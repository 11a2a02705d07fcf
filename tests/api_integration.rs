//! Integration tests for the HTTP API
//!
//! Tests session lifecycle endpoints against stub collaborators

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use examguard::core::{
    create_router, EngineServices, FrameAnalyzer, MemoryMarkerStore, SessionService,
    VoiceTelemetry,
};
use examguard::types::{
    Answers, CloseSessionResponse, FrameAnalysis, SessionHandle, StartSessionResponse,
    VoiceEventKind,
};
use examguard::{EngineConfig, ServiceError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

#[derive(Default)]
struct Backend {
    closes: AtomicUsize,
}

#[async_trait]
impl SessionService for Backend {
    async fn start_session(
        &self,
        _auth_token: &str,
        exam_id: &str,
    ) -> Result<StartSessionResponse, ServiceError> {
        if exam_id == "closed" {
            return Ok(StartSessionResponse {
                success: false,
                session_id: None,
                message: Some("Exam is not open".to_string()),
            });
        }
        Ok(StartSessionResponse {
            success: true,
            session_id: exam_id.parse::<i64>().ok().map(Value::from),
            message: None,
        })
    }

    async fn close_session(
        &self,
        _handle: &SessionHandle,
        _answers: &Answers,
    ) -> Result<CloseSessionResponse, ServiceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(CloseSessionResponse {
            success: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl VoiceTelemetry for Backend {
    async fn report(
        &self,
        _session_id: &str,
        _rms: f64,
        _kind: VoiceEventKind,
        _duration: Option<f64>,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[async_trait]
impl FrameAnalyzer for Backend {
    async fn analyze_frame(
        &self,
        _session_id: &str,
        _image: &[u8],
    ) -> Result<FrameAnalysis, ServiceError> {
        Ok(FrameAnalysis::default())
    }
}

fn create_test_router() -> (axum::Router, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let services = EngineServices {
        session: backend.clone(),
        telemetry: backend.clone(),
        analyzer: backend.clone(),
        markers: Arc::new(MemoryMarkerStore::new()),
    };
    (create_router(EngineConfig::default(), services), backend)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn start(app: &axum::Router, id: &str) {
    let response = app
        .clone()
        .oneshot(post(
            "/session/new",
            json!({"session_id": id, "auth_token": "tok", "duration": "0:10:00", "total_questions": 4}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = create_test_router();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sessions_active"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_create_session() {
    let (app, _) = create_test_router();

    let response = app
        .clone()
        .oneshot(post(
            "/session/new",
            json!({"session_id": "17", "auth_token": "tok"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["session_id"], "17");
    assert_eq!(json["websocket_url"], "/ws/17");
}

#[tokio::test]
async fn test_create_without_token_rejected() {
    let (app, _) = create_test_router();

    let response = app
        .oneshot(post("/session/new", json!({"session_id": "17"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("Session not initialized"));
}

#[tokio::test]
async fn test_create_from_exam_id_opens_backend_session() {
    let (app, _) = create_test_router();

    let response = app
        .clone()
        .oneshot(post(
            "/session/new",
            json!({"exam_id": "31", "auth_token": "tok", "duration": 20}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["session_id"], "31");

    let json = body_json(app.oneshot(get("/session/31")).await.unwrap()).await;
    assert_eq!(json["status"], "RUNNING");
    assert_eq!(json["timer"]["text"], "20:00");
}

#[tokio::test]
async fn test_rejected_exam_start_is_client_error() {
    let (app, _) = create_test_router();

    let response = app
        .clone()
        .oneshot(post(
            "/session/new",
            json!({"exam_id": "closed", "auth_token": "tok"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Exam is not open");

    // Reply without a session id
    let response = app
        .clone()
        .oneshot(post(
            "/session/new",
            json!({"exam_id": "math-101", "auth_token": "tok"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let json = body_json(app.oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(json["sessions_active"], 0);
}

#[tokio::test]
async fn test_duplicate_session_conflicts() {
    let (app, _) = create_test_router();
    start(&app, "5").await;

    let response = app
        .oneshot(post(
            "/session/new",
            json!({"session_id": "5", "auth_token": "tok"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_get_session_snapshot() {
    let (app, _) = create_test_router();
    start(&app, "9").await;

    let response = app.oneshot(get("/session/9")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["session_id"], "9");
    assert_eq!(json["status"], "RUNNING");
    assert_eq!(json["vad_phase"], "CALIBRATING");
    assert_eq!(json["focus_state"], "IDLE");
    assert_eq!(json["timer"]["text"], "10:00");
    assert_eq!(json["total_questions"], 4);
}

#[tokio::test]
async fn test_unknown_session_not_found() {
    let (app, _) = create_test_router();

    let response = app.clone().oneshot(get("/session/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(post(
            "/session/missing/answer",
            json!({"question_id": "1", "option": 0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signals_update_counters() {
    let (app, _) = create_test_router();
    start(&app, "3").await;

    for (kind, t) in [("tab_hidden", 0), ("window_blur", 2000)] {
        let response = app
            .clone()
            .oneshot(post(
                "/session/3/signal",
                json!({"signal": "focus", "kind": {"type": kind}, "t": t}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
    let response = app
        .clone()
        .oneshot(post(
            "/session/3/answer",
            json!({"question_id": "1", "option": 2}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let json = body_json(app.oneshot(get("/session/3")).await.unwrap()).await;
    assert_eq!(json["window_violations"], 1);
    assert_eq!(json["grace_used"], true);
    assert_eq!(json["focus_state"], "ESCALATING");
    assert_eq!(json["answered"], 1);
}

#[tokio::test]
async fn test_malformed_signal_rejected() {
    let (app, _) = create_test_router();
    start(&app, "4").await;

    let response = app
        .oneshot(post("/session/4/signal", json!({"signal": "teleport"})))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_submit_completes_session() {
    let (app, backend) = create_test_router();
    start(&app, "8").await;

    let response = app
        .clone()
        .oneshot(post("/session/8/submit", json!({"answers": {"1": 3}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let json = body_json(app.clone().oneshot(get("/session/8")).await.unwrap()).await;
    assert_eq!(json["status"], "COMPLETED");
    assert_eq!(backend.closes.load(Ordering::SeqCst), 1);

    // Engine is gone; further events are refused
    let response = app
        .oneshot(post("/session/8/modal", json!({"action": "continue"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_finished_session_can_restart() {
    let (app, backend) = create_test_router();
    start(&app, "12").await;

    app.clone()
        .oneshot(post("/session/12/submit", json!({})))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.closes.load(Ordering::SeqCst), 1);

    start(&app, "12").await;
    let json = body_json(app.oneshot(get("/session/12")).await.unwrap()).await;
    assert_eq!(json["status"], "RUNNING");
    assert_eq!(json["answered"], 0);
}

#[tokio::test]
async fn test_cancel_session() {
    let (app, backend) = create_test_router();
    start(&app, "11").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/session/11")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(get("/session/11")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(backend.closes.load(Ordering::SeqCst), 0);
}
