//! HTTP + WebSocket API for ExamGuard
//!
//! Endpoints:
//! - POST /session/new - Start an engine for a session (or open one from an exam id)
//! - GET /session/{id} - Engine snapshot
//! - DELETE /session/{id} - Cancel the engine
//! - POST /session/{id}/signal - Push a frame, amplitude or focus signal
//! - POST /session/{id}/answer - Record an answer
//! - POST /session/{id}/submit - Manual submission
//! - POST /session/{id}/modal - Answer the window-change modal
//! - WS /ws/{id} - UI command stream
//! - GET /health - Health check

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::core::engine::{
    EngineEvent, EngineHandle, EngineServices, EngineSnapshot, ExamSetup, ModalAction, Producers,
    SessionEngine,
};
use crate::core::timer::DurationInput;
use crate::error::EngineError;
use crate::types::{Answers, SessionHandle, Signal, UiCommand};

/// One running engine
#[derive(Debug)]
pub struct Session {
    pub handle: EngineHandle,
    pub task: JoinHandle<EngineSnapshot>,
}

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, Session>>,
    pub config: EngineConfig,
    pub services: EngineServices,
}

impl AppState {
    pub fn new(config: EngineConfig, services: EngineServices) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            services,
        }
    }
}

/// Start session request
#[derive(Debug, Deserialize)]
pub struct NewSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Opens a backend session when no `session_id` is given
    #[serde(default)]
    pub exam_id: Option<String>,
    #[serde(default)]
    pub duration: Option<DurationInput>,
    #[serde(default)]
    pub total_questions: usize,
    #[serde(default)]
    pub viewport: Option<(u32, u32)>,
}

/// Start session response
#[derive(Debug, Serialize, Deserialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
}

/// Answer request
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_id: String,
    pub option: i64,
}

/// Manual submit request
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub answers: Answers,
}

/// Modal button request
#[derive(Debug, Deserialize)]
pub struct ModalRequest {
    pub action: ModalAction,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn not_found(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("Unknown session {}", id))
}

/// Create the API router
pub fn create_router(config: EngineConfig, services: EngineServices) -> Router {
    let state = Arc::new(AppState::new(config, services));

    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session).delete(cancel_session))
        .route("/session/:id/signal", post(push_signal))
        .route("/session/:id/answer", post(select_answer))
        .route("/session/:id/submit", post(submit))
        .route("/session/:id/modal", post(modal_action))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    let active = sessions
        .values()
        .filter(|s| !s.handle.snapshot().status.is_terminal())
        .count();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: active,
    })
}

/// Open a backend session for the exam and return its handle
async fn open_backend_session(
    state: &AppState,
    exam_id: &str,
    token: &str,
) -> Result<SessionHandle, ApiError> {
    let reply = state
        .services
        .session
        .start_session(token, exam_id)
        .await
        .map_err(|e| {
            warn!(exam_id = %exam_id, error = %e, "session start failed");
            api_error(StatusCode::BAD_GATEWAY, e.to_string())
        })?;
    let session_id = reply.session_id_string().filter(|id| !id.is_empty());
    match session_id {
        Some(id) if reply.success => Ok(SessionHandle::new(id, token)),
        _ => Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            reply
                .message
                .unwrap_or_else(|| "Session could not be started".to_string()),
        )),
    }
}

/// Start an engine for the session
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let token = req.auth_token.filter(|t| !t.is_empty());
    let handle = match (req.session_id.filter(|id| !id.is_empty()), req.exam_id, token) {
        (Some(id), _, Some(token)) => Some(SessionHandle::new(id, token)),
        (None, Some(exam_id), Some(token)) if !exam_id.is_empty() => {
            Some(open_backend_session(&state, &exam_id, &token).await?)
        }
        _ => None,
    };
    let setup = ExamSetup {
        duration: req.duration,
        total_questions: req.total_questions,
        viewport: req.viewport,
    };

    let mut sessions = state.sessions.write().await;
    if let Some(h) = handle.as_ref() {
        let finished = match sessions.get(&h.session_id) {
            Some(existing) if !existing.handle.snapshot().status.is_terminal() => {
                return Err(api_error(
                    StatusCode::CONFLICT,
                    format!("Session {} already running", h.session_id),
                ));
            }
            Some(_) => true,
            None => false,
        };
        if finished {
            sessions.remove(&h.session_id);
            debug!(session_id = %h.session_id, "replacing finished session");
        }
    }

    let (mut engine, engine_handle) =
        SessionEngine::new(state.config.clone(), handle, state.services.clone(), setup)
            .map_err(|e| match e {
                EngineError::SessionMissing => api_error(StatusCode::BAD_REQUEST, e.to_string()),
                _ => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            })?;
    // Devices live in the browser; only the exam clock runs server-side
    engine
        .spawn_producers(Producers::default())
        .map_err(|e| api_error(StatusCode::PRECONDITION_FAILED, e.to_string()))?;

    let session_id = engine_handle.snapshot().session_id;
    let task = tokio::spawn(engine.run());
    info!(session_id = %session_id, "session engine started");
    sessions.insert(
        session_id.clone(),
        Session {
            handle: engine_handle,
            task,
        },
    );

    Ok(Json(NewSessionResponse {
        session_id: session_id.clone(),
        websocket_url: format!("/ws/{}", session_id),
    }))
}

/// Get engine snapshot
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EngineSnapshot>, ApiError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or_else(|| not_found(&id))?;
    Ok(Json(session.handle.snapshot()))
}

/// Cancel and forget a session
async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| not_found(&id))?;
    session.handle.cancel();
    if let Err(e) = session.task.await {
        warn!(session_id = %id, error = %e, "engine task ended abnormally");
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn dispatch(state: &AppState, id: &str, event: EngineEvent) -> Result<StatusCode, ApiError> {
    let handle = {
        let sessions = state.sessions.read().await;
        sessions.get(id).ok_or_else(|| not_found(id))?.handle.clone()
    };
    handle
        .send(event)
        .await
        .map_err(|e| api_error(StatusCode::GONE, e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

/// Push a signal into the engine queue
async fn push_signal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(signal): Json<Signal>,
) -> Result<StatusCode, ApiError> {
    dispatch(&state, &id, EngineEvent::Signal(signal)).await
}

async fn select_answer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> Result<StatusCode, ApiError> {
    let event = EngineEvent::AnswerSelected {
        question_id: req.question_id,
        option: req.option,
    };
    dispatch(&state, &id, event).await
}

async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<SubmitRequest>>,
) -> Result<StatusCode, ApiError> {
    let answers = body.map(|Json(req)| req.answers).unwrap_or_default();
    dispatch(&state, &id, EngineEvent::SubmitRequested { answers }).await
}

async fn modal_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ModalRequest>,
) -> Result<StatusCode, ApiError> {
    dispatch(&state, &id, EngineEvent::ModalAction { action: req.action }).await
}

/// WebSocket handler for the UI command stream
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or_else(|| not_found(&id))?;
    let rx = session.handle.subscribe();
    drop(sessions);

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Forward UI commands until the engine ends or the client leaves
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<UiCommand>) {
    let (mut sender, mut receiver) = socket.split();

    let mut forward = tokio::spawn(async move {
        loop {
            let command = match rx.recv().await {
                Ok(command) => command,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging, commands skipped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let json = match serde_json::to_string(&command) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to encode ui command");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
            if command.is_terminal() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Clients only listen; anything they send except Close is ignored
    let mut inbound = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut forward => inbound.abort(),
        _ = &mut inbound => forward.abort(),
    }
}

/// Run the API server
pub async fn run_server(
    addr: &str,
    config: EngineConfig,
    services: EngineServices,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(config, services);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "ExamGuard API listening");
    println!("ExamGuard API running on {}", addr);
    println!("  POST   /session/new        - Start session engine");
    println!("  GET    /session/:id        - Engine snapshot");
    println!("  DELETE /session/:id        - Cancel engine");
    println!("  POST   /session/:id/signal - Push signal");
    println!("  POST   /session/:id/answer - Record answer");
    println!("  POST   /session/:id/submit - Submit test");
    println!("  POST   /session/:id/modal  - Modal action");
    println!("  WS     /ws/:id             - UI commands");
    println!("  GET    /health             - Health check");
    axum::serve(listener, router).await?;
    Ok(())
}
