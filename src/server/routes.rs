//! HTTP API and chat page.
//!
//! Routes:
//! - GET  /                          (embedded single-page chat UI)
//! - POST /api/session               (create a session)
//! - GET  /api/session/{id}/history  (transcript as JSON)
//! - POST /api/chat                  (run one turn, streamed as SSE)
//! - POST /api/chat/cancel           (cancel the in-flight turn)
//! - GET  /health                    (status, uptime, model identity)

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chat::transcript::Turn;
use crate::chat::turn::{run_turn, FinishReason};
use crate::config::Config;
use crate::engine::generate::Generator;
use crate::model::cache::ModelHandle;
use crate::server::session::SessionStore;
use crate::server::streaming::{chat_to_sse_stream, ChatEvent};

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub model: Arc<ModelHandle>,
    pub generator: Arc<dyn Generator>,
    pub sessions: SessionStore,
    pub start_time: Instant,
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/session", post(create_session))
        .route("/api/session/{id}/history", get(session_history))
        .route("/api/chat", post(chat))
        .route("/api/chat/cancel", post(cancel_chat))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub model: ModelInfo,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub context_size: u32,
    pub file_size_bytes: u64,
}

/// Error reply with a JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("invalid session id"))
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(include_str!("../../assets/chat.html"))
}

async fn create_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let session = state.sessions.create().await;
    Json(SessionResponse {
        session_id: session.id.to_string(),
    })
}

async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| ApiError::not_found("unknown session"))?;

    Ok(Json(HistoryResponse {
        session_id: id.to_string(),
        turns: session.transcript_snapshot().await,
    }))
}

/// Run one chat turn, streaming fragments back as SSE.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let id = parse_session_id(&req.session_id)?;
    let session = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| ApiError::not_found("unknown session"))?;

    // One turn at a time per session; overlapping submissions are rejected
    // rather than queued.
    let (mut guard, cancel) = session
        .try_begin_turn()
        .ok_or_else(|| ApiError::conflict("a turn is already in flight for this session"))?;

    let request_id = Uuid::new_v4().to_string();

    info!(
        session_id = %id,
        request_id,
        chars = req.message.len(),
        "Chat turn accepted"
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let generator = Arc::clone(&state.generator);
    let generation = state.config.generation.clone();
    let task_request_id = request_id.clone();

    tokio::spawn(async move {
        let outcome = run_turn(
            &mut guard,
            generator.as_ref(),
            &generation,
            &task_request_id,
            &req.message,
            cancel,
            |text| {
                let _ = events_tx.send(ChatEvent::Delta(text.to_string()));
            },
        )
        .await;

        match outcome {
            Ok(outcome) => {
                let event = match outcome.finish {
                    FinishReason::Complete => ChatEvent::Done {
                        content: outcome.content,
                        fragments: outcome.fragments,
                        finish_reason: "stop".to_string(),
                    },
                    FinishReason::Cancelled => ChatEvent::Done {
                        content: outcome.content,
                        fragments: outcome.fragments,
                        finish_reason: "cancelled".to_string(),
                    },
                    FinishReason::Error(e) => ChatEvent::Error(e),
                };
                let _ = events_tx.send(event);
            }
            Err(e) => {
                warn!(request_id = task_request_id, "Turn failed: {e}");
                let _ = events_tx.send(ChatEvent::Error(e.to_string()));
            }
        }

        session.end_turn();
    });

    let stream = chat_to_sse_stream(events_rx, request_id);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn cancel_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, ApiError> {
    let id = parse_session_id(&req.session_id)?;
    let session = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| ApiError::not_found("unknown session"))?;

    let cancelled = session.cancel_active();
    if cancelled {
        info!(session_id = %id, "In-flight turn cancelled");
    }
    Ok(Json(CancelResponse { cancelled }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        model: ModelInfo {
            id: state.model.model_id().to_string(),
            context_size: state.model.n_ctx(),
            file_size_bytes: state.model.file_size(),
        },
        sessions: state.sessions.len().await,
    })
}
