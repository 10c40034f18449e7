//! `/chat` SSE endpoint and `/health` — spec §4.9, §6.
//!
//! Grounded on the teacher's `create_router`/`build_cors_layer` pattern
//! (`crates/server/src/http.rs`) for router construction, and on
//! `examples/other_examples/.../mira-chat-src-server.rs.rs`'s
//! `Sse`/tagged-event-enum usage for the streaming response itself — the
//! teacher's own chat endpoint is WebSocket-based, so SSE has no teacher
//! counterpart to adapt.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use medrag_agent::Orchestrator;
use medrag_core::{check_ownership, ErrorCode, SessionStore, StreamEvent};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::auth_middleware;
use crate::ServerError;

/// 30s wall-clock budget for one turn, spec §4.9 step 6.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);
/// Backpressure buffer between the orchestrator and the SSE writer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub session_store: Arc<dyn SessionStore>,
    pub auth_token: Arc<medrag_core::AuthToken>,
}

pub fn create_router(state: AppState, cors_origins: &[String], cors_enabled: bool) -> Router {
    let cors_layer = build_cors_layer(cors_origins, cors_enabled);

    // The chat route streams SSE and must not be buffered by compression, so
    // CompressionLayer is scoped to the health route only.
    let chat_routes = Router::new()
        .route("/chat", post(chat_handler))
        .route_layer(axum::middleware::from_fn_with_state(state.auth_token.clone(), auth_middleware));

    let health_routes = Router::new().route("/health", get(health_handler)).layer(CompressionLayer::new());

    health_routes
        .merge(chat_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled — allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if parsed.is_empty() {
        tracing::warn!("no valid CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_credentials(true)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    user_id: String,
    session_id: Option<Uuid>,
    message: String,
}

impl ChatRequest {
    fn validate(&self) -> Result<(), ServerError> {
        if self.user_id.trim().is_empty() {
            return Err(ServerError::Validation("user_id must not be empty".into()));
        }
        let len = self.message.chars().count();
        if !(1..=5000).contains(&len) {
            return Err(ServerError::Validation("message must be 1..=5000 characters".into()));
        }
        Ok(())
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    request.validate().map_err(StatusCode::from)?;

    let session_id = match request.session_id {
        Some(id) => {
            // Verify ownership before a single byte of the SSE response
            // goes out — spec §4.9 step 3. A session fetched here only to
            // establish the precondition; the orchestrator fetches it
            // again (and re-checks) once the turn actually runs.
            let session = state.session_store.get(id).await.map_err(session_error)?;
            check_ownership(&session, &request.user_id).map_err(session_error)?;
            id
        }
        None => state.session_store.create(request.user_id.clone()).await.id,
    };

    let (events_tx, events_rx) = mpsc::channel::<StreamEvent>(EVENT_CHANNEL_CAPACITY);
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

    let orchestrator = state.orchestrator.clone();
    let user_id = request.user_id.clone();
    let message = request.message.clone();
    tokio::spawn(async move {
        let turn = orchestrator.handle_turn(session_id, &user_id, message, events_tx.clone(), cancel_rx);
        match tokio::time::timeout(REQUEST_DEADLINE, turn).await {
            Ok(Ok(())) => {}
            Ok(Err(medrag_agent::AgentError::Cancelled)) => {
                let _ = events_tx.send(StreamEvent::cancelled()).await;
            }
            Ok(Err(err)) => {
                let _ = events_tx.send(StreamEvent::error(map_error_code(&err), err.to_string())).await;
            }
            Err(_) => {
                let _ = events_tx
                    .send(StreamEvent::error(ErrorCode::TimeoutError, "request deadline exceeded"))
                    .await;
            }
        }
    });

    let stream = event_stream(events_rx, cancel_tx);
    let response = Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));

    Ok((
        [
            ("Cache-Control".to_string(), "no-cache".to_string()),
            ("X-Accel-Buffering".to_string(), "no".to_string()),
            ("X-Session-Id".to_string(), session_id.to_string()),
        ],
        response,
    ))
}

/// Drains `rx` into SSE frames. `cancel_tx` is held for the generator's
/// whole lifetime and never sent on explicitly — axum drops this future
/// when the client disconnects, which drops `cancel_tx`, which is the
/// signal `Orchestrator::handle_turn` races its work against.
fn event_stream(
    mut rx: mpsc::Receiver<StreamEvent>,
    cancel_tx: oneshot::Sender<()>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let _cancel_guard = cancel_tx;
        while let Some(event) = rx.recv().await {
            let is_terminal = event.is_terminal();
            let payload = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(payload));
            if is_terminal {
                break;
            }
        }
    }
}

fn session_error(err: medrag_core::SessionError) -> StatusCode {
    use medrag_core::SessionError;
    let server_err = match err {
        SessionError::OwnershipViolation => ServerError::OwnershipViolation,
        SessionError::Missing | SessionError::Expired => ServerError::SessionMissing,
    };
    StatusCode::from(server_err)
}

fn map_error_code(err: &medrag_agent::AgentError) -> ErrorCode {
    use medrag_agent::AgentError;
    match err {
        AgentError::Retrieval(_) => ErrorCode::RetrievalError,
        AgentError::Timeout => ErrorCode::TimeoutError,
        AgentError::Llm(_) | AgentError::Classification(_) | AgentError::Conversation(_) => {
            ErrorCode::ProcessingError
        }
        // A race lost to the orchestrator's own re-check (session expired
        // or was deleted between the pre-stream check above and the turn
        // actually running): the stream already started, so this can only
        // surface as a mid-stream error event, not a status code.
        AgentError::OwnershipViolation | AgentError::SessionUnavailable => ErrorCode::InternalError,
        // Intercepted separately in chat_handler's spawn (StreamEvent::cancelled
        // instead); kept here only for exhaustiveness.
        AgentError::Cancelled => ErrorCode::InternalError,
    }
}
