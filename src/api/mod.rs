use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use validator::Validate;

use crate::database::ManifestEntry;
use crate::llm::{ChatSession, ConversationTurn};
use crate::startup::Assistant;

#[derive(Clone)]
pub struct AppState {
    assistant: Arc<Assistant>,
    session: Arc<Mutex<ChatSession>>,
}

#[derive(Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000))]
    message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    response: String,
    citations: Vec<String>,
    is_error: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    index: String,
    entries: usize,
    model: String,
    agent_state: String,
}

#[derive(Serialize)]
struct ApiResponse {
    status: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiResponse>)>;

fn api_error(code: StatusCode, status: impl Into<String>) -> (StatusCode, Json<ApiResponse>) {
    (code, Json(ApiResponse { status: status.into() }))
}

/// Create and configure the API router
pub fn create_api(assistant: Arc<Assistant>) -> Router {
    let state = AppState {
        session: Arc::new(Mutex::new(assistant.session())),
        assistant,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/history", get(history_handler).delete(clear_handler))
        .route("/documents", get(documents_handler))
        .route("/health", get(health_check))
        .layer(ConcurrencyLimitLayer::new(16))
        .layer(cors)
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if let Err(e) = request.validate() {
        return api_error(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e)).into_response();
    }
    if request.message.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "Message must not be blank").into_response();
    }

    // One question at a time: later requests wait for the session
    let mut session = state.session.lock().await;
    let turn = session.ask(&request.message).await;
    log::info!("Answered API question ({} citations)", turn.citations.len());

    Json(ChatResponse {
        response: turn.text.clone(),
        citations: turn.citations.clone(),
        is_error: turn.is_error,
    })
    .into_response()
}

async fn history_handler(State(state): State<AppState>) -> Json<Vec<ConversationTurn>> {
    let session = state.session.lock().await;
    Json(session.history().to_vec())
}

async fn clear_handler(State(state): State<AppState>) -> StatusCode {
    state.session.lock().await.clear();
    StatusCode::NO_CONTENT
}

async fn documents_handler(State(state): State<AppState>) -> Json<Vec<ManifestEntry>> {
    Json(state.assistant.knowledge.documents())
}

async fn health_check(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let knowledge = &state.assistant.knowledge;
    let entries = knowledge
        .entry_count()
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        index: knowledge.index().backend_name().to_string(),
        entries,
        model: state.assistant.model_info.clone(),
        agent_state: format!("{:?}", state.assistant.agent.state()),
    }))
}
