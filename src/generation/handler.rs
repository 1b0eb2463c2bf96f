//! HTTP handlers for generation sessions
//!
//! A client first registers a task with one of the `POST /generate_*`
//! endpoints, then attaches to `GET /request_sse?session_id=` to drain it.

use crate::api::ApiError;
use crate::generation::pipeline::StreamPipeline;
use crate::generation::GenerationTask;
use crate::session::SessionRegistry;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Shared state for generation handlers
#[derive(Clone)]
pub struct GenerationState {
    pub pipeline: Arc<StreamPipeline>,
    pub registry: Arc<SessionRegistry<GenerationTask>>,
}

/// Create the generation router
pub fn generation_router(state: GenerationState) -> Router {
    Router::new()
        .route("/generate_tree", post(generate_tree))
        .route("/generate_answer", post(generate_answer))
        .route("/generate_recommendations", post(generate_recommendations))
        .route("/request_sse", get(request_sse))
        .with_state(state)
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Deserialize)]
struct TreeRequest {
    selection: String,
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    question: String,
    #[serde(default)]
    system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecommendationRequest {
    node_name: String,
    node_content: String,
}

#[derive(Debug, Deserialize)]
struct SseQuery {
    session_id: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /generate_tree
async fn generate_tree(
    State(state): State<GenerationState>,
    Json(request): Json<TreeRequest>,
) -> impl IntoResponse {
    let task = state.pipeline.tree_of_abstraction(&request.selection);
    let session_id = state.registry.create(task).await;
    Json(serde_json::json!({
        "session_id": session_id,
        "selection": request.selection,
    }))
}

/// POST /generate_answer
async fn generate_answer(
    State(state): State<GenerationState>,
    Json(request): Json<AnswerRequest>,
) -> impl IntoResponse {
    let task = state
        .pipeline
        .answer_question(&request.question, request.system_prompt.as_deref());
    let session_id = state.registry.create(task).await;
    Json(serde_json::json!({
        "session_id": session_id,
        "question": request.question,
    }))
}

/// POST /generate_recommendations
async fn generate_recommendations(
    State(state): State<GenerationState>,
    Json(request): Json<RecommendationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .pipeline
        .recommend(&request.node_name, &request.node_content)
        .await?;
    let session_id = state.registry.create(task).await;
    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "node_name": request.node_name,
    })))
}

/// GET /request_sse?session_id=
async fn request_sse(
    State(state): State<GenerationState>,
    Query(query): Query<SseQuery>,
) -> Response {
    let Some(session_id) = query.session_id else {
        return session_not_found();
    };

    let task = match state.registry.consume(&session_id).await {
        Ok(task) => task,
        Err(_) => return session_not_found(),
    };

    let events = state.pipeline.drive(task, session_id).map(|event| {
        Ok::<_, Infallible>(
            Event::default()
                .event(event.event_name())
                .data(event.data()),
        )
    });

    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("keep-alive"))
        .into_response()
}

fn session_not_found() -> Response {
    (StatusCode::NOT_FOUND, "Session not found").into_response()
}
