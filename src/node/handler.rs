//! HTTP handlers for nodes and the graph
//!
//! - GET    /graph                 whole graph `{nodes, edges}`
//! - GET    /graph/:name           one node's content
//! - DELETE /graph/:name           delete a node
//! - POST   /graph/saveNode/:name  create/overwrite content, keeping tags
//! - POST   /graph/renameNode      rename a node
//! - POST   /graph/tagNode         add tags
//! - POST   /graph/removeTag       remove one tag

use crate::api::ApiError;
use crate::graph::GraphBuilder;
use crate::node::NodeStore;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Shared state for node handlers
#[derive(Clone)]
pub struct GraphState {
    pub store: NodeStore,
    pub builder: GraphBuilder,
}

/// Create the graph router with all node endpoints
pub fn graph_router(state: GraphState) -> Router {
    Router::new()
        .route("/graph", get(fetch_graph))
        .route("/graph/:name", get(read_node).delete(delete_node))
        .route("/graph/saveNode/:name", post(save_node))
        .route("/graph/renameNode", post(rename_node))
        .route("/graph/tagNode", post(tag_node))
        .route("/graph/removeTag", post(remove_tag))
        .with_state(state)
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Deserialize)]
struct SaveNodeRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameNodeRequest {
    old_node_name: String,
    new_node_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagNodeRequest {
    node_name: String,
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveTagRequest {
    node_name: String,
    tag: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /graph
async fn fetch_graph(State(state): State<GraphState>) -> Result<impl IntoResponse, ApiError> {
    let graph = state.builder.build_graph().await?;
    Ok(Json(graph))
}

/// GET /graph/:name
async fn read_node(
    State(state): State<GraphState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let node = state.store.read(&name).await?;
    Ok(Json(serde_json::json!({"success": true, "content": node.content})))
}

/// DELETE /graph/:name
async fn delete_node(
    State(state): State<GraphState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.remove(&name).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

/// POST /graph/saveNode/:name
async fn save_node(
    State(state): State<GraphState>,
    Path(name): Path<String>,
    Json(request): Json<SaveNodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.save_content(&name, &request.content).await?;
    Ok(Json(serde_json::json!({"success": true, "nodename": name})))
}

/// POST /graph/renameNode
async fn rename_node(
    State(state): State<GraphState>,
    Json(request): Json<RenameNodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .rename(&request.old_node_name, &request.new_node_name)
        .await?;
    Ok(Json(serde_json::json!({"status": "Node renamed"})))
}

/// POST /graph/tagNode
async fn tag_node(
    State(state): State<GraphState>,
    Json(request): Json<TagNodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = state.store.add_tags(&request.node_name, &request.tags).await?;
    Ok(Json(serde_json::json!({"status": "Tag added", "tags": tags})))
}

/// POST /graph/removeTag
async fn remove_tag(
    State(state): State<GraphState>,
    Json(request): Json<RemoveTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = state.store.remove_tag(&request.node_name, &request.tag).await?;
    Ok(Json(serde_json::json!({"status": "Tag removed", "tags": tags})))
}
