//! Unified API router for InsightMap
//!
//! Merges the module routers into a single axum `Router` with CORS,
//! request tracing and a consistent error envelope.
//!
//! ## Endpoint Map
//!
//! | Path                         | Module     | Description                    |
//! |------------------------------|------------|--------------------------------|
//! | `/health`                    | api        | Health probe                   |
//! | `/graph`, `/graph/*`         | node       | Node CRUD, tags, whole graph   |
//! | `/generate_*`                | generation | Register a generation session  |
//! | `/request_sse`               | generation | Stream a session's fragments   |

use crate::error::Error;
use crate::generation::{generation_router, GenerationState};
use crate::node::{graph_router, GraphState};
use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete InsightMap HTTP application
pub fn build_app(
    graph_state: GraphState,
    generation_state: GenerationState,
    cors_origins: &[String],
) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(graph_router(graph_state))
        .merge(generation_router(generation_state))
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

// =============================================================================
// Error envelope
// =============================================================================

/// Error response body: `{"success": false, "error": {"code", "message"}}`
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: ApiErrorDetail,
}

/// API error detail
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// An error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                success: false,
                error: ApiErrorDetail {
                    code: code.to_string(),
                    message: message.into(),
                },
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) => Self::not_found(err.to_string()),
            Error::InvalidNodeId(_) | Error::InvalidTag(_) => Self::bad_request(err.to_string()),
            other => {
                tracing::error!("Request failed: {}", other);
                Self::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// =============================================================================
// Root handlers
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// CORS
// =============================================================================

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::CACHE_CONTROL]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}
