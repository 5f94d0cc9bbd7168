//! HTTP search API.
//!
//! Serves the query endpoint consumed by the web front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search?query=<q>&offset=<n>` | One batch of rendered results |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/search` answers `{ "html": "...", "n_results": 3 }`, where `n_results`
//! counts the results in this batch only.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "offset must be a non-negative integer" } }
//! ```
//!
//! Error codes: `bad_request` (400), `search_failed` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the front end can be
//! served from anywhere.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::index::connect_index;
use crate::query::{QueryService, SearchResponse};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
}

/// Build the router. Split from [`run_server`] so tests can drive it directly.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(handle_search))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Connect to the search backend and serve until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let index = connect_index(config).await?;
    let state = AppState {
        query: Arc::new(QueryService::new(Arc::new(index), config.query.clone())),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "search API listening");
    println!("Search API listening on http://{}", config.server.bind);
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn search_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "search_failed".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /search ============

/// Query string of `GET /search`. `offset` is parsed by hand so a bad value
/// gets the JSON error body.
#[derive(Deserialize)]
struct SearchParams {
    query: Option<String>,
    offset: Option<String>,
}

fn parse_offset(raw: Option<&str>) -> Result<usize, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0),
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| bad_request(format!("offset must be a non-negative integer, got '{}'", s))),
    }
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let offset = parse_offset(params.offset.as_deref())?;
    let query = params.query.unwrap_or_default();

    let page = state.query.serve_search(&query, offset).await.map_err(|e| {
        error!(query = %query, offset, error = %e, "search failed");
        search_failed(format!("{:#}", e))
    })?;
    Ok(Json(page.to_response()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets() {
        assert_eq!(parse_offset(None).ok(), Some(0));
        assert_eq!(parse_offset(Some("")).ok(), Some(0));
        assert_eq!(parse_offset(Some(" 50 ")).ok(), Some(50));
        assert!(parse_offset(Some("-1")).is_err());
        assert!(parse_offset(Some("ten")).is_err());
    }
}
