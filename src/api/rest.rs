// =============================================================================
// REST API Endpoints: Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/` and return JSON. Admitted responses
// carry the same `X-RateLimit-*` headers as 429 rejections.
//
// CORS is configured permissively; the dashboard is served from another
// origin.
// =============================================================================

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Json, Path, Query, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api::client_key::ClientKey;
use crate::app_state::AppState;
use crate::error::{quota_headers, ApiError};
use crate::orchestrator::{Served, StoreStats};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS, request tracing and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        tracing::info_span!(
            "http_request",
            request_id = %Uuid::new_v4(),
            method = %req.method(),
            uri = %req.uri(),
        )
    });

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/crypto", get(market_snapshot))
        .route("/api/v1/indicators/:symbol", get(indicators))
        .route("/api/v1/indicators/:symbol/computed", get(computed_indicators))
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

/// Serialize `served.body` with the quota headers attached.
fn with_quota<T: Serialize>(served: Served<T>) -> Response {
    (quota_headers(&served.quota), Json(served.body)).into_response()
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
    uptime_secs: i64,
    stores: StoreStats,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        server_time: state.now_ms(),
        uptime_secs: state.uptime_secs(),
        stores: state.store_stats(),
    })
}

// =============================================================================
// Market snapshot
// =============================================================================

/// Raw pagination values; clamping happens in the orchestrator so that
/// malformed numbers fall back to defaults instead of failing extraction.
#[derive(Debug, Deserialize)]
struct SnapshotQuery {
    page: Option<String>,
    per_page: Option<String>,
}

async fn market_snapshot(
    State(state): State<Arc<AppState>>,
    ClientKey(key): ClientKey,
    Query(query): Query<SnapshotQuery>,
) -> Result<Response, ApiError> {
    let served = state
        .orchestrator
        .market_snapshot(&key, query.page.as_deref(), query.per_page.as_deref())
        .await?;
    Ok(with_quota(served))
}

// =============================================================================
// Indicators
// =============================================================================

async fn indicators(
    State(state): State<Arc<AppState>>,
    ClientKey(key): ClientKey,
    Path(symbol): Path<String>,
) -> Result<Response, ApiError> {
    let served = state.orchestrator.indicators(&key, &symbol).await?;
    Ok(with_quota(served))
}

#[derive(Debug, Deserialize)]
struct ComputedQuery {
    mode: Option<String>,
}

async fn computed_indicators(
    State(state): State<Arc<AppState>>,
    ClientKey(key): ClientKey,
    Path(symbol): Path<String>,
    Query(query): Query<ComputedQuery>,
) -> Result<Response, ApiError> {
    let served = state
        .orchestrator
        .computed_indicators(&key, &symbol, query.mode.as_deref())
        .await?;
    Ok(with_quota(served))
}
