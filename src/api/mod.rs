//! HTTP API for health checks, status, and monitoring

use crate::chain::ChainManager;
use crate::config::ApiConfig;
use crate::coordination::Orchestrator;
use crate::state::{StoredSwap, SwapStats, SwapStore};
use crate::swap::parse_hex32;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SwapStore>,
    pub chains: Arc<ChainManager>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/chains", get(get_chains))
        .route("/stats", get(get_stats))
        .route("/swaps/:id", get(get_swap))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - store and every native chain must respond
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Store health check failed: {}", e);
            false
        }
    };

    let chain_health = state.chains.health_check().await;
    let chains_ok = chain_health.iter().all(|(_, healthy)| *healthy);
    let ready = store_ok && chains_ok;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            store: store_ok,
            chains: chains_ok,
            details: chain_health
                .into_iter()
                .map(|(chain, healthy)| ChainHealth { chain, healthy })
                .collect(),
        }),
    )
}

/// Get registered native chains
async fn get_chains(State(state): State<AppState>) -> impl IntoResponse {
    Json(ChainsResponse {
        address: state.orchestrator.address().to_string(),
        chains: state.chains.connected_chains(),
    })
}

/// Get swap statistics
async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let swaps = state.store.stats().await.map_err(ApiError::internal)?;
    Ok(Json(StatsResponse {
        swaps,
        queued_events: state.orchestrator.queue_depth(),
    }))
}

/// Get one swap by its hex id
async fn get_swap(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredSwap>, ApiError> {
    let swap_id = parse_hex32(&id).ok_or_else(|| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: format!("invalid swap id {}", id),
    })?;

    let swaps = state.store.list().await.map_err(ApiError::internal)?;
    swaps
        .into_iter()
        .find(|s| s.swap.id == swap_id)
        .map(Json)
        .ok_or_else(|| ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("swap {} not found", id),
        })
}

/// Error body returned by failing handlers
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(err: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    store: bool,
    chains: bool,
    details: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain: String,
    healthy: bool,
}

#[derive(Serialize)]
struct ChainsResponse {
    address: String,
    chains: Vec<String>,
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    swaps: SwapStats,
    queued_events: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}
