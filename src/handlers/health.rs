use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{
    error::Result,
    models::cache::{CacheHealth, CacheStats, HealthStatus},
    state::AppState,
};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: bool,
    pub cache: CacheHealth,
}

/// Liveness and dependency status. Answers 503 when the session store is
/// down, since no authenticated request can succeed then. A degraded or
/// unreachable cache only lowers the reported status.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, cache) = tokio::join!(state.sessions.store_healthy(), state.cache.health_check());

    let (status, code) = if database {
        (cache.status, StatusCode::OK)
    } else {
        (HealthStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE)
    };

    (code, Json(HealthResponse { status, database, cache }))
}

pub async fn cache_stats(State(state): State<AppState>) -> Result<Json<CacheStats>> {
    Ok(Json(state.cache.get_stats().await?))
}
