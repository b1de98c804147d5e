use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    cache::keys,
    error::AppError,
    middleware_layer::session::client_ip,
    state::AppState,
};

/// A middleware that rate limits failed login attempts per client address.
///
/// Failures count towards `rateLimit:login:<ip>`; the window starts with the
/// first failure. A successful login clears the counter. When the cache is
/// unreachable, requests are let through.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`, or a 429 once the limit is reached.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let ip = client_ip(&parts).unwrap_or_else(|| "unknown".to_string());
    let key = keys::rate_limit("login", &ip);
    let limit = state.config.login_rate_limit;
    let window = state.config.login_rate_window_secs;

    if let Some(attempts) = state.cache.get_counter(&key).await {
        if attempts >= limit {
            return AppError::RateLimitExceeded(format!(
                "Too many failed login attempts. Try again in {} minutes",
                (window / 60).max(1)
            ))
            .into_response();
        }
    }

    let response = next.run(Request::from_parts(parts, body)).await;

    if response.status().is_client_error() {
        match state.cache.increment(&key, 1, Some(window)).await {
            Ok(attempts) => tracing::debug!("Failed login {} of {} from {}", attempts, limit, ip),
            Err(e) => tracing::warn!("⚠️ Login attempt not counted for {}: {}", ip, e),
        }
    } else if response.status().is_success() {
        if let Err(e) = state.cache.delete(&key).await {
            tracing::warn!("⚠️ Login counter not cleared for {}: {}", ip, e);
        }
    }

    response
}
