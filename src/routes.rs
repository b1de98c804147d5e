use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_cookies::CookieManagerLayer;

use crate::{handlers, middleware_layer, state::AppState};

/// Builds the application router.
///
/// Every route sits behind the session middleware; the configured public
/// paths pass through it unauthenticated. Transport-level layers (tracing,
/// CORS, per-IP throttling) are added by the binary.
pub fn build_router(state: AppState) -> Router {
    let login_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_login,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/sessions/{id}",
            delete(handlers::sessions::revoke_session),
        )
        .route("/api/cache/stats", get(handlers::health::cache_stats))
        .route("/api/dashboard", get(handlers::forms::dashboard))
        .route(
            "/api/forms/categories",
            get(handlers::forms::list_categories),
        )
        .route(
            "/api/forms/categories/{id}/hierarchy",
            get(handlers::forms::category_hierarchy),
        )
        .route(
            "/api/forms/cache/invalidate",
            post(handlers::forms::invalidate_form_cache),
        );

    Router::new()
        .merge(login_routes)
        .merge(api_routes)
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::session::require_session,
        ))
        .layer(CookieManagerLayer::new())
        .with_state(state)
}
