use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::session::{session_cookie, ClientContext},
    models::session::UserContext,
    services::auth as auth_service,
    state::AppState,
};

/// The request payload for user login.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(skip)]
    pub tenant_id: Uuid,
    #[garde(length(min = 3, max = 255))]
    pub username: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("tenant_id", &self.tenant_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub session_id: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// The response payload for simple acknowledgements.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    ClientContext(context): ClientContext,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt - Payload: {:?}", payload);
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = auth_service::authenticate_user(
        state.users.as_ref(),
        payload.tenant_id,
        &payload.username,
        &payload.password,
    )
    .await?;

    let session = state
        .sessions
        .create_session(user.id, user.tenant_id, &context)
        .await?;

    cookies.add(session_cookie(state.sessions.config(), session.id.clone()));
    tracing::info!("✅ User logged in: {}", user.id);

    let response = LoginResponse {
        session_id: session.id,
        user_id: session.user_id,
        tenant_id: session.tenant_id,
        expires_at: session.expires_at,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles user logout.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", user.user_id);

    state
        .sessions
        .invalidate_session(&user.session_id, "logout")
        .await?;

    let mut cookie = Cookie::new(state.sessions.config().cookie_name.clone(), "");
    cookie.set_max_age(Duration::seconds(0));
    cookie.set_path("/");
    cookies.remove(cookie);

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
