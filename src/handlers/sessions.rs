use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    models::session::{Session, UserContext},
    state::AppState,
};

/// A session as shown to its owner. The token of other sessions is never
/// echoed back, only a short prefix to tell them apart.
#[derive(Serialize)]
pub struct SessionView {
    pub id_prefix: String,
    pub current: bool,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

const ID_PREFIX_LEN: usize = 8;

impl SessionView {
    fn new(session: Session, current_id: &str) -> Self {
        Self {
            id_prefix: session.id.chars().take(ID_PREFIX_LEN).collect(),
            current: session.id == current_id,
            created_at: session.created_at,
            last_accessed_at: session.last_accessed_at,
            expires_at: session.expires_at,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
        }
    }
}

/// Lists the caller's live sessions, most recently used first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<Vec<SessionView>>> {
    let sessions = state.sessions.get_user_sessions(user.user_id).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionView::new(s, &user.session_id))
            .collect(),
    ))
}

/// Revokes one of the caller's sessions, addressed by its id prefix.
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id_prefix): Path<String>,
) -> Result<Response> {
    if id_prefix.len() < ID_PREFIX_LEN {
        return Err(AppError::Validation(format!(
            "Session id prefix must be at least {} characters",
            ID_PREFIX_LEN
        )));
    }

    let sessions = state.sessions.get_user_sessions(user.user_id).await?;
    let mut matching = sessions.iter().filter(|s| s.id.starts_with(&id_prefix));
    let target = match (matching.next(), matching.next()) {
        (Some(session), None) => session,
        (Some(_), Some(_)) => {
            return Err(AppError::Validation("Session id prefix is ambiguous".to_string()));
        }
        (None, _) => return Err(AppError::NotFound),
    };

    state
        .sessions
        .invalidate_session(&target.id, "revoked")
        .await?;
    tracing::info!("🔒 User {} revoked one of their sessions", user.user_id);

    Ok(StatusCode::NO_CONTENT.into_response())
}
