use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents one authenticated client session.
///
/// `is_active` only ever moves from `true` to `false`. Once a row is
/// invalidated it is never validated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque, unguessable token.
    pub id: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub invalidated_at: Option<DateTime<Utc>>,
    /// Free-form data attached by the caller.
    pub metadata: Option<serde_json::Value>,
}

impl Session {
    /// Whether the session is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Client details observed on the current request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Why a session token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// No active row carries this id.
    NotFound,
    /// The row was active but past its expiry; it has now been invalidated.
    Expired,
    /// The client IP differs from the one the session was created from.
    IpMismatch,
    /// The row was invalidated while this request was validating it.
    Invalidated,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvalidReason::NotFound => "session not found",
            InvalidReason::Expired => "session expired",
            InvalidReason::IpMismatch => "client address mismatch",
            InvalidReason::Invalidated => "session invalidated",
        };
        f.write_str(text)
    }
}

/// The outcome of validating a session token.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionValidation {
    /// `renewed` is set when this validation moved `expires_at` forward.
    Valid { session: Session, renewed: bool },
    Invalid(InvalidReason),
}

/// The identity attached to a request once its session has been validated.
///
/// `roles` and `permissions` are populated by the authorization layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub session_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl From<&Session> for UserContext {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            tenant_id: session.tenant_id,
            session_id: session.id.clone(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }
}
