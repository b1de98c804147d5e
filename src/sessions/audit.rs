use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::models::session::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    Login,
    Logout,
}

/// One authentication event destined for the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuthEvent {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub kind: AuthEventKind,
    pub session_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Human-readable detail, e.g. the expiry or the logout reason.
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl AuthEvent {
    pub fn new(
        kind: AuthEventKind,
        user_id: Uuid,
        tenant_id: Uuid,
        session_id: &str,
        context: Option<&RequestContext>,
        detail: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            tenant_id,
            kind,
            session_id: session_id.to_string(),
            ip_address: context.and_then(|c| c.ip_address.clone()),
            user_agent: context.and_then(|c| c.user_agent.clone()),
            detail: detail.into(),
            at,
        }
    }
}

/// Sink for authentication audit events.
///
/// Callers treat delivery as fire-and-forget: an error is logged and the
/// session operation carries on.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log_auth_event(&self, event: AuthEvent) -> Result<()>;
}

/// Writes audit events to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log_auth_event(&self, event: AuthEvent) -> Result<()> {
        tracing::info!(
            target: "audit",
            kind = ?event.kind,
            user_id = %event.user_id,
            tenant_id = %event.tenant_id,
            ip = event.ip_address.as_deref().unwrap_or("unknown"),
            at = %event.at.to_rfc3339(),
            "{}",
            event.detail
        );
        Ok(())
    }
}

/// Keeps events in memory so they can be inspected.
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    events: Mutex<Vec<AuthEvent>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the events recorded so far.
    pub async fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditLogger for MemoryAuditLogger {
    async fn log_auth_event(&self, event: AuthEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
