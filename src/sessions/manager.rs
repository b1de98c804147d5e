use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cache::{CacheStore, keys};
use crate::config::{IpMismatchPolicy, SessionConfig};
use crate::crypto::token::generate_session_id;
use crate::error::{AppError, Result};
use crate::models::session::{InvalidReason, RequestContext, Session, SessionValidation};
use crate::sessions::audit::{AuditLogger, AuthEvent, AuthEventKind};
use crate::sessions::clock::{Clock, SystemClock};
use crate::sessions::store::SessionStore;

/// Logout reason recorded when the concurrency cap evicts a session.
pub const REASON_SESSION_LIMIT: &str = "concurrent_session_limit";
/// Logout reason recorded when an access finds the session expired.
pub const REASON_EXPIRED: &str = "expired";

/// Owns the session lifecycle. It is the only component that flips
/// `is_active` or moves `expires_at`.
///
/// Every validation re-reads the store; nothing about a session is kept in
/// process between requests. Operations on the same session id are not
/// serialized: concurrent validations race on the access/expiry write and
/// the last writer wins, which is harmless since both only extend the same
/// session.
///
/// The per-user cap is soft. Two logins racing for the same user can both
/// see room and leave the user one or more sessions over the cap until the
/// next login trims them. The sweep logs how many users are over.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditLogger>,
    clock: Arc<dyn Clock>,
    mirror: Option<CacheStore>,
    config: SessionConfig,
}

impl SessionManager {
    /// Creates a new `SessionManager` on the system clock.
    pub fn new(
        store: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditLogger>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            audit,
            clock: Arc::new(SystemClock),
            mirror: None,
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mirrors live sessions into the cache under `userSession:<id>`.
    /// The mirror is a hint for other readers; validation never uses it.
    pub fn with_cache_mirror(mut self, cache: CacheStore) -> Self {
        self.mirror = Some(cache);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs a store call under the store timeout, mapping any failure to
    /// [`AppError::SessionStore`].
    async fn guarded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!("❌ Session store {} failed: {}", op, e);
                Err(AppError::SessionStore(format!("{}: {}", op, e)))
            }
            Err(_) => {
                tracing::error!(
                    "❌ Session store {} timed out after {:?}",
                    op,
                    self.config.store_timeout
                );
                Err(AppError::SessionStore(format!("{}: timed out", op)))
            }
        }
    }

    async fn emit(&self, event: AuthEvent) {
        if let Err(e) = self.audit.log_auth_event(event).await {
            tracing::warn!("⚠️ Audit event dropped: {}", e);
        }
    }

    async fn mirror(&self, session: &Session) {
        let Some(cache) = &self.mirror else {
            return;
        };
        if let Err(e) = cache
            .set_expire_at(&keys::user_session(&session.id), session, session.expires_at)
            .await
        {
            tracing::debug!("Session mirror write skipped: {}", e);
        }
    }

    async fn forget(&self, session_id: &str) {
        let Some(cache) = &self.mirror else {
            return;
        };
        if let Err(e) = cache.delete(&keys::user_session(session_id)).await {
            tracing::debug!("Session mirror delete skipped: {}", e);
        }
    }

    /// Opens a new session for an authenticated user.
    ///
    /// Before inserting, the user's oldest active sessions are invalidated
    /// so that at most `max_concurrent_sessions - 1` remain besides the new
    /// one.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        context: &RequestContext,
    ) -> Result<Session> {
        let now = self.clock.now();

        let active = self
            .guarded("find_active_by_user", self.store.find_active_by_user(user_id))
            .await?;
        let keep = self.config.max_concurrent_sessions.saturating_sub(1);
        if active.len() > keep {
            let evicted = &active[keep..];
            let ids: Vec<String> = evicted.iter().map(|s| s.id.clone()).collect();
            let count = self
                .guarded("bulk_invalidate", self.store.bulk_invalidate(&ids, now))
                .await?;
            tracing::info!(
                "♻️ Evicted {} session(s) for user {} (limit {})",
                count,
                user_id,
                self.config.max_concurrent_sessions
            );

            for session in evicted {
                self.forget(&session.id).await;
                self.emit(AuthEvent::new(
                    AuthEventKind::Logout,
                    session.user_id,
                    session.tenant_id,
                    &session.id,
                    Some(context),
                    REASON_SESSION_LIMIT,
                    now,
                ))
                .await;
            }
        }

        let session = Session {
            id: generate_session_id()?,
            user_id,
            tenant_id,
            created_at: now,
            last_accessed_at: now,
            expires_at: now + self.config.max_age,
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            is_active: true,
            invalidated_at: None,
            metadata: None,
        };

        self.guarded("insert", self.store.insert(&session)).await?;
        self.mirror(&session).await;

        self.emit(AuthEvent::new(
            AuthEventKind::Login,
            user_id,
            tenant_id,
            &session.id,
            Some(context),
            format!("session created, expires at {}", session.expires_at.to_rfc3339()),
            now,
        ))
        .await;

        tracing::info!("✅ Session created for user {} (tenant {})", user_id, tenant_id);
        Ok(session)
    }

    /// Validates a session token and slides its expiry when it is close to
    /// running out.
    ///
    /// The access time and the (possibly renewed) expiry are written in one
    /// conditional update. If the row was invalidated after it was read, the
    /// update matches nothing and the session is reported as invalidated.
    pub async fn validate_session(
        &self,
        session_id: &str,
        context: &RequestContext,
    ) -> Result<SessionValidation> {
        let now = self.clock.now();

        let Some(mut session) = self
            .guarded("find_active_by_id", self.store.find_active_by_id(session_id))
            .await?
        else {
            return Ok(SessionValidation::Invalid(InvalidReason::NotFound));
        };

        if session.is_expired_at(now) {
            let transitioned = self
                .guarded("invalidate", self.store.invalidate(session_id, now))
                .await?;
            if transitioned {
                tracing::info!("⌛ Session expired for user {}", session.user_id);
                self.forget(session_id).await;
                self.emit(AuthEvent::new(
                    AuthEventKind::Logout,
                    session.user_id,
                    session.tenant_id,
                    session_id,
                    Some(context),
                    REASON_EXPIRED,
                    now,
                ))
                .await;
            }
            return Ok(SessionValidation::Invalid(InvalidReason::Expired));
        }

        if let (Some(stored), Some(observed)) = (&session.ip_address, &context.ip_address) {
            if stored != observed {
                match self.config.ip_mismatch_policy {
                    IpMismatchPolicy::Ignore => {}
                    IpMismatchPolicy::Warn => {
                        tracing::warn!(
                            "⚠️ Session for user {} used from {} (created from {})",
                            session.user_id,
                            observed,
                            stored
                        );
                    }
                    IpMismatchPolicy::Reject => {
                        tracing::warn!(
                            "❌ Rejected session for user {} used from {} (created from {})",
                            session.user_id,
                            observed,
                            stored
                        );
                        return Ok(SessionValidation::Invalid(InvalidReason::IpMismatch));
                    }
                }
            }
        }

        let expires_at = self.renewed_expiry(session.expires_at, now);
        let renewed = expires_at != session.expires_at;

        let updated = self
            .guarded(
                "update_access_and_expiry",
                self.store.update_access_and_expiry(session_id, now, expires_at),
            )
            .await?;
        if !updated {
            tracing::debug!("Session invalidated while validating for user {}", session.user_id);
            return Ok(SessionValidation::Invalid(InvalidReason::Invalidated));
        }

        session.last_accessed_at = now;
        session.expires_at = expires_at;
        if renewed {
            tracing::debug!("🔄 Session renewed for user {}", session.user_id);
            self.mirror(&session).await;
        }

        Ok(SessionValidation::Valid { session, renewed })
    }

    /// The expiry after an access at `now`: pushed to `now + max_age` when
    /// less than the renewal threshold remains, never moved backwards.
    fn renewed_expiry(&self, current: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        if current - now < self.config.renewal_threshold {
            current.max(now + self.config.max_age)
        } else {
            current
        }
    }

    /// Ends a session. Missing or already-inactive sessions are a no-op.
    pub async fn invalidate_session(&self, session_id: &str, reason: &str) -> Result<()> {
        let now = self.clock.now();

        let Some(session) = self
            .guarded("find_active_by_id", self.store.find_active_by_id(session_id))
            .await?
        else {
            return Ok(());
        };

        let transitioned = self
            .guarded("invalidate", self.store.invalidate(session_id, now))
            .await?;
        if !transitioned {
            return Ok(());
        }

        self.forget(session_id).await;
        self.emit(AuthEvent::new(
            AuthEventKind::Logout,
            session.user_id,
            session.tenant_id,
            session_id,
            None,
            reason,
            now,
        ))
        .await;

        tracing::info!("👋 Session closed for user {} ({})", session.user_id, reason);
        Ok(())
    }

    /// Removes expired and inactive rows. Failures are logged and count as
    /// zero removals; the next run will pick the rows up.
    pub async fn cleanup_expired_sessions(&self) -> u64 {
        let now = self.clock.now();

        let removed = match self
            .guarded(
                "delete_expired_or_inactive",
                self.store.delete_expired_or_inactive(now),
            )
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!("❌ Session cleanup skipped: {}", e);
                return 0;
            }
        };

        match self
            .guarded(
                "count_users_over_cap",
                self.store
                    .count_users_over_cap(self.config.max_concurrent_sessions, now),
            )
            .await
        {
            Ok(0) => {}
            Ok(over) => tracing::warn!(
                "⚠️ {} user(s) above the limit of {} concurrent sessions",
                over,
                self.config.max_concurrent_sessions
            ),
            Err(e) => tracing::debug!("Session cap check skipped: {}", e),
        }

        tracing::info!("🧹 Removed {} expired or inactive session(s)", removed);
        removed
    }

    /// Live sessions of a user, most recently used first.
    pub async fn get_user_sessions(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let now = self.clock.now();
        let mut sessions: Vec<Session> = self
            .guarded("find_active_by_user", self.store.find_active_by_user(user_id))
            .await?
            .into_iter()
            .filter(|s| !s.is_expired_at(now))
            .collect();
        sessions.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(sessions)
    }

    /// Whether the session store answers.
    pub async fn store_healthy(&self) -> bool {
        self.guarded("ping", self.store.ping()).await.is_ok()
    }
}
