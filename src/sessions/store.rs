use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::session::Session;

/// Persistence for session rows. The store is the source of truth for
/// whether a session exists and when it expires.
///
/// Both mutating calls that touch a single row are conditioned on the row
/// still being active, so an invalidated session can never be brought back
/// by a concurrent access update.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<()>;

    async fn find_active_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Writes the access time and expiry of an active row. Returns `false`
    /// when no active row matched.
    async fn update_access_and_expiry(
        &self,
        id: &str,
        last_accessed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Marks an active row inactive. Returns `false` when it was already
    /// inactive or missing.
    async fn invalidate(&self, id: &str, invalidated_at: DateTime<Utc>) -> Result<bool>;

    /// Active rows of a user, newest `created_at` first.
    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Vec<Session>>;

    /// Invalidates the listed rows that are still active.
    async fn bulk_invalidate(&self, ids: &[String], invalidated_at: DateTime<Utc>) -> Result<u64>;

    /// Physically removes rows that are expired or inactive.
    async fn delete_expired_or_inactive(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Number of users holding more than `cap` live sessions.
    async fn count_users_over_cap(&self, cap: usize, now: DateTime<Utc>) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

/// Session rows kept in process memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    rows: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any row by id, active or not.
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.rows.read().await.get(id).cloned()
    }

    /// Number of rows, active or not.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<()> {
        self.rows
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<Session>> {
        Ok(self
            .rows
            .read()
            .await
            .get(id)
            .filter(|s| s.is_active)
            .cloned())
    }

    async fn update_access_and_expiry(
        &self,
        id: &str,
        last_accessed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(id).filter(|s| s.is_active) {
            Some(session) => {
                session.last_accessed_at = last_accessed_at;
                session.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate(&self, id: &str, invalidated_at: DateTime<Utc>) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(id).filter(|s| s.is_active) {
            Some(session) => {
                session.is_active = false;
                session.invalidated_at = Some(invalidated_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .rows
            .read()
            .await
            .values()
            .filter(|s| s.is_active && s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn bulk_invalidate(&self, ids: &[String], invalidated_at: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let mut count = 0;
        for id in ids {
            if let Some(session) = rows.get_mut(id).filter(|s| s.is_active) {
                session.is_active = false;
                session.invalidated_at = Some(invalidated_at);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_expired_or_inactive(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, s| s.is_active && s.expires_at >= now);
        Ok((before - rows.len()) as u64)
    }

    async fn count_users_over_cap(&self, cap: usize, now: DateTime<Utc>) -> Result<u64> {
        let rows = self.rows.read().await;
        let mut per_user: HashMap<Uuid, usize> = HashMap::new();
        for session in rows.values().filter(|s| s.is_active && s.expires_at > now) {
            *per_user.entry(session.user_id).or_default() += 1;
        }
        Ok(per_user.values().filter(|n| **n > cap).count() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
