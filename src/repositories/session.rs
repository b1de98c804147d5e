use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::Session,
    sessions::store::SessionStore,
};

/// Maps a `user_sessions` row to a `Session`.
fn row_to_session(row: &Row) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
        tenant_id: row.try_get("tenant_id").map_err(|_| AppError::MissingData("tenant_id".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        last_accessed_at: row.try_get("last_accessed_at").map_err(|_| AppError::MissingData("last_accessed_at".to_string()))?,
        expires_at: row.try_get("expires_at").map_err(|_| AppError::MissingData("expires_at".to_string()))?,
        ip_address: row.try_get("ip_address").map_err(|_| AppError::MissingData("ip_address".to_string()))?,
        user_agent: row.try_get("user_agent").map_err(|_| AppError::MissingData("user_agent".to_string()))?,
        is_active: row.try_get("is_active").map_err(|_| AppError::MissingData("is_active".to_string()))?,
        invalidated_at: row.try_get("invalidated_at").map_err(|_| AppError::MissingData("invalidated_at".to_string()))?,
        metadata: row.try_get("metadata").map_err(|_| AppError::MissingData("metadata".to_string()))?,
    })
}

/// Session rows in the `user_sessions` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: Pool,
}

impl PgSessionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO user_sessions (
                    id, user_id, tenant_id, created_at, last_accessed_at, expires_at,
                    ip_address, user_agent, is_active, invalidated_at, metadata
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
                &[
                    &session.id,
                    &session.user_id,
                    &session.tenant_id,
                    &session.created_at,
                    &session.last_accessed_at,
                    &session.expires_at,
                    &session.ip_address,
                    &session.user_agent,
                    &session.is_active,
                    &session.invalidated_at,
                    &session.metadata,
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT *
                FROM user_sessions
                WHERE id = $1 AND is_active = true
                "#,
                &[&id],
            )
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn update_access_and_expiry(
        &self,
        id: &str,
        last_accessed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE user_sessions
                SET last_accessed_at = $2, expires_at = $3
                WHERE id = $1 AND is_active = true
                "#,
                &[&id, &last_accessed_at, &expires_at],
            )
            .await?;
        Ok(updated == 1)
    }

    async fn invalidate(&self, id: &str, invalidated_at: DateTime<Utc>) -> Result<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE user_sessions
                SET is_active = false, invalidated_at = $2
                WHERE id = $1 AND is_active = true
                "#,
                &[&id, &invalidated_at],
            )
            .await?;
        Ok(updated == 1)
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT *
                FROM user_sessions
                WHERE user_id = $1 AND is_active = true
                ORDER BY created_at DESC
                "#,
                &[&user_id],
            )
            .await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn bulk_invalidate(&self, ids: &[String], invalidated_at: DateTime<Utc>) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE user_sessions
                SET is_active = false, invalidated_at = $2
                WHERE id = ANY($1) AND is_active = true
                "#,
                &[&ids, &invalidated_at],
            )
            .await?;
        Ok(updated)
    }

    async fn delete_expired_or_inactive(&self, now: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                r#"
                DELETE FROM user_sessions
                WHERE expires_at < $1 OR is_active = false
                "#,
                &[&now],
            )
            .await?;
        Ok(deleted)
    }

    async fn count_users_over_cap(&self, cap: usize, now: DateTime<Utc>) -> Result<u64> {
        let cap = i64::try_from(cap).unwrap_or(i64::MAX);
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT COUNT(*) AS users
                FROM (
                    SELECT user_id
                    FROM user_sessions
                    WHERE is_active = true AND expires_at > $1
                    GROUP BY user_id
                    HAVING COUNT(*) > $2
                ) over_cap
                "#,
                &[&now, &cap],
            )
            .await?;
        let users: i64 = row.try_get("users").map_err(|_| AppError::MissingData("users".to_string()))?;
        Ok(users.max(0) as u64)
    }

    async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}
