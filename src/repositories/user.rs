use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio::sync::RwLock;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::UserCredentials,
};

/// Looks up login credentials.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds an active user by username inside a tenant.
    async fn find_by_username(&self, tenant_id: Uuid, username: &str) -> Result<Option<UserCredentials>>;
}

/// A helper function to map a `tokio_postgres::Row` to `UserCredentials`.
fn row_to_credentials(row: &Row) -> Result<UserCredentials> {
    Ok(UserCredentials {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        tenant_id: row.try_get("tenant_id").map_err(|_| AppError::MissingData("tenant_id".to_string()))?,
        username: row.try_get("username").map_err(|_| AppError::MissingData("username".to_string()))?,
        password_hash: row.try_get("password_hash").map_err(|_| AppError::MissingData("password_hash".to_string()))?,
        is_active: row.try_get("is_active").map_err(|_| AppError::MissingData("is_active".to_string()))?,
    })
}

/// Users in the `users` table.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool,
}

impl PgUserRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, tenant_id: Uuid, username: &str) -> Result<Option<UserCredentials>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, tenant_id, username, password_hash, is_active
                FROM users
                WHERE tenant_id = $1 AND username = $2 AND is_active = true
                "#,
                &[&tenant_id, &username],
            )
            .await?;
        row.map(|r| row_to_credentials(&r)).transpose()
    }
}

/// Users kept in process memory, keyed by tenant and username.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<(Uuid, String), UserCredentials>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserCredentials) {
        self.users
            .write()
            .await
            .insert((user.tenant_id, user.username.clone()), user);
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_username(&self, tenant_id: Uuid, username: &str) -> Result<Option<UserCredentials>> {
        Ok(self
            .users
            .read()
            .await
            .get(&(tenant_id, username.to_string()))
            .filter(|u| u.is_active)
            .cloned())
    }
}
