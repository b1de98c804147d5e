use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::cache::{CacheStore, DomainCache, RedisCacheBackend};
use crate::config::Config;
use crate::error::Result;
use crate::repositories::form::{FormRepository, PgFormRepository};
use crate::repositories::session::PgSessionStore;
use crate::repositories::user::{PgUserRepository, UserRepository};
use crate::sessions::audit::TracingAuditLogger;
use crate::sessions::manager::SessionManager;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Session lifecycle.
    pub sessions: Arc<SessionManager>,
    /// The shared cache.
    pub cache: CacheStore,
    /// Read-through caching of form lookups and dashboards.
    pub domain_cache: DomainCache,
    pub users: Arc<dyn UserRepository>,
    pub forms: Arc<dyn FormRepository>,
}

impl AppState {
    /// Connects to PostgreSQL and Redis and wires the production collaborators.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url, config.session.store_timeout)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        let cache = CacheStore::new(Arc::new(RedisCacheBackend::new(redis)), config.cache.clone());

        let sessions = SessionManager::new(
            Arc::new(PgSessionStore::new(db.clone())),
            Arc::new(TracingAuditLogger),
            config.session.clone(),
        )
        .with_cache_mirror(cache.clone());
        tracing::info!(
            "✅ Session manager initialized (max age {}s, limit {} per user)",
            config.session.max_age.num_seconds(),
            config.session.max_concurrent_sessions
        );

        Ok(Self::from_parts(
            config.clone(),
            sessions,
            cache,
            Arc::new(PgUserRepository::new(db.clone())),
            Arc::new(PgFormRepository::new(db)),
        ))
    }

    /// Assembles a state from already built collaborators.
    pub fn from_parts(
        config: Config,
        sessions: SessionManager,
        cache: CacheStore,
        users: Arc<dyn UserRepository>,
        forms: Arc<dyn FormRepository>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            domain_cache: DomainCache::new(cache.clone()),
            cache,
            users,
            forms,
        }
    }
}
