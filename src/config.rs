use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Cookie `SameSite` policy handed to the transport adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSiteMode {
    Strict,
    Lax,
    None,
}

impl FromStr for SameSiteMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            other => anyhow::bail!("unknown SameSite mode '{}' (expected strict, lax or none)", other),
        }
    }
}

/// What to do when a session is presented from a different IP than the one
/// it was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpMismatchPolicy {
    Ignore,
    Warn,
    Reject,
}

impl FromStr for IpMismatchPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => anyhow::bail!("unknown IP mismatch policy '{}' (expected ignore, warn or reject)", other),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lifetime of a session from creation or renewal.
    pub max_age: chrono::Duration,
    /// Remaining lifetime below which an access slides the expiry forward.
    pub renewal_threshold: chrono::Duration,
    /// Soft cap on simultaneously active sessions per user.
    pub max_concurrent_sessions: usize,
    /// Reject requests that did not arrive over HTTPS.
    pub require_secure: bool,
    /// Cookie policy for the session cookie.
    pub same_site: SameSiteMode,
    pub ip_mismatch_policy: IpMismatchPolicy,
    /// Name of the fallback session cookie.
    pub cookie_name: String,
    /// Budget for a single session store call.
    pub store_timeout: Duration,
    /// How often the expiry sweep runs.
    pub cleanup_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age: chrono::Duration::seconds(3600),
            renewal_threshold: chrono::Duration::seconds(1800),
            max_concurrent_sessions: 3,
            require_secure: false,
            same_site: SameSiteMode::Lax,
            ip_mismatch_policy: IpMismatchPolicy::Warn,
            cookie_name: "session_id".to_string(),
            store_timeout: Duration::from_secs(3),
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

impl SessionConfig {
    /// Checks the invariants the session manager relies on.
    pub fn validate(&self) -> Result<()> {
        if self.max_age <= chrono::Duration::zero() {
            anyhow::bail!("session max age must be positive");
        }
        if self.renewal_threshold < chrono::Duration::zero() || self.renewal_threshold > self.max_age {
            anyhow::bail!("session renewal threshold must be between 0 and the max age");
        }
        if self.max_concurrent_sessions == 0 {
            anyhow::bail!("max concurrent sessions must be at least 1");
        }
        Ok(())
    }
}

/// Cache store settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL in seconds used when a caller does not pass one.
    pub default_ttl_secs: u64,
    /// Budget for a single cache call; slower calls count as misses.
    pub op_timeout: Duration,
    /// Optional prefix prepended to every key.
    pub namespace: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            op_timeout: Duration::from_millis(250),
            namespace: None,
        }
    }
}

/// The application's configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    pub session: SessionConfig,
    pub cache: CacheConfig,
    /// Path prefixes that bypass session validation.
    pub public_paths: Vec<String>,
    /// Failed logins allowed per IP inside one window.
    pub login_rate_limit: i64,
    /// Length of the login rate limit window in seconds.
    pub login_rate_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: "postgres://localhost/carelink".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            session: SessionConfig::default(),
            cache: CacheConfig::default(),
            public_paths: default_public_paths(),
            login_rate_limit: 5,
            login_rate_window_secs: 900,
        }
    }
}

fn default_public_paths() -> Vec<String> {
    ["/health", "/api/auth/login", "/api/auth/register"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Reads an environment variable, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

/// Splits a comma separated list, dropping empty items.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let defaults = SessionConfig::default();

        let session = SessionConfig {
            max_age: chrono::Duration::seconds(env_or("SESSION_MAX_AGE_SECS", 3600i64)?),
            renewal_threshold: chrono::Duration::seconds(env_or(
                "SESSION_RENEWAL_THRESHOLD_SECS",
                1800i64,
            )?),
            max_concurrent_sessions: env_or("SESSION_MAX_CONCURRENT", defaults.max_concurrent_sessions)?,
            require_secure: env_or("SESSION_REQUIRE_SECURE", false)?,
            same_site: env_or("SESSION_SAME_SITE", defaults.same_site)?,
            ip_mismatch_policy: env_or("SESSION_IP_POLICY", defaults.ip_mismatch_policy)?,
            cookie_name: env::var("SESSION_COOKIE_NAME").unwrap_or(defaults.cookie_name),
            store_timeout: Duration::from_millis(env_or("SESSION_STORE_TIMEOUT_MS", 3000u64)?),
            cleanup_interval: Duration::from_secs(env_or("SESSION_CLEANUP_INTERVAL_SECS", 3600u64)?),
        };
        session.validate().context("Invalid session configuration")?;

        let cache = CacheConfig {
            default_ttl_secs: env_or("CACHE_DEFAULT_TTL_SECS", 300u64)?,
            op_timeout: Duration::from_millis(env_or("CACHE_OP_TIMEOUT_MS", 250u64)?),
            namespace: env::var("CACHE_NAMESPACE").ok().filter(|ns| !ns.trim().is_empty()),
        };
        if cache.default_ttl_secs == 0 {
            anyhow::bail!("CACHE_DEFAULT_TTL_SECS must be greater than 0");
        }

        let public_paths = match env::var("PUBLIC_PATHS") {
            Ok(raw) => parse_list(&raw),
            Err(_) => default_public_paths(),
        };

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            session,
            cache,
            public_paths,
            login_rate_limit: env_or("LOGIN_RATE_LIMIT", 5i64)?,
            login_rate_window_secs: env_or("LOGIN_RATE_WINDOW_SECS", 900u64)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_enums_case_insensitively() {
        assert_eq!("Strict".parse::<SameSiteMode>().unwrap(), SameSiteMode::Strict);
        assert_eq!(" none ".parse::<SameSiteMode>().unwrap(), SameSiteMode::None);
        assert_eq!("REJECT".parse::<IpMismatchPolicy>().unwrap(), IpMismatchPolicy::Reject);
        assert!("sometimes".parse::<IpMismatchPolicy>().is_err());
    }

    #[test]
    fn public_path_list_drops_blanks() {
        assert_eq!(
            parse_list("/health, ,/api/auth/login,"),
            vec!["/health".to_string(), "/api/auth/login".to_string()]
        );
    }

    #[test]
    fn rejects_zero_session_cap() {
        let config = SessionConfig {
            max_concurrent_sessions: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_threshold_longer_than_max_age() {
        let config = SessionConfig {
            renewal_threshold: chrono::Duration::seconds(7200),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(SessionConfig::default().validate().is_ok());
    }
}
