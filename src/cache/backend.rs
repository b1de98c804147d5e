use async_trait::async_trait;

use crate::error::Result;

/// Backend-wide figures reported by `INFO`-style introspection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendInfo {
    pub total_keys: u64,
    /// Bytes currently used.
    pub used_memory: u64,
    /// Configured memory ceiling in bytes, `0` when unlimited.
    pub max_memory: u64,
    /// Keys evicted under memory pressure since the backend started.
    pub evictions: u64,
}

/// Expiry applied by [`CacheBackend::replace_if_unchanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Relative TTL in seconds.
    In(u64),
    /// Unix timestamp in seconds.
    At(i64),
}

/// The primitives the cache store needs from a key/value service.
///
/// Keys are passed through untouched; namespacing is the caller's concern.
/// Expiry must be enforced by the backend itself.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` with a relative TTL in seconds.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Writes `value` expiring at the given unix timestamp (seconds).
    async fn set_at(&self, key: &str, value: &str, deadline_unix: i64) -> Result<()>;

    /// Overwrites `key` with `value` only while it still holds `expected`.
    /// Returns `false` when the key was deleted, expired or rewritten in the
    /// meantime, leaving it untouched.
    async fn replace_if_unchanged(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        expiry: Expiry,
    ) -> Result<bool>;

    /// Deletes the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Lists keys matching a glob pattern.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Atomically adds `amount`, creating the key at zero when missing.
    async fn incr(&self, key: &str, amount: i64) -> Result<i64>;

    /// Sets a relative TTL on an existing key. Returns `false` if it is missing.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool>;

    async fn ping(&self) -> Result<()>;

    async fn info(&self) -> Result<BackendInfo>;
}
