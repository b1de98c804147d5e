use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::cache::backend::{CacheBackend, Expiry};
use crate::config::CacheConfig;
use crate::error::{AppError, Result};
use crate::models::cache::{CacheEntry, CacheHealth, CacheStats, HealthStatus};

/// Latency above this is degraded.
pub const LATENCY_DEGRADED_MS: u64 = 100;
/// Latency above this is unhealthy.
pub const LATENCY_UNHEALTHY_MS: u64 = 1000;
/// Memory use above this share of the ceiling is degraded.
pub const MEMORY_DEGRADED_PERCENT: f64 = 80.0;
/// Memory use above this share of the ceiling is unhealthy.
pub const MEMORY_UNHEALTHY_PERCENT: f64 = 95.0;

/// Keys deleted per backend call during a pattern delete.
const DELETE_BATCH: usize = 500;

/// Classifies a probe result. Latency and memory are banded independently
/// and the worse band wins.
pub fn health_status(latency_ms: u64, memory_usage_percent: f64) -> HealthStatus {
    let latency = if latency_ms > LATENCY_UNHEALTHY_MS {
        HealthStatus::Unhealthy
    } else if latency_ms > LATENCY_DEGRADED_MS {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let memory = if memory_usage_percent > MEMORY_UNHEALTHY_PERCENT {
        HealthStatus::Unhealthy
    } else if memory_usage_percent > MEMORY_DEGRADED_PERCENT {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    latency.max(memory)
}

struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

struct Inner {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    counters: Counters,
}

/// A TTL-bounded, JSON-encoded key/value store over a [`CacheBackend`].
///
/// The cache is always a derived view: read failures and timeouts are
/// reported as misses and never reach the caller. Writes report errors so
/// call sites can decide, but nothing authoritative lives here.
///
/// Reads re-arm the entry's TTL. A key that is read more often than its TTL
/// therefore never expires on its own; only a delete or a pause in reads
/// lets it go. The re-arm is a compare-and-set against the value just read:
/// it never revives a deleted key or overwrites a newer one, and concurrent
/// reads may skip a re-arm or a hit increment.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl CacheStore {
    /// Creates a new `CacheStore`.
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                counters: Counters {
                    hits: AtomicU64::new(0),
                    misses: AtomicU64::new(0),
                    sets: AtomicU64::new(0),
                    deletes: AtomicU64::new(0),
                },
            }),
        }
    }

    /// The TTL applied by [`CacheStore::set_default`].
    pub fn default_ttl(&self) -> u64 {
        self.inner.config.default_ttl_secs
    }

    fn backend(&self) -> &dyn CacheBackend {
        self.inner.backend.as_ref()
    }

    fn key(&self, key: &str) -> String {
        match &self.inner.config.namespace {
            Some(namespace) => format!("{}:{}", namespace, key),
            None => key.to_string(),
        }
    }

    /// Runs a backend call under the cache timeout.
    async fn call<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.inner.config.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AppError::Cache(format!("{} failed: {}", op, e))),
            Err(_) => Err(AppError::Cache(format!(
                "{} timed out after {:?}",
                op, self.inner.config.op_timeout
            ))),
        }
    }

    fn record_miss(&self) {
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads and decodes a value. Misses, backend failures and undecodable
    /// payloads all yield `None`.
    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let full_key = self.key(key);

        let raw = match self.call("get", self.backend().get(&full_key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.record_miss();
                return None;
            }
            Err(e) => {
                tracing::warn!("⚠️ Cache read degraded to miss for {}: {}", full_key, e);
                self.record_miss();
                return None;
            }
        };

        // Decoded as a JSON tree so the rewrite below keeps fields `T` does not know.
        let mut entry: CacheEntry<serde_json::Value> = match sonic_rs::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("⚠️ Undecodable cache entry at {}: {}", full_key, e);
                self.record_miss();
                return None;
            }
        };

        let data = match serde_json::from_value(entry.data.clone()) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Cache entry at {} does not fit the requested type: {}",
                    full_key,
                    e
                );
                self.record_miss();
                return None;
            }
        };

        self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
        entry.hits += 1;
        self.rearm(&full_key, &raw, &entry).await;

        Some(data)
    }

    /// Rewrites an entry after a hit so its TTL starts over. The rewrite only
    /// lands while the key still holds what was read, so a delete or a newer
    /// write that slipped in since is left alone.
    async fn rearm(&self, full_key: &str, read: &str, entry: &CacheEntry<serde_json::Value>) {
        let payload = match sonic_rs::to_string(entry) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("⚠️ Could not re-encode cache entry {}: {}", full_key, e);
                return;
            }
        };

        let expiry = match entry.expires_at {
            Some(deadline) => Expiry::At(deadline.timestamp()),
            None => Expiry::In(entry.ttl),
        };

        match self
            .call(
                "rearm",
                self.backend()
                    .replace_if_unchanged(full_key, read, &payload, expiry),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Cache entry {} changed before its TTL re-arm", full_key)
            }
            Err(e) => tracing::debug!("Cache TTL re-arm skipped for {}: {}", full_key, e),
        }
    }

    fn encode<T: Serialize>(
        value: &T,
        ttl: u64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let entry = CacheEntry {
            data: value,
            timestamp: Utc::now(),
            ttl,
            hits: 0,
            expires_at,
        };
        sonic_rs::to_string(&entry)
            .map_err(|e| AppError::Serialization(format!("Cache entry encoding failed: {}", e)))
    }

    /// Stores `value` for `ttl_secs` seconds, overwriting any existing entry.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        if ttl_secs == 0 {
            return Err(AppError::Validation("Cache TTL must be greater than 0".to_string()));
        }
        let full_key = self.key(key);
        let payload = Self::encode(value, ttl_secs, None)?;
        self.call("set", self.backend().set(&full_key, &payload, ttl_secs))
            .await?;
        self.inner.counters.sets.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Cached {} for {}s", full_key, ttl_secs);
        Ok(())
    }

    /// Stores `value` with the configured default TTL.
    pub async fn set_default<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, value, self.default_ttl()).await
    }

    /// Stores `value` until a wall-clock deadline. A deadline that has
    /// already passed removes the key instead and returns `false`.
    pub async fn set_expire_at<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        deadline: DateTime<Utc>,
    ) -> Result<bool> {
        let now = Utc::now();
        if deadline <= now {
            self.delete(key).await?;
            return Ok(false);
        }

        let full_key = self.key(key);
        let ttl = (deadline - now).num_seconds().max(1) as u64;
        let payload = Self::encode(value, ttl, Some(deadline))?;
        self.call(
            "set_at",
            self.backend()
                .set_at(&full_key, &payload, deadline.timestamp()),
        )
        .await?;
        self.inner.counters.sets.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Removes a key. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let full_key = self.key(key);
        let removed = self
            .call("delete", self.backend().delete(&[full_key]))
            .await?;
        self.inner.counters.deletes.fetch_add(removed, Ordering::Relaxed);
        Ok(removed > 0)
    }

    /// Removes every key matching a glob pattern. Returns how many went.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let full_pattern = self.key(pattern);
        let keys = self
            .call("scan", self.backend().scan(&full_pattern))
            .await?;

        let mut removed = 0;
        for batch in keys.chunks(DELETE_BATCH) {
            removed += self.call("delete", self.backend().delete(batch)).await?;
        }

        self.inner.counters.deletes.fetch_add(removed, Ordering::Relaxed);
        tracing::debug!("🗑️ Deleted {} cache key(s) matching {}", removed, full_pattern);
        Ok(removed)
    }

    /// Whether a live entry exists. Backend failures read as `false`.
    pub async fn exists(&self, key: &str) -> bool {
        let full_key = self.key(key);
        match self.call("exists", self.backend().exists(&full_key)).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("⚠️ Cache exists check degraded for {}: {}", full_key, e);
                false
            }
        }
    }

    /// Read-through: returns the cached value, or runs `compute`, caches its
    /// result and returns it.
    ///
    /// There is no single-flight: concurrent callers that miss on the same
    /// key each run `compute`. Callers that need at-most-once computation
    /// must serialize themselves. Errors from `compute` are returned and not
    /// cached; errors writing the result are logged only.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, ttl_secs: u64, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }

        let value = compute().await?;
        if let Err(e) = self.set(key, &value, ttl_secs).await {
            tracing::warn!("⚠️ Cache write failed for {}: {}", key, e);
        }
        Ok(value)
    }

    /// Atomically adds `amount` to a counter and returns the new value.
    ///
    /// `ttl_secs` is only applied when this call created the counter, i.e.
    /// when the returned value equals `amount`.
    pub async fn increment(&self, key: &str, amount: i64, ttl_secs: Option<u64>) -> Result<i64> {
        let full_key = self.key(key);
        let value = self
            .call("incr", self.backend().incr(&full_key, amount))
            .await?;

        if value == amount {
            if let Some(ttl) = ttl_secs {
                if let Err(e) = self.call("expire", self.backend().expire(&full_key, ttl)).await {
                    tracing::warn!("⚠️ Could not set TTL on counter {}: {}", full_key, e);
                }
            }
        }

        Ok(value)
    }

    /// Reads a counter written by [`CacheStore::increment`].
    pub async fn get_counter(&self, key: &str) -> Option<i64> {
        let full_key = self.key(key);
        match self.call("get", self.backend().get(&full_key)).await {
            Ok(raw) => raw.and_then(|v| v.parse().ok()),
            Err(e) => {
                tracing::warn!("⚠️ Counter read degraded for {}: {}", full_key, e);
                None
            }
        }
    }

    /// Statistics combining backend figures with this process's counters.
    pub async fn get_stats(&self) -> Result<CacheStats> {
        let info = self.call("info", self.backend().info()).await?;
        let counters = &self.inner.counters;
        let hits = counters.hits.load(Ordering::Relaxed);
        let misses = counters.misses.load(Ordering::Relaxed);
        let reads = hits + misses;
        let (hit_rate, miss_rate) = if reads == 0 {
            (0.0, 0.0)
        } else {
            (hits as f64 / reads as f64, misses as f64 / reads as f64)
        };

        Ok(CacheStats {
            total_keys: info.total_keys,
            memory_usage: info.used_memory,
            hit_rate,
            miss_rate,
            evictions: info.evictions,
            hits,
            misses,
            sets: counters.sets.load(Ordering::Relaxed),
            deletes: counters.deletes.load(Ordering::Relaxed),
        })
    }

    /// Probes the backend and grades it with [`health_status`].
    pub async fn health_check(&self) -> CacheHealth {
        let started = Instant::now();
        if let Err(e) = self.call("ping", self.backend().ping()).await {
            tracing::error!("❌ Cache health check failed: {}", e);
            return CacheHealth {
                connected: false,
                latency_ms: started.elapsed().as_millis() as u64,
                memory_usage_percent: 0.0,
                status: HealthStatus::Unhealthy,
            };
        }
        let latency_ms = started.elapsed().as_millis() as u64;

        let memory_usage_percent = match self.call("info", self.backend().info()).await {
            Ok(info) if info.max_memory > 0 => {
                info.used_memory as f64 / info.max_memory as f64 * 100.0
            }
            Ok(_) => 0.0,
            Err(e) => {
                tracing::warn!("⚠️ Cache memory probe failed: {}", e);
                0.0
            }
        };

        CacheHealth {
            connected: true,
            latency_ms,
            memory_usage_percent,
            status: health_status(latency_ms, memory_usage_percent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::BackendInfo;
    use crate::cache::memory::MemoryCacheBackend;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn store() -> CacheStore {
        CacheStore::new(Arc::new(MemoryCacheBackend::new()), CacheConfig::default())
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Member {
        name: String,
        tags: Vec<String>,
        address: Option<Address>,
        extra: serde_json::Value,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Address {
        city: String,
    }

    /// A backend whose every call fails.
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _: &str) -> Result<Option<String>> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn set(&self, _: &str, _: &str, _: u64) -> Result<()> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn set_at(&self, _: &str, _: &str, _: i64) -> Result<()> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn replace_if_unchanged(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Expiry,
        ) -> Result<bool> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn delete(&self, _: &[String]) -> Result<u64> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn exists(&self, _: &str) -> Result<bool> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn scan(&self, _: &str) -> Result<Vec<String>> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn incr(&self, _: &str, _: i64) -> Result<i64> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn expire(&self, _: &str, _: u64) -> Result<bool> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn ping(&self) -> Result<()> {
            Err(AppError::Cache("connection refused".into()))
        }
        async fn info(&self) -> Result<BackendInfo> {
            Err(AppError::Cache("connection refused".into()))
        }
    }

    /// A backend that answers reads too slowly.
    struct SlowBackend(MemoryCacheBackend);

    #[async_trait]
    impl CacheBackend for SlowBackend {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.0.get(key).await
        }
        async fn set(&self, key: &str, value: &str, ttl: u64) -> Result<()> {
            self.0.set(key, value, ttl).await
        }
        async fn set_at(&self, key: &str, value: &str, at: i64) -> Result<()> {
            self.0.set_at(key, value, at).await
        }
        async fn replace_if_unchanged(
            &self,
            key: &str,
            expected: &str,
            value: &str,
            expiry: Expiry,
        ) -> Result<bool> {
            self.0.replace_if_unchanged(key, expected, value, expiry).await
        }
        async fn delete(&self, keys: &[String]) -> Result<u64> {
            self.0.delete(keys).await
        }
        async fn exists(&self, key: &str) -> Result<bool> {
            self.0.exists(key).await
        }
        async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
            self.0.scan(pattern).await
        }
        async fn incr(&self, key: &str, amount: i64) -> Result<i64> {
            self.0.incr(key, amount).await
        }
        async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
            self.0.expire(key, ttl).await
        }
        async fn ping(&self) -> Result<()> {
            self.0.ping().await
        }
        async fn info(&self) -> Result<BackendInfo> {
            self.0.info().await
        }
    }

    /// What another client does to a key between a read and its re-arm.
    enum Interleaved {
        Delete,
        Rewrite(String),
    }

    /// A backend that lets one foreign write land right after a read.
    struct InterleavingBackend {
        inner: MemoryCacheBackend,
        pending: std::sync::Mutex<Option<Interleaved>>,
    }

    impl InterleavingBackend {
        fn new(inner: MemoryCacheBackend, write: Interleaved) -> Self {
            Self {
                inner,
                pending: std::sync::Mutex::new(Some(write)),
            }
        }
    }

    #[async_trait]
    impl CacheBackend for InterleavingBackend {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            let value = self.inner.get(key).await?;
            let pending = self.pending.lock().unwrap().take();
            match pending {
                Some(Interleaved::Delete) => {
                    self.inner.delete(&[key.to_string()]).await?;
                }
                Some(Interleaved::Rewrite(raw)) => self.inner.set(key, &raw, 60).await?,
                None => {}
            }
            Ok(value)
        }
        async fn set(&self, key: &str, value: &str, ttl: u64) -> Result<()> {
            self.inner.set(key, value, ttl).await
        }
        async fn set_at(&self, key: &str, value: &str, at: i64) -> Result<()> {
            self.inner.set_at(key, value, at).await
        }
        async fn replace_if_unchanged(
            &self,
            key: &str,
            expected: &str,
            value: &str,
            expiry: Expiry,
        ) -> Result<bool> {
            self.inner
                .replace_if_unchanged(key, expected, value, expiry)
                .await
        }
        async fn delete(&self, keys: &[String]) -> Result<u64> {
            self.inner.delete(keys).await
        }
        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }
        async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
            self.inner.scan(pattern).await
        }
        async fn incr(&self, key: &str, amount: i64) -> Result<i64> {
            self.inner.incr(key, amount).await
        }
        async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
            self.inner.expire(key, ttl).await
        }
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
        async fn info(&self) -> Result<BackendInfo> {
            self.inner.info().await
        }
    }

    #[tokio::test]
    async fn round_trips_nested_values() {
        let cache = store();
        let member = Member {
            name: "Ana".into(),
            tags: vec!["diabetes".into(), "priority".into()],
            address: None,
            extra: serde_json::json!({"visits": [1, 2, {"kind": null}], "flag": true}),
        };

        cache.set("member:1", &member, 60).await.unwrap();
        assert_eq!(cache.get::<Member>("member:1").await, Some(member));

        cache.set("nothing", &serde_json::Value::Null, 60).await.unwrap();
        assert_eq!(
            cache.get::<serde_json::Value>("nothing").await,
            Some(serde_json::Value::Null)
        );
    }

    #[tokio::test]
    async fn missing_key_is_a_miss_not_an_error() {
        let cache = store();
        assert_eq!(cache.get::<String>("absent").await, None);
        let stats = cache.get_stats().await.unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.miss_rate, 1.0);
    }

    #[tokio::test]
    async fn entry_is_gone_after_its_ttl() {
        let cache = store();
        cache.set("short", &"v", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get::<String>("short").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_keep_hot_entries_alive() {
        let cache = store();
        cache.set("hot", &1u32, 10).await.unwrap();

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(8)).await;
            assert_eq!(cache.get::<u32>("hot").await, Some(1));
        }

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get::<u32>("hot").await, None);
    }

    #[tokio::test]
    async fn hits_are_recorded_on_the_entry() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = CacheStore::new(backend.clone(), CacheConfig::default());
        cache.set("k", &"v", 60).await.unwrap();
        cache.get::<String>("k").await;
        cache.get::<String>("k").await;

        let raw = backend.get("k").await.unwrap().unwrap();
        let entry: CacheEntry<String> = sonic_rs::from_str(&raw).unwrap();
        assert_eq!(entry.hits, 2);
        assert_eq!(entry.ttl, 60);
    }

    #[tokio::test]
    async fn delete_during_read_is_not_undone() {
        let inner = MemoryCacheBackend::new();
        inner
            .set("formCategories:t1", &CacheStore::encode(&"stale", 60, None).unwrap(), 60)
            .await
            .unwrap();
        let cache = CacheStore::new(
            Arc::new(InterleavingBackend::new(inner, Interleaved::Delete)),
            CacheConfig::default(),
        );

        assert_eq!(
            cache.get::<String>("formCategories:t1").await.as_deref(),
            Some("stale")
        );
        assert!(!cache.exists("formCategories:t1").await);
        assert_eq!(cache.get::<String>("formCategories:t1").await, None);
    }

    #[tokio::test]
    async fn newer_write_during_read_survives() {
        let inner = MemoryCacheBackend::new();
        inner
            .set("k", &CacheStore::encode(&"old", 60, None).unwrap(), 60)
            .await
            .unwrap();
        let fresh = CacheStore::encode(&"new", 60, None).unwrap();
        let cache = CacheStore::new(
            Arc::new(InterleavingBackend::new(inner, Interleaved::Rewrite(fresh))),
            CacheConfig::default(),
        );

        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("old"));
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn narrow_readers_keep_unknown_fields() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Full {
            a: u32,
            b: u32,
        }

        #[derive(Debug, PartialEq, Deserialize)]
        struct Narrow {
            a: u32,
        }

        let cache = store();
        cache.set("k", &Full { a: 1, b: 2 }, 60).await.unwrap();
        assert_eq!(cache.get::<Narrow>("k").await, Some(Narrow { a: 1 }));
        assert_eq!(cache.get::<Full>("k").await, Some(Full { a: 1, b: 2 }));
    }

    #[tokio::test]
    async fn pattern_delete_stays_in_scope() {
        let cache = store();
        cache.set("A:1", &1, 60).await.unwrap();
        cache.set("A:2", &2, 60).await.unwrap();
        cache.set("B:1", &3, 60).await.unwrap();

        assert_eq!(cache.delete_pattern("A:*").await.unwrap(), 2);
        assert!(!cache.exists("A:1").await);
        assert!(!cache.exists("A:2").await);
        assert_eq!(cache.get::<i32>("B:1").await, Some(3));
    }

    #[tokio::test]
    async fn namespace_prefixes_keys_and_patterns() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let config = CacheConfig {
            namespace: Some("crm".into()),
            ..CacheConfig::default()
        };
        let cache = CacheStore::new(backend.clone(), config);

        cache.set("A:1", &1, 60).await.unwrap();
        assert!(backend.exists("crm:A:1").await.unwrap());
        assert_eq!(cache.delete_pattern("A:*").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let cache = store();
        cache.set("k", &"v", 60).await.unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let cache = store();
        assert!(matches!(
            cache.set("k", &"v", 0).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn get_or_set_computes_on_miss_only() {
        let cache = store();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = calls.clone();
            let value = cache
                .get_or_set("expensive", 60, move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_or_set_does_not_cache_failures() {
        let cache = store();
        let result: Result<u32> = cache
            .get_or_set("flaky", 60, || async { Err(AppError::NotFound) })
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));
        assert!(!cache.exists("flaky").await);
    }

    #[tokio::test]
    async fn increment_sets_ttl_only_on_creation() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = CacheStore::new(backend.clone(), CacheConfig::default());

        assert_eq!(cache.increment("hits", 1, None).await.unwrap(), 1);
        assert_eq!(cache.increment("hits", 1, Some(60)).await.unwrap(), 2);
        assert_eq!(cache.get_counter("hits").await, Some(2));

        // "hits" was created without a TTL and the later call did not add one.
        assert_eq!(cache.increment("windowed", 5, Some(1)).await.unwrap(), 5);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get_counter("windowed").await, None);
        assert_eq!(cache.get_counter("hits").await, Some(2));
    }

    #[tokio::test]
    async fn set_expire_at_respects_deadline() {
        let cache = store();
        let past = Utc::now() - chrono::Duration::seconds(5);
        cache.set("k", &"old", 60).await.unwrap();
        assert!(!cache.set_expire_at("k", &"new", past).await.unwrap());
        assert!(!cache.exists("k").await);

        let future = Utc::now() + chrono::Duration::seconds(60);
        assert!(cache.set_expire_at("k", &"new", future).await.unwrap());
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn broken_backend_degrades_reads_to_misses() {
        let cache = CacheStore::new(Arc::new(BrokenBackend), CacheConfig::default());
        assert_eq!(cache.get::<String>("k").await, None);
        assert!(!cache.exists("k").await);
        assert_eq!(cache.get_counter("k").await, None);
        assert!(cache.set("k", &"v", 60).await.is_err());

        let value = cache
            .get_or_set("k", 60, || async { Ok("origin".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "origin");

        let health = cache.health_check().await;
        assert!(!health.connected);
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reads_time_out_as_misses() {
        let inner = MemoryCacheBackend::new();
        inner
            .set("k", &CacheStore::encode(&"v", 60, None).unwrap(), 60)
            .await
            .unwrap();
        let cache = CacheStore::new(Arc::new(SlowBackend(inner)), CacheConfig::default());

        assert_eq!(cache.get::<String>("k").await, None);
        assert_eq!(cache.get_stats().await.unwrap().misses, 1);
    }

    #[tokio::test]
    async fn stats_track_hit_rate() {
        let cache = store();
        cache.set("k", &1, 60).await.unwrap();
        cache.get::<i32>("k").await;
        cache.get::<i32>("k").await;
        cache.get::<i32>("k").await;
        cache.get::<i32>("missing").await;

        let stats = cache.get_stats().await.unwrap();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.75);
        assert_eq!(stats.miss_rate, 0.25);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.total_keys, 1);
    }

    #[tokio::test]
    async fn healthy_memory_backend() {
        let health = store().health_check().await;
        assert!(health.connected);
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[test]
    fn health_bands_take_the_worse_reading() {
        assert_eq!(health_status(5, 10.0), HealthStatus::Healthy);
        assert_eq!(health_status(150, 10.0), HealthStatus::Degraded);
        assert_eq!(health_status(5, 85.0), HealthStatus::Degraded);
        assert_eq!(health_status(1500, 10.0), HealthStatus::Unhealthy);
        assert_eq!(health_status(150, 97.0), HealthStatus::Unhealthy);
        assert_eq!(health_status(100, 80.0), HealthStatus::Healthy);
    }
}
