use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use glob::Pattern;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::cache::backend::{BackendInfo, CacheBackend, Expiry};
use crate::error::{AppError, Result};

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
    seq: u64,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn size(&self, key: &str) -> u64 {
        (key.len() + self.value.len()) as u64
    }
}

/// An in-process cache backend with the same observable semantics as Redis:
/// per-key TTL, glob scans, atomic increments.
///
/// Expired keys are dropped lazily on access and on writes. With a byte
/// budget, writes evict the oldest keys until the budget holds again.
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    max_bytes: Option<u64>,
    seq: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCacheBackend {
    /// Creates an unbounded backend.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_bytes: None,
            seq: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a backend that evicts the oldest keys beyond `max_bytes`.
    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            ..Self::new()
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn insert(&self, key: &str, value: &str, expires_at: Option<Instant>) {
        let mut entries = self.entries.write().await;
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at,
            seq: self.next_seq(),
        };
        entries.insert(key.to_string(), entry);
        self.enforce_budget(&mut entries);
    }

    fn enforce_budget(&self, entries: &mut HashMap<String, MemoryEntry>) {
        let Some(max_bytes) = self.max_bytes else {
            return;
        };

        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));

        let mut used: u64 = entries.iter().map(|(k, e)| e.size(k)).sum();
        while used > max_bytes {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            if let Some(entry) = entries.remove(&oldest) {
                used -= entry.size(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn deadline_from_unix(deadline_unix: i64) -> Instant {
    let remaining = deadline_unix - Utc::now().timestamp();
    Instant::now() + Duration::from_secs(remaining.max(0) as u64)
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        self.insert(key, value, Some(expires_at)).await;
        Ok(())
    }

    async fn set_at(&self, key: &str, value: &str, deadline_unix: i64) -> Result<()> {
        self.insert(key, value, Some(deadline_from_unix(deadline_unix)))
            .await;
        Ok(())
    }

    async fn replace_if_unchanged(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        expiry: Expiry,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let Some(entry) = entries
            .get_mut(key)
            .filter(|e| e.is_live(now) && e.value == expected)
        else {
            return Ok(false);
        };

        entry.value = value.to_string();
        entry.expires_at = Some(match expiry {
            Expiry::In(ttl_secs) => now + Duration::from_secs(ttl_secs),
            Expiry::At(deadline_unix) => deadline_from_unix(deadline_unix),
        });
        entry.seq = self.next_seq();
        self.enforce_budget(&mut entries);
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|e| e.is_live(now)))
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = Pattern::new(pattern)
            .map_err(|e| AppError::Validation(format!("Invalid key pattern '{}': {}", pattern, e)))?;
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && matcher.matches(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn incr(&self, key: &str, amount: i64) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let (current, expires_at) = match entries.get(key).filter(|e| e.is_live(now)) {
            Some(entry) => {
                let value = entry.value.parse::<i64>().map_err(|_| {
                    AppError::Cache(format!("value at '{}' is not an integer", key))
                })?;
                (value, entry.expires_at)
            }
            None => (0, None),
        };

        let next = current
            .checked_add(amount)
            .ok_or_else(|| AppError::Cache(format!("increment overflow at '{}'", key)))?;
        let seq = self.next_seq();
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: next.to_string(),
                expires_at,
                seq,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key).filter(|e| e.is_live(now)) {
            Some(entry) => {
                entry.expires_at = Some(now + Duration::from_secs(ttl_secs));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn info(&self) -> Result<BackendInfo> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let live = entries.iter().filter(|(_, e)| e.is_live(now));
        let (total_keys, used_memory) = live.fold((0u64, 0u64), |(n, bytes), (k, e)| {
            (n + 1, bytes + e.size(k))
        });
        Ok(BackendInfo {
            total_keys,
            used_memory,
            max_memory: self.max_bytes.unwrap_or(0),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn keys_expire_after_ttl() {
        let backend = MemoryCacheBackend::new();
        backend.set("a", "1", 5).await.unwrap();
        assert_eq!(backend.get("a").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(backend.get("a").await.unwrap(), None);
        assert!(!backend.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn incr_keeps_existing_expiry() {
        let backend = MemoryCacheBackend::new();
        assert_eq!(backend.incr("hits", 2).await.unwrap(), 2);
        assert!(backend.expire("hits", 60).await.unwrap());
        assert_eq!(backend.incr("hits", 3).await.unwrap(), 5);

        let entries = backend.entries.read().await;
        assert!(entries.get("hits").unwrap().expires_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn replace_only_touches_the_expected_value() {
        let backend = MemoryCacheBackend::new();
        assert!(!backend.replace_if_unchanged("a", "1", "2", Expiry::In(60)).await.unwrap());
        assert!(!backend.exists("a").await.unwrap());

        backend.set("a", "1", 5).await.unwrap();
        assert!(!backend.replace_if_unchanged("a", "0", "2", Expiry::In(60)).await.unwrap());
        assert_eq!(backend.get("a").await.unwrap().as_deref(), Some("1"));

        assert!(backend.replace_if_unchanged("a", "1", "2", Expiry::In(60)).await.unwrap());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(backend.get("a").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn incr_rejects_non_numeric_values() {
        let backend = MemoryCacheBackend::new();
        backend.set("name", "alice", 60).await.unwrap();
        assert!(backend.incr("name", 1).await.is_err());
    }

    #[tokio::test]
    async fn scan_matches_globs() {
        let backend = MemoryCacheBackend::new();
        for key in ["A:1", "A:2", "B:1"] {
            backend.set(key, "x", 60).await.unwrap();
        }
        let mut keys = backend.scan("A:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["A:1".to_string(), "A:2".to_string()]);
    }

    #[tokio::test]
    async fn evicts_oldest_keys_over_budget() {
        let backend = MemoryCacheBackend::with_max_bytes(20);
        backend.set("k1", "0123456789", 60).await.unwrap();
        backend.set("k2", "0123456789", 60).await.unwrap();

        assert!(!backend.exists("k1").await.unwrap());
        assert!(backend.exists("k2").await.unwrap());

        let info = backend.info().await.unwrap();
        assert_eq!(info.evictions, 1);
        assert_eq!(info.total_keys, 1);
        assert_eq!(info.max_memory, 20);
    }
}
