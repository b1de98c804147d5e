use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached value with its bookkeeping, as stored in the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// When the entry was first written.
    pub timestamp: DateTime<Utc>,
    /// TTL in seconds; re-armed on every read.
    pub ttl: u64,
    /// Best-effort read counter. Concurrent reads may lose increments.
    pub hits: u64,
    /// Absolute deadline for entries written with a wall-clock expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Cache statistics. Rates come from process-local counters and reset on
/// restart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_keys: u64,
    /// Bytes used by the backend.
    pub memory_usage: u64,
    /// Hits over reads, in `[0, 1]`.
    pub hit_rate: f64,
    /// Misses over reads, in `[0, 1]`.
    pub miss_rate: f64,
    pub evictions: u64,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
}

/// Coarse health of the cache backend. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of a cache health probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHealth {
    pub connected: bool,
    pub latency_ms: u64,
    pub memory_usage_percent: f64,
    pub status: HealthStatus,
}
