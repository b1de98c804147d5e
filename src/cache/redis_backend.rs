use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, SetExpiry, SetOptions};

use crate::cache::backend::{BackendInfo, CacheBackend, Expiry};
use crate::error::Result;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Compare-and-set: rewrites KEYS[1] only while it still holds ARGV[1].
const LUA_REPLACE_IF_UNCHANGED: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        redis.call('SET', KEYS[1], ARGV[2], ARGV[3], ARGV[4])
        return 1
    end
    return 0
"#;

/// Cache backend on top of a pooled Redis connection.
///
/// Pattern listing uses cursor-based `SCAN MATCH` so it never blocks the
/// server the way `KEYS` would.
#[derive(Clone)]
pub struct RedisCacheBackend {
    connection: ConnectionManager,
}

impl RedisCacheBackend {
    /// Creates a new `RedisCacheBackend`.
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

impl std::fmt::Debug for RedisCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheBackend")
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

/// Pulls the fields we report out of an `INFO` reply.
pub fn parse_info(info: &str) -> BackendInfo {
    let mut parsed = BackendInfo::default();
    for line in info.lines() {
        let Some((field, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();
        match field {
            "used_memory" => parsed.used_memory = value.parse().unwrap_or(0),
            "maxmemory" => parsed.max_memory = value.parse().unwrap_or(0),
            "evicted_keys" => parsed.evictions = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    parsed
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self.connection.clone().get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let _: () = self.connection.clone().set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn set_at(&self, key: &str, value: &str, deadline_unix: i64) -> Result<()> {
        let options =
            SetOptions::default().with_expiration(SetExpiry::EXAT(deadline_unix.max(0) as u64));
        let _: redis::Value = self
            .connection
            .clone()
            .set_options(key, value, options)
            .await?;
        Ok(())
    }

    async fn replace_if_unchanged(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        expiry: Expiry,
    ) -> Result<bool> {
        let (mode, at) = match expiry {
            Expiry::In(ttl_secs) => ("EX", ttl_secs.max(1) as i64),
            Expiry::At(deadline_unix) => ("EXAT", deadline_unix.max(1)),
        };
        let replaced: i32 = redis::Script::new(LUA_REPLACE_IF_UNCHANGED)
            .key(key)
            .arg(expected)
            .arg(value)
            .arg(mode)
            .arg(at)
            .invoke_async(&mut self.connection.clone())
            .await?;
        Ok(replaced == 1)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = self.connection.clone().del(keys).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let found: bool = self.connection.clone().exists(key).await?;
        Ok(found)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn incr(&self, key: &str, amount: i64) -> Result<i64> {
        let value: i64 = self.connection.clone().incr(key, amount).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        let applied: bool = self
            .connection
            .clone()
            .expire(key, ttl_secs as i64)
            .await?;
        Ok(applied)
    }

    async fn ping(&self) -> Result<()> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.connection.clone())
            .await?;
        Ok(())
    }

    async fn info(&self) -> Result<BackendInfo> {
        let mut conn = self.connection.clone();
        let raw: String = redis::cmd("INFO").query_async(&mut conn).await?;
        let total_keys: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(BackendInfo {
            total_keys,
            ..parse_info(&raw)
        })
    }
}
