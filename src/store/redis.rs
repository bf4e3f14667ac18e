//! Redis-backed presence store
//!
//! One multiplexed `ConnectionManager` shared by all callers; reconnection is
//! handled by the manager. Every command runs under a bounded timeout so a
//! hung store surfaces as `StoreUnavailable` instead of stalling the request
//! path.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::info;

use super::{PresenceStore, StoreResult};
use crate::types::{EngineError, StoreUnavailable};

/// Presence store over a Redis-protocol server
#[derive(Clone)]
pub struct RedisPresenceStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisPresenceStore {
    /// Connect to the store
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, EngineError> {
        info!("Connecting to presence store at {}", url);

        let client = redis::Client::open(url)
            .map_err(|e| EngineError::Config(format!("Invalid store URL: {}", e)))?;

        let connect = client.get_connection_manager();
        let conn = match tokio::time::timeout(Duration::from_secs(5), connect).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(StoreUnavailable(e.to_string()).into()),
            Err(_) => return Err(StoreUnavailable("connect timed out".to_string()).into()),
        };

        info!("Connected to presence store");

        Ok(Self { conn, op_timeout })
    }

    /// Run a store command under the per-command timeout
    async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreUnavailable(e.to_string())),
            Err(_) => Err(StoreUnavailable(format!(
                "store command timed out after {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}

/// Refresh a key's expiry without ever shortening it.
///
/// `EXPIRE GT` only extends an existing window, but is a no-op on keys that
/// have no TTL yet; those get a plain `EXPIRE`.
async fn refresh_expiry(
    conn: &mut ConnectionManager,
    key: &str,
    ttl: Duration,
) -> redis::RedisResult<()> {
    let secs = ttl.as_secs().max(1) as i64;

    let applied: i64 = redis::cmd("EXPIRE")
        .arg(key)
        .arg(secs)
        .arg("GT")
        .query_async(conn)
        .await?;

    if applied == 0 {
        let remaining: i64 = redis::cmd("TTL").arg(key).query_async(conn).await?;
        if remaining == -1 {
            let _: i64 = redis::cmd("EXPIRE").arg(key).arg(secs).query_async(conn).await?;
        }
    }

    Ok(())
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn set_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.run(async move {
            let _: i64 = conn.hset(key, field, value).await?;
            refresh_expiry(&mut conn, key, ttl).await
        })
        .await
    }

    async fn get_field(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.hget(key, field).await }).await
    }

    async fn get_all_fields(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.hgetall(key).await }).await
    }

    async fn remove_field(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self.run(async move { conn.hdel(key, field).await }).await?;
        Ok(removed > 0)
    }

    async fn increment_field(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        self.run(async move {
            let value: i64 = conn.hincr(key, field, delta).await?;
            refresh_expiry(&mut conn, key, ttl).await?;
            Ok(value)
        })
        .await
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        self.run(async move {
            let added: i64 = conn.sadd(key, member).await?;
            refresh_expiry(&mut conn, key, ttl).await?;
            Ok(added > 0)
        })
        .await
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self.run(async move { conn.srem(key, member).await }).await?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.smembers(key).await }).await
    }

    async fn set_len(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: i64 = self.run(async move { conn.scard(key).await }).await?;
        Ok(len.max(0) as u64)
    }

    async fn sorted_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: f64,
        ttl: Duration,
    ) -> StoreResult<f64> {
        let mut conn = self.conn.clone();
        self.run(async move {
            let score: f64 = conn.zincr(key, member, delta).await?;
            refresh_expiry(&mut conn, key, ttl).await?;
            Ok(score)
        })
        .await
    }

    async fn sorted_set_top_n(&self, key: &str, n: usize) -> StoreResult<Vec<(String, f64)>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = (n - 1) as isize;
        self.run(async move { conn.zrevrange_withscores(key, 0, stop).await })
            .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.run(async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.run(async move {
            let _: () = conn.set(key, value).await?;
            refresh_expiry(&mut conn, key, ttl).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.run(async move {
            let _: i64 = conn.del(key).await?;
            Ok(())
        })
        .await
    }
}
