//! Presence store
//!
//! Thin wrapper over a shared, TTL-capable key-value/set/hash store. Every
//! operation is a single atomic primitive at the store level; composite
//! tracker operations are built from these and tolerate interleaving (counts
//! are advisory, not billing).
//!
//! TTLs implement the sliding presence window: a write refreshes a key's
//! expiry upward, never shortens it. Any transport failure or timeout
//! surfaces as [`StoreUnavailable`]; callers degrade to a zero/default value
//! rather than retrying inside the request path.

pub mod keys;
mod memory;
mod redis;

pub use self::memory::MemoryPresenceStore;
pub use self::redis::RedisPresenceStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::types::StoreUnavailable;

/// Result of a single store primitive
pub type StoreResult<T> = std::result::Result<T, StoreUnavailable>;

/// Atomic primitives over the shared presence store
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Set a hash field, refreshing the key's expiry
    async fn set_field(&self, key: &str, field: &str, value: &str, ttl: Duration)
        -> StoreResult<()>;

    /// Read a hash field
    async fn get_field(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Read all fields of a hash
    async fn get_all_fields(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Remove a hash field; returns whether it existed
    async fn remove_field(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Atomically add a signed delta to an integer hash field, refreshing
    /// expiry; returns the post-increment value
    async fn increment_field(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> StoreResult<i64>;

    /// Add a member to a set, refreshing expiry; returns whether it was new
    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remove a member from a set; returns whether it was present
    async fn remove_from_set(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// List the members of a set
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Cardinality of a set (0 for a missing key)
    async fn set_len(&self, key: &str) -> StoreResult<u64>;

    /// Atomically add a delta to a sorted-set member's score, refreshing
    /// expiry; returns the post-increment score
    async fn sorted_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: f64,
        ttl: Duration,
    ) -> StoreResult<f64>;

    /// Top `n` sorted-set members by descending score
    async fn sorted_set_top_n(&self, key: &str, n: usize) -> StoreResult<Vec<(String, f64)>>;

    /// Read a plain value
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a plain value, refreshing expiry
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Delete a key and all its contents
    async fn delete(&self, key: &str) -> StoreResult<()>;
}
