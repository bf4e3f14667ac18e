//! In-memory presence store
//!
//! Dev-mode and test stand-in for the Redis store. Single-process only: the
//! real deployment coordinates many request handlers through the shared
//! store, which this cannot do.
//!
//! Expiry is lazy: a slot past its deadline is dropped on the next access.
//! Writes refresh a slot's deadline upward, matching the sliding-window
//! semantics of the Redis impl.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::{PresenceStore, StoreResult};
use crate::clock::Clock;

enum Value {
    Scalar(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    Sorted(HashMap<String, f64>),
}

struct Slot {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }

    /// Extend the deadline; never shorten it
    fn refresh(&mut self, now: DateTime<Utc>, ttl: Duration) {
        let deadline = now + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
        match self.expires_at {
            Some(current) if current >= deadline => {}
            _ => self.expires_at = Some(deadline),
        }
    }
}

/// In-memory presence store over a concurrent map
pub struct MemoryPresenceStore {
    slots: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
}

impl MemoryPresenceStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
        }
    }

    /// Run `f` against the live slot for `key`, creating it with `init` if
    /// missing or expired
    fn with_slot<T>(&self, key: &str, ttl: Duration, init: fn() -> Value, f: impl FnOnce(&mut Value) -> T) -> T {
        let now = self.clock.now();
        let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: init(),
            expires_at: None,
        });
        if slot.expired(now) {
            slot.value = init();
            slot.expires_at = None;
        }
        slot.refresh(now, ttl);
        f(&mut slot.value)
    }

    /// Run `f` against the live slot for `key`, if present
    fn read_slot<T>(&self, key: &str, f: impl FnOnce(&Value) -> T) -> Option<T> {
        let now = self.clock.now();
        if let Some(slot) = self.slots.get(key) {
            if !slot.expired(now) {
                return Some(f(&slot.value));
            }
        }
        // drop the read guard before removing
        self.slots.remove_if(key, |_, slot| slot.expired(now));
        None
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn set_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.with_slot(key, ttl, || Value::Hash(HashMap::new()), |v| {
            if let Value::Hash(hash) = v {
                hash.insert(field.to_string(), value.to_string());
            }
        });
        Ok(())
    }

    async fn get_field(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self
            .read_slot(key, |v| match v {
                Value::Hash(hash) => hash.get(field).cloned(),
                _ => None,
            })
            .flatten())
    }

    async fn get_all_fields(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self
            .read_slot(key, |v| match v {
                Value::Hash(hash) => hash.clone(),
                _ => HashMap::new(),
            })
            .unwrap_or_default())
    }

    async fn remove_field(&self, key: &str, field: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let removed = match self.slots.get_mut(key) {
            Some(mut slot) if !slot.expired(now) => match &mut slot.value {
                Value::Hash(hash) => hash.remove(field).is_some(),
                _ => false,
            },
            _ => false,
        };
        Ok(removed)
    }

    async fn increment_field(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> StoreResult<i64> {
        Ok(self.with_slot(key, ttl, || Value::Hash(HashMap::new()), |v| {
            if let Value::Hash(hash) = v {
                let current = hash
                    .get(field)
                    .and_then(|raw| raw.parse::<i64>().ok())
                    .unwrap_or(0);
                let next = current + delta;
                hash.insert(field.to_string(), next.to_string());
                next
            } else {
                0
            }
        }))
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool> {
        Ok(self.with_slot(key, ttl, || Value::Set(HashSet::new()), |v| {
            if let Value::Set(set) = v {
                set.insert(member.to_string())
            } else {
                false
            }
        }))
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let removed = match self.slots.get_mut(key) {
            Some(mut slot) if !slot.expired(now) => match &mut slot.value {
                Value::Set(set) => set.remove(member),
                _ => false,
            },
            _ => false,
        };
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .read_slot(key, |v| match v {
                Value::Set(set) => set.iter().cloned().collect(),
                _ => Vec::new(),
            })
            .unwrap_or_default())
    }

    async fn set_len(&self, key: &str) -> StoreResult<u64> {
        Ok(self
            .read_slot(key, |v| match v {
                Value::Set(set) => set.len() as u64,
                _ => 0,
            })
            .unwrap_or(0))
    }

    async fn sorted_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: f64,
        ttl: Duration,
    ) -> StoreResult<f64> {
        Ok(self.with_slot(key, ttl, || Value::Sorted(HashMap::new()), |v| {
            if let Value::Sorted(scores) = v {
                let score = scores.entry(member.to_string()).or_insert(0.0);
                *score += delta;
                *score
            } else {
                0.0
            }
        }))
    }

    async fn sorted_set_top_n(&self, key: &str, n: usize) -> StoreResult<Vec<(String, f64)>> {
        let mut entries = self
            .read_slot(key, |v| match v {
                Value::Sorted(scores) => scores
                    .iter()
                    .map(|(member, score)| (member.clone(), *score))
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .unwrap_or_default();

        // descending by score, member order as tie-break for determinism
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        entries.truncate(n);
        Ok(entries)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .read_slot(key, |v| match v {
                Value::Scalar(value) => Some(value.clone()),
                _ => None,
            })
            .flatten())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.with_slot(key, ttl, || Value::Scalar(String::new()), |v| {
            *v = Value::Scalar(value.to_string());
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.slots.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn store() -> (Arc<ManualClock>, MemoryPresenceStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let store = MemoryPresenceStore::new(clock.clone());
        (clock, store)
    }

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn hash_fields_round_trip() {
        let (_, store) = store();
        store.set_field("k", "f", "v", TTL).await.unwrap();
        assert_eq!(store.get_field("k", "f").await.unwrap().as_deref(), Some("v"));
        assert!(store.remove_field("k", "f").await.unwrap());
        assert!(!store.remove_field("k", "f").await.unwrap());
    }

    #[tokio::test]
    async fn slots_expire_lazily() {
        let (clock, store) = store();
        store.add_to_set("k", "m", TTL).await.unwrap();
        assert_eq!(store.set_len("k").await.unwrap(), 1);

        clock.advance_secs(301);
        assert_eq!(store.set_len("k").await.unwrap(), 0);
        assert!(store.set_members("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_refresh_expiry_upward_only() {
        let (clock, store) = store();
        store.add_to_set("k", "a", Duration::from_secs(300)).await.unwrap();
        // a shorter TTL must not shorten the window
        store.add_to_set("k", "b", Duration::from_secs(10)).await.unwrap();

        clock.advance_secs(200);
        assert_eq!(store.set_len("k").await.unwrap(), 2);

        // a later long write slides the window forward
        store.add_to_set("k", "c", Duration::from_secs(300)).await.unwrap();
        clock.advance_secs(250);
        assert_eq!(store.set_len("k").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn increment_is_signed() {
        let (_, store) = store();
        assert_eq!(store.increment_field("k", "d", 2, TTL).await.unwrap(), 2);
        assert_eq!(store.increment_field("k", "d", -1, TTL).await.unwrap(), 1);
        assert_eq!(store.increment_field("k", "d", -1, TTL).await.unwrap(), 0);
        assert_eq!(store.increment_field("k", "d", -1, TTL).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn sorted_set_orders_by_score_descending() {
        let (_, store) = store();
        store.sorted_set_increment("z", "low", 1.0, TTL).await.unwrap();
        store.sorted_set_increment("z", "high", 5.0, TTL).await.unwrap();
        store.sorted_set_increment("z", "mid", 3.0, TTL).await.unwrap();

        let top = store.sorted_set_top_n("z", 2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, "high");
        assert_eq!(top[1].0, "mid");
    }
}
