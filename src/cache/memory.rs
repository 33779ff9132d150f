//! In-process key-value store used for local runs and tests.

use super::{CacheError, CacheResult, KeyValueStore};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// DashMap-backed store with lazy expiry
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn add(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(CacheEntry::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                let current = entry
                    .value
                    .as_i64()
                    .ok_or_else(|| CacheError::not_an_integer(key))?;
                let next = current + delta;
                entry.value = Value::from(next);
                Ok(next)
            }
            _ => Err(CacheError::missing_key(key)),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_only_succeeds_once() {
        let store = InMemoryKeyValueStore::new();
        assert!(store.add("k", json!(1), None).await.unwrap());
        assert!(!store.add("k", json!(5), None).await.unwrap());
        assert_eq!(store.get_i64("k").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_incr_requires_existing_integer() {
        let store = InMemoryKeyValueStore::new();
        assert_eq!(
            store.incr("missing", 1).await,
            Err(CacheError::missing_key("missing"))
        );

        store.set("n", json!(2), None).await.unwrap();
        assert_eq!(store.incr("n", 3).await.unwrap(), 5);

        store.set("s", json!("text"), None).await.unwrap();
        assert!(matches!(
            store.incr("s", 1).await,
            Err(CacheError::NotAnInteger { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let store = InMemoryKeyValueStore::new();
        store
            .set("short", json!(1), Some(Duration::from_millis(0)))
            .await
            .unwrap();
        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(store.add("short", json!(7), None).await.unwrap());
        assert_eq!(store.get_i64("short").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_keys_with_prefix_sorted() {
        let store = InMemoryKeyValueStore::new();
        store.set("worker-info:b", json!({}), None).await.unwrap();
        store.set("worker-info:a", json!({}), None).await.unwrap();
        store.set("pid:1", json!({}), None).await.unwrap();
        assert_eq!(
            store.keys_with_prefix("worker-info:").await.unwrap(),
            vec!["worker-info:a".to_string(), "worker-info:b".to_string()]
        );
    }
}
