//! # Shared Key-Value Store
//!
//! TTL-aware key-value interface backing the worker identity registry, the
//! streamer concurrency guard, action pid tracking and the reboot delay
//! checker. Values are JSON so counters and small records share one store.
//!
//! `add` and `incr` must be atomic in every implementation: the concurrency
//! guard relies on them to hand out at most one processing slot per key.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use memory::InMemoryKeyValueStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Key not found: {key}")]
    MissingKey { key: String },

    #[error("Value for {key} is not an integer")]
    NotAnInteger { key: String },

    #[error("Cache backend unavailable: {message}")]
    Unavailable { message: String },
}

impl CacheError {
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }

    pub fn not_an_integer(key: impl Into<String>) -> Self {
        Self::NotAnInteger { key: key.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Store a value; `None` means no expiry
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()>;

    /// Store a value only if the key is absent. Returns true when stored.
    async fn add(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<bool>;

    /// Atomically add `delta` to an existing integer value and return the new value.
    /// Fails with [`CacheError::MissingKey`] when the key does not exist.
    async fn incr(&self, key: &str, delta: i64) -> CacheResult<i64>;

    async fn delete(&self, key: &str) -> CacheResult<bool>;

    async fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>>;

    async fn get_i64(&self, key: &str) -> CacheResult<Option<i64>> {
        match self.get(key).await? {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| CacheError::not_an_integer(key)),
        }
    }
}
