//! # Streamer Concurrency Guard
//!
//! Fleet-wide mutual exclusion per streamer, backed by an atomic counter in
//! the shared key-value store. The first worker to `add` the key owns the
//! streamer until it calls [`ConcurrencyGuard::release`] or the entry's TTL
//! runs out; every other attempt increments the counter and backs off.

use crate::actions::{ActionError, ActionResult};
use crate::cache::{CacheError, KeyValueStore};
use crate::config::ThrottleConfig;
use crate::constants::keys::STREAMER_GUARD_PREFIX;
use crate::notify::Notifier;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Escalation policy for contended acquisitions
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottlePolicy {
    pub escalation_threshold: i64,
    pub notify_every: i64,
    pub give_up_threshold: i64,
}

impl From<&ThrottleConfig> for ThrottlePolicy {
    fn from(config: &ThrottleConfig) -> Self {
        Self {
            escalation_threshold: config.escalation_threshold,
            notify_every: config.notify_every,
            give_up_threshold: config.give_up_threshold,
        }
    }
}

impl ThrottlePolicy {
    pub fn should_notify(&self, attempts: i64) -> bool {
        attempts >= self.escalation_threshold && self.notify_every > 0 && attempts % self.notify_every == 0
    }

    pub fn should_give_up(&self, attempts: i64) -> bool {
        attempts >= self.give_up_threshold
    }
}

/// Result of a contended acquisition, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Acquired,
    Contended { attempts: i64 },
    GaveUp { attempts: i64 },
}

impl Acquisition {
    pub fn acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

pub struct ConcurrencyGuard {
    store: Arc<dyn KeyValueStore>,
    config: ThrottleConfig,
    policy: ThrottlePolicy,
}

impl ConcurrencyGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &ThrottleConfig) -> Self {
        Self {
            store,
            policy: ThrottlePolicy::from(config),
            config: config.clone(),
        }
    }

    pub fn key(resource: &str) -> String {
        format!("{STREAMER_GUARD_PREFIX}:{resource}")
    }

    /// Claim `resource`. Returns false when another attempt holds it.
    pub async fn try_acquire(&self, resource: &str) -> Result<bool, CacheError> {
        self.store
            .add(&Self::key(resource), json!(1), Some(self.config.ttl()))
            .await
    }

    /// Claim `resource`, escalating to operators on repeated contention.
    ///
    /// `source` names the caller in notifications and `context` is appended to
    /// them (typically the task arguments).
    pub async fn begin(
        &self,
        resource: &str,
        notifier: &dyn Notifier,
        source: &str,
        context: &str,
    ) -> ActionResult<Acquisition> {
        if self.try_acquire(resource).await? {
            return Ok(Acquisition::Acquired);
        }

        let key = Self::key(resource);
        let attempts = self.store.incr(&key, 1).await.map_err(|e| {
            warn!(key = %key, error = %e, "Unable to increase guard counter");
            ActionError::hard(e.to_string())
        })?;
        warn!(
            action = %source,
            streamer = %resource,
            attempts = attempts,
            "New attempt to process a streamer that is being processed"
        );

        if self.policy.should_give_up(attempts) {
            notifier
                .notify_admins(
                    source,
                    &format!("{attempts} attempts. Giving up. Args:\n{context}"),
                )
                .await;
            self.release(resource).await?;
            return Ok(Acquisition::GaveUp { attempts });
        }
        if self.policy.should_notify(attempts) {
            notifier
                .notify_admins(
                    source,
                    &format!(
                        "Has seen {attempts} attempts to run a parallel worker task. Args:\n{context}"
                    ),
                )
                .await;
        }
        Ok(Acquisition::Contended { attempts })
    }

    pub async fn release(&self, resource: &str) -> ActionResult<()> {
        let key = Self::key(resource);
        info!(key = %key, "Clearing streamer guard");
        self.store.delete(&key).await.map_err(|e| {
            warn!(key = %key, error = %e, "Unable to delete guard entry");
            ActionError::hard(e.to_string())
        })?;
        Ok(())
    }

    /// Current attempt counter, if held
    pub async fn attempts(&self, resource: &str) -> Result<Option<i64>, CacheError> {
        self.store.get_i64(&Self::key(resource)).await
    }
}
