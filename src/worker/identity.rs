//! Worker registry kept in the shared key-value store.
//!
//! Every running worker owns `worker-info:{id}` and `worker-count:{id}`;
//! per-action counters under `worker-action-count:{name}` are shared by the
//! fleet. Counter failures are logged and never interrupt message handling.

use crate::actions::ActionName;
use crate::cache::{CacheResult, KeyValueStore};
use crate::constants::keys::{ACTION_COUNT_PREFIX, WORKER_COUNT_PREFIX, WORKER_INFO_PREFIX};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Registry entry of one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub uuid: String,
    pub start_dt: DateTime<Utc>,
    /// Tasks processed since start, filled in by listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCount {
    pub name: String,
    pub count: Option<i64>,
}

pub struct WorkerIdentity {
    id: Uuid,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for WorkerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerIdentity").field("id", &self.id).finish()
    }
}

impl std::fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl WorkerIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_id(Uuid::new_v4(), store)
    }

    pub fn with_id(id: Uuid, store: Arc<dyn KeyValueStore>) -> Self {
        Self { id, store }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn info_key(&self) -> String {
        format!("{WORKER_INFO_PREFIX}{}", self.id)
    }

    pub fn count_key(&self) -> String {
        format!("{WORKER_COUNT_PREFIX}{}", self.id)
    }

    pub fn action_key(name: &str) -> String {
        format!("{ACTION_COUNT_PREFIX}{name}")
    }

    /// Register the worker and zero its counters
    pub async fn start(&self, started_at: DateTime<Utc>) -> CacheResult<()> {
        info!(worker_id = %self.id, started_at = %started_at, "Worker started");
        let entry = WorkerInfo {
            uuid: self.id.to_string(),
            start_dt: started_at,
            count: None,
        };
        self.store
            .set(&self.info_key(), json!(entry), None)
            .await?;
        self.store.set(&self.count_key(), json!(0), None).await?;
        for name in ActionName::tracked_names() {
            self.store
                .set(&Self::action_key(name), json!(0), None)
                .await?;
        }
        Ok(())
    }

    pub async fn increment_count(&self) {
        if let Err(e) = self.store.incr(&self.count_key(), 1).await {
            warn!(worker_id = %self.id, error = %e, "Unable to increment worker count");
        }
    }

    pub async fn increment_action_count(&self, name: &str) {
        if let Err(e) = self.store.incr(&Self::action_key(name), 1).await {
            warn!(action = %name, error = %e, "Unable to increment action count");
        }
    }

    pub async fn count(&self) -> i64 {
        self.store
            .get_i64(&self.count_key())
            .await
            .ok()
            .flatten()
            .unwrap_or(0)
    }

    pub async fn action_count(&self, name: &str) -> i64 {
        self.store
            .get_i64(&Self::action_key(name))
            .await
            .ok()
            .flatten()
            .unwrap_or(0)
    }

    pub async fn info(&self) -> Option<WorkerInfo> {
        let value = self.store.get(&self.info_key()).await.ok()??;
        serde_json::from_value(value).ok()
    }

    /// Every registered worker with its current count
    pub async fn list_workers(store: &dyn KeyValueStore) -> CacheResult<Vec<WorkerInfo>> {
        let mut workers = Vec::new();
        for key in store.keys_with_prefix(WORKER_INFO_PREFIX).await? {
            let Some(value) = store.get(&key).await? else {
                continue;
            };
            let Ok(mut entry) = serde_json::from_value::<WorkerInfo>(value) else {
                warn!(key = %key, "Skipping malformed worker info");
                continue;
            };
            if let Some(id) = key.strip_prefix(WORKER_INFO_PREFIX) {
                entry.count = store.get_i64(&format!("{WORKER_COUNT_PREFIX}{id}")).await?;
            }
            workers.push(entry);
        }
        workers.sort_by(|a, b| a.start_dt.cmp(&b.start_dt));
        Ok(workers)
    }

    /// Drop workers that processed at most `min_count` tasks; returns how many
    pub async fn cleanup(store: &dyn KeyValueStore, min_count: i64) -> CacheResult<usize> {
        let mut removed = 0;
        for key in store.keys_with_prefix(WORKER_COUNT_PREFIX).await? {
            let Some(count) = store.get_i64(&key).await? else {
                continue;
            };
            if count > min_count {
                continue;
            }
            store.delete(&key).await?;
            if let Some(id) = key.strip_prefix(WORKER_COUNT_PREFIX) {
                store.delete(&format!("{WORKER_INFO_PREFIX}{id}")).await?;
            }
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn cleanup_id(store: &dyn KeyValueStore, worker_id: &str) -> CacheResult<()> {
        store.delete(&format!("{WORKER_COUNT_PREFIX}{worker_id}")).await?;
        store.delete(&format!("{WORKER_INFO_PREFIX}{worker_id}")).await?;
        Ok(())
    }

    pub async fn action_counts(store: &dyn KeyValueStore) -> CacheResult<Vec<ActionCount>> {
        let mut counts = Vec::new();
        for name in ActionName::tracked_names() {
            counts.push(ActionCount {
                name: name.to_string(),
                count: store.get_i64(&Self::action_key(name)).await?,
            });
        }
        Ok(counts)
    }
}
