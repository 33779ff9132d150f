//! Action process ids.
//!
//! Every scheduled envelope gets a `pid:{message_id}` record so operators can
//! see background work that has been queued but not yet finished. The worker
//! removes the record when the message is deleted or rescheduled.

use crate::cache::{CacheResult, KeyValueStore};
use crate::constants::{keys::ACTION_PID_PREFIX, ACTION_PID_TTL};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPidInfo {
    pub id: String,
    /// Action name, `Unk` when not known
    #[serde(rename = "type")]
    pub action_type: String,
    pub dt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPid {
    id: String,
    action_type: Option<String>,
}

impl ActionPid {
    /// Accepts a bare id or a `pid:{id}` string
    pub fn new(id: &str, action_type: Option<&str>) -> Self {
        let id = id.split_once(':').map(|(_, rest)| rest).unwrap_or(id);
        Self {
            id: id.to_string(),
            action_type: action_type.map(str::to_string),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> String {
        Self::key_for(&self.id)
    }

    fn key_for(id: &str) -> String {
        format!("{ACTION_PID_PREFIX}{id}")
    }

    pub async fn start(&self, store: &dyn KeyValueStore) -> CacheResult<ActionPidInfo> {
        let record = ActionPidInfo {
            id: self.id.clone(),
            action_type: self.action_type.clone().unwrap_or_else(|| "Unk".to_string()),
            dt: Utc::now().to_rfc3339(),
        };
        info!(pid = %self.key(), action = %record.action_type, "ActionPID created");
        store
            .set(&self.key(), serde_json::json!(record), Some(ACTION_PID_TTL))
            .await?;
        Ok(record)
    }

    pub async fn info(&self, store: &dyn KeyValueStore) -> CacheResult<Option<ActionPidInfo>> {
        Ok(store
            .get(&self.key())
            .await?
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    pub async fn delete(store: &dyn KeyValueStore, id: &str) -> CacheResult<bool> {
        let deleted = store.delete(&Self::key_for(id)).await?;
        if deleted {
            info!(pid = %Self::key_for(id), "ActionPID deleted");
        }
        Ok(deleted)
    }

    pub async fn all(store: &dyn KeyValueStore) -> CacheResult<Vec<ActionPidInfo>> {
        let mut records = Vec::new();
        for key in store.keys_with_prefix(ACTION_PID_PREFIX).await? {
            if let Some(value) = store.get(&key).await? {
                if let Ok(record) = serde_json::from_value(value) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    pub async fn delete_all(store: &dyn KeyValueStore) -> CacheResult<usize> {
        let mut deleted = 0;
        for key in store.keys_with_prefix(ACTION_PID_PREFIX).await? {
            if store.delete(&key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

impl std::fmt::Display for ActionPid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryKeyValueStore;

    #[test]
    fn test_prefixed_id_is_stripped() {
        let pid = ActionPid::new("pid:42", None);
        assert_eq!(pid.id(), "42");
        assert_eq!(pid.to_string(), "pid:42");
    }

    #[tokio::test]
    async fn test_start_list_and_delete() {
        let store = InMemoryKeyValueStore::new();
        ActionPid::new("1", Some("Ping")).start(&store).await.unwrap();
        let unknown = ActionPid::new("2", None);
        unknown.start(&store).await.unwrap();

        assert_eq!(unknown.info(&store).await.unwrap().unwrap().action_type, "Unk");
        assert_eq!(ActionPid::all(&store).await.unwrap().len(), 2);

        assert!(ActionPid::delete(&store, "1").await.unwrap());
        assert!(!ActionPid::delete(&store, "1").await.unwrap());
        assert_eq!(ActionPid::delete_all(&store).await.unwrap(), 1);
        assert!(ActionPid::all(&store).await.unwrap().is_empty());
    }
}
