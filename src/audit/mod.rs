//! # Task Audit Log
//!
//! One entry per dispatched task, keyed by `(worker_id, timestamp)` and
//! searchable by task name, plus the periodic statistics rolled up from it.
//! Audit writes are best effort: the worker logs and continues when the
//! audit store fails.

pub mod memory;

use crate::streamer::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::{InMemoryAuditLog, InMemoryStatisticsStore};

/// Status strings written to audit entries besides the outcome kind names
pub mod status {
    pub const EXECUTING: &str = "executing";
    pub const DONE: &str = "done";
    /// Final status of a halting worker that gave up waiting to be replaced
    pub const SHUTDOWN_AUTO_REBOOT: &str = "ShutDown-AutoReboot";

    /// `ShutDown-{checkpoint}` while a halting worker waits out its checkpoints
    pub fn shutdown_checkpoint(checkpoint: u32) -> String {
        format!("ShutDown-{checkpoint}")
    }

    /// Entries in these states are not counted as errors by the statistics rollup
    pub fn is_success(status: &str) -> bool {
        status == DONE || status == EXECUTING
    }
}

/// Identity of an audit entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditKey {
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerLogEntry {
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
    pub task: String,
    pub status: String,
    /// Seconds spent in `execute`
    pub execution_time: f64,
    pub arguments: serde_json::Value,
}

impl WorkerLogEntry {
    pub fn key(&self) -> AuditKey {
        AuditKey {
            worker_id: self.worker_id.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// New audit entry (status starts as `executing`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkerLogEntry {
    pub worker_id: String,
    pub task: String,
    pub arguments: serde_json::Value,
}

/// Per-task rollup over a time span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatistics {
    pub timestamp: DateTime<Utc>,
    /// `d`, `w` or `m`
    pub span: String,
    pub task_name: String,
    pub total_count: u64,
    pub error_count: u64,
    pub total_execution_time: f64,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn create(&self, entry: NewWorkerLogEntry) -> StoreResult<AuditKey>;

    async fn update(&self, key: &AuditKey, status: &str, execution_time: Option<f64>) -> StoreResult<()>;

    /// Entries for a task with `timestamp >= since`
    async fn query_task(&self, task: &str, since: DateTime<Utc>) -> StoreResult<Vec<WorkerLogEntry>>;
}

#[async_trait]
pub trait StatisticsStore: Send + Sync {
    async fn save(&self, statistics: WorkerStatistics) -> StoreResult<()>;

    async fn list(&self, task_name: Option<&str>) -> StoreResult<Vec<WorkerStatistics>>;
}
