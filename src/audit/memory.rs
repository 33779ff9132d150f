use super::{
    status, AuditKey, AuditLog, NewWorkerLogEntry, StatisticsStore, WorkerLogEntry, WorkerStatistics,
};
use crate::streamer::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<WorkerLogEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<WorkerLogEntry> {
        self.entries.read().clone()
    }

    /// Insert a fully formed entry, e.g. historical rows for a statistics run
    pub fn insert(&self, entry: WorkerLogEntry) {
        self.entries.write().push(entry);
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn create(&self, entry: NewWorkerLogEntry) -> StoreResult<AuditKey> {
        let mut entries = self.entries.write();
        let mut timestamp = Utc::now();
        // Keys must stay unique for a worker even when the clock does not move
        while entries
            .iter()
            .any(|e| e.worker_id == entry.worker_id && e.timestamp == timestamp)
        {
            timestamp += Duration::microseconds(1);
        }
        let record = WorkerLogEntry {
            worker_id: entry.worker_id,
            timestamp,
            task: entry.task,
            status: status::EXECUTING.to_string(),
            execution_time: 0.0,
            arguments: entry.arguments,
        };
        let key = record.key();
        entries.push(record);
        Ok(key)
    }

    async fn update(&self, key: &AuditKey, status: &str, execution_time: Option<f64>) -> StoreResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.worker_id == key.worker_id && e.timestamp == key.timestamp)
            .ok_or_else(|| StoreError::not_found("worker log", format!("{}@{}", key.worker_id, key.timestamp)))?;
        entry.status = status.to_string();
        if let Some(seconds) = execution_time {
            entry.execution_time = seconds;
        }
        Ok(())
    }

    async fn query_task(&self, task: &str, since: DateTime<Utc>) -> StoreResult<Vec<WorkerLogEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.task == task && e.timestamp >= since)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStatisticsStore {
    rows: RwLock<Vec<WorkerStatistics>>,
}

impl InMemoryStatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatisticsStore for InMemoryStatisticsStore {
    async fn save(&self, statistics: WorkerStatistics) -> StoreResult<()> {
        self.rows.write().push(statistics);
        Ok(())
    }

    async fn list(&self, task_name: Option<&str>) -> StoreResult<Vec<WorkerStatistics>> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|row| task_name.map_or(true, |name| row.task_name == name))
            .cloned()
            .collect())
    }
}
