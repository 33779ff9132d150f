//! Repository traits for the external stores.
//!
//! The report processor and the reboot/delay actions reach the entity
//! directory, the time-series sink and the object store only through these
//! traits. Implementations must be safe to share across tasks; the worker
//! serializes access per streamer through the concurrency guard, not through
//! the stores.

use super::models::{DataStatus, Device, DeviceStatus, Project, StreamData, Streamer, StreamerReport};
use super::objects::StoredObject;
use super::StoreResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Devices, projects, streamer cursors and ledger records
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn get_device(&self, device_slug: &str) -> StoreResult<Option<Device>>;

    async fn save_device(&self, device: &Device) -> StoreResult<()>;

    async fn get_project(&self, project_id: Uuid) -> StoreResult<Option<Project>>;

    /// Every streamer of a device, ordered by index
    async fn streamers_for_device(&self, device_slug: &str) -> StoreResult<Vec<Streamer>>;

    /// Streamers registered for one index. More than one is a data integrity violation.
    async fn streamers_for_index(&self, device_slug: &str, index: u8) -> StoreResult<Vec<Streamer>> {
        Ok(self
            .streamers_for_device(device_slug)
            .await?
            .into_iter()
            .filter(|s| s.index == index)
            .collect())
    }

    async fn create_streamer(&self, streamer: Streamer) -> StoreResult<Streamer>;

    async fn save_streamer(&self, streamer: &Streamer) -> StoreResult<()>;

    async fn get_report(&self, report_id: Uuid) -> StoreResult<Option<StreamerReport>>;

    async fn save_report(&self, report: &StreamerReport) -> StoreResult<()>;

    /// Ledger records of a streamer carrying the given `rpt_id`, oldest receipt first
    async fn find_reports(
        &self,
        streamer_slug: &str,
        incremental_id: i64,
    ) -> StoreResult<Vec<StreamerReport>>;

    async fn get_or_create_device_status(&self, device_id: u64) -> StoreResult<DeviceStatus>;

    async fn save_device_status(&self, status: &DeviceStatus) -> StoreResult<()>;

    /// Readings on disabled streams are dropped during ingestion
    async fn is_stream_enabled(&self, _stream_slug: &str) -> StoreResult<bool> {
        Ok(true)
    }

    /// Drop pooled connections so a restarted worker reconnects cleanly
    async fn reset_connections(&self) {}
}

/// Filter over committed readings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataQuery {
    pub device_slug: Option<String>,
    /// Match any of these projects; empty matches all
    pub project_slugs: Vec<String>,
    pub vid: Option<u16>,
    pub int_value: Option<i64>,
    pub id_gte: Option<i64>,
    pub id_gt: Option<i64>,
    pub id_lt: Option<i64>,
    pub id_lte: Option<i64>,
    /// Skip readings whose timestamp was already flagged unreliable
    pub exclude_dirty_ts: bool,
}

impl DataQuery {
    pub fn for_device(device_slug: impl Into<String>) -> Self {
        Self {
            device_slug: Some(device_slug.into()),
            ..Self::default()
        }
    }

    pub fn in_projects<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_slugs = projects.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_vid(mut self, vid: u16) -> Self {
        self.vid = Some(vid);
        self
    }

    pub fn with_int_value(mut self, value: i64) -> Self {
        self.int_value = Some(value);
        self
    }

    pub fn id_gte(mut self, id: i64) -> Self {
        self.id_gte = Some(id);
        self
    }

    pub fn id_gt(mut self, id: i64) -> Self {
        self.id_gt = Some(id);
        self
    }

    pub fn id_lt(mut self, id: i64) -> Self {
        self.id_lt = Some(id);
        self
    }

    pub fn id_lte(mut self, id: i64) -> Self {
        self.id_lte = Some(id);
        self
    }

    pub fn clean_timestamps_only(mut self) -> Self {
        self.exclude_dirty_ts = true;
        self
    }

    pub fn matches(&self, data: &StreamData) -> bool {
        let id = data.streamer_local_id;
        self.device_slug.as_deref().map_or(true, |d| d == data.device_slug)
            && (self.project_slugs.is_empty() || self.project_slugs.contains(&data.project_slug))
            && self.vid.map_or(true, |vid| data.vid() == Some(vid))
            && self.int_value.map_or(true, |v| v == data.int_value)
            && self.id_gte.map_or(true, |bound| id >= bound)
            && self.id_gt.map_or(true, |bound| id > bound)
            && self.id_lt.map_or(true, |bound| id < bound)
            && self.id_lte.map_or(true, |bound| id <= bound)
            && !(self.exclude_dirty_ts && data.dirty_ts)
    }
}

/// Append-only sink for committed readings
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Insert readings, assigning ids. Returns the number inserted.
    async fn bulk_insert(&self, entries: Vec<StreamData>) -> StoreResult<usize>;

    /// Matching readings ordered by `streamer_local_id`
    async fn query(&self, query: &DataQuery) -> StoreResult<Vec<StreamData>>;

    /// Replace a previously inserted reading, matched by id
    async fn update(&self, data: &StreamData) -> StoreResult<()>;

    /// Set the status of every matching reading; returns the count touched
    async fn set_status(&self, query: &DataQuery, status: DataStatus) -> StoreResult<usize>;

    async fn first(&self, query: &DataQuery) -> StoreResult<Option<StreamData>> {
        Ok(self.query(query).await?.into_iter().next())
    }

    async fn last(&self, query: &DataQuery) -> StoreResult<Option<StreamData>> {
        Ok(self.query(query).await?.into_iter().last())
    }

    async fn count(&self, query: &DataQuery) -> StoreResult<usize> {
        Ok(self.query(query).await?.len())
    }
}

/// Raw uploaded report bytes
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<StoredObject>;
}
