//! In-process directory and time-series store.
//!
//! Backs tests and local runs of the worker binary. A JSON seed file with
//! `projects`, `devices`, `streamers` and `reports` arrays can be loaded at
//! startup so a local worker has something to reconcile against.

use super::models::{DataStatus, Device, DeviceStatus, Project, StreamData, Streamer, StreamerReport};
use super::repository::{DataQuery, DeviceDirectory, TimeSeriesStore};
use super::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;
use uuid::Uuid;

/// Seed document accepted by [`InMemoryStreamerStore::from_seed_file`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerSeed {
    pub projects: Vec<Project>,
    pub devices: Vec<Device>,
    pub streamers: Vec<Streamer>,
    pub reports: Vec<StreamerReport>,
}

#[derive(Debug, Default)]
pub struct InMemoryStreamerStore {
    projects: RwLock<HashMap<Uuid, Project>>,
    devices: RwLock<HashMap<String, Device>>,
    /// Keyed by streamer slug; a device may own several per index
    streamers: RwLock<BTreeMap<String, Vec<Streamer>>>,
    reports: RwLock<HashMap<Uuid, StreamerReport>>,
    device_status: RwLock<HashMap<u64, DeviceStatus>>,
    disabled_streams: RwLock<HashSet<String>>,
    data: RwLock<Vec<StreamData>>,
    next_data_id: AtomicI64,
}

impl InMemoryStreamerStore {
    pub fn new() -> Self {
        Self {
            next_data_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn from_seed(seed: StreamerSeed) -> Self {
        let store = Self::new();
        for project in seed.projects {
            store.insert_project(project);
        }
        for device in seed.devices {
            store.insert_device(device);
        }
        for streamer in seed.streamers {
            store.insert_streamer(streamer);
        }
        for report in seed.reports {
            store.insert_report(report);
        }
        store
    }

    pub fn from_seed_file(path: &Path) -> StoreResult<Self> {
        let raw = std::fs::read(path)?;
        let seed: StreamerSeed = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::invalid("seed file", e.to_string()))?;
        info!(
            path = %path.display(),
            projects = seed.projects.len(),
            devices = seed.devices.len(),
            "Loaded streamer seed"
        );
        Ok(Self::from_seed(seed))
    }

    pub fn insert_project(&self, project: Project) {
        self.projects.write().insert(project.id, project);
    }

    pub fn insert_device(&self, device: Device) {
        self.devices.write().insert(device.slug(), device);
    }

    /// Register a streamer without the uniqueness check, so tests can build
    /// an inconsistent directory
    pub fn insert_streamer(&self, streamer: Streamer) {
        self.streamers
            .write()
            .entry(streamer.slug.clone())
            .or_default()
            .push(streamer);
    }

    pub fn insert_report(&self, report: StreamerReport) {
        self.reports.write().insert(report.id, report);
    }

    pub fn disable_stream(&self, stream_slug: impl Into<String>) {
        self.disabled_streams.write().insert(stream_slug.into());
    }

    pub fn streamer(&self, slug: &str) -> Option<Streamer> {
        self.streamers
            .read()
            .get(slug)
            .and_then(|list| list.first().cloned())
    }

    pub fn device(&self, device_slug: &str) -> Option<Device> {
        self.devices.read().get(device_slug).cloned()
    }

    pub fn report(&self, report_id: Uuid) -> Option<StreamerReport> {
        self.reports.read().get(&report_id).cloned()
    }

    pub fn device_status(&self, device_id: u64) -> Option<DeviceStatus> {
        self.device_status.read().get(&device_id).cloned()
    }

    /// Every committed reading, in insertion order
    pub fn all_data(&self) -> Vec<StreamData> {
        self.data.read().clone()
    }

    pub fn data_len(&self) -> usize {
        self.data.read().len()
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryStreamerStore {
    async fn get_device(&self, device_slug: &str) -> StoreResult<Option<Device>> {
        Ok(self.devices.read().get(device_slug).cloned())
    }

    async fn save_device(&self, device: &Device) -> StoreResult<()> {
        self.devices.write().insert(device.slug(), device.clone());
        Ok(())
    }

    async fn get_project(&self, project_id: Uuid) -> StoreResult<Option<Project>> {
        Ok(self.projects.read().get(&project_id).cloned())
    }

    async fn streamers_for_device(&self, device_slug: &str) -> StoreResult<Vec<Streamer>> {
        let mut found: Vec<Streamer> = self
            .streamers
            .read()
            .values()
            .flatten()
            .filter(|s| s.device_slug() == device_slug)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.index);
        Ok(found)
    }

    async fn create_streamer(&self, streamer: Streamer) -> StoreResult<Streamer> {
        let mut streamers = self.streamers.write();
        let entry = streamers.entry(streamer.slug.clone()).or_default();
        if !entry.is_empty() {
            return Err(StoreError::invalid(
                "streamer",
                format!("{} already exists", streamer.slug),
            ));
        }
        entry.push(streamer.clone());
        Ok(streamer)
    }

    async fn save_streamer(&self, streamer: &Streamer) -> StoreResult<()> {
        let mut streamers = self.streamers.write();
        match streamers.get_mut(&streamer.slug).and_then(|list| list.first_mut()) {
            Some(existing) => {
                *existing = streamer.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("streamer", streamer.slug.clone())),
        }
    }

    async fn get_report(&self, report_id: Uuid) -> StoreResult<Option<StreamerReport>> {
        Ok(self.reports.read().get(&report_id).cloned())
    }

    async fn save_report(&self, report: &StreamerReport) -> StoreResult<()> {
        self.reports.write().insert(report.id, report.clone());
        Ok(())
    }

    async fn find_reports(
        &self,
        streamer_slug: &str,
        incremental_id: i64,
    ) -> StoreResult<Vec<StreamerReport>> {
        let mut found: Vec<StreamerReport> = self
            .reports
            .read()
            .values()
            .filter(|r| r.streamer_slug == streamer_slug && r.incremental_id == Some(incremental_id))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.sent_timestamp);
        Ok(found)
    }

    async fn get_or_create_device_status(&self, device_id: u64) -> StoreResult<DeviceStatus> {
        Ok(self
            .device_status
            .write()
            .entry(device_id)
            .or_insert_with(|| DeviceStatus::new(device_id))
            .clone())
    }

    async fn save_device_status(&self, status: &DeviceStatus) -> StoreResult<()> {
        self.device_status
            .write()
            .insert(status.device_id, status.clone());
        Ok(())
    }

    async fn is_stream_enabled(&self, stream_slug: &str) -> StoreResult<bool> {
        Ok(!self.disabled_streams.read().contains(stream_slug))
    }
}

#[async_trait]
impl TimeSeriesStore for InMemoryStreamerStore {
    async fn bulk_insert(&self, entries: Vec<StreamData>) -> StoreResult<usize> {
        let count = entries.len();
        let mut data = self.data.write();
        for mut entry in entries {
            entry.id = Some(self.next_data_id.fetch_add(1, Ordering::SeqCst));
            data.push(entry);
        }
        Ok(count)
    }

    async fn query(&self, query: &DataQuery) -> StoreResult<Vec<StreamData>> {
        let mut found: Vec<StreamData> = self
            .data
            .read()
            .iter()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        found.sort_by_key(|d| (d.streamer_local_id, d.id));
        Ok(found)
    }

    async fn update(&self, updated: &StreamData) -> StoreResult<()> {
        let id = updated
            .id
            .ok_or_else(|| StoreError::invalid("stream data", "cannot update a reading without id"))?;
        let mut data = self.data.write();
        match data.iter_mut().find(|d| d.id == Some(id)) {
            Some(existing) => {
                *existing = updated.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("stream data", id.to_string())),
        }
    }

    async fn set_status(&self, query: &DataQuery, status: DataStatus) -> StoreResult<usize> {
        let mut touched = 0;
        for entry in self.data.write().iter_mut().filter(|d| query.matches(d)) {
            entry.status = status;
            touched += 1;
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::streamer_selector;
    use chrono::Utc;

    fn fixture() -> (InMemoryStreamerStore, Project, Device) {
        let project = Project {
            id: Uuid::new_v4(),
            gid: 1,
            name: "demo".to_string(),
        };
        let device = Device::new(0xa, Some(project.id));
        let store = InMemoryStreamerStore::new();
        store.insert_project(project.clone());
        store.insert_device(device.clone());
        (store, project, device)
    }

    #[tokio::test]
    async fn test_streamer_create_and_save() {
        let (store, _, device) = fixture();
        let created = store
            .create_streamer(Streamer::new(device.id, 1, streamer_selector::USER_NO_REBOOTS))
            .await
            .unwrap();
        assert!(store
            .create_streamer(Streamer::new(device.id, 1, streamer_selector::USER_NO_REBOOTS))
            .await
            .is_err());

        let mut updated = created.clone();
        updated.advance_last_id(42);
        store.save_streamer(&updated).await.unwrap();

        let found = store.streamers_for_index(&device.slug(), 1).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].last_id, 42);
    }

    #[tokio::test]
    async fn test_time_series_insert_query_and_status() {
        let (store, project, device) = fixture();
        let now = Utc::now();
        let entries = vec![
            StreamData::new(&project, &device, 0x5001, 3, 30, now, 1),
            StreamData::new(&project, &device, 0x5001, 1, 10, now, 1),
            StreamData::new(&project, &device, 0x5c00, 2, 20, now, 0),
        ];
        assert_eq!(store.bulk_insert(entries).await.unwrap(), 3);

        let all = store.query(&DataQuery::for_device(device.slug())).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|d| d.streamer_local_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let touched = store
            .set_status(&DataQuery::for_device(device.slug()).id_gte(2), DataStatus::Clean)
            .await
            .unwrap();
        assert_eq!(touched, 2);

        let mut reboot = store
            .last(&DataQuery::for_device(device.slug()).with_vid(0x5c00))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reboot.status, DataStatus::Clean);
        reboot.dirty_ts = true;
        store.update(&reboot).await.unwrap();
        assert_eq!(
            store
                .count(&DataQuery::for_device(device.slug()).clean_timestamps_only())
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_seed_file_loading() {
        let (store, project, device) = fixture();
        let mut report = StreamerReport::new("t--0000-0000-0000-000a--0001");
        report.incremental_id = Some(7);
        store.insert_report(report.clone());

        let seed = StreamerSeed {
            projects: vec![project],
            devices: vec![device.clone()],
            streamers: vec![],
            reports: vec![report.clone()],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, serde_json::to_vec(&seed).unwrap()).unwrap();

        let loaded = InMemoryStreamerStore::from_seed_file(&path).unwrap();
        assert!(loaded.device(&device.slug()).is_some());
        let found = loaded
            .find_reports("t--0000-0000-0000-000a--0001", 7)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, report.id);
    }
}
