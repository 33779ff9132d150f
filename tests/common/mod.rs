#![allow(dead_code)]

pub mod strategies;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use streamer_worker::actions::{ActionContext, Arguments};
use streamer_worker::audit::InMemoryAuditLog;
use streamer_worker::cache::InMemoryKeyValueStore;
use streamer_worker::config::WorkerConfig;
use streamer_worker::messaging::{InMemoryQueue, MessageQueue};
use streamer_worker::notify::MemoryNotifier;
use streamer_worker::streamer::{
    Device, InMemoryObjectStore, InMemoryStreamerStore, Project, StoredObject, StreamerReport,
};
use streamer_worker::utils::gid;
use uuid::Uuid;

pub const BUCKET: &str = "streamer-reports";
pub const DEVICE_ID: u64 = 0x0a1b;
pub const USER_STREAM: u16 = 0x5001;

/// Worker collaborators over in-memory backends, with handles kept for assertions
pub struct Harness {
    pub ctx: ActionContext,
    pub queue: Arc<InMemoryQueue>,
    pub store: Arc<InMemoryStreamerStore>,
    pub objects: Arc<InMemoryObjectStore>,
    pub notifier: Arc<MemoryNotifier>,
    pub audit: Arc<InMemoryAuditLog>,
    pub cache: Arc<InMemoryKeyValueStore>,
    pub project: Project,
    pub device: Device,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: WorkerConfig) -> Self {
        let queue = Arc::new(InMemoryQueue::new());
        let store = Arc::new(InMemoryStreamerStore::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let cache = Arc::new(InMemoryKeyValueStore::new());

        let project = Project {
            id: Uuid::new_v4(),
            gid: 1,
            name: "Field Test".to_string(),
        };
        let device = Device::new(DEVICE_ID, Some(project.id));
        store.insert_project(project.clone());
        store.insert_device(device.clone());

        let ctx = ActionContext::builder(config)
            .worker_id(Uuid::new_v4().to_string())
            .queue(queue.clone())
            .cache(cache.clone())
            .streamer_store(store.clone())
            .objects(objects.clone())
            .notifier(notifier.clone())
            .audit(audit.clone())
            .build();
        queue
            .ensure_queue(ctx.queue_name())
            .await
            .expect("queue should be created");

        Self {
            ctx,
            queue,
            store,
            objects,
            notifier,
            audit,
            cache,
            project,
            device,
        }
    }

    pub fn queue_name(&self) -> String {
        self.ctx.queue_name().to_string()
    }

    /// Register a ledger record and store the bytes the way the uploader does
    pub fn upload(&self, bytes: Bytes, streamer_index: u8) -> (StreamerReport, Arguments) {
        let report = StreamerReport::new(gid::streamer_slug(DEVICE_ID, streamer_index));
        self.store.insert_report(report.clone());

        let key = format!("user-1/{}.bin", report.id);
        self.objects.put(
            BUCKET,
            &key,
            StoredObject::new(bytes)
                .with_metadata("sent", received_at().to_rfc3339())
                .with_metadata("uuid", report.id.to_string()),
        );
        let arguments = Arguments::new().with("bucket", BUCKET).with("key", key);
        (report, arguments)
    }

    /// Class names of every envelope waiting in the queue
    pub async fn queued_classes(&self) -> Vec<String> {
        self.queue
            .snapshot(&self.queue_name())
            .await
            .iter()
            .filter_map(|m| m.envelope().ok())
            .map(|e| e.class)
            .collect()
    }
}

pub fn test_config() -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.worker.wait_time_seconds = 0;
    config.worker.halt_checkpoints = 1;
    config.worker.halt_checkpoint_interval_seconds = 0;
    config.report.followup_delay_seconds = 0;
    config.throttle.retry_delay_seconds = 0;
    config
}

/// Upload time shared by every report in the tests
pub fn received_at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00+00:00")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}
