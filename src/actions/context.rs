//! Collaborators handed to every action.
//!
//! Actions never reach for globals: the queue, key-value store, entity
//! directory, time-series sink, object store, notifier and audit stores are
//! injected here. The builder fills anything left unset with an in-memory
//! backend.

use super::errors::ActionResult;
use super::registry::ActionName;
use super::Arguments;
use crate::audit::{AuditLog, InMemoryAuditLog, InMemoryStatisticsStore, StatisticsStore};
use crate::cache::{InMemoryKeyValueStore, KeyValueStore};
use crate::config::WorkerConfig;
use crate::messaging::{ActionPid, InMemoryQueue, MessageId, MessageQueue, TaskEnvelope};
use crate::notify::{Notifier, TracingNotifier};
use crate::processor::{NoopPostProcessor, ReportPostProcessor};
use crate::streamer::{
    DeviceDirectory, InMemoryObjectStore, InMemoryStreamerStore, ObjectStore, TimeSeriesStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ActionContext {
    pub config: Arc<WorkerConfig>,
    /// Identity of the worker executing the action
    pub worker_id: String,
    pub queue: Arc<dyn MessageQueue>,
    pub cache: Arc<dyn KeyValueStore>,
    pub directory: Arc<dyn DeviceDirectory>,
    pub data: Arc<dyn TimeSeriesStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditLog>,
    pub statistics: Arc<dyn StatisticsStore>,
    pub post_processor: Arc<dyn ReportPostProcessor>,
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("worker_id", &self.worker_id)
            .field("queue", &self.queue.provider_name())
            .field("queue_name", &self.config.worker.queue_name)
            .finish()
    }
}

impl ActionContext {
    pub fn builder(config: WorkerConfig) -> ActionContextBuilder {
        ActionContextBuilder::new(config)
    }

    pub fn queue_name(&self) -> &str {
        &self.config.worker.queue_name
    }

    pub fn server_type(&self) -> &str {
        &self.config.worker.server_type
    }

    /// Enqueue an envelope for `action` and start its pid record
    pub async fn schedule(
        &self,
        action: ActionName,
        arguments: Arguments,
        delay: Duration,
    ) -> ActionResult<MessageId> {
        let envelope = TaskEnvelope::new(action.module(), action.class_name(), arguments.into_map());
        let message_id = self.queue.send(self.queue_name(), &envelope, delay).await?;

        let pid = ActionPid::new(message_id.as_str(), Some(action.class_name()));
        if let Err(e) = pid.start(self.cache.as_ref()).await {
            warn!(pid = %pid, error = %e, "Unable to record action pid");
        }

        info!(
            action = %action,
            message_id = %message_id,
            delay_seconds = delay.as_secs(),
            "Message sent"
        );
        Ok(message_id)
    }
}

pub struct ActionContextBuilder {
    config: WorkerConfig,
    worker_id: Option<String>,
    queue: Option<Arc<dyn MessageQueue>>,
    cache: Option<Arc<dyn KeyValueStore>>,
    directory: Option<Arc<dyn DeviceDirectory>>,
    data: Option<Arc<dyn TimeSeriesStore>>,
    objects: Option<Arc<dyn ObjectStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    audit: Option<Arc<dyn AuditLog>>,
    statistics: Option<Arc<dyn StatisticsStore>>,
    post_processor: Option<Arc<dyn ReportPostProcessor>>,
}

impl ActionContextBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            worker_id: None,
            queue: None,
            cache: None,
            directory: None,
            data: None,
            objects: None,
            notifier: None,
            audit: None,
            statistics: None,
            post_processor: None,
        }
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn KeyValueStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use one in-memory store as both the directory and the time-series sink
    pub fn streamer_store(mut self, store: Arc<InMemoryStreamerStore>) -> Self {
        self.directory = Some(store.clone());
        self.data = Some(store);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn DeviceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn data(mut self, data: Arc<dyn TimeSeriesStore>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn objects(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn statistics(mut self, statistics: Arc<dyn StatisticsStore>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn post_processor(mut self, post_processor: Arc<dyn ReportPostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    pub fn build(self) -> ActionContext {
        let (directory, data) = match (self.directory, self.data) {
            (Some(directory), Some(data)) => (directory, data),
            (directory, data) => {
                let store = Arc::new(InMemoryStreamerStore::new());
                (
                    directory.unwrap_or_else(|| store.clone() as Arc<dyn DeviceDirectory>),
                    data.unwrap_or_else(|| store as Arc<dyn TimeSeriesStore>),
                )
            }
        };

        ActionContext {
            config: Arc::new(self.config),
            worker_id: self.worker_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            queue: self.queue.unwrap_or_else(|| Arc::new(InMemoryQueue::new())),
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(InMemoryKeyValueStore::new())),
            directory,
            data,
            objects: self
                .objects
                .unwrap_or_else(|| Arc::new(InMemoryObjectStore::new())),
            notifier: self
                .notifier
                .unwrap_or_else(|| Arc::new(TracingNotifier::new("operators"))),
            audit: self.audit.unwrap_or_else(|| Arc::new(InMemoryAuditLog::new())),
            statistics: self
                .statistics
                .unwrap_or_else(|| Arc::new(InMemoryStatisticsStore::new())),
            post_processor: self
                .post_processor
                .unwrap_or_else(|| Arc::new(NoopPostProcessor)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schedule_sends_envelope_and_starts_pid() {
        let queue = Arc::new(InMemoryQueue::new());
        let cache = Arc::new(InMemoryKeyValueStore::new());
        let ctx = ActionContext::builder(WorkerConfig::default())
            .queue(queue.clone())
            .cache(cache.clone())
            .build();
        ctx.queue.ensure_queue(ctx.queue_name()).await.unwrap();

        let id = ctx
            .schedule(
                ActionName::Ping,
                Arguments::new().with("message", "hi"),
                Duration::ZERO,
            )
            .await
            .unwrap();

        let snapshot = queue.snapshot(ctx.queue_name()).await;
        assert_eq!(snapshot.len(), 1);
        let envelope = snapshot[0].envelope().unwrap();
        assert_eq!(envelope.class, "PingAction");
        assert_eq!(envelope.module, "worker.system");

        let pid = ActionPid::new(id.as_str(), None).info(cache.as_ref()).await.unwrap();
        assert_eq!(pid.unwrap().action_type, "PingAction");
    }
}
