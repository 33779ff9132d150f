//! Worker maintenance actions: ping, health check, shutdown and statistics.

use super::context::ActionContext;
use super::errors::{ActionError, ActionResult};
use super::registry::ActionName;
use super::{Action, Arguments};
use crate::audit::{status, WorkerStatistics};
use crate::constants::keys::WORKER_LAST_PING;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

async fn record_ping(ctx: &ActionContext) -> ActionResult<Option<serde_json::Value>> {
    let previous = ctx.cache.get(WORKER_LAST_PING).await?;
    ctx.cache
        .set(WORKER_LAST_PING, json!(Utc::now().to_rfc3339()), None)
        .await?;
    Ok(previous)
}

fn message_arguments(arguments: Arguments) -> ActionResult<Arguments> {
    if arguments.is_empty() {
        return Ok(Arguments::new().with("message", "hello"));
    }
    if !arguments.contains("message") {
        return Err(ActionError::hard(format!(
            "Missing fields in argument payload.\nReceived args: {arguments}\nRequired args : message"
        )));
    }
    Ok(arguments)
}

/// Liveness probe that also pages the operator channel
#[derive(Debug, Default, Clone, Copy)]
pub struct PingAction;

#[async_trait]
impl Action for PingAction {
    fn name(&self) -> ActionName {
        ActionName::Ping
    }

    async fn execute(&self, ctx: &ActionContext, arguments: &Arguments) -> ActionResult<()> {
        let message = arguments.str("message").ok_or_else(|| {
            ActionError::hard(format!(
                "Message not found in arguments. Error comes from Ping Action with arguments: {arguments}"
            ))
        })?;
        info!(message = %message, "PingAction on worker return active status");
        ctx.notifier
            .notify(&format!("PingAction on {}:\n {}", ctx.server_type(), message))
            .await;
        record_ping(ctx).await?;
        Ok(())
    }

    fn prepare_schedule(&self, arguments: Arguments) -> ActionResult<Arguments> {
        message_arguments(arguments)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerHealthCheckAction;

#[async_trait]
impl Action for WorkerHealthCheckAction {
    fn name(&self) -> ActionName {
        ActionName::WorkerHealthCheck
    }

    async fn execute(&self, ctx: &ActionContext, arguments: &Arguments) -> ActionResult<()> {
        let message = arguments.str("message").ok_or_else(|| {
            ActionError::hard(format!(
                "Message not found in arguments. Error comes from WorkerHealthCheckAction with arguments: {arguments}"
            ))
        })?;
        info!(server = %ctx.server_type(), message = %message, "WorkerHealthCheckAction");
        let previous = record_ping(ctx).await?;
        info!(last_ping = ?previous, "Last worker ping");
        Ok(())
    }

    fn prepare_schedule(&self, arguments: Arguments) -> ActionResult<Arguments> {
        message_arguments(arguments)
    }
}

/// Asks the receiving worker to stop
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerShutDownAction;

#[async_trait]
impl Action for WorkerShutDownAction {
    fn name(&self) -> ActionName {
        ActionName::WorkerShutDown
    }

    async fn execute(&self, ctx: &ActionContext, arguments: &Arguments) -> ActionResult<()> {
        let timestamp = arguments.str("timestamp").ok_or_else(|| {
            ActionError::hard(format!(
                "Timestamp not found in arguments. Error comes from WorkerShutDownAction with arguments: {arguments}"
            ))
        })?;
        Err(ActionError::halt(format!(
            "Ready for shutting down\n - Server: {}\n - ID: {}\n - Timestamp: {}",
            ctx.server_type(),
            ctx.worker_id,
            timestamp
        )))
    }

    fn prepare_schedule(&self, _arguments: Arguments) -> ActionResult<Arguments> {
        Ok(Arguments::new().with("timestamp", Utc::now().to_rfc3339()))
    }
}

/// Rolls the audit log up into per-task statistics
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerCollectStatsAction;

impl WorkerCollectStatsAction {
    fn span_length(span: &str) -> ActionResult<Duration> {
        match span {
            "d" => Ok(Duration::days(1)),
            "w" => Ok(Duration::days(7)),
            "m" => Ok(Duration::days(30)),
            other => Err(ActionError::hard(format!(
                "Invalid argument span = {other}. Expected d, w or m"
            ))),
        }
    }

    async fn stats_for_task(
        ctx: &ActionContext,
        task_name: &str,
        timestamp: DateTime<Utc>,
        span: &str,
    ) -> ActionResult<WorkerStatistics> {
        let start = timestamp - Self::span_length(span)?;
        let entries = match ctx.audit.query_task(task_name, start).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(task = %task_name, error = %e, "Unable to query worker log");
                Vec::new()
            }
        };

        let mut statistics = WorkerStatistics {
            timestamp,
            span: span.to_string(),
            task_name: task_name.to_string(),
            total_count: 0,
            error_count: 0,
            total_execution_time: 0.0,
        };
        for entry in entries.iter().filter(|e| e.timestamp > start) {
            statistics.total_count += 1;
            if !status::is_success(&entry.status) {
                statistics.error_count += 1;
            }
            statistics.total_execution_time += entry.execution_time;
        }
        Ok(statistics)
    }
}

#[async_trait]
impl Action for WorkerCollectStatsAction {
    fn name(&self) -> ActionName {
        ActionName::WorkerCollectStats
    }

    async fn execute(&self, ctx: &ActionContext, arguments: &Arguments) -> ActionResult<()> {
        let (Some(ts), Some(span)) = (arguments.str("ts"), arguments.str("span")) else {
            return Err(ActionError::hard(format!(
                "Missing fields in argument payload. Error comes from WorkerCollectStatsAction with arguments: {arguments}"
            )));
        };
        arguments.check(&["ts", "span"], &[], self.name().class_name())?;
        let timestamp = DateTime::parse_from_rfc3339(ts)
            .map_err(|e| ActionError::hard(format!("Invalid argument ts = {ts}: {e}")))?
            .with_timezone(&Utc);

        for task_name in ActionName::tracked_names() {
            let statistics = Self::stats_for_task(ctx, task_name, timestamp, span).await?;
            info!(
                task = %task_name,
                total = statistics.total_count,
                errors = statistics.error_count,
                "Statistics created"
            );
            ctx.statistics.save(statistics).await?;
        }
        info!(ts = %ts, span = %span, "Finished creating statistics for worker tasks");
        Ok(())
    }

    fn prepare_schedule(&self, arguments: Arguments) -> ActionResult<Arguments> {
        if arguments.contains("ts") && arguments.contains("span") {
            Ok(arguments)
        } else {
            Err(ActionError::hard(format!(
                "Missing fields in argument payload.\nReceived args: {arguments}\nRequired args : ts, span"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{InMemoryAuditLog, InMemoryStatisticsStore, StatisticsStore, WorkerLogEntry};
    use crate::cache::InMemoryKeyValueStore;
    use crate::config::WorkerConfig;
    use crate::notify::MemoryNotifier;
    use std::sync::Arc;

    fn context() -> (ActionContext, Arc<MemoryNotifier>, Arc<InMemoryAuditLog>, Arc<InMemoryStatisticsStore>) {
        let notifier = Arc::new(MemoryNotifier::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let statistics = Arc::new(InMemoryStatisticsStore::new());
        let ctx = ActionContext::builder(WorkerConfig::default())
            .worker_id("worker-1")
            .cache(Arc::new(InMemoryKeyValueStore::new()))
            .notifier(notifier.clone())
            .audit(audit.clone())
            .statistics(statistics.clone())
            .build();
        (ctx, notifier, audit, statistics)
    }

    #[tokio::test]
    async fn test_ping_notifies_and_records_last_ping() {
        let (ctx, notifier, _, _) = context();
        PingAction
            .execute(&ctx, &Arguments::new().with("message", "hello"))
            .await
            .unwrap();

        assert_eq!(notifier.messages(), vec!["PingAction on worker:\n hello".to_string()]);
        assert!(ctx.cache.get(WORKER_LAST_PING).await.unwrap().is_some());

        let err = PingAction.execute(&ctx, &Arguments::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::HardError(msg) if msg.starts_with("Message not found")));
    }

    #[tokio::test]
    async fn test_health_check_does_not_notify() {
        let (ctx, notifier, _, _) = context();
        WorkerHealthCheckAction
            .execute(&ctx, &Arguments::new().with("message", "ok"))
            .await
            .unwrap();
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_message_schedule_defaults() {
        let args = PingAction.prepare_schedule(Arguments::new()).unwrap();
        assert_eq!(args.str("message"), Some("hello"));
        assert!(WorkerHealthCheckAction
            .prepare_schedule(Arguments::new().with("other", 1))
            .is_err());
    }

    #[tokio::test]
    async fn test_shutdown_halts_with_identity() {
        let (ctx, _, _, _) = context();
        let args = WorkerShutDownAction.prepare_schedule(Arguments::new()).unwrap();
        let err = WorkerShutDownAction.execute(&ctx, &args).await.unwrap_err();
        match err {
            ActionError::HaltAndCatchFire(msg) => {
                assert!(msg.starts_with("Ready for shutting down\n - Server: worker\n - ID: worker-1"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_collect_stats_counts_errors_and_time() {
        let (ctx, _, audit, statistics) = context();
        let now = Utc::now();
        for (status, seconds) in [("done", 1.5), ("WorkerActionHardError", 0.5), ("executing", 0.0)] {
            audit.insert(WorkerLogEntry {
                worker_id: "w".to_string(),
                timestamp: now - Duration::hours(1),
                task: "PingAction".to_string(),
                status: status.to_string(),
                execution_time: seconds,
                arguments: json!({}),
            });
        }
        audit.insert(WorkerLogEntry {
            worker_id: "w".to_string(),
            timestamp: now - Duration::days(3),
            task: "PingAction".to_string(),
            status: "done".to_string(),
            execution_time: 9.0,
            arguments: json!({}),
        });

        let args = Arguments::new().with("ts", now.to_rfc3339()).with("span", "d");
        WorkerCollectStatsAction.execute(&ctx, &args).await.unwrap();

        let rows = statistics.list(Some("PingAction")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_count, 3);
        assert_eq!(rows[0].error_count, 1);
        assert!((rows[0].total_execution_time - 2.0).abs() < f64::EPSILON);
        assert_eq!(statistics.list(None).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_collect_stats_rejects_bad_span() {
        let (ctx, _, _, _) = context();
        let args = Arguments::new().with("ts", Utc::now().to_rfc3339()).with("span", "y");
        let err = WorkerCollectStatsAction.execute(&ctx, &args).await.unwrap_err();
        assert_eq!(err, ActionError::hard("Invalid argument span = y. Expected d, w or m"));
    }

    #[tokio::test]
    async fn test_collect_stats_rejects_unknown_arguments() {
        let (ctx, _, _, statistics) = context();
        let args = Arguments::new()
            .with("ts", Utc::now().to_rfc3339())
            .with("span", "d")
            .with("window", "all");
        let err = WorkerCollectStatsAction.execute(&ctx, &args).await.unwrap_err();
        assert_eq!(
            err,
            ActionError::hard("Illegal argument (window) for WorkerCollectStatsAction")
        );
        assert!(statistics.list(None).await.unwrap().is_empty());
    }
}
