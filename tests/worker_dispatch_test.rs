//! Worker loop outcome handling against the in-memory queue

mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::{Harness, DEVICE_ID, USER_STREAM};
use std::sync::Arc;
use streamer_worker::actions::{
    ActionContext, ActionError, ActionName, ActionRegistry, ActionResult, Arguments,
};
use streamer_worker::constants::streamer_selector;
use streamer_worker::processor::ReportPostProcessor;
use streamer_worker::report::ReportBuilder;
use streamer_worker::streamer::{StoreError, StreamData, StreamerReport};
use streamer_worker::worker::{LoopControl, TerminationReason, Worker, WorkerState};

enum Script {
    Fail(ActionError),
    Panic,
}

/// Post-processor that forces an outcome once a report has been reconciled
struct ScriptedPostProcessor(Script);

#[async_trait]
impl ReportPostProcessor for ScriptedPostProcessor {
    async fn process(
        &self,
        _ctx: &ActionContext,
        _report: &StreamerReport,
        _entries: &[StreamData],
    ) -> ActionResult<()> {
        match &self.0 {
            Script::Fail(error) => Err(error.clone()),
            Script::Panic => panic!("post-processor exploded"),
        }
    }
}

fn worker_with(harness: &Harness, script: Option<Script>) -> Worker {
    let mut ctx = harness.ctx.clone();
    if let Some(script) = script {
        ctx.post_processor = Arc::new(ScriptedPostProcessor(script));
    }
    Worker::new(ctx)
}

/// Upload a small report and enqueue its processing task
async fn enqueue_report(harness: &Harness) {
    let bytes = ReportBuilder::new(DEVICE_ID as u32, streamer_selector::USER_NO_REBOOTS)
        .streamer_index(1)
        .report_id(4)
        .sent_timestamp(40)
        .reading(USER_STREAM, 1, 10, 1)
        .reading(USER_STREAM, 2, 20, 2)
        .reading(USER_STREAM, 3, 30, 3)
        .build();
    let (_, arguments) = harness.upload(bytes, 1);
    ActionRegistry::new()
        .schedule(
            &harness.ctx,
            ActionName::ProcessReportV1,
            arguments,
            std::time::Duration::ZERO,
        )
        .await
        .unwrap();
}

fn last_audit_status(harness: &Harness) -> String {
    harness.audit.entries().pop().unwrap().status
}

#[tokio::test]
async fn test_successful_action_is_deleted_and_audited() {
    let harness = Harness::new().await;
    enqueue_report(&harness).await;
    let worker = worker_with(&harness, None);

    let control = worker.poll_once().await.unwrap();
    assert_eq!(control, Some(LoopControl::Continue));
    assert_eq!(worker.state(), WorkerState::Completing);

    let stats = harness.queue.stats(&harness.queue_name()).await;
    assert_eq!(stats.deleted, 1);
    assert_eq!(harness.queue.queue_length(&harness.queue_name()).await, 0);
    assert_eq!(last_audit_status(&harness), "done");
    assert_eq!(worker.identity().count().await, 1);
    assert_eq!(worker.identity().action_count("ProcessReportV1Action").await, 1);

    assert_eq!(worker.poll_once().await.unwrap(), None);
}

#[tokio::test]
async fn test_hard_error_deletes_exactly_once() {
    let harness = Harness::new().await;
    ActionRegistry::new()
        .schedule(
            &harness.ctx,
            ActionName::HandleDelay,
            Arguments::new()
                .with("device_slug", "d--0000-0000-0000-ffff")
                .with("project_id", "nope")
                .with("start_id", 1)
                .with("end_id", 2)
                .with("report_id", "r"),
            std::time::Duration::ZERO,
        )
        .await
        .unwrap();
    let worker = worker_with(&harness, None);

    assert_eq!(worker.poll_once().await.unwrap(), Some(LoopControl::Continue));

    let stats = harness.queue.stats(&harness.queue_name()).await;
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.visibility_changes, 0);
    assert_eq!(harness.queue.queue_length(&harness.queue_name()).await, 0);
    assert_eq!(last_audit_status(&harness), "WorkerActionHardError");
}

#[tokio::test]
async fn test_soft_error_defers_visibility() {
    let harness = Harness::new().await;
    enqueue_report(&harness).await;
    let worker = worker_with(
        &harness,
        Some(Script::Fail(ActionError::soft("downstream busy"))),
    );

    assert_eq!(worker.poll_once().await.unwrap(), Some(LoopControl::Continue));
    assert_eq!(worker.state(), WorkerState::Retrying);

    let stats = harness.queue.stats(&harness.queue_name()).await;
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.visibility_changes, 1);

    let snapshot = harness.queue.snapshot(&harness.queue_name()).await;
    assert_eq!(snapshot.len(), 1);
    let soft_delay = harness.ctx.config.worker.soft_error_delay_seconds as i64;
    let visible_at = snapshot[0].visible_at.unwrap();
    assert!(visible_at > Utc::now() + chrono::Duration::seconds(soft_delay - 5));

    assert_eq!(last_audit_status(&harness), "WorkerActionSoftError");
    assert_eq!(harness.notifier.count_containing("downstream busy"), 1);
    assert_eq!(harness.notifier.count_containing("-Message Body:"), 1);
}

#[tokio::test]
async fn test_store_failure_reschedules_and_terminates() {
    let harness = Harness::new().await;
    enqueue_report(&harness).await;
    let worker = worker_with(
        &harness,
        Some(Script::Fail(ActionError::Store(StoreError::interface(
            "connection reset",
        )))),
    );

    let control = worker.poll_once().await.unwrap();
    assert_eq!(
        control,
        Some(LoopControl::Terminate(TerminationReason::Infrastructure))
    );

    let stats = harness.queue.stats(&harness.queue_name()).await;
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.visibility_changes, 1);
    assert_eq!(last_audit_status(&harness), "WorkerDatabaseError");
    assert_eq!(harness.notifier.count_containing("DB Error"), 1);
}

#[tokio::test]
async fn test_internal_error_deletes_and_terminates() {
    let harness = Harness::new().await;
    enqueue_report(&harness).await;
    let worker = worker_with(
        &harness,
        Some(Script::Fail(ActionError::internal("registry corrupted"))),
    );

    let control = worker.poll_once().await.unwrap();
    assert_eq!(
        control,
        Some(LoopControl::Terminate(TerminationReason::InternalError))
    );
    assert_eq!(harness.queue.queue_length(&harness.queue_name()).await, 0);
    assert_eq!(last_audit_status(&harness), "WorkerInternalError");
}

#[tokio::test]
async fn test_panicking_action_is_an_internal_error() {
    let harness = Harness::new().await;
    enqueue_report(&harness).await;
    let worker = worker_with(&harness, Some(Script::Panic));

    let control = worker.poll_once().await.unwrap();
    assert_eq!(
        control,
        Some(LoopControl::Terminate(TerminationReason::InternalError))
    );
    assert_eq!(harness.queue.queue_length(&harness.queue_name()).await, 0);
    assert_eq!(last_audit_status(&harness), "WorkerInternalError");
}

#[tokio::test]
async fn test_abort_silently_notifies_and_continues() {
    let harness = Harness::new().await;
    enqueue_report(&harness).await;
    let worker = worker_with(
        &harness,
        Some(Script::Fail(ActionError::abort_silently("nothing to do"))),
    );

    assert_eq!(worker.poll_once().await.unwrap(), Some(LoopControl::Continue));
    assert_eq!(harness.queue.queue_length(&harness.queue_name()).await, 0);
    assert_eq!(last_audit_status(&harness), "WorkerAbortSilently");
    assert_eq!(harness.notifier.count_containing("nothing to do"), 1);
}

#[tokio::test]
async fn test_unresolvable_messages_are_dropped() {
    let harness = Harness::new().await;
    let queue_name = harness.queue_name();
    harness
        .queue
        .send_raw(
            &queue_name,
            r#"{"module":"apps.streamer.worker","class":"NoSuchAction","arguments":{}}"#,
        )
        .await
        .unwrap();
    harness.queue.send_raw(&queue_name, "not json").await.unwrap();
    let worker = worker_with(&harness, None);

    assert_eq!(worker.poll_once().await.unwrap(), Some(LoopControl::Continue));
    assert_eq!(worker.poll_once().await.unwrap(), Some(LoopControl::Continue));

    assert_eq!(harness.queue.queue_length(&queue_name).await, 0);
    assert!(harness.audit.entries().is_empty());
    assert_eq!(worker.identity().count().await, 0);
}

#[tokio::test]
async fn test_ping_round_trip() {
    let harness = Harness::new().await;
    ActionRegistry::new()
        .schedule(
            &harness.ctx,
            ActionName::Ping,
            Arguments::new().with("message", "are you there"),
            std::time::Duration::ZERO,
        )
        .await
        .unwrap();
    let worker = worker_with(&harness, None);

    assert_eq!(worker.poll_once().await.unwrap(), Some(LoopControl::Continue));
    assert_eq!(harness.notifier.count_containing("are you there"), 1);
    assert_eq!(last_audit_status(&harness), "done");
}

#[tokio::test]
async fn test_shutdown_request_stops_the_loop() {
    let harness = Harness::new().await;
    ActionRegistry::new()
        .schedule(
            &harness.ctx,
            ActionName::WorkerShutDown,
            Arguments::new(),
            std::time::Duration::ZERO,
        )
        .await
        .unwrap();
    let worker = worker_with(&harness, None);

    let reason = worker.run().await;
    assert_eq!(reason, Some(TerminationReason::Halted));
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert!(!worker.is_running());
    assert_eq!(harness.queue.queue_length(&harness.queue_name()).await, 0);

    let entries = harness.audit.entries();
    assert!(entries.iter().any(|e| e.task == "WorkerStarted"));
    let shutdown = entries
        .iter()
        .find(|e| e.task == "WorkerShutDownAction")
        .unwrap();
    assert_eq!(shutdown.status, "ShutDown-AutoReboot");
    assert_eq!(harness.notifier.count_containing("Worker Started"), 1);
}
