//! The queue-consuming worker loop.
//!
//! One message at a time: receive, resolve, execute, then apply the outcome
//! to the message lifecycle.
//!
//! | Outcome            | Audit status            | Message                    | Loop        |
//! |--------------------|-------------------------|----------------------------|-------------|
//! | `Ok`               | `done`                  | deleted                    | continue    |
//! | `AbortSilently`    | `WorkerAbortSilently`   | deleted, operators notified| continue    |
//! | `HardError`        | `WorkerActionHardError` | deleted                    | continue    |
//! | `SoftError`        | `WorkerActionSoftError` | visibility deferred        | continue    |
//! | `InternalError`    | `WorkerInternalError`   | deleted                    | terminate   |
//! | `HaltAndCatchFire` | `ShutDown-N`            | deleted, then checkpoints  | terminate   |
//! | store failure      | `WorkerDatabaseError`   | visibility deferred        | terminate   |
//!
//! Termination is returned to the caller as [`LoopControl::Terminate`]; the
//! binary decides how the process ends.

use super::identity::WorkerIdentity;
use super::shutdown::HaltSequence;
use super::state::{LoopControl, TerminationReason, WorkerState};
use crate::actions::{ActionContext, ActionError, ActionRegistry, Arguments, OutcomeKind};
use crate::audit::{status, AuditKey, NewWorkerLogEntry};
use crate::constants::WORKER_STARTED;
use crate::logging::{log_error, log_task_operation};
use crate::messaging::{ActionPid, MessagingResult, QueuedMessage};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub struct Worker {
    ctx: ActionContext,
    registry: ActionRegistry,
    identity: WorkerIdentity,
    halt: HaltSequence,
    state: Mutex<WorkerState>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.identity.id())
            .field("state", &*self.state.lock())
            .field("queue", &self.ctx.queue_name())
            .finish()
    }
}

impl Worker {
    /// Build a worker over `ctx`. A `worker_id` that is not a UUID is replaced.
    pub fn new(mut ctx: ActionContext) -> Self {
        let id = Uuid::parse_str(&ctx.worker_id).unwrap_or_else(|_| Uuid::new_v4());
        ctx.worker_id = id.to_string();
        let identity = WorkerIdentity::with_id(id, ctx.cache.clone());
        let halt = HaltSequence::from(&ctx.config.worker);
        Self {
            ctx,
            registry: ActionRegistry::new(),
            identity,
            halt,
            state: Mutex::new(WorkerState::Idle),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn context(&self) -> &ActionContext {
        &self.ctx
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Handle for stopping the loop from another task
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Ask the loop to exit after the current message
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn transition(&self, next: WorkerState) {
        let mut state = self.state.lock();
        if *state == next {
            return;
        }
        if !state.can_transition_to(next) {
            warn!(from = %*state, to = %next, "Unexpected worker state transition");
        }
        debug!(from = %*state, to = %next, "Worker state transition");
        *state = next;
    }

    /// Register the worker and announce it to operators
    pub async fn announce_start(&self) {
        let now = Utc::now();
        info!(worker_id = %self.identity, queue = %self.ctx.queue_name(), "Running worker");
        if let Err(e) = self.identity.start(now).await {
            warn!(worker_id = %self.identity, error = %e, "Unable to register worker");
        }
        self.identity.increment_action_count(WORKER_STARTED).await;
        self.ctx
            .notifier
            .notify(&format!(
                "Worker Started:\n\n - ID: {}:{}\n - Timestamp: {}",
                self.ctx.server_type(),
                self.identity,
                now
            ))
            .await;
        self.create_audit(WORKER_STARTED, Value::String(String::new()))
            .await;
    }

    /// Poll until stopped or until an outcome asks for termination
    pub async fn run(&self) -> Option<TerminationReason> {
        if let Err(e) = self.ctx.queue.ensure_queue(self.ctx.queue_name()).await {
            error!(queue = %self.ctx.queue_name(), error = %e, "Unable to prepare queue");
        }
        self.announce_start().await;
        self.running.store(true, Ordering::SeqCst);

        while self.is_running() {
            match self.poll_once().await {
                Ok(Some(LoopControl::Terminate(reason))) => {
                    self.running.store(false, Ordering::SeqCst);
                    self.transition(WorkerState::Stopped);
                    info!(worker_id = %self.identity, reason = %reason, "Worker terminating");
                    return Some(reason);
                }
                Ok(Some(LoopControl::Continue)) => {}
                Ok(None) => {
                    self.transition(WorkerState::Idle);
                    debug!(
                        wait_seconds = self.ctx.config.worker.wait_time_seconds,
                        "Nothing in queue, worker goes to sleep"
                    );
                    tokio::time::sleep(self.ctx.config.worker.wait_time()).await;
                }
                Err(e) => {
                    self.transition(WorkerState::Idle);
                    error!(queue = %self.ctx.queue_name(), error = %e, "Error receiving messages");
                    tokio::time::sleep(self.ctx.config.worker.wait_time()).await;
                }
            }
        }

        self.transition(WorkerState::Stopped);
        info!(worker_id = %self.identity, "Worker stopped");
        None
    }

    /// Receive and process one batch; `None` when the queue was empty
    #[instrument(skip(self), fields(worker_id = %self.identity))]
    pub async fn poll_once(&self) -> MessagingResult<Option<LoopControl>> {
        self.transition(WorkerState::Polling);
        let messages = self
            .ctx
            .queue
            .receive(
                self.ctx.queue_name(),
                self.ctx.config.worker.max_messages as usize,
                self.ctx.config.worker.visibility_timeout(),
            )
            .await?;
        if messages.is_empty() {
            return Ok(None);
        }

        let mut control = LoopControl::Continue;
        for message in &messages {
            control = self.process_message(message).await;
            if control.should_terminate() {
                break;
            }
        }
        Ok(Some(control))
    }

    /// Dispatch one message and apply its outcome
    pub async fn process_message(&self, message: &QueuedMessage) -> LoopControl {
        self.transition(WorkerState::Dispatching);
        log_task_operation(
            "received",
            None,
            Some(message.message_id.as_str()),
            "dispatching",
            Some(&message.body),
        );

        let resolved = message
            .envelope()
            .map_err(|e| e.to_string())
            .and_then(|envelope| {
                self.registry
                    .resolve(&envelope.module, &envelope.class)
                    .map(|action| (envelope, action))
                    .map_err(|e| e.to_string())
            });
        let (envelope, action) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                self.log_failure(&e, Some(message));
                self.delete_message(message).await;
                self.transition(WorkerState::Completing);
                return LoopControl::Continue;
            }
        };

        let task = envelope.class.clone();
        self.identity.increment_count().await;
        self.identity.increment_action_count(&task).await;
        let audit_key = self
            .create_audit(&task, Value::Object(envelope.arguments.clone()))
            .await;

        let arguments = Arguments::from(envelope.arguments);
        let started = Instant::now();
        let outcome = AssertUnwindSafe(action.execute(&self.ctx, &arguments))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ActionError::internal(panic_message(panic.as_ref()))));
        let execution_time = started.elapsed().as_secs_f64();
        info!(
            action = %task,
            message_id = %message.message_id,
            execution_time,
            "Worker task finished"
        );

        let error = match outcome {
            Ok(()) => {
                self.update_audit(audit_key.as_ref(), status::DONE, execution_time).await;
                self.delete_message(message).await;
                self.transition(WorkerState::Completing);
                log_task_operation("completed", Some(&task), Some(message.message_id.as_str()), status::DONE, None);
                return LoopControl::Continue;
            }
            Err(error) => error,
        };

        let kind = error.kind();
        let text = error.to_string();
        log_task_operation(
            "failed",
            Some(&task),
            Some(message.message_id.as_str()),
            kind.audit_status(),
            Some(&text),
        );

        match kind {
            OutcomeKind::Ok => LoopControl::Continue,
            OutcomeKind::Infrastructure => {
                self.reschedule_message(message, self.ctx.config.worker.infra_error_delay())
                    .await;
                self.transition(WorkerState::Retrying);
                self.update_audit(audit_key.as_ref(), kind.audit_status(), execution_time)
                    .await;
                self.notify_staff(
                    &format!("DB Error: Attempting to close all unused and obsoleted dbs: {text}"),
                    Some(message),
                )
                .await;
                self.ctx.directory.reset_connections().await;
                self.ctx.queue.reset_connections().await;
                LoopControl::Terminate(TerminationReason::Infrastructure)
            }
            OutcomeKind::InternalError => {
                self.update_audit(audit_key.as_ref(), kind.audit_status(), execution_time)
                    .await;
                self.log_failure(&text, Some(message));
                self.delete_message(message).await;
                self.transition(WorkerState::Completing);
                LoopControl::Terminate(TerminationReason::InternalError)
            }
            OutcomeKind::HardError => {
                self.update_audit(audit_key.as_ref(), kind.audit_status(), execution_time)
                    .await;
                self.log_failure(&text, Some(message));
                self.delete_message(message).await;
                self.transition(WorkerState::Completing);
                LoopControl::Continue
            }
            OutcomeKind::SoftError => {
                self.update_audit(audit_key.as_ref(), kind.audit_status(), execution_time)
                    .await;
                self.notify_staff(&text, Some(message)).await;
                self.reschedule_message(message, self.ctx.config.worker.soft_error_delay())
                    .await;
                self.transition(WorkerState::Retrying);
                LoopControl::Continue
            }
            OutcomeKind::HaltAndCatchFire => {
                self.transition(WorkerState::Halting);
                self.update_audit(audit_key.as_ref(), &status::shutdown_checkpoint(0), execution_time)
                    .await;
                self.log_failure(&text, Some(message));
                self.delete_message(message).await;
                self.halt
                    .run(
                        &self.ctx.worker_id,
                        self.ctx.audit.as_ref(),
                        audit_key.as_ref(),
                        execution_time,
                    )
                    .await;
                self.stop();
                LoopControl::Terminate(TerminationReason::Halted)
            }
            OutcomeKind::AbortSilently => {
                self.update_audit(audit_key.as_ref(), kind.audit_status(), execution_time)
                    .await;
                warn!(action = %task, message_id = %message.message_id, "{text}");
                self.notify_staff(&text, Some(message)).await;
                self.delete_message(message).await;
                self.transition(WorkerState::Completing);
                LoopControl::Continue
            }
        }
    }

    async fn create_audit(&self, task: &str, arguments: Value) -> Option<AuditKey> {
        let entry = NewWorkerLogEntry {
            worker_id: self.ctx.worker_id.clone(),
            task: task.to_string(),
            arguments,
        };
        match self.ctx.audit.create(entry).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(task = %task, error = %e, "Unable to create worker log");
                None
            }
        }
    }

    async fn update_audit(&self, key: Option<&AuditKey>, status: &str, execution_time: f64) {
        let Some(key) = key else {
            return;
        };
        if let Err(e) = self.ctx.audit.update(key, status, Some(execution_time)).await {
            warn!(status = %status, error = %e, "Unable to update worker log");
        }
    }

    async fn delete_message(&self, message: &QueuedMessage) {
        self.forget_pid(message).await;
        if let Err(e) = self
            .ctx
            .queue
            .delete(self.ctx.queue_name(), &message.message_id)
            .await
        {
            warn!(message_id = %message.message_id, error = %e, "Failed to delete message");
        }
    }

    /// Defer redelivery by changing visibility; the message is not re-sent
    async fn reschedule_message(&self, message: &QueuedMessage, delay: Duration) {
        self.forget_pid(message).await;
        if let Err(e) = self
            .ctx
            .queue
            .change_visibility(self.ctx.queue_name(), &message.message_id, delay)
            .await
        {
            warn!(message_id = %message.message_id, error = %e, "Failed to change message visibility");
        }
    }

    async fn forget_pid(&self, message: &QueuedMessage) {
        if let Err(e) = ActionPid::delete(self.ctx.cache.as_ref(), message.message_id.as_str()).await {
            debug!(message_id = %message.message_id, error = %e, "Unable to delete action pid");
        }
    }

    async fn notify_staff(&self, error_text: &str, message: Option<&QueuedMessage>) {
        self.ctx
            .notifier
            .notify(&failure_report(error_text, message))
            .await;
    }

    fn log_failure(&self, error_text: &str, message: Option<&QueuedMessage>) {
        log_error(
            "worker",
            "process_message",
            error_text,
            Some(&failure_report(error_text, message)),
        );
    }
}

/// `{error}\n\nMessage ID {id}.\n-Message Body: {body}\n\n`
pub fn failure_report(error_text: &str, message: Option<&QueuedMessage>) -> String {
    let mut report = format!("{error_text}\n\n");
    if let Some(message) = message {
        report.push_str(&format!(
            "Message ID {}.\n-Message Body: {}\n\n",
            message.message_id, message.body
        ));
    }
    report
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Action panicked: {detail}")
}
