//! Bounded wait after a shutdown request.
//!
//! The shutdown envelope is already deleted when the sequence starts. The
//! worker then stays alive for a fixed number of checkpoints so an
//! orchestrator can replace it, recording each checkpoint in the audit log,
//! and finally gives up and stops on its own.

use crate::audit::{status, AuditKey, AuditLog};
use crate::config::WorkerSection;
use chrono::Utc;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaltSequence {
    pub checkpoints: u32,
    pub interval: Duration,
}

impl From<&WorkerSection> for HaltSequence {
    fn from(config: &WorkerSection) -> Self {
        Self {
            checkpoints: config.halt_checkpoints,
            interval: config.halt_checkpoint_interval(),
        }
    }
}

impl HaltSequence {
    pub fn total_wait(&self) -> Duration {
        self.interval * self.checkpoints
    }

    /// Sleep through every checkpoint, then record the automatic reboot
    pub async fn run(
        &self,
        worker_id: &str,
        audit: &dyn AuditLog,
        audit_key: Option<&AuditKey>,
        execution_time: f64,
    ) {
        for checkpoint in 1..=self.checkpoints {
            tokio::time::sleep(self.interval).await;
            error!(
                worker_id = %worker_id,
                checkpoint,
                "Alert {checkpoint}, ID={worker_id} ==> Still waiting for shut down at {}",
                Utc::now()
            );
            record(audit, audit_key, &status::shutdown_checkpoint(checkpoint), execution_time).await;
        }

        error!(
            worker_id = %worker_id,
            "{}: ID={worker_id} ==> Aborting shutdown after {}min at {}",
            self.checkpoints + 1,
            self.total_wait().as_secs() / 60,
            Utc::now()
        );
        record(audit, audit_key, status::SHUTDOWN_AUTO_REBOOT, execution_time).await;
    }
}

async fn record(audit: &dyn AuditLog, key: Option<&AuditKey>, status: &str, execution_time: f64) {
    let Some(key) = key else {
        return;
    };
    if let Err(e) = audit.update(key, status, Some(execution_time)).await {
        warn!(status = %status, error = %e, "Unable to update worker log");
    }
}
