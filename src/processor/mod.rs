//! # Report Processing
//!
//! Turns uploaded device reports into committed time-series readings and
//! schedules the follow-up work that repairs timelines around reboots.
//!
//! ```text
//!   ProcessReportV1Action  fetch -> guard -> parse -> reconcile -> follow-ups -> post-process
//!   HandleRebootAction     re-anchor timestamps of a system block once every streamer caught up
//!   HandleDelayAction      repair a late user report, then run reboot handling inline
//! ```
//!
//! All three run under the action contract: they return an `ActionResult`
//! and let the worker decide what happens to the envelope.

mod delay;
mod delay_checker;
mod locator;
mod reboot;
mod reconcile;
mod report;

pub use delay::HandleDelayAction;
pub use delay_checker::DelayChecker;
pub use locator::{LocatorError, ReportLocator};
pub use reboot::HandleRebootAction;
pub use reconcile::{ReconcileSummary, ReportReconciler};
pub use report::ProcessReportV1Action;

use crate::actions::{ActionContext, ActionResult};
use crate::streamer::{StreamData, StreamerReport};
use async_trait::async_trait;

/// Hook run on the committed entries of a report.
///
/// Runs after follow-up work is scheduled but before any reboot handling has
/// re-anchored the timeline, so the timestamps it sees may still be revised.
#[async_trait]
pub trait ReportPostProcessor: Send + Sync {
    async fn process(
        &self,
        ctx: &ActionContext,
        report: &StreamerReport,
        entries: &[StreamData],
    ) -> ActionResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPostProcessor;

#[async_trait]
impl ReportPostProcessor for NoopPostProcessor {
    async fn process(
        &self,
        _ctx: &ActionContext,
        _report: &StreamerReport,
        _entries: &[StreamData],
    ) -> ActionResult<()> {
        Ok(())
    }
}
