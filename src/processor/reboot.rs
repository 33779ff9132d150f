//! Timestamp repair after device reboots.
//!
//! Uptime-based timestamps restart at zero on every reboot, so readings
//! committed before the last reboot of a block were anchored to the wrong
//! origin. The repair walks backward from the last reboot of the block:
//!
//! ```text
//!   block_start        reboot[0]      reboot[1]   ...   reboot[n]        block_end
//!       |---- clean ------|---- dirty ---|--- dirty ---|---- cln (tail) ----|
//! ```
//!
//! The segment before the first reboot is re-anchored from a trusted origin
//! (the previous system report, or the latest clean reboot marker). Segments
//! between consecutive reboots have no trusted origin: they are stacked
//! right before the following reboot and flagged dirty.

use super::delay_checker::DelayChecker;
use crate::actions::{Action, ActionContext, ActionError, ActionName, ActionResult, Arguments};
use crate::constants::system_vid;
use crate::streamer::{DataQuery, DataStatus, Device, Project};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

const REQUIRED: [&str; 5] = [
    "device_slug",
    "project_id",
    "block_start_id",
    "block_end_id",
    "reboot_ids",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct HandleRebootAction;

#[async_trait]
impl Action for HandleRebootAction {
    fn name(&self) -> ActionName {
        ActionName::HandleReboot
    }

    async fn execute(&self, ctx: &ActionContext, arguments: &Arguments) -> ActionResult<()> {
        if REQUIRED.iter().any(|key| !arguments.contains(key)) {
            return Err(ActionError::hard(format!(
                "Missing fields in arguments payload. Error comes from task HandleRebootAction, received args: {arguments}"
            )));
        }
        let task = self.name().class_name();
        arguments.check(&REQUIRED, &[], task)?;
        let device_slug = arguments.require_str("device_slug", task)?;
        let project_id = arguments.require_str("project_id", task)?;
        let block_start_id = arguments.require_i64("block_start_id", task)?;
        let block_end_id = arguments.require_i64("block_end_id", task)?;
        let reboot_ids = arguments.require_i64_list("reboot_ids", task)?;

        let (device, project) = load_device_and_project(ctx, device_slug, project_id).await?;

        let checker = DelayChecker::new(ctx, &device, &project, block_start_id, block_end_id, task);
        if checker.ready_to_process().await? {
            info!(device = %device_slug, block_start_id, block_end_id, "Data ready to process");
            let repair = RebootRepair {
                ctx,
                device: &device,
                project: &project,
                block_start_id,
                block_end_id,
            };
            repair.fix_data_backward(&reboot_ids).await?;
            checker.delete_count().await?;
        } else {
            let attempts = checker.continue_delay(&arguments.to_string()).await?;
            info!(
                device = %device_slug,
                attempts,
                "Data not ready to process. Schedule to retry later"
            );
            ctx.schedule(
                self.name(),
                arguments.clone(),
                ctx.config.report.followup_delay(),
            )
            .await?;
        }
        Ok(())
    }

    fn prepare_schedule(&self, arguments: Arguments) -> ActionResult<Arguments> {
        if REQUIRED.iter().any(|key| !arguments.contains(key)) {
            return Err(ActionError::hard(format!(
                "Missing fields in argument payload.\nReceived args: {arguments}\nRequired args fields: device_slug, block_end_id, block_start_id, reboot_ids, project_id"
            )));
        }
        Ok(arguments)
    }
}

/// Resolve the device by slug and the project by id, both required
pub(super) async fn load_device_and_project(
    ctx: &ActionContext,
    device_slug: &str,
    project_id: &str,
) -> ActionResult<(Device, Project)> {
    let device = ctx
        .directory
        .get_device(device_slug)
        .await?
        .ok_or_else(|| ActionError::hard(format!("Device with slug {device_slug} not found !")))?;

    let project = match Uuid::parse_str(project_id) {
        Ok(id) => ctx.directory.get_project(id).await?,
        Err(_) => None,
    }
    .ok_or_else(|| ActionError::hard(format!("Project with id {project_id} not found !")))?;

    Ok((device, project))
}

fn origin(timestamp: DateTime<Utc>, device_timestamp: i64) -> DateTime<Utc> {
    timestamp - Duration::seconds(device_timestamp)
}

struct RebootRepair<'a> {
    ctx: &'a ActionContext,
    device: &'a Device,
    project: &'a Project,
    block_start_id: i64,
    block_end_id: i64,
}

impl RebootRepair<'_> {
    fn scoped(&self) -> DataQuery {
        DataQuery::for_device(self.device.slug()).in_projects([self.project.slug()])
    }

    async fn fix_data_backward(&self, reboot_ids: &[i64]) -> ActionResult<()> {
        let (Some(&first_reboot), Some(&last_reboot)) = (reboot_ids.first(), reboot_ids.last())
        else {
            return Ok(());
        };

        let clean_reboot = self
            .ctx
            .data
            .last(
                &self
                    .scoped()
                    .with_vid(system_vid::REBOOT)
                    .id_gte(last_reboot)
                    .id_lte(last_reboot),
            )
            .await?
            .ok_or_else(|| {
                ActionError::hard(format!("Report clean reboot with id {last_reboot} not found !"))
            })?;
        let mut next_base = origin(clean_reboot.timestamp, clean_reboot.device_timestamp);
        info!(reboot_id = last_reboot, next_base = %next_base, "Timestamp of next base");

        for window in reboot_ids.windows(2).rev() {
            next_base = self.fix_dirty(window[0], window[1], next_base).await?;
        }
        self.fix_clean(first_reboot, next_base).await?;

        let tail = self
            .scoped()
            .id_gte(last_reboot)
            .id_lte(self.block_end_id);
        let cleaned = self.ctx.data.set_status(&tail, DataStatus::Clean).await?;
        info!(from = last_reboot, to = self.block_end_id, cleaned, "Marked block tail clean");
        Ok(())
    }

    /// Stack `[start_id, end_id)` right before `next_base`; returns the origin used
    async fn fix_dirty(
        &self,
        start_id: i64,
        end_id: i64,
        next_base: DateTime<Utc>,
    ) -> ActionResult<DateTime<Utc>> {
        info!(start_id, end_id, next_base = %next_base, "Fixing dirty data");
        let data = self
            .ctx
            .data
            .query(&self.scoped().id_gte(start_id).id_lt(end_id))
            .await?;

        let base = match data.iter().map(|item| item.device_timestamp).max() {
            Some(max) if max != 0 => origin(next_base, max),
            _ => next_base,
        };
        if base != next_base {
            for mut item in data {
                item.timestamp = base + Duration::seconds(item.device_timestamp);
                item.dirty_ts = true;
                item.status = DataStatus::Dirty;
                self.ctx.data.update(&item).await?;
            }
        }
        info!(base = %base, "Base dirty timestamp");
        Ok(base)
    }

    /// Re-anchor `(block_start_id, end_id)` from a trusted origin, falling back to dirty stacking
    async fn fix_clean(&self, end_id: i64, next_base: DateTime<Utc>) -> ActionResult<()> {
        let start_id = self.block_start_id + 1;
        info!(start_id, end_id, next_base = %next_base, "Fixing clean data");

        let base = match self.trusted_origin(end_id).await? {
            Some(base) => base,
            None => {
                info!("Base timestamp not found. Fix as dirty data");
                self.fix_dirty(start_id, end_id, next_base).await?;
                return Ok(());
            }
        };

        let data = self
            .ctx
            .data
            .query(&self.scoped().id_gte(start_id).id_lt(end_id))
            .await?;
        for mut item in data {
            item.timestamp = base + Duration::seconds(item.device_timestamp);
            item.status = DataStatus::Clean;
            self.ctx.data.update(&item).await?;
        }
        Ok(())
    }

    /// Origin of the system report that opened the block, else of the latest clean reboot
    async fn trusted_origin(&self, end_id: i64) -> ActionResult<Option<DateTime<Utc>>> {
        let streamers = self
            .ctx
            .directory
            .streamers_for_device(&self.device.slug())
            .await?;
        if let Some(system) = streamers.iter().find(|s| s.is_system) {
            let previous = self
                .ctx
                .directory
                .find_reports(&system.slug, self.block_start_id)
                .await?
                .pop();
            if let Some(report) = previous {
                if let (Some(sent), Some(device_sent)) = (
                    report.sent_timestamp,
                    report.device_sent_timestamp.filter(|ts| *ts != 0),
                ) {
                    info!(report = %report.id, incremental_id = ?report.incremental_id, "Found trusted report");
                    return Ok(Some(origin(sent, device_sent)));
                }
            }
        }

        let reboot = self
            .ctx
            .data
            .last(
                &DataQuery::for_device(self.device.slug())
                    .with_vid(system_vid::REBOOT)
                    .id_gt(0)
                    .id_lt(end_id)
                    .clean_timestamps_only(),
            )
            .await?;
        Ok(reboot
            .filter(|r| r.device_timestamp != 0)
            .map(|r| {
                info!(reboot_id = r.streamer_local_id, timestamp = %r.timestamp, "Found trusted reboot");
                origin(r.timestamp, r.device_timestamp)
            }))
    }
}
