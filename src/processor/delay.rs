use super::reboot::{load_device_and_project, HandleRebootAction};
use crate::actions::{Action, ActionContext, ActionError, ActionName, ActionResult, Arguments};
use crate::constants::system_vid;
use crate::streamer::{DataQuery, DataStatus, Device, Project};
use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;
use tracing::info;

const REQUIRED: [&str; 5] = ["device_slug", "project_id", "start_id", "end_id", "report_id"];

/// Repairs a user report that landed after a reboot it precedes.
///
/// If the last reboot inside `[start_id, end_id]` was flagged dirty, the
/// readings after it are re-anchored from the reading at `end_id`. Reboot
/// handling then runs inline over the block.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandleDelayAction;

#[async_trait]
impl Action for HandleDelayAction {
    fn name(&self) -> ActionName {
        ActionName::HandleDelay
    }

    async fn execute(&self, ctx: &ActionContext, arguments: &Arguments) -> ActionResult<()> {
        if REQUIRED.iter().any(|key| !arguments.contains(key)) {
            return Err(ActionError::hard(format!(
                "Missing fields in arguments payload. Error comes from task HandleDelayAction, received args: {arguments}"
            )));
        }
        let task = self.name().class_name();
        arguments.check(&REQUIRED, &[], task)?;
        let device_slug = arguments.require_str("device_slug", task)?;
        let project_id = arguments.require_str("project_id", task)?;
        let start_id = arguments.require_i64("start_id", task)?;
        let end_id = arguments.require_i64("end_id", task)?;
        info!(
            report = ?arguments.str("report_id"),
            device = %device_slug,
            start_id,
            end_id,
            "Handling delayed report"
        );

        let (device, project) = load_device_and_project(ctx, device_slug, project_id).await?;
        let reboot_ids = reclean_after_dirty_reboot(ctx, &device, &project, start_id, end_id).await?;
        if reboot_ids.is_empty() {
            return Ok(());
        }

        let reboot_arguments = Arguments::new()
            .with("device_slug", device_slug)
            .with("project_id", project_id)
            .with("block_end_id", end_id)
            .with("block_start_id", start_id - 1)
            .with("reboot_ids", json!(reboot_ids));
        HandleRebootAction.execute(ctx, &reboot_arguments).await
    }

    fn prepare_schedule(&self, arguments: Arguments) -> ActionResult<Arguments> {
        if REQUIRED.iter().any(|key| !arguments.contains(key)) {
            return Err(ActionError::hard(format!(
                "Missing fields in argument payload.\nReceived args: {arguments}\nRequired args fields: device_slug, report_id, start_id, end_id, project_id"
            )));
        }
        Ok(arguments)
    }
}

/// Returns the reboot ids found in `[start_id, end_id]`
async fn reclean_after_dirty_reboot(
    ctx: &ActionContext,
    device: &Device,
    project: &Project,
    start_id: i64,
    end_id: i64,
) -> ActionResult<Vec<i64>> {
    let scoped = DataQuery::for_device(device.slug()).in_projects([project.slug()]);
    let reboots = ctx
        .data
        .query(
            &scoped
                .clone()
                .with_vid(system_vid::REBOOT)
                .id_gte(start_id)
                .id_lte(end_id),
        )
        .await?;
    let Some(last_reboot) = reboots.last() else {
        return Ok(Vec::new());
    };

    if last_reboot.dirty_ts || last_reboot.status == DataStatus::Dirty {
        let trusted = ctx
            .data
            .last(&scoped.clone().id_gte(end_id).id_lte(end_id))
            .await?
            .ok_or_else(|| ActionError::hard("Trusted data not found at the end of block"))?;
        let base = trusted.timestamp - Duration::seconds(trusted.device_timestamp);
        info!(
            from = last_reboot.streamer_local_id,
            to = end_id,
            base = %base,
            "Fixing clean data from trusted end of block"
        );

        let data = ctx
            .data
            .query(&scoped.id_gte(last_reboot.streamer_local_id).id_lt(end_id))
            .await?;
        for mut item in data {
            item.timestamp = base + Duration::seconds(item.device_timestamp);
            item.dirty_ts = false;
            item.status = DataStatus::Clean;
            ctx.data.update(&item).await?;
        }
    }

    Ok(reboots.iter().map(|r| r.streamer_local_id).collect())
}
