//! Readiness gate for block repairs.
//!
//! Reboot handling over `[start_id, end_id]` must wait until every streamer
//! of the device has committed its share of the block. Each retry is counted
//! under `delay-process:{device}:{start}:{end}`; past the configured maximum
//! the repair gives up with a hard error.

use crate::actions::{ActionContext, ActionError, ActionResult};
use crate::constants::{keys::DELAY_CHECK_PREFIX, system_vid};
use crate::streamer::{DataQuery, Device, Project};
use serde_json::json;
use tracing::{info, warn};

pub struct DelayChecker<'a> {
    ctx: &'a ActionContext,
    device: &'a Device,
    project: &'a Project,
    start_id: i64,
    end_id: i64,
    action: &'a str,
    key: String,
}

impl<'a> DelayChecker<'a> {
    pub fn new(
        ctx: &'a ActionContext,
        device: &'a Device,
        project: &'a Project,
        start_id: i64,
        end_id: i64,
        action: &'a str,
    ) -> Self {
        Self {
            ctx,
            device,
            project,
            start_id,
            end_id,
            action,
            key: Self::key(&device.slug(), start_id, end_id),
        }
    }

    pub fn key(device_slug: &str, start_id: i64, end_id: i64) -> String {
        format!("{DELAY_CHECK_PREFIX}:{device_slug}:{start_id}:{end_id}")
    }

    /// True once user streamers have reached the block start and every
    /// streamer's completion marker is committed
    pub async fn ready_to_process(&self) -> ActionResult<bool> {
        let device_slug = self.device.slug();
        let mut projects = vec![self.project.slug()];
        if let Some(current) = self.device.project_id.filter(|id| *id != self.project.id) {
            if let Some(project) = self.ctx.directory.get_project(current).await? {
                projects.push(project.slug());
            }
        }

        for streamer in self.ctx.directory.streamers_for_device(&device_slug).await? {
            if streamer.last_id == 0 {
                continue;
            }
            if !streamer.triggers_block_completeness() && streamer.last_id < self.start_id {
                info!(streamer = %streamer.slug, "User streamer is not in sync with system streamer");
                return Ok(false);
            }
            let marker = DataQuery::for_device(device_slug.as_str())
                .in_projects(projects.iter().cloned())
                .with_vid(system_vid::COMPLETE_REPORT)
                .with_int_value(i64::from(streamer.index))
                .id_gte(streamer.last_id);
            if self.ctx.data.count(&marker).await? == 0 {
                info!(
                    streamer = %streamer.slug,
                    last_id = streamer.last_id,
                    "Completion marker of streamer not found"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Count another wait; fails once the attempt budget is spent
    pub async fn continue_delay(&self, context: &str) -> ActionResult<i64> {
        let max_attempts = self.ctx.config.report.delay_check_max_attempts;
        let attempts = self.ctx.cache.get_i64(&self.key).await?.unwrap_or(0);

        if attempts == 0 {
            self.ctx
                .cache
                .set(&self.key, json!(1), Some(self.ctx.config.report.delay_check_ttl()))
                .await?;
            return Ok(1);
        }
        if attempts < max_attempts {
            warn!(
                action = %self.action,
                start_id = self.start_id,
                end_id = self.end_id,
                key = %self.key,
                attempts,
                "New attempt to process a data range but streamer is not ready"
            );
            return self.ctx.cache.incr(&self.key, 1).await.map_err(|e| {
                warn!(key = %self.key, error = %e, "Unable to increase cache");
                ActionError::hard(e.to_string())
            });
        }
        Err(ActionError::hard(format!(
            "{}: {max_attempts} attempts. Giving up. Args:\n{context}",
            self.action
        )))
    }

    pub async fn delete_count(&self) -> ActionResult<()> {
        let current = self.ctx.cache.get(&self.key).await?;
        info!(action = %self.action, key = %self.key, count = ?current, "Clearing delay counter");
        if current.is_some() {
            self.ctx.cache.delete(&self.key).await.map_err(|e| {
                warn!(key = %self.key, error = %e, "Unable to delete cache");
                ActionError::hard(e.to_string())
            })?;
        }
        Ok(())
    }
}
