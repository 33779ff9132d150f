//! Incremental-id reconciliation of one parsed report.
//!
//! Readings at or below the streamer cursor were committed by an earlier
//! report and are skipped, which makes reprocessing the same bytes a no-op.
//! Callers must hold the streamer's concurrency guard.

use super::{HandleDelayAction, HandleRebootAction};
use crate::actions::{Action, ActionContext, ActionError, ActionName, ActionResult, Arguments};
use crate::constants::{streamer_selector, system_vid};
use crate::report::{base_timestamp, reading_timestamp, ParsedReport, ReportParser};
use crate::streamer::{
    DataQuery, DataStatus, Device, Project, StreamData, Streamer, StreamerReport,
};
use crate::utils::gid;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What a reconciliation pass committed and scheduled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileSummary {
    /// Newly committed readings on enabled streams
    pub count: usize,
    pub actual_first_id: Option<i64>,
    pub actual_last_id: Option<i64>,
    pub reboot_ids: Vec<i64>,
    pub chopped: bool,
    pub followups: Vec<ActionName>,
}

struct Target {
    device: Device,
    project: Project,
    streamer: Streamer,
}

#[derive(Default)]
struct NewReadings {
    entries: Vec<StreamData>,
    reboot_ids: Vec<i64>,
    count: usize,
    first_id: Option<i64>,
    last_id: Option<i64>,
    last_user_id: Option<i64>,
    last_system_id: Option<i64>,
}

impl NewReadings {
    fn track(&mut self, incremental_id: i64, system: bool) {
        self.first_id.get_or_insert(incremental_id);
        self.last_id = Some(incremental_id);
        if system {
            self.last_system_id = Some(incremental_id);
        } else {
            self.last_user_id = Some(incremental_id);
        }
    }
}

pub struct ReportReconciler<'a> {
    ctx: &'a ActionContext,
    report: StreamerReport,
    received: DateTime<Utc>,
}

impl<'a> ReportReconciler<'a> {
    pub fn new(ctx: &'a ActionContext, report: StreamerReport, received: DateTime<Utc>) -> Self {
        Self {
            ctx,
            report,
            received,
        }
    }

    pub fn report(&self) -> &StreamerReport {
        &self.report
    }

    pub async fn process(&mut self, data: &[u8]) -> ActionResult<ReconcileSummary> {
        let started = Instant::now();

        let parsed = ReportParser::parse(data, self.ctx.config.report.max_report_length)?;
        self.record_claimed_range(&parsed).await?;

        let mut target = self.resolve_target(&parsed).await?;
        self.initialize_device(&mut target).await?;

        if parsed.chopped {
            warn!(
                device = %target.device.slug(),
                report = %self.report.id,
                "Report likely chopped off"
            );
        }

        let base = base_timestamp(self.received, parsed.header.sent_timestamp);
        let mut readings = self.read_stream_data(&parsed, &target, base).await?;
        // Reboot-aware user selectors belong to a later engine
        if parsed.header.streamer_selector == streamer_selector::USER {
            return Err(ActionError::hard(format!(
                "Unexpected selector for V1 engine: {}",
                streamer_selector::USER
            )));
        }

        self.commit(&parsed, &target, &mut readings).await?;
        self.update_records(&mut target, &readings, base).await?;

        let mut summary = ReconcileSummary {
            count: readings.count,
            actual_first_id: readings.first_id,
            actual_last_id: readings.last_id,
            reboot_ids: readings.reboot_ids.clone(),
            chopped: parsed.chopped,
            followups: Vec::new(),
        };

        if readings.count > 0 {
            summary.followups = self.schedule_followups(&parsed, &mut target, &readings).await?;
            self.ctx
                .post_processor
                .process(self.ctx, &self.report, &readings.entries)
                .await?;
        }

        info!(
            count = readings.count,
            streamer = %target.streamer.slug,
            last_user_id = ?readings.last_user_id,
            last_system_id = ?readings.last_system_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Processed report"
        );
        Ok(summary)
    }

    async fn record_claimed_range(&mut self, parsed: &ParsedReport) -> ActionResult<()> {
        self.report.original_first_id = Some(i64::from(parsed.footer.lowest_id));
        self.report.original_last_id = Some(i64::from(parsed.footer.highest_id));
        self.report.incremental_id = Some(i64::from(parsed.header.report_id));
        self.report.device_sent_timestamp = Some(i64::from(parsed.header.sent_timestamp));
        self.report.sent_timestamp.get_or_insert(self.received);
        self.ctx.directory.save_report(&self.report).await?;
        Ok(())
    }

    async fn resolve_target(&self, parsed: &ParsedReport) -> ActionResult<Target> {
        let header = &parsed.header;
        let device_slug = gid::device_slug(u64::from(header.device_id));
        info!(device = %device_slug, "Looking for streamers using report device id");

        let device = self
            .ctx
            .directory
            .get_device(&device_slug)
            .await?
            .ok_or_else(|| ActionError::hard("Device not found in database"))?;
        let project_id = device.project_id.ok_or_else(|| {
            ActionError::hard(format!(
                "Device {device_slug} has not been claimed. Yet, it is uploading a report"
            ))
        })?;
        let project = self
            .ctx
            .directory
            .get_project(project_id)
            .await?
            .ok_or_else(|| ActionError::hard(format!("Project with id {project_id} not found !")))?;

        let mut streamers = self
            .ctx
            .directory
            .streamers_for_index(&device_slug, header.streamer_index)
            .await?;
        if streamers.len() > 1 {
            return Err(ActionError::hard(format!(
                "Illegal Condition. More than one Streamer for device {device_slug}"
            )));
        }
        let streamer = match streamers.pop() {
            Some(streamer) => streamer,
            None => {
                let mut streamer =
                    Streamer::new(device.id, header.streamer_index, header.streamer_selector);
                streamer.created_by = self.report.created_by.clone();
                info!(streamer = %streamer.slug, "Creating streamer");
                self.ctx.directory.create_streamer(streamer).await?
            }
        };

        if streamer.slug != self.report.streamer_slug {
            return Err(ActionError::hard(format!(
                "The streamer indicated in the streamer report doesn't correspond to the streamer slug of the streamer report in database\n\
                 Streamer found by report' header : {}\n\
                 Streamer registered by streamer report: {}",
                streamer.slug, self.report.streamer_slug
            )));
        }

        Ok(Target {
            device,
            project,
            streamer,
        })
    }

    /// Seed the device watermark from its latest reboot, or 1 on first contact
    async fn initialize_device(&self, target: &mut Target) -> ActionResult<()> {
        if target.device.last_known_id.unwrap_or(0) != 0 {
            return Ok(());
        }
        let last_known_id = match self.last_reboot(&target.device).await {
            Some(reboot) => {
                info!(device = %target.device.slug(), "Device's last_known_id doesn't exist, take the latest reboot");
                reboot.streamer_local_id
            }
            None => {
                info!(device = %target.device.slug(), "Device's last_known_id doesn't exist, set to 1");
                1
            }
        };
        target.device.last_known_id = Some(last_known_id);
        self.ctx.directory.save_device(&target.device).await?;
        Ok(())
    }

    /// Most recent reboot marker of the device; lookup failures only alert
    async fn last_reboot(&self, device: &Device) -> Option<StreamData> {
        let query = DataQuery::for_device(device.slug())
            .with_vid(system_vid::REBOOT)
            .id_gt(0);
        match self.ctx.data.last(&query).await {
            Ok(reboot) => reboot,
            Err(e) => {
                let message = format!(
                    "Query for data failed:  device={}, variable__contain={:04x}\n\n{e}",
                    device.slug(),
                    system_vid::REBOOT
                );
                warn!(device = %device.slug(), error = %e, "Reboot lookup failed");
                self.ctx.notifier.notify(&message).await;
                None
            }
        }
    }

    async fn read_stream_data(
        &self,
        parsed: &ParsedReport,
        target: &Target,
        base: DateTime<Utc>,
    ) -> ActionResult<NewReadings> {
        let mut readings = NewReadings::default();
        let mut enabled: HashMap<String, bool> = HashMap::new();

        for reading in &parsed.readings {
            let incremental_id = i64::from(reading.id);
            if incremental_id <= target.streamer.last_id {
                continue;
            }

            let timestamp = reading_timestamp(base, reading.timestamp);
            let entry = StreamData::new(
                &target.project,
                &target.device,
                reading.stream,
                incremental_id,
                i64::from(reading.timestamp),
                timestamp,
                i64::from(reading.value),
            );
            readings.track(incremental_id, reading.is_system());

            let stream_enabled = match enabled.get(&entry.stream_slug) {
                Some(flag) => *flag,
                None => {
                    let flag = self.ctx.directory.is_stream_enabled(&entry.stream_slug).await?;
                    enabled.insert(entry.stream_slug.clone(), flag);
                    flag
                }
            };
            if reading.stream == system_vid::REBOOT {
                info!(stream = %entry.stream_slug, incremental_id, "Found reboot");
                readings.reboot_ids.push(incremental_id);
            }
            if stream_enabled {
                readings.entries.push(entry);
                readings.count += 1;
            }
        }
        Ok(readings)
    }

    async fn commit(
        &self,
        parsed: &ParsedReport,
        target: &Target,
        readings: &mut NewReadings,
    ) -> ActionResult<()> {
        if readings.count == 0 || readings.first_id.is_none() || readings.last_id.is_none() {
            return Ok(());
        }

        let marker_vid = if parsed.chopped {
            system_vid::CHOPPED_REPORT
        } else {
            system_vid::COMPLETE_REPORT
        };
        let marker = StreamData::new(
            &target.project,
            &target.device,
            marker_vid,
            i64::from(parsed.header.report_id),
            i64::from(parsed.header.sent_timestamp),
            self.received,
            i64::from(target.streamer.index),
        )
        .with_status(DataStatus::Clean);
        readings.entries.push(marker);

        let inserted = self.ctx.data.bulk_insert(readings.entries.clone()).await?;
        debug!(inserted, streamer = %target.streamer.slug, "Committed readings");
        Ok(())
    }

    async fn update_records(
        &mut self,
        target: &mut Target,
        readings: &NewReadings,
        base: DateTime<Utc>,
    ) -> ActionResult<()> {
        let directory = &self.ctx.directory;

        if readings.count > 0 {
            let (Some(first_id), Some(last_id)) = (readings.first_id, readings.last_id) else {
                return Ok(());
            };
            info!(
                device = %target.device.slug(),
                from = ?target.device.last_known_id,
                to = last_id,
                "Updating streamer cursor"
            );
            let mut status = directory.get_or_create_device_status(target.device.id).await?;

            self.report.actual_first_id = Some(first_id);
            self.report.actual_last_id = Some(last_id);
            directory.save_report(&self.report).await?;

            target.streamer.advance_last_id(last_id);
            target.streamer.last_reboot_ts = Some(base);
            directory.save_streamer(&target.streamer).await?;

            if last_id > status.last_known_id {
                status.last_known_id = last_id;
                status.last_report_ts = Some(self.received);
                directory.save_device_status(&status).await?;
            }
        } else if self.report.actual_first_id.is_none() && self.report.actual_last_id.is_none() {
            self.report.actual_first_id = Some(0);
            self.report.actual_last_id = Some(0);
            directory.save_report(&self.report).await?;
        }
        Ok(())
    }

    async fn schedule_followups(
        &self,
        parsed: &ParsedReport,
        target: &mut Target,
        readings: &NewReadings,
    ) -> ActionResult<Vec<ActionName>> {
        let delay = self.ctx.config.report.followup_delay();
        let device_slug = target.device.slug();
        let project_id = target.project.id.to_string();
        let mut scheduled = Vec::new();

        if target.streamer.is_system {
            if !readings.reboot_ids.is_empty() {
                info!(reboot_ids = ?readings.reboot_ids, "Reboot detected, scheduling reboot handling");
                let arguments = Arguments::new()
                    .with("device_slug", device_slug.as_str())
                    .with("project_id", project_id.as_str())
                    .with("block_end_id", parsed.header.report_id)
                    .with("block_start_id", target.device.last_known_id.unwrap_or(1))
                    .with("reboot_ids", json!(readings.reboot_ids));
                let arguments = HandleRebootAction.prepare_schedule(arguments)?;
                self.ctx.schedule(ActionName::HandleReboot, arguments, delay).await?;
                scheduled.push(ActionName::HandleReboot);
            }

            target.device.last_known_id = Some(i64::from(parsed.header.report_id));
            self.ctx.directory.save_device(&target.device).await?;
        } else if let (Some(reboot), Some(first_id)) =
            (self.last_reboot(&target.device).await, readings.first_id)
        {
            if first_id < reboot.streamer_local_id {
                info!(
                    first_id,
                    reboot_id = reboot.streamer_local_id,
                    "Delayed report detected, scheduling delay handling"
                );
                let arguments = Arguments::new()
                    .with("device_slug", device_slug.as_str())
                    .with("project_id", project_id.as_str())
                    .with("start_id", first_id)
                    .with("end_id", readings.last_id.unwrap_or(first_id))
                    .with("report_id", self.report.id.to_string());
                let arguments = HandleDelayAction.prepare_schedule(arguments)?;
                self.ctx.schedule(ActionName::HandleDelay, arguments, delay).await?;
                scheduled.push(ActionName::HandleDelay);
            }
        }
        Ok(scheduled)
    }
}
