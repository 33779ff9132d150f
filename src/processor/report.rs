use super::locator::{ReportLocator, REPORT_EXTENSION};
use super::reconcile::ReportReconciler;
use crate::actions::{Action, ActionContext, ActionError, ActionName, ActionResult, Arguments};
use crate::guard::{Acquisition, ConcurrencyGuard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Report engine versions handled by this worker
const SUPPORTED_VERSIONS: [&str; 1] = ["v1"];

const METADATA_SENT: &str = "sent";
const METADATA_UUID: &str = "uuid";

/// Ingests one uploaded binary report.
///
/// Arguments: `bucket` and `key` locate the raw bytes; `version` optionally
/// pins the report engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessReportV1Action;

#[async_trait]
impl Action for ProcessReportV1Action {
    fn name(&self) -> ActionName {
        ActionName::ProcessReportV1
    }

    async fn execute(&self, ctx: &ActionContext, arguments: &Arguments) -> ActionResult<()> {
        let (Some(bucket), Some(key)) = (arguments.str("bucket"), arguments.str("key")) else {
            return Err(ActionError::hard(format!(
                "Bucket and/or key not found in arguments. Error comes from task: {arguments}"
            )));
        };
        let decoded_key = urlencoding::decode(key)
            .map_err(|e| {
                ActionError::hard(format!("Error: {e}. Incorrect key format in bucket {bucket}, key : {key}"))
            })?
            .into_owned();

        let object = ctx.objects.fetch(bucket, &decoded_key).await.map_err(|e| {
            ActionError::hard(format!(
                "Error: {e}. Incorrect report in bucket {bucket}, key : {key}"
            ))
        })?;

        let (received, report_id) = match (
            object.metadata(METADATA_SENT),
            object.metadata(METADATA_UUID),
        ) {
            (Some(sent), Some(uuid)) => (
                parse_received(sent, bucket, key)?,
                uuid.to_string(),
            ),
            _ => {
                let locator = ReportLocator::parse(&decoded_key).map_err(|e| {
                    ActionError::hard(format!(
                        "Error: {e}. Incorrect key format in payload with bucket {bucket}, key : {key}"
                    ))
                })?;
                (locator.received, locator.report_id.to_string())
            }
        };

        let report = match Uuid::parse_str(&report_id) {
            Ok(id) => ctx.directory.get_report(id).await?,
            Err(_) => None,
        }
        .ok_or_else(|| ActionError::hard(format!("Streamer report {report_id} not found!")))?;

        let guard = ConcurrencyGuard::new(ctx.cache.clone(), &ctx.config.throttle);
        let resource = report.streamer_slug.clone();
        let acquisition = guard
            .begin(
                &resource,
                ctx.notifier.as_ref(),
                self.name().class_name(),
                &arguments.to_string(),
            )
            .await?;

        match acquisition {
            Acquisition::Acquired => {
                let mut reconciler = ReportReconciler::new(ctx, report, received);
                let outcome = AssertUnwindSafe(reconciler.process(&object.bytes))
                    .catch_unwind()
                    .await;
                let released = guard.release(&resource).await;
                let summary = match outcome {
                    Ok(outcome) => outcome?,
                    Err(panic) => panic::resume_unwind(panic),
                };
                released?;
                info!(
                    report = %report_id,
                    streamer = %resource,
                    count = summary.count,
                    "Report reconciled"
                );
                Ok(())
            }
            Acquisition::Contended { attempts } | Acquisition::GaveUp { attempts } => {
                warn!(
                    streamer = %resource,
                    attempts,
                    "Streamer busy, rescheduling report"
                );
                ctx.schedule(
                    self.name(),
                    arguments.clone(),
                    ctx.config.throttle.retry_delay(),
                )
                .await?;
                Ok(())
            }
        }
    }

    fn prepare_schedule(&self, arguments: Arguments) -> ActionResult<Arguments> {
        let Some(key) = arguments.str("key").filter(|_| arguments.contains("bucket")) else {
            return Err(ActionError::hard(format!(
                "Missing fields in argument payload.\nReceived args: {arguments}\nRequired args : bucket, key"
            )));
        };
        let extension = Path::new(key)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let version = arguments.str("version").unwrap_or(SUPPORTED_VERSIONS[0]);
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ActionError::hard(format!(
                "Unsupported Streamer Report Version: {version}"
            )));
        }
        if extension != REPORT_EXTENSION {
            return Err(ActionError::hard(format!(
                "Unsupported file extension ({extension}) for Streamer Report {}",
                version.to_uppercase()
            )));
        }
        Ok(arguments)
    }
}

fn parse_received(sent: &str, bucket: &str, key: &str) -> ActionResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(sent)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ActionError::hard(format!(
                "Received date time in key is not valid. Incorrect timestamp in bucket {bucket}, key : {key}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_validation() {
        let action = ProcessReportV1Action;
        let ok = Arguments::new().with("bucket", "b").with("key", "u/ts/id.bin");
        assert!(action.prepare_schedule(ok.clone()).is_ok());
        assert!(action
            .prepare_schedule(ok.clone().with("version", "v1"))
            .is_ok());

        let err = action
            .prepare_schedule(Arguments::new().with("key", "u/ts/id.bin"))
            .unwrap_err();
        assert!(err.to_string().contains("Required args : bucket, key"));

        let err = action
            .prepare_schedule(ok.clone().with("version", "v2"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported Streamer Report Version: v2");

        let err = action
            .prepare_schedule(Arguments::new().with("bucket", "b").with("key", "u/ts/id.json"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported file extension (.json) for Streamer Report V1"
        );
    }

    #[test]
    fn test_parse_received() {
        let dt = parse_received("2024-01-02T03:04:05+00:00", "b", "k").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        assert!(matches!(
            parse_received("not a date", "b", "k"),
            Err(ActionError::HardError(_))
        ));
    }
}
