//! Compile-time action registry.

use super::context::ActionContext;
use super::errors::ActionResult;
use super::system::{
    PingAction, WorkerCollectStatsAction, WorkerHealthCheckAction, WorkerShutDownAction,
};
use super::{Action, Arguments};
use crate::constants::WORKER_STARTED;
use crate::messaging::MessageId;
use crate::processor::{HandleDelayAction, HandleRebootAction, ProcessReportV1Action};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Dispatch namespace of report reconciliation actions
pub const REPORT_MODULE: &str = "streamer.report";
/// Dispatch namespace of worker maintenance actions
pub const WORKER_MODULE: &str = "worker.system";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Unknown action {class} in module {module}")]
    UnknownAction { module: String, class: String },

    #[error("Message improperly configured: {0}")]
    MalformedEnvelope(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionName {
    ProcessReportV1,
    HandleReboot,
    HandleDelay,
    Ping,
    WorkerShutDown,
    WorkerHealthCheck,
    WorkerCollectStats,
}

impl ActionName {
    pub const ALL: [ActionName; 7] = [
        ActionName::ProcessReportV1,
        ActionName::HandleReboot,
        ActionName::HandleDelay,
        ActionName::Ping,
        ActionName::WorkerShutDown,
        ActionName::WorkerHealthCheck,
        ActionName::WorkerCollectStats,
    ];

    /// Envelope `class` value
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::ProcessReportV1 => "ProcessReportV1Action",
            Self::HandleReboot => "HandleRebootAction",
            Self::HandleDelay => "HandleDelayAction",
            Self::Ping => "PingAction",
            Self::WorkerShutDown => "WorkerShutDownAction",
            Self::WorkerHealthCheck => "WorkerHealthCheckAction",
            Self::WorkerCollectStats => "WorkerCollectStatsAction",
        }
    }

    /// Envelope `module` value
    pub fn module(&self) -> &'static str {
        match self {
            Self::ProcessReportV1 | Self::HandleReboot | Self::HandleDelay => REPORT_MODULE,
            _ => WORKER_MODULE,
        }
    }

    /// Human label for operator tooling
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProcessReportV1 => "Process Report (V1 Bin)",
            Self::HandleReboot => "Handle Reboot",
            Self::HandleDelay => "Handle Delay",
            Self::Ping => "Ping Worker",
            Self::WorkerShutDown => "Shut Down ONE Worker",
            Self::WorkerHealthCheck => "Worker Health Check",
            Self::WorkerCollectStats => "Worker Collect Stats",
        }
    }

    /// Names tracked by the worker counters and statistics rollup
    pub fn tracked_names() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .map(ActionName::class_name)
            .chain(std::iter::once(WORKER_STARTED))
            .collect()
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

impl FromStr for ActionName {
    type Err = DispatchError;

    /// Accepts the class name, with or without the `Action` suffix
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| {
                let class = name.class_name();
                class == s || class.strip_suffix("Action") == Some(s)
            })
            .ok_or_else(|| DispatchError::UnknownAction {
                module: String::new(),
                class: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInfo {
    pub name: String,
    pub module: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActionRegistry;

impl ActionRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn create(&self, name: ActionName) -> Box<dyn Action> {
        match name {
            ActionName::ProcessReportV1 => Box::new(ProcessReportV1Action),
            ActionName::HandleReboot => Box::new(HandleRebootAction),
            ActionName::HandleDelay => Box::new(HandleDelayAction),
            ActionName::Ping => Box::new(PingAction),
            ActionName::WorkerShutDown => Box::new(WorkerShutDownAction),
            ActionName::WorkerHealthCheck => Box::new(WorkerHealthCheckAction),
            ActionName::WorkerCollectStats => Box::new(WorkerCollectStatsAction),
        }
    }

    pub fn lookup(&self, module: &str, class: &str) -> Result<ActionName, DispatchError> {
        ActionName::ALL
            .iter()
            .copied()
            .find(|name| name.module() == module && name.class_name() == class)
            .ok_or_else(|| DispatchError::UnknownAction {
                module: module.to_string(),
                class: class.to_string(),
            })
    }

    pub fn resolve(&self, module: &str, class: &str) -> Result<Box<dyn Action>, DispatchError> {
        let name = self.lookup(module, class)?;
        debug!(module = %module, class = %class, "Resolved action");
        Ok(self.create(name))
    }

    pub fn list(&self) -> Vec<ActionInfo> {
        ActionName::ALL
            .iter()
            .map(|name| ActionInfo {
                name: name.class_name().to_string(),
                module: name.module().to_string(),
                label: name.label().to_string(),
            })
            .collect()
    }

    /// Validate arguments for `name` and enqueue it
    pub async fn schedule(
        &self,
        ctx: &ActionContext,
        name: ActionName,
        arguments: Arguments,
        delay: Duration,
    ) -> ActionResult<MessageId> {
        let arguments = self.create(name).prepare_schedule(arguments)?;
        ctx.schedule(name, arguments, delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_requires_matching_module() {
        let registry = ActionRegistry::new();
        let action = registry.resolve(REPORT_MODULE, "HandleRebootAction").unwrap();
        assert_eq!(action.name(), ActionName::HandleReboot);

        let err = registry.resolve(WORKER_MODULE, "HandleRebootAction").err().unwrap();
        assert!(matches!(err, DispatchError::UnknownAction { .. }));
        assert!(registry.resolve(REPORT_MODULE, "NoSuchAction").is_err());
    }

    #[test]
    fn test_list_and_tracked_names() {
        let registry = ActionRegistry::new();
        let list = registry.list();
        assert_eq!(list.len(), 7);
        assert_eq!(list[0].label, "Process Report (V1 Bin)");

        let tracked = ActionName::tracked_names();
        assert_eq!(tracked.len(), 8);
        assert_eq!(tracked.last(), Some(&"WorkerStarted"));
    }

    #[test]
    fn test_parse_action_name() {
        assert_eq!("Ping".parse::<ActionName>().unwrap(), ActionName::Ping);
        assert_eq!(
            "HandleDelayAction".parse::<ActionName>().unwrap(),
            ActionName::HandleDelay
        );
        assert!("Nope".parse::<ActionName>().is_err());
    }
}
