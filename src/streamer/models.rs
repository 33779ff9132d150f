use crate::utils::gid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Project owning claimed devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    /// Numeric global id used in variable and stream slugs
    pub gid: u64,
    pub name: String,
}

impl Project {
    pub fn slug(&self) -> String {
        gid::project_slug(self.gid)
    }

    pub fn formatted_gid(&self) -> String {
        gid::project_gid(self.gid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Device id as found in report headers
    pub id: u64,
    /// Owning project; unclaimed devices have none
    pub project_id: Option<Uuid>,
    /// Incremental id of the last processed system report
    pub last_known_id: Option<i64>,
}

impl Device {
    pub fn new(id: u64, project_id: Option<Uuid>) -> Self {
        Self {
            id,
            project_id,
            last_known_id: None,
        }
    }

    pub fn slug(&self) -> String {
        gid::device_slug(self.id)
    }

    pub fn formatted_gid(&self) -> String {
        gid::device_gid(self.id)
    }
}

/// Per-device, per-index cursor over committed incremental ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Streamer {
    pub slug: String,
    pub device_id: u64,
    pub index: u8,
    /// Highest committed incremental id, 0 when nothing has been committed
    pub last_id: i64,
    pub last_reboot_ts: Option<DateTime<Utc>>,
    pub is_system: bool,
    pub selector: u16,
    pub created_by: Option<String>,
}

impl Streamer {
    pub fn new(device_id: u64, index: u8, selector: u16) -> Self {
        Self {
            slug: gid::streamer_slug(device_id, index),
            device_id,
            index,
            last_id: 0,
            last_reboot_ts: None,
            is_system: selector == crate::constants::streamer_selector::SYSTEM,
            selector,
            created_by: None,
        }
    }

    pub fn device_slug(&self) -> String {
        gid::device_slug(self.device_id)
    }

    /// System streamers close a block of incremental ids
    pub fn triggers_block_completeness(&self) -> bool {
        self.is_system
    }

    /// Move the cursor forward; never backward
    pub fn advance_last_id(&mut self, last_id: i64) -> bool {
        if last_id > self.last_id {
            self.last_id = last_id;
            true
        } else {
            false
        }
    }
}

/// Ledger record for one uploaded report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamerReport {
    pub id: Uuid,
    pub streamer_slug: String,
    /// Claimed range from the report footer
    pub original_first_id: Option<i64>,
    pub original_last_id: Option<i64>,
    /// Range actually committed, set once processing completes
    pub actual_first_id: Option<i64>,
    pub actual_last_id: Option<i64>,
    /// Receipt time
    pub sent_timestamp: Option<DateTime<Utc>>,
    /// `sent_timestamp` from the report header
    pub device_sent_timestamp: Option<i64>,
    /// `rpt_id` from the report header
    pub incremental_id: Option<i64>,
    pub created_by: Option<String>,
}

impl StreamerReport {
    pub fn new(streamer_slug: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            streamer_slug: streamer_slug.into(),
            original_first_id: None,
            original_last_id: None,
            actual_first_id: None,
            actual_last_id: None,
            sent_timestamp: None,
            device_sent_timestamp: None,
            incremental_id: None,
            created_by: None,
        }
    }

    pub fn successful(&self) -> bool {
        self.actual_first_id.is_some() && self.actual_last_id.is_some()
    }

    /// Size of the committed range; zero for the fully duplicate `(0, 0)` case
    pub fn num_entries(&self) -> i64 {
        match (self.actual_first_id, self.actual_last_id) {
            (Some(first), Some(last)) if first != 0 && last != 0 => last - first + 1,
            _ => 0,
        }
    }

    pub fn status(&self) -> &'static str {
        let claimed = self.original_first_id.unwrap_or(0) != 0 || self.original_last_id.unwrap_or(0) != 0;
        if !claimed {
            "Scheduled"
        } else if self.successful() {
            "Success"
        } else {
            "Fail"
        }
    }
}

/// Heartbeat bookkeeping for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: u64,
    pub last_known_id: i64,
    pub last_report_ts: Option<DateTime<Utc>>,
}

impl DeviceStatus {
    pub fn new(device_id: u64) -> Self {
        Self {
            device_id,
            last_known_id: 1,
            last_report_ts: None,
        }
    }
}

/// Quality of a committed reading's timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataStatus {
    #[serde(rename = "unk")]
    #[default]
    Unknown,
    #[serde(rename = "cln")]
    Clean,
    #[serde(rename = "drt")]
    Dirty,
}

impl DataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unk",
            Self::Clean => "cln",
            Self::Dirty => "drt",
        }
    }
}

impl fmt::Display for DataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unk" => Ok(Self::Unknown),
            "cln" => Ok(Self::Clean),
            "drt" => Ok(Self::Dirty),
            _ => Err(format!("Unknown data status: {s}")),
        }
    }
}

/// One committed time-series reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamData {
    /// Assigned by the store on insert
    pub id: Option<i64>,
    pub stream_slug: String,
    pub project_slug: String,
    pub device_slug: String,
    pub variable_slug: String,
    pub streamer_local_id: i64,
    pub device_timestamp: i64,
    pub timestamp: DateTime<Utc>,
    pub int_value: i64,
    pub status: DataStatus,
    pub dirty_ts: bool,
}

impl StreamData {
    pub fn new(
        project: &Project,
        device: &Device,
        vid: u16,
        streamer_local_id: i64,
        device_timestamp: i64,
        timestamp: DateTime<Utc>,
        int_value: i64,
    ) -> Self {
        Self {
            id: None,
            stream_slug: gid::stream_slug(project.gid, device.id, vid),
            project_slug: project.slug(),
            device_slug: device.slug(),
            variable_slug: gid::variable_slug(project.gid, vid),
            streamer_local_id,
            device_timestamp,
            timestamp,
            int_value,
            status: DataStatus::Unknown,
            dirty_ts: false,
        }
    }

    pub fn with_status(mut self, status: DataStatus) -> Self {
        self.status = status;
        self
    }

    pub fn vid(&self) -> Option<u16> {
        gid::vid_from_slug(&self.variable_slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::streamer_selector;

    #[test]
    fn test_streamer_cursor_never_moves_backward() {
        let mut streamer = Streamer::new(0xa, 1, streamer_selector::USER_NO_REBOOTS);
        assert_eq!(streamer.slug, "t--0000-0000-0000-000a--0001");
        assert!(!streamer.is_system);
        assert!(streamer.advance_last_id(100));
        assert!(!streamer.advance_last_id(50));
        assert_eq!(streamer.last_id, 100);
    }

    #[test]
    fn test_system_selector_marks_system_streamer() {
        let streamer = Streamer::new(0xa, 0, streamer_selector::SYSTEM);
        assert!(streamer.is_system);
        assert!(streamer.triggers_block_completeness());
    }

    #[test]
    fn test_report_entries_and_status() {
        let mut report = StreamerReport::new("t--0000-0000-0000-000a--0001");
        assert_eq!(report.status(), "Scheduled");

        report.original_first_id = Some(1);
        report.original_last_id = Some(100);
        assert_eq!(report.status(), "Fail");

        report.actual_first_id = Some(0);
        report.actual_last_id = Some(0);
        assert_eq!(report.num_entries(), 0);
        assert_eq!(report.status(), "Success");

        report.actual_first_id = Some(1);
        report.actual_last_id = Some(100);
        assert_eq!(report.num_entries(), 100);
    }

    #[test]
    fn test_data_status_round_trip_strings() {
        assert_eq!(DataStatus::Clean.to_string(), "cln");
        assert_eq!("drt".parse::<DataStatus>().unwrap(), DataStatus::Dirty);
        assert!("bad".parse::<DataStatus>().is_err());
        assert_eq!(serde_json::to_string(&DataStatus::Unknown).unwrap(), "\"unk\"");
    }
}
