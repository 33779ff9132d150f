//! Report storage keys.
//!
//! Uploads are stored under `{user}/{received}/{report_id}.bin`, where
//! `received` is an RFC 3339 timestamp. Older uploads used an hourly layout,
//! `.../{yyyy}/{mm}/{dd}/{hh}/{report_id}.bin`, which resolves to the top of
//! that hour.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

pub const REPORT_EXTENSION: &str = ".bin";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocatorError {
    #[error("key has too few segments: {0}")]
    TooShort(String),

    #[error("report name {0} is not a <uuid>.bin file")]
    BadReportName(String),

    #[error("no receipt timestamp in key {0}")]
    BadTimestamp(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportLocator {
    /// Submitting user, when the key carries one
    pub user: Option<String>,
    pub received: DateTime<Utc>,
    pub report_id: Uuid,
}

impl ReportLocator {
    pub fn parse(key: &str) -> Result<Self, LocatorError> {
        let segments: Vec<&str> = key.trim_matches('/').split('/').collect();
        let Some((name, prefix)) = segments.split_last() else {
            return Err(LocatorError::TooShort(key.to_string()));
        };
        if prefix.is_empty() {
            return Err(LocatorError::TooShort(key.to_string()));
        }

        let report_id = name
            .strip_suffix(REPORT_EXTENSION)
            .and_then(|stem| Uuid::parse_str(stem).ok())
            .ok_or_else(|| LocatorError::BadReportName(name.to_string()))?;

        if let Some((stamp, rest)) = prefix.split_last() {
            if let Ok(received) = DateTime::parse_from_rfc3339(stamp) {
                return Ok(Self {
                    user: rest.last().map(|s| s.to_string()),
                    received: received.with_timezone(&Utc),
                    report_id,
                });
            }
        }

        if prefix.len() >= 4 {
            let (rest, hourly) = prefix.split_at(prefix.len() - 4);
            if let Some(received) = hourly_timestamp(hourly) {
                return Ok(Self {
                    user: rest.last().map(|s| s.to_string()),
                    received,
                    report_id,
                });
            }
        }

        Err(LocatorError::BadTimestamp(key.to_string()))
    }
}

fn hourly_timestamp(parts: &[&str]) -> Option<DateTime<Utc>> {
    let [y, m, d, h] = parts else {
        return None;
    };
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)?
        .and_hms_opt(h.parse().ok()?, 0, 0)
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ID: &str = "0b5ad8a2-1f0c-4c55-9f41-6e0f3c3f2b11";

    #[test]
    fn test_rfc3339_layout() {
        let locator =
            ReportLocator::parse(&format!("user-1/2024-03-05T10:20:30Z/{ID}.bin")).unwrap();
        assert_eq!(locator.user.as_deref(), Some("user-1"));
        assert_eq!(
            locator.received,
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap()
        );
        assert_eq!(locator.report_id.to_string(), ID);
    }

    #[test]
    fn test_hourly_layout() {
        let locator =
            ReportLocator::parse(&format!("dev/s--0000-0001/2023/11/02/07/{ID}.bin")).unwrap();
        assert_eq!(locator.user.as_deref(), Some("s--0000-0001"));
        assert_eq!(
            locator.received,
            Utc.with_ymd_and_hms(2023, 11, 2, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_rejects_malformed_keys() {
        assert!(matches!(
            ReportLocator::parse(&format!("{ID}.bin")),
            Err(LocatorError::TooShort(_))
        ));
        assert!(matches!(
            ReportLocator::parse("user/2024-03-05T10:20:30Z/report.json"),
            Err(LocatorError::BadReportName(_))
        ));
        assert!(matches!(
            ReportLocator::parse(&format!("user/yesterday/{ID}.bin")),
            Err(LocatorError::BadTimestamp(_))
        ));
    }
}
