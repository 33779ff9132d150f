//! Device-relative timestamps.
//!
//! Devices without a real-time clock count seconds since their last reboot;
//! those with one set bit 31 and count seconds since 2000-01-01 UTC.

use chrono::{DateTime, Duration, TimeZone, Utc};

const RTC_FLAG: u32 = 1 << 31;

/// 2000-01-01T00:00:00Z
pub fn rtc_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(946_684_800, 0)
        .single()
        .unwrap_or_default()
}

pub fn is_rtc(device_timestamp: u32) -> bool {
    device_timestamp & RTC_FLAG != 0
}

/// Time origin of a report: receipt time minus the device's sent timestamp
pub fn base_timestamp(received: DateTime<Utc>, sent_timestamp: u32) -> DateTime<Utc> {
    received - Duration::seconds(i64::from(sent_timestamp))
}

/// Absolute time of a reading
pub fn reading_timestamp(base: DateTime<Utc>, device_timestamp: u32) -> DateTime<Utc> {
    if is_rtc(device_timestamp) {
        rtc_epoch() + Duration::seconds(i64::from(device_timestamp & !RTC_FLAG))
    } else {
        base + Duration::seconds(i64::from(device_timestamp))
    }
}
