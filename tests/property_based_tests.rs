mod common;

use chrono::Duration;
use common::strategies::*;
use common::{received_at, DEVICE_ID};
use proptest::prelude::*;
use streamer_worker::constants::streamer_selector;
use streamer_worker::report::{
    base_timestamp, reading_timestamp, ParseReportError, ReportBuilder, ReportParser,
    DEFAULT_REPORT_MAX_LENGTH,
};
use streamer_worker::streamer::Streamer;

proptest! {
    /// Property: any single corrupted byte is caught by the hash check
    #[test]
    fn corrupted_reports_fail_hash_check(
        readings in readings_strategy(32),
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let mut bytes = ReportBuilder::new(DEVICE_ID as u32, streamer_selector::USER_NO_REBOOTS)
            .report_id(5000)
            .readings(readings)
            .build()
            .to_vec();
        // Keep the format byte intact so parsing reaches the hash step
        let index = 1 + position.index(bytes.len() - 1);
        bytes[index] ^= flip;

        let result = ReportParser::parse(&bytes, DEFAULT_REPORT_MAX_LENGTH);
        prop_assert!(result.is_err());
        // Byte 16 holds the signature flags, which are rejected before hashing
        if index != 16 {
            prop_assert_eq!(result.unwrap_err(), ParseReportError::InvalidHash);
        }
    }

    /// Property: a well-formed report yields exactly the encoded readings, in order
    #[test]
    fn valid_reports_keep_reading_order(readings in readings_strategy(64)) {
        let bytes = ReportBuilder::new(DEVICE_ID as u32, streamer_selector::USER_NO_REBOOTS)
            .readings(readings.clone())
            .build();
        let parsed = ReportParser::parse(&bytes, DEFAULT_REPORT_MAX_LENGTH).unwrap();

        prop_assert_eq!(parsed.readings.len(), readings.len());
        prop_assert!(parsed.readings.windows(2).all(|w| w[0].id < w[1].id));
        prop_assert_eq!(parsed.footer.lowest_id, readings[0].id);
        prop_assert_eq!(parsed.footer.highest_id, readings[readings.len() - 1].id);
        prop_assert!(!parsed.chopped);
    }

    /// Property: uptime timestamps preserve device ordering and spacing
    #[test]
    fn uptime_timestamps_are_monotonic(
        sent in 0u32..1_000_000,
        a in 0u32..0x7fff_ffff,
        b in 0u32..0x7fff_ffff,
    ) {
        let base = base_timestamp(received_at(), sent);
        let (ta, tb) = (reading_timestamp(base, a), reading_timestamp(base, b));
        prop_assert_eq!(a <= b, ta <= tb);
        prop_assert_eq!(tb - ta, Duration::seconds(i64::from(b) - i64::from(a)));
    }

    /// Property: the streamer cursor ends at the highest id ever offered
    #[test]
    fn streamer_cursor_is_monotonic(ids in prop::collection::vec(0i64..10_000, 1..50)) {
        let mut streamer = Streamer::new(DEVICE_ID, 1, streamer_selector::USER_NO_REBOOTS);
        let mut previous = streamer.last_id;
        for id in &ids {
            streamer.advance_last_id(*id);
            prop_assert!(streamer.last_id >= previous);
            previous = streamer.last_id;
        }
        prop_assert_eq!(streamer.last_id, ids.iter().copied().max().unwrap().max(0));
    }
}
