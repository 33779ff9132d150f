//! Report encoding, used by local tooling, tests and benchmarks to produce
//! byte-exact device reports.

use super::parser::Reading;
use super::{FOOTER_LENGTH, HEADER_LENGTH, READING_LENGTH, REPORT_FORMAT_V1, SIGNATURE_LENGTH};
use bytes::{BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct ReportBuilder {
    format: u8,
    device_id: u32,
    report_id: u32,
    sent_timestamp: u32,
    signature_flags: u8,
    streamer_index: u8,
    streamer_selector: u16,
    readings: Vec<Reading>,
    id_range: Option<(u32, u32)>,
    claimed_length: Option<u32>,
}

impl ReportBuilder {
    pub fn new(device_id: u32, streamer_selector: u16) -> Self {
        Self {
            format: REPORT_FORMAT_V1,
            device_id,
            report_id: 0,
            sent_timestamp: 0,
            signature_flags: 0,
            streamer_index: 0,
            streamer_selector,
            readings: Vec::new(),
            id_range: None,
            claimed_length: None,
        }
    }

    pub fn format(mut self, format: u8) -> Self {
        self.format = format;
        self
    }

    pub fn report_id(mut self, report_id: u32) -> Self {
        self.report_id = report_id;
        self
    }

    pub fn sent_timestamp(mut self, sent_timestamp: u32) -> Self {
        self.sent_timestamp = sent_timestamp;
        self
    }

    pub fn signature_flags(mut self, flags: u8) -> Self {
        self.signature_flags = flags;
        self
    }

    pub fn streamer_index(mut self, index: u8) -> Self {
        self.streamer_index = index;
        self
    }

    pub fn reading(mut self, stream: u16, id: u32, timestamp: u32, value: u32) -> Self {
        self.readings.push(Reading {
            stream,
            reserved: 0,
            id,
            timestamp,
            value,
        });
        self
    }

    pub fn readings(mut self, readings: impl IntoIterator<Item = Reading>) -> Self {
        self.readings.extend(readings);
        self
    }

    /// Footer range; defaults to the min and max reading ids
    pub fn id_range(mut self, lowest: u32, highest: u32) -> Self {
        self.id_range = Some((lowest, highest));
        self
    }

    /// Header length field; defaults to the real encoded length
    pub fn claimed_length(mut self, length: u32) -> Self {
        self.claimed_length = Some(length);
        self
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LENGTH + self.readings.len() * READING_LENGTH + FOOTER_LENGTH
    }

    pub fn build(&self) -> Bytes {
        let total = self.encoded_len();
        let length = self.claimed_length.unwrap_or(total as u32);
        let mut buf = BytesMut::with_capacity(total);

        buf.put_u8(self.format);
        buf.put_u8((length & 0xff) as u8);
        buf.put_u16_le((length >> 8) as u16);
        buf.put_u32_le(self.device_id);
        buf.put_u32_le(self.report_id);
        buf.put_u32_le(self.sent_timestamp);
        buf.put_u8(self.signature_flags);
        buf.put_u8(self.streamer_index);
        buf.put_u16_le(self.streamer_selector);

        for reading in &self.readings {
            buf.put_u16_le(reading.stream);
            buf.put_u16_le(reading.reserved);
            buf.put_u32_le(reading.id);
            buf.put_u32_le(reading.timestamp);
            buf.put_u32_le(reading.value);
        }

        let (lowest, highest) = self.id_range.unwrap_or_else(|| {
            let ids = self.readings.iter().map(|r| r.id);
            (ids.clone().min().unwrap_or(0), ids.max().unwrap_or(0))
        });
        buf.put_u32_le(lowest);
        buf.put_u32_le(highest);

        let digest = Sha256::digest(&buf[..]);
        buf.put_slice(&digest[..SIGNATURE_LENGTH]);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ReportParser, DEFAULT_REPORT_MAX_LENGTH};

    #[test]
    fn test_layout_and_range_defaults() {
        let report = ReportBuilder::new(0x1234, 0x5fff)
            .report_id(9)
            .reading(0x5c00, 5, 0, 0)
            .reading(0x5800, 7, 3, 1)
            .build();

        assert_eq!(report.len(), 20 + 2 * 16 + 24);
        assert_eq!(report[0], 1);
        assert_eq!(report[1] as usize, report.len());

        let parsed = ReportParser::parse(&report, DEFAULT_REPORT_MAX_LENGTH).unwrap();
        assert_eq!(parsed.header.device_id, 0x1234);
        assert_eq!(parsed.header.streamer_selector, 0x5fff);
        assert_eq!((parsed.footer.lowest_id, parsed.footer.highest_id), (5, 7));
    }

    #[test]
    fn test_large_length_uses_high_bytes() {
        let report = ReportBuilder::new(1, 0x57ff).claimed_length(0x01_02_03).build();
        assert_eq!(report[1], 0x03);
        assert_eq!(u16::from_le_bytes([report[2], report[3]]), 0x0102);
    }
}
