//! Report decoding and integrity checks.
//!
//! Steps run in a fixed order: header, footer, signature flags, hash, then
//! readings. A bad format tag fails before the hash is looked at, and a bad
//! hash fails before any reading is decoded.

use super::{
    ParseReportError, ParseResult, DEFAULT_REPORT_MAX_LENGTH, FOOTER_LENGTH, HEADER_LENGTH,
    READING_LENGTH, REPORT_FORMAT_V1, SIGNATURE_FLAGS_HASH_ONLY, SIGNATURE_LENGTH,
};
use crate::constants::SYSTEM_STREAM_BIT;
use bytes::Buf;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportHeader {
    pub format: u8,
    /// Total report length claimed by the device
    pub length: u32,
    pub device_id: u32,
    /// Incremental id of the report itself
    pub report_id: u32,
    /// Device uptime (or RTC time) when the report was sent
    pub sent_timestamp: u32,
    pub signature_flags: u8,
    pub streamer_index: u8,
    pub streamer_selector: u16,
}

impl ReportHeader {
    fn decode(mut buf: &[u8]) -> Self {
        let format = buf.get_u8();
        let len_low = buf.get_u8();
        let len_high = buf.get_u16_le();
        Self {
            format,
            length: (u32::from(len_high) << 8) | u32::from(len_low),
            device_id: buf.get_u32_le(),
            report_id: buf.get_u32_le(),
            sent_timestamp: buf.get_u32_le(),
            signature_flags: buf.get_u8(),
            streamer_index: buf.get_u8(),
            streamer_selector: buf.get_u16_le(),
        }
    }

    /// Number of readings implied by the claimed length
    pub fn expected_count(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_LENGTH + FOOTER_LENGTH) / READING_LENGTH
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportFooter {
    pub lowest_id: u32,
    pub highest_id: u32,
    pub signature: [u8; SIGNATURE_LENGTH],
}

impl ReportFooter {
    fn decode(mut buf: &[u8]) -> Self {
        let lowest_id = buf.get_u32_le();
        let highest_id = buf.get_u32_le();
        let mut signature = [0u8; SIGNATURE_LENGTH];
        buf.copy_to_slice(&mut signature);
        Self {
            lowest_id,
            highest_id,
            signature,
        }
    }

    pub fn signature_hex(&self) -> String {
        hex::encode(self.signature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Stream id; the low 16 bits of the variable id
    pub stream: u16,
    pub reserved: u16,
    /// Incremental id
    pub id: u32,
    /// Seconds since reboot, or RTC seconds when bit 31 is set
    pub timestamp: u32,
    pub value: u32,
}

impl Reading {
    fn decode(mut buf: &[u8]) -> Self {
        Self {
            stream: buf.get_u16_le(),
            reserved: buf.get_u16_le(),
            id: buf.get_u32_le(),
            timestamp: buf.get_u32_le(),
            value: buf.get_u32_le(),
        }
    }

    /// Readings on the system sub-stream carry bit 11 in their stream id
    pub fn is_system(&self) -> bool {
        self.stream & SYSTEM_STREAM_BIT != 0
    }
}

/// Fully decoded and verified report
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub header: ReportHeader,
    pub footer: ReportFooter,
    pub readings: Vec<Reading>,
    pub chopped: bool,
}

pub struct ReportParser<'a> {
    data: &'a [u8],
    max_length: u32,
    header: Option<ReportHeader>,
    footer: Option<ReportFooter>,
    readings: Vec<Reading>,
}

impl<'a> ReportParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            max_length: DEFAULT_REPORT_MAX_LENGTH,
            header: None,
            footer: None,
            readings: Vec::new(),
        }
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Run every step and return the verified report
    pub fn parse(data: &'a [u8], max_length: u32) -> ParseResult<ParsedReport> {
        let mut parser = Self::new(data).with_max_length(max_length);
        let header = parser.parse_header()?;
        let footer = parser.parse_footer()?;
        if header.signature_flags != SIGNATURE_FLAGS_HASH_ONLY {
            return Err(ParseReportError::UnsupportedSignature {
                flags: header.signature_flags,
            });
        }
        if !parser.check_report_hash() {
            error!(
                device_id = header.device_id,
                report_id = header.report_id,
                "Invalid report hash"
            );
            return Err(ParseReportError::InvalidHash);
        }
        parser.parse_readings()?;
        let chopped = parser.chopped_off();

        Ok(ParsedReport {
            header,
            footer,
            readings: parser.readings,
            chopped,
        })
    }

    pub fn parse_header(&mut self) -> ParseResult<ReportHeader> {
        let raw = self.section("header", 0, HEADER_LENGTH)?;
        let header = ReportHeader::decode(raw);
        if header.format != REPORT_FORMAT_V1 {
            return Err(ParseReportError::UnsupportedFormat {
                format: header.format,
            });
        }
        debug!(
            device_id = header.device_id,
            report_id = header.report_id,
            length = header.length,
            expected_count = header.expected_count(),
            "Parsed report header"
        );
        self.header = Some(header);
        Ok(header)
    }

    pub fn parse_footer(&mut self) -> ParseResult<ReportFooter> {
        let start = self.data.len().saturating_sub(FOOTER_LENGTH);
        let raw = self.section("footer", start, FOOTER_LENGTH)?;
        let footer = ReportFooter::decode(raw);
        debug!(
            lowest_id = footer.lowest_id,
            highest_id = footer.highest_id,
            "Parsed report footer"
        );
        self.footer = Some(footer);
        Ok(footer)
    }

    /// Compare the embedded signature with the truncated SHA-256 of the preceding bytes
    pub fn check_report_hash(&self) -> bool {
        if self.data.len() < SIGNATURE_LENGTH {
            return false;
        }
        let (hashed, embedded) = self.data.split_at(self.data.len() - SIGNATURE_LENGTH);
        let digest = Sha256::digest(hashed);
        constant_time_eq(embedded, &digest[..SIGNATURE_LENGTH])
    }

    pub fn parse_readings(&mut self) -> ParseResult<&[Reading]> {
        let header = self
            .header
            .ok_or(ParseReportError::OutOfOrder { step: "readings" })?;
        let expected = header.expected_count();

        let end = self.data.len().saturating_sub(FOOTER_LENGTH).max(HEADER_LENGTH);
        let body = self.data.get(HEADER_LENGTH..end).unwrap_or_default();
        let readings: Vec<Reading> = body
            .chunks_exact(READING_LENGTH)
            .take(expected)
            .map(Reading::decode)
            .collect();

        if readings.len() != expected {
            let err = ParseReportError::CountMismatch {
                actual: readings.len(),
                expected,
            };
            error!(error = %err, "Report readings do not match the claimed length");
            return Err(err);
        }
        self.readings = readings;
        Ok(&self.readings)
    }

    /// Claimed length sits just under the gateway upload limit
    pub fn chopped_off(&self) -> bool {
        self.header.is_some_and(|h| {
            h.length > self.max_length.saturating_sub(READING_LENGTH as u32) && h.length < self.max_length
        })
    }

    pub fn header(&self) -> Option<&ReportHeader> {
        self.header.as_ref()
    }

    pub fn footer(&self) -> Option<&ReportFooter> {
        self.footer.as_ref()
    }

    fn section(&self, section: &'static str, start: usize, len: usize) -> ParseResult<&'a [u8]> {
        self.data
            .get(start..start + len)
            .ok_or(ParseReportError::Truncated {
                section,
                needed: len,
                available: self.data.len().saturating_sub(start),
            })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportBuilder;

    fn sample(count: u32) -> Vec<u8> {
        let mut builder = ReportBuilder::new(0xa, 0x57ff).report_id(count).sent_timestamp(1000);
        for id in 1..=count {
            builder = builder.reading(0x5001, id, id * 10, id * 2);
        }
        builder.build().to_vec()
    }

    #[test]
    fn test_parse_valid_report() {
        let data = sample(3);
        let report = ReportParser::parse(&data, DEFAULT_REPORT_MAX_LENGTH).unwrap();

        assert_eq!(report.header.device_id, 0xa);
        assert_eq!(report.header.length as usize, data.len());
        assert_eq!(report.footer.lowest_id, 1);
        assert_eq!(report.footer.highest_id, 3);
        assert_eq!(report.readings.len(), 3);
        assert_eq!(report.readings[2].value, 6);
        assert!(!report.chopped);
    }

    #[test]
    fn test_unsupported_format_detected_before_hash() {
        let mut data = sample(2);
        data[0] = 2;
        let err = ReportParser::parse(&data, DEFAULT_REPORT_MAX_LENGTH).unwrap_err();
        assert_eq!(err, ParseReportError::UnsupportedFormat { format: 2 });
        assert_eq!(err.to_string(), "Unsupported Report Format: 2");
    }

    #[test]
    fn test_corrupted_reading_fails_hash() {
        let mut data = sample(2);
        data[HEADER_LENGTH + 12] ^= 0xff;
        let err = ReportParser::parse(&data, DEFAULT_REPORT_MAX_LENGTH).unwrap_err();
        assert_eq!(err, ParseReportError::InvalidHash);
        assert_eq!(err.to_string(), "Invalid Report Hash");
    }

    #[test]
    fn test_signature_flags_rejected() {
        let data = ReportBuilder::new(0xa, 0x57ff)
            .signature_flags(1)
            .reading(0x5001, 1, 0, 0)
            .build();
        let err = ReportParser::parse(&data, DEFAULT_REPORT_MAX_LENGTH).unwrap_err();
        assert_eq!(err, ParseReportError::UnsupportedSignature { flags: 1 });
    }

    #[test]
    fn test_count_mismatch_when_length_overclaims() {
        let data = ReportBuilder::new(0xa, 0x57ff)
            .reading(0x5001, 1, 0, 0)
            .claimed_length(20 + 24 + 16 * 10)
            .build();
        let err = ReportParser::parse(&data, DEFAULT_REPORT_MAX_LENGTH).unwrap_err();
        assert!(matches!(err, ParseReportError::CountMismatch { expected: 10, .. }));
    }

    #[test]
    fn test_short_input_is_truncated() {
        let err = ReportParser::new(&[1u8, 2, 3]).parse_header().unwrap_err();
        assert!(matches!(err, ParseReportError::Truncated { section: "header", .. }));
    }

    #[test]
    fn test_chopped_off_window() {
        let data = sample(1);
        let mut parser = ReportParser::new(&data).with_max_length(data.len() as u32 + 1);
        parser.parse_header().unwrap();
        assert!(parser.chopped_off());

        let mut parser = ReportParser::new(&data).with_max_length(data.len() as u32);
        parser.parse_header().unwrap();
        assert!(!parser.chopped_off());
    }

    #[test]
    fn test_system_stream_bit() {
        let reading = Reading {
            stream: 0x5c00,
            reserved: 0,
            id: 1,
            timestamp: 0,
            value: 0,
        };
        assert!(reading.is_system());
        assert!(!Reading { stream: 0x5001, ..reading }.is_system());
    }
}
