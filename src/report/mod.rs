//! # Streamer Report Wire Format
//!
//! Binary reports uploaded by devices (format tag `1`). All integers are
//! little endian.
//!
//! ```text
//! header   20 bytes  fmt:u8 len_low:u8 len_high:u16 dev_id:u32 rpt_id:u32
//!                    sent_timestamp:u32 signature_flags:u8 streamer_index:u8
//!                    streamer_selector:u16
//! reading  16 bytes  stream:u16 reserved:u16 id:u32 timestamp:u32 value:u32
//! footer   24 bytes  lowest_id:u32 highest_id:u32 signature:[u8; 16]
//! ```
//!
//! The total length is `(len_high << 8) | len_low`. The signature is the
//! first 16 bytes of SHA-256 over everything before it.

pub mod encoder;
pub mod parser;
pub mod timestamp;

use thiserror::Error;

pub use encoder::ReportBuilder;
pub use parser::{ParsedReport, Reading, ReportFooter, ReportHeader, ReportParser};
pub use timestamp::{base_timestamp, reading_timestamp};

/// Largest upload the mobile gateway sends; reports within one reading of it were cut short
pub const DEFAULT_REPORT_MAX_LENGTH: u32 = 196_608;

pub const REPORT_FORMAT_V1: u8 = 1;
pub const HEADER_LENGTH: usize = 20;
pub const READING_LENGTH: usize = 16;
pub const FOOTER_LENGTH: usize = 24;
pub const SIGNATURE_LENGTH: usize = 16;

/// Only "hash only, no HMAC key" signatures are accepted
pub const SIGNATURE_FLAGS_HASH_ONLY: u8 = 0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseReportError {
    #[error("Unsupported Report Format: {format}")]
    UnsupportedFormat { format: u8 },

    #[error("Report too short for {section}: need {needed} bytes, have {available}")]
    Truncated {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("len(data)={actual}, expected={expected}")]
    CountMismatch { actual: usize, expected: usize },

    #[error("Unrecognized signature flags: {flags}")]
    UnsupportedSignature { flags: u8 },

    #[error("Invalid Report Hash")]
    InvalidHash,

    #[error("Report {step} requested before the header was parsed")]
    OutOfOrder { step: &'static str },
}

pub type ParseResult<T> = Result<T, ParseReportError>;
