//! # System Constants
//!
//! Cache key formats, well-known variable ids, streamer selectors and the
//! default delays that shape message lifecycle decisions.

use std::time::Duration;

/// Key-value store key formats
pub mod keys {
    /// `worker-info:{id}` holds `{uuid, start_dt}` for every started worker
    pub const WORKER_INFO_PREFIX: &str = "worker-info:";
    /// `worker-count:{id}` holds the total tasks processed by a worker
    pub const WORKER_COUNT_PREFIX: &str = "worker-count:";
    /// `worker-action-count:{name}` holds the per-action counter
    pub const ACTION_COUNT_PREFIX: &str = "worker-action-count:";
    /// `pid:{message_id}` tracks a scheduled but not yet processed envelope
    pub const ACTION_PID_PREFIX: &str = "pid:";
    /// Last time a ping/health-check action ran on any worker
    pub const WORKER_LAST_PING: &str = "sqs-worker-last-ping";
    /// `streamer-processing-attempt:{streamer_slug}` is the concurrency guard entry
    pub const STREAMER_GUARD_PREFIX: &str = "streamer-processing-attempt";
    /// `delay-process:{device}:{start}:{end}` counts reboot-handling retries
    pub const DELAY_CHECK_PREFIX: &str = "delay-process";
}

/// Well-known system variable ids (lower 16 bits of a stream id)
pub mod system_vid {
    pub const REBOOT: u16 = 0x5c00;
    pub const COMPLETE_REPORT: u16 = 0x5a05;
    pub const CHOPPED_REPORT: u16 = 0x5a06;
}

/// Streamer selectors found in the report header
pub mod streamer_selector {
    /// User outputs with reboot markers interleaved; not handled by the v1 engine
    pub const USER: u16 = 0xd7ff;
    /// User outputs only
    pub const USER_NO_REBOOTS: u16 = 0x57ff;
    pub const SYSTEM: u16 = 0x5fff;
}

/// Bit set on a reading's stream id when it belongs to the system sub-stream
pub const SYSTEM_STREAM_BIT: u16 = 1 << 11;

/// Pseudo action name recorded when a worker process starts
pub const WORKER_STARTED: &str = "WorkerStarted";

/// Default dispatch namespace for queue envelopes
pub const DEFAULT_QUEUE_NAME: &str = "streamer-worker";

pub const SOFT_ERROR_DELAY: Duration = Duration::from_secs(5 * 60);
pub const INFRA_ERROR_DELAY: Duration = Duration::from_secs(60);
pub const FOLLOWUP_DELAY: Duration = Duration::from_secs(5 * 60);
pub const GUARD_CONTENTION_DELAY: Duration = Duration::from_secs(120);
pub const GUARD_TTL: Duration = Duration::from_secs(10 * 60 * 60);
pub const ACTION_PID_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const HALT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const HALT_CHECKPOINTS: u32 = 3;
