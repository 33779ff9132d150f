#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Streamer Worker
//!
//! Background worker that ingests binary streamer reports uploaded by IoT
//! devices and reconciles them with the time-series store.
//!
//! ## Overview
//!
//! Devices buffer sensor readings and upload them in signed reports. The
//! worker consumes task envelopes from a message queue, resolves each one to
//! a registered action and applies the action's outcome to the message
//! lifecycle: delete, defer for redelivery, or stop the worker.
//!
//! ## Architecture
//!
//! ```text
//!   MessageQueue ──▶ worker::Worker ──▶ actions::ActionRegistry
//!                        │                      │
//!                        │            processor::ProcessReportV1Action
//!                        │                      │
//!                        ▼            report::ReportParser ─▶ TimeSeriesStore
//!                   audit::AuditLog
//! ```
//!
//! ## Module Organization
//!
//! - [`actions`] - Action trait, argument bag, registry and system actions
//! - [`processor`] - Report ingestion, reboot repair and delayed-report handling
//! - [`report`] - Binary report parsing, integrity checks and timestamps
//! - [`streamer`] - Entity model and store traits with in-memory backends
//! - [`messaging`] - Queue abstraction over pgmq and an in-process queue
//! - [`guard`] - Per-streamer concurrency guard with throttling
//! - [`worker`] - The queue-consuming loop and shutdown sequence
//! - [`config`] - Layered configuration
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use streamer_worker::actions::ActionContext;
//! use streamer_worker::config::WorkerConfig;
//! use streamer_worker::worker::Worker;
//!
//! # async fn example() {
//! let ctx = ActionContext::builder(WorkerConfig::default()).build();
//! let worker = Worker::new(ctx);
//! if let Some(reason) = worker.run().await {
//!     eprintln!("worker stopped: {reason}");
//! }
//! # }
//! ```

pub mod actions;
pub mod audit;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod guard;
pub mod logging;
pub mod messaging;
pub mod notify;
pub mod processor;
pub mod report;
pub mod streamer;
pub mod utils;
pub mod worker;

pub use actions::{Action, ActionContext, ActionError, ActionName, ActionRegistry, Arguments};
pub use config::{ConfigManager, WorkerConfig};
pub use error::{Result, WorkerError};
pub use worker::{TerminationReason, Worker};
