//! # Crate Error Types
//!
//! Top-level error type for operations that cross component boundaries
//! (configuration loading, worker bootstrap, the binary entry point).
//! Each layer keeps its own focused error enum; this type wraps them.

use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::report::ParseReportError;
use crate::streamer::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Report parse error: {0}")]
    Report(#[from] ParseReportError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl WorkerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
