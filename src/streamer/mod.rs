//! # Streamer Ledger and Collaborator Interfaces
//!
//! Entities the report processor reads and mutates (devices, projects,
//! streamer cursors, ledger records, committed readings) and the narrow
//! repository traits through which it reaches the external stores.
//!
//! ```text
//!   DeviceDirectory   devices, projects, streamers, ledger records, device status
//!   TimeSeriesStore   append-only committed readings with filtered queries
//!   ObjectStore       raw report bytes plus upload metadata
//! ```

pub mod memory;
pub mod models;
pub mod objects;
pub mod repository;

use thiserror::Error;

pub use memory::{InMemoryStreamerStore, StreamerSeed};
pub use models::{
    DataStatus, Device, DeviceStatus, Project, StreamData, Streamer, StreamerReport,
};
pub use objects::{InMemoryObjectStore, LocalObjectStore, StoredObject};
pub use repository::{DataQuery, DeviceDirectory, ObjectStore, TimeSeriesStore};

/// Failures reported by the external stores.
///
/// `Interface`, `Operational` and `Database` are infrastructure failures: the
/// worker reschedules the message and restarts. `NotFound` and `Invalid` are
/// per-request problems.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Data store interface error: {message}")]
    Interface { message: String },

    #[error("Data store operational error: {message}")]
    Operational { message: String },

    #[error("Data store database error: {message}")]
    Database { message: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    #[error("Invalid {entity}: {message}")]
    Invalid { entity: String, message: String },
}

impl StoreError {
    pub fn interface(message: impl Into<String>) -> Self {
        Self::Interface {
            message: message.into(),
        }
    }

    pub fn operational(message: impl Into<String>) -> Self {
        Self::Operational {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    pub fn invalid(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Connectivity or server-side failure that a fresh process may not hit
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Interface { .. } | Self::Operational { .. } | Self::Database { .. }
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::not_found("row", "query"),
            sqlx::Error::Database(db_err) => StoreError::database(db_err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::interface(err.to_string())
            }
            _ => StoreError::operational(err.to_string()),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::not_found("object", err.to_string())
        } else {
            StoreError::operational(err.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
