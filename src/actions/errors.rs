//! Action outcome taxonomy.
//!
//! `execute` returns `Ok(())` or one of these kinds. The worker loop branches
//! on [`OutcomeKind`], never on message text.

use crate::cache::CacheError;
use crate::messaging::MessagingError;
use crate::report::ParseReportError;
use crate::streamer::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    /// Recoverable condition not worth alarming on
    #[error("{0}")]
    AbortSilently(String),

    /// Well-understood failure specific to this invocation; never retried
    #[error("{0}")]
    HardError(String),

    /// Transient failure; the message is retried after a delay
    #[error("{0}")]
    SoftError(String),

    /// Dispatch-level failure; the worker terminates
    #[error("{0}")]
    InternalError(String),

    /// Deliberate shutdown request
    #[error("{0}")]
    HaltAndCatchFire(String),

    /// Data-store connectivity or operational failure
    #[error("{0}")]
    Store(StoreError),
}

/// Closed set of outcomes the worker loop decides on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    Ok,
    AbortSilently,
    HardError,
    SoftError,
    InternalError,
    HaltAndCatchFire,
    Infrastructure,
}

impl OutcomeKind {
    /// Status written to the audit log for this outcome
    pub fn audit_status(&self) -> &'static str {
        match self {
            Self::Ok => crate::audit::status::DONE,
            Self::AbortSilently => "WorkerAbortSilently",
            Self::HardError => "WorkerActionHardError",
            Self::SoftError => "WorkerActionSoftError",
            Self::InternalError => "WorkerInternalError",
            Self::HaltAndCatchFire => "ShutDown-0",
            Self::Infrastructure => "WorkerDatabaseError",
        }
    }
}

impl ActionError {
    pub fn abort_silently(message: impl Into<String>) -> Self {
        Self::AbortSilently(message.into())
    }

    pub fn hard(message: impl Into<String>) -> Self {
        Self::HardError(message.into())
    }

    pub fn soft(message: impl Into<String>) -> Self {
        Self::SoftError(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn halt(message: impl Into<String>) -> Self {
        Self::HaltAndCatchFire(message.into())
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::AbortSilently(_) => OutcomeKind::AbortSilently,
            Self::HardError(_) => OutcomeKind::HardError,
            Self::SoftError(_) => OutcomeKind::SoftError,
            Self::InternalError(_) => OutcomeKind::InternalError,
            Self::HaltAndCatchFire(_) => OutcomeKind::HaltAndCatchFire,
            Self::Store(_) => OutcomeKind::Infrastructure,
        }
    }
}

/// Infrastructure failures keep their own path; anything else about a single
/// entity is a hard error for this invocation
impl From<StoreError> for ActionError {
    fn from(err: StoreError) -> Self {
        if err.is_infrastructure() {
            Self::Store(err)
        } else {
            Self::HardError(err.to_string())
        }
    }
}

impl From<ParseReportError> for ActionError {
    fn from(err: ParseReportError) -> Self {
        Self::HardError(err.to_string())
    }
}

impl From<CacheError> for ActionError {
    fn from(err: CacheError) -> Self {
        Self::HardError(err.to_string())
    }
}

/// A follow-up that cannot be enqueued leaves the worker in an unknown state
impl From<MessagingError> for ActionError {
    fn from(err: MessagingError) -> Self {
        Self::InternalError(err.to_string())
    }
}

pub type ActionResult<T = ()> = Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_split_by_infrastructure() {
        let infra: ActionError = StoreError::operational("connection reset").into();
        assert_eq!(infra.kind(), OutcomeKind::Infrastructure);

        let missing: ActionError = StoreError::not_found("device", "d--0001").into();
        assert_eq!(missing.kind(), OutcomeKind::HardError);
        assert_eq!(missing.to_string(), "device not found: d--0001");
    }

    #[test]
    fn test_parse_errors_are_hard() {
        let err: ActionError = ParseReportError::InvalidHash.into();
        assert_eq!(err, ActionError::hard("Invalid Report Hash"));
    }

    #[test]
    fn test_audit_status_names() {
        assert_eq!(OutcomeKind::Ok.audit_status(), "done");
        assert_eq!(OutcomeKind::HardError.audit_status(), "WorkerActionHardError");
        assert_eq!(ActionError::soft("later").kind().audit_status(), "WorkerActionSoftError");
    }
}
