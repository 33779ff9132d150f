//! # Messaging Errors
//!
//! Failures raised by queue backends and by envelope decoding. A broken
//! envelope is deleted by the worker; transport failures are logged and the
//! receive is retried after the poll wait.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    /// Backend driver failure that is not tied to a single queue operation
    #[error("Queue backend error: {operation}: {message}")]
    Backend { operation: String, message: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Invalid message id: {message_id}")]
    InvalidMessageId { message_id: String },

    #[error("Invalid delay: {message}")]
    InvalidDelay { message: String },

    #[error("Envelope encoding error: {message}")]
    Encode { message: String },

    #[error("Invalid envelope: {message}")]
    InvalidEnvelope { message: String },
}

impl MessagingError {
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Failure of `operation` (send, read, delete, set_vt) on a named queue
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn message_not_found(message_id: impl Into<String>) -> Self {
        Self::MessageNotFound {
            message_id: message_id.into(),
        }
    }

    pub fn invalid_message_id(message_id: impl Into<String>) -> Self {
        Self::InvalidMessageId {
            message_id: message_id.into(),
        }
    }

    pub fn invalid_delay(message: impl Into<String>) -> Self {
        Self::InvalidDelay {
            message: message.into(),
        }
    }

    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    pub fn invalid_envelope(message: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            message: message.into(),
        }
    }

    /// Whether the envelope itself is bad, as opposed to the transport
    pub fn is_envelope_error(&self) -> bool {
        matches!(self, Self::InvalidEnvelope { .. })
    }
}

impl From<sqlx::Error> for MessagingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnNotFound(column) => {
                MessagingError::backend("decode_row", format!("missing column {column}"))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                MessagingError::backend("acquire", err.to_string())
            }
            _ => MessagingError::backend("query", err.to_string()),
        }
    }
}

/// Bodies that are not JSON, or JSON of the wrong shape, are envelope errors
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            MessagingError::message_serialization(err.to_string())
        } else {
            MessagingError::invalid_envelope(format!("undecodable body: {err}"))
        }
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;
