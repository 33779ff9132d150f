//! # Task Envelope and Queue Message Types
//!
//! The task envelope is the JSON body of every queue message:
//!
//! ```json
//! {"module": "streamer-worker", "class": "ProcessReport", "arguments": {"bucket": "b", "key": "k"}}
//! ```
//!
//! Envelopes are immutable once enqueued. Received messages keep their raw
//! body so a malformed envelope can be logged and deleted by the worker.

use super::errors::{MessagingError, MessagingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum serialized envelope size (256KB)
const MAX_ENVELOPE_SIZE_BYTES: usize = 256 * 1024;

/// Maximum nesting depth inside `arguments`
const MAX_ARGUMENT_DEPTH: usize = 10;

/// Maximum number of keys in an arguments object or items in an array
const MAX_ARGUMENT_ITEMS: usize = 1000;

/// Provider-specific message identifier (pgmq `msg_id`, in-memory counter)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form used by pgmq
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unit of work taken off the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Dispatch namespace
    pub module: String,
    /// Action name
    pub class: String,
    pub arguments: Map<String, Value>,
}

impl TaskEnvelope {
    pub fn new(module: impl Into<String>, class: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            module: module.into(),
            class: class.into(),
            arguments,
        }
    }

    /// Decode and validate a raw queue body
    pub fn from_body(body: &str) -> MessagingResult<Self> {
        let envelope: TaskEnvelope = serde_json::from_str(body)?;
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn to_json(&self) -> MessagingResult<String> {
        serde_json::to_string(self).map_err(|e| MessagingError::message_serialization(e.to_string()))
    }

    /// Size and structure checks applied before enqueueing and after receiving
    pub fn validate(&self) -> MessagingResult<()> {
        if self.module.trim().is_empty() {
            return Err(MessagingError::invalid_envelope("module cannot be empty"));
        }
        if self.class.trim().is_empty() {
            return Err(MessagingError::invalid_envelope("class cannot be empty"));
        }

        let serialized = self.to_json()?;
        if serialized.len() > MAX_ENVELOPE_SIZE_BYTES {
            return Err(MessagingError::invalid_envelope(format!(
                "envelope too large: {} bytes (max: {})",
                serialized.len(),
                MAX_ENVELOPE_SIZE_BYTES
            )));
        }

        if self.arguments.len() > MAX_ARGUMENT_ITEMS {
            return Err(MessagingError::invalid_envelope(format!(
                "too many arguments: {} (max: {MAX_ARGUMENT_ITEMS})",
                self.arguments.len()
            )));
        }
        for value in self.arguments.values() {
            validate_argument_depth(value, 1)?;
        }
        Ok(())
    }
}

fn validate_argument_depth(value: &Value, current_depth: usize) -> MessagingResult<()> {
    if current_depth > MAX_ARGUMENT_DEPTH {
        return Err(MessagingError::invalid_envelope(format!(
            "arguments nested too deep: {current_depth} (max: {MAX_ARGUMENT_DEPTH})"
        )));
    }

    match value {
        Value::Object(map) => {
            if map.len() > MAX_ARGUMENT_ITEMS {
                return Err(MessagingError::invalid_envelope(format!(
                    "too many keys: {} (max: {MAX_ARGUMENT_ITEMS})",
                    map.len()
                )));
            }
            for val in map.values() {
                validate_argument_depth(val, current_depth + 1)?;
            }
        }
        Value::Array(arr) => {
            if arr.len() > MAX_ARGUMENT_ITEMS {
                return Err(MessagingError::invalid_envelope(format!(
                    "array too large: {} items (max: {MAX_ARGUMENT_ITEMS})",
                    arr.len()
                )));
            }
            for item in arr {
                validate_argument_depth(item, current_depth + 1)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// A message received from a queue
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message_id: MessageId,
    /// Raw JSON body as stored in the queue
    pub body: String,
    /// Number of times this message has been received
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn envelope(&self) -> MessagingResult<TaskEnvelope> {
        TaskEnvelope::from_body(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_from_body() {
        let body = r#"{"module":"streamer-worker","class":"Ping","arguments":{"message":"hi"}}"#;
        let envelope = TaskEnvelope::from_body(body).unwrap();
        assert_eq!(envelope.class, "Ping");
        assert_eq!(envelope.arguments["message"], json!("hi"));
    }

    #[test]
    fn test_envelope_requires_all_keys() {
        let missing_arguments = r#"{"module":"streamer-worker","class":"Ping"}"#;
        let err = TaskEnvelope::from_body(missing_arguments).unwrap_err();
        assert!(err.is_envelope_error());

        let not_json = "hello";
        assert!(TaskEnvelope::from_body(not_json).unwrap_err().is_envelope_error());

        let empty_class = r#"{"module":"m","class":"","arguments":{}}"#;
        assert!(matches!(
            TaskEnvelope::from_body(empty_class),
            Err(MessagingError::InvalidEnvelope { .. })
        ));
    }

    #[test]
    fn test_envelope_rejects_deep_arguments() {
        let mut nested = json!(1);
        for _ in 0..12 {
            nested = json!({ "inner": nested });
        }
        let mut arguments = Map::new();
        arguments.insert("deep".to_string(), nested);
        let envelope = TaskEnvelope::new("m", "Ping", arguments);
        assert!(matches!(
            envelope.validate(),
            Err(MessagingError::InvalidEnvelope { .. })
        ));
    }

    #[test]
    fn test_message_id_numeric_form() {
        assert_eq!(MessageId::from(42i64).as_i64(), Some(42));
        assert_eq!(MessageId::from("abc").as_i64(), None);
    }
}
