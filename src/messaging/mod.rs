//! # Messaging Module
//!
//! Task envelopes, the provider-agnostic queue trait, and its in-memory and
//! PostgreSQL (pgmq) backends.

pub mod action_pid;
pub mod errors;
pub mod in_memory;
pub mod message;
pub mod pgmq_queue;
pub mod queue;

pub use action_pid::{ActionPid, ActionPidInfo};
pub use errors::{MessagingError, MessagingResult};
pub use in_memory::{InMemoryMessageSnapshot, InMemoryQueue, InMemoryQueueStats};
pub use message::{MessageId, QueuedMessage, TaskEnvelope};
pub use pgmq_queue::PgmqQueue;
pub use queue::MessageQueue;
