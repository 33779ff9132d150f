//! # Worker
//!
//! The long-running consumer that pulls task envelopes off the queue and
//! runs them through the [`ActionRegistry`](crate::actions::ActionRegistry).
//!
//! ```text
//!   Idle ──▶ Polling ──▶ Dispatching ──┬──▶ Completing ──▶ Polling
//!                                       ├──▶ Retrying   ──▶ Polling
//!                                       └──▶ Halting    ──▶ Stopped
//! ```
//!
//! [`WorkerIdentity`] keeps the fleet registry and counters in the shared
//! key-value store; [`HaltSequence`] is the bounded wait after a shutdown
//! request.

mod identity;
mod runner;
mod shutdown;
mod state;

pub use identity::{ActionCount, WorkerIdentity, WorkerInfo};
pub use runner::{failure_report, Worker};
pub use shutdown::HaltSequence;
pub use state::{LoopControl, TerminationReason, WorkerState};
