//! # Actions
//!
//! Named, independently schedulable units of work. A task envelope names an
//! action by `(module, class)`; the [`ActionRegistry`] maps that pair to a
//! constructor at compile time and the worker calls [`Action::execute`] on a
//! fresh instance.
//!
//! ```text
//!   envelope ──▶ ActionRegistry::resolve ──▶ Box<dyn Action> ──▶ execute(ctx, args)
//!                                                                   │
//!                                             Ok | ActionError ◀────┘
//! ```

pub mod arguments;
pub mod context;
pub mod errors;
pub mod registry;
pub mod system;

use async_trait::async_trait;

pub use arguments::Arguments;
pub use context::{ActionContext, ActionContextBuilder};
pub use errors::{ActionError, ActionResult, OutcomeKind};
pub use registry::{ActionName, ActionRegistry, DispatchError};
pub use system::{
    PingAction, WorkerCollectStatsAction, WorkerHealthCheckAction, WorkerShutDownAction,
};

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> ActionName;

    async fn execute(&self, ctx: &ActionContext, arguments: &Arguments) -> ActionResult<()>;

    /// Validate and complete arguments before the action is enqueued
    fn prepare_schedule(&self, arguments: Arguments) -> ActionResult<Arguments> {
        Ok(arguments)
    }
}
