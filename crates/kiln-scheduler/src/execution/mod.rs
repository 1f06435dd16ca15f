//! # Execution Lifecycle
//!
//! Drives one job execution through its ordered task sequence and applies
//! failure attribution when a task fails. The state machine lives in
//! [`RunningExecution`]; tasks and their construction are in [`task`] and
//! [`factory`]; the queue-side and error-catalog collaborators are injected
//! through the traits in [`hooks`].

pub mod backpressure;
pub mod factory;
pub mod hooks;
pub mod running;
pub mod task;

pub use backpressure::{NodeFailureMonitor, NODE_PAUSE_REASON};
pub use factory::TaskFactory;
pub use hooks::{ErrorCatalog, QueueSink, StandardErrorCatalog, StoreQueueSink};
pub use running::RunningExecution;
pub use task::{ExecutionTask, TaskKind};
