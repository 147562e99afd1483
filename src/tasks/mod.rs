//! Asynchronous orchestration tasks: the retrying pipeline, its state
//! model and the in-process queue that runs it.

pub mod backoff;
pub mod pipeline;
pub mod queue;
pub mod state;

pub use backoff::RetryPolicy;
pub use pipeline::Orchestrator;
pub use queue::TaskQueue;
pub use state::{LogObserver, Stage, TaskObserver, TaskPoll, TaskRecord, TaskResult, TaskState};
