//! Job execution: coordinator, worker pool and per-page tasks.
//!
//! Separated from UI concerns; observers receive [`JobEvent`]s through an
//! [`EventSink`].

mod coordinator;
mod events;
mod pool;
mod tasks;
mod types;

pub use coordinator::{Capabilities, JobCoordinator, JobHandle, JobState};
pub use events::{ChannelEventSink, EventSink, NullEventSink};
pub use pool::{PoolReport, WorkerPool};
pub use tasks::{parse_metadata, plan_page, TaskError};
pub use types::{
    CancelFlag, JobError, JobEvent, JobEventKind, JobId, JobKind, JobRequest, JobType,
    ProgressEvent, TerminalStatus,
};
