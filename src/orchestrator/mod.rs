//! Batch orchestration: job lifecycle, worker pool, and events.

mod batch;
mod events;
mod job;

pub use batch::{BatchHandle, BatchRunner, JobFactoryError};
pub use events::{BatchReport, JobEvent};
pub use job::{JobHandle, TransitionError};
