//! Worker pool that executes page-fetch jobs concurrently.

pub mod dispatcher;
pub mod job;

pub use dispatcher::{PoolConfigError, PoolLifecycleError, PoolState, WorkerPool};
pub use job::{Job, JobQueue, JobResult, SubmitError};
