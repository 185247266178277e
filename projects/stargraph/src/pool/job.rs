use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::fetcher::PageFetchError;

/// One page of a repository's stargazer listing, waiting to be fetched.
///
/// Each job carries the reply channel its [`JobResult`] goes to, so several
/// aggregations can share one pool without seeing each other's pages.
pub struct Job {
    pub owner: String,
    pub name: String,
    pub token: String,
    /// 1-based page index.
    pub page_index: u32,
    pub page_size: u32,
    reply: mpsc::Sender<JobResult>,
}

impl Job {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        token: impl Into<String>,
        page_index: u32,
        page_size: u32,
        reply: mpsc::Sender<JobResult>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            token: token.into(),
            page_index,
            page_size,
            reply,
        }
    }

    /// Consumes the job and delivers its outcome, waiting while the reply
    /// channel is full.
    pub async fn complete(self, outcome: Result<Vec<i64>, PageFetchError>) {
        let result = JobResult {
            page_index: self.page_index,
            outcome,
        };
        if self.reply.send(result).await.is_err() {
            debug!(
                owner = %self.owner,
                name = %self.name,
                page = self.page_index,
                "Result dropped, requester is gone"
            );
        }
    }
}

// The token stays out of logs.
impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("page_index", &self.page_index)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Outcome of exactly one [`Job`].
#[derive(Debug)]
pub struct JobResult {
    pub page_index: u32,
    pub outcome: Result<Vec<i64>, PageFetchError>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Stopped: the worker pool no longer accepts jobs")]
    Stopped,
}

/// Where the aggregator sends jobs. Implemented by
/// [`WorkerPool`](super::WorkerPool); tests substitute their own.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a job, waiting while the queue is at capacity.
    async fn submit(&self, job: Job) -> Result<(), SubmitError>;
}
