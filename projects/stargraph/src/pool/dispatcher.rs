use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::job::{Job, JobQueue, SubmitError};
use crate::fetcher::PageFetcher;

/// Externally visible lifecycle of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Created,
    Running,
    Stopped,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

enum Lifecycle {
    Created,
    Running(Vec<JoinHandle<()>>),
    Stopped,
}

impl Lifecycle {
    const fn state(&self) -> PoolState {
        match self {
            Self::Created => PoolState::Created,
            Self::Running(_) => PoolState::Running,
            Self::Stopped => PoolState::Stopped,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolConfigError {
    #[error("InvalidWorkerCount: a pool needs at least one worker")]
    InvalidWorkerCount,

    #[error("InvalidQueueCapacity: the job queue needs room for at least one job")]
    InvalidQueueCapacity,
}

#[derive(Debug, Error)]
pub enum PoolLifecycleError {
    #[error("AlreadyStarted: pool is {state}")]
    AlreadyStarted { state: PoolState },

    #[error("NotRunning: pool is {state}")]
    NotRunning { state: PoolState },

    #[error("NoRuntime: {source}")]
    NoRuntime {
        #[from]
        source: tokio::runtime::TryCurrentError,
    },
}

/// Fixed set of workers draining one bounded job queue.
///
/// Every worker runs as its own task on the multi-threaded runtime and
/// handles one job at a time, so `worker_count` bounds both the number of
/// requests in flight and the burst presented to GitHub.
pub struct WorkerPool {
    worker_count: usize,
    sender: mpsc::Sender<Job>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    fetcher: Arc<dyn PageFetcher>,
    shutdown: CancellationToken,
    lifecycle: StdMutex<Lifecycle>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        queue_capacity: usize,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, PoolConfigError> {
        if worker_count == 0 {
            return Err(PoolConfigError::InvalidWorkerCount);
        }
        if queue_capacity == 0 {
            return Err(PoolConfigError::InvalidQueueCapacity);
        }

        let (sender, receiver) = mpsc::channel(queue_capacity);

        Ok(Self {
            worker_count,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            fetcher,
            shutdown: CancellationToken::new(),
            lifecycle: StdMutex::new(Lifecycle::Created),
        })
    }

    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn state(&self) -> PoolState {
        self.lifecycle().state()
    }

    /// Spawns the workers. Must be called from inside a Tokio runtime, and
    /// only once.
    pub fn run(&self) -> Result<(), PoolLifecycleError> {
        let runtime = tokio::runtime::Handle::try_current()?;

        let mut lifecycle = self.lifecycle();
        if !matches!(*lifecycle, Lifecycle::Created) {
            return Err(PoolLifecycleError::AlreadyStarted {
                state: lifecycle.state(),
            });
        }

        let handles = (0..self.worker_count)
            .map(|worker_id| {
                runtime.spawn(work(
                    worker_id,
                    Arc::clone(&self.receiver),
                    Arc::clone(&self.fetcher),
                    self.shutdown.clone(),
                ))
            })
            .collect();
        *lifecycle = Lifecycle::Running(handles);

        info!(workers = self.worker_count, "Worker pool running");
        Ok(())
    }

    /// Tells every worker to exit once its current job is done, waits for
    /// all of them, then closes the queue. Jobs still queued are dropped,
    /// which closes their reply channels.
    #[instrument(skip(self), fields(workers = self.worker_count))]
    pub async fn stop(&self) -> Result<(), PoolLifecycleError> {
        let handles = {
            let mut lifecycle = self.lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(handles) => handles,
                other => {
                    let state = other.state();
                    *lifecycle = other;
                    return Err(PoolLifecycleError::NotRunning { state });
                }
            }
        };

        self.shutdown.cancel();
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "Worker task failed");
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut dropped = 0_usize;
        while receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Dropped queued jobs on shutdown");
        }

        info!("Worker pool stopped");
        Ok(())
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        // The lock is never held across a panic-prone call.
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobQueue for WorkerPool {
    async fn submit(&self, job: Job) -> Result<(), SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::Stopped);
        }
        self.sender.send(job).await.map_err(|_| SubmitError::Stopped)
    }
}

async fn work(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    fetcher: Arc<dyn PageFetcher>,
    shutdown: CancellationToken,
) {
    debug!(worker_id, "Worker started");

    loop {
        // Only the wait for the next job is cancellable; a job in progress
        // always runs to completion.
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = next else {
            break;
        };

        debug!(
            worker_id,
            owner = %job.owner,
            name = %job.name,
            page = job.page_index,
            "Fetching page"
        );
        let outcome = fetcher.fetch_page(&job).await;
        if let Err(err) = &outcome {
            warn!(
                worker_id,
                owner = %job.owner,
                name = %job.name,
                page = job.page_index,
                error = %err,
                "Page fetch failed"
            );
        }
        job.complete(outcome).await;
    }

    debug!(worker_id, "Worker exited");
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use reqwest::StatusCode;
    use rstest::rstest;

    use super::*;
    use crate::fetcher::{MockPageFetcher, PageFetchError};
    use crate::pool::JobResult;
    use crate::test_utils::{page_of, CountingFetcher};

    fn job(page_index: u32, reply: &mpsc::Sender<JobResult>) -> Job {
        Job::new("octo", "repo", "token", page_index, 100, reply.clone())
    }

    #[test]
    fn rejects_zero_workers() {
        let fetcher = Arc::new(CountingFetcher::default());
        let err = WorkerPool::new(0, 8, fetcher).err();
        assert!(matches!(err, Some(PoolConfigError::InvalidWorkerCount)));
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let fetcher = Arc::new(CountingFetcher::default());
        let err = WorkerPool::new(2, 0, fetcher).err();
        assert!(matches!(err, Some(PoolConfigError::InvalidQueueCapacity)));
    }

    #[test]
    fn run_outside_a_runtime_is_an_error() {
        let pool = WorkerPool::new(1, 1, Arc::new(CountingFetcher::default()))
            .expect("pool should build");
        assert!(matches!(
            pool.run(),
            Err(PoolLifecycleError::NoRuntime { .. })
        ));
        assert_eq!(pool.state(), PoolState::Created);
    }

    #[rstest]
    #[case(1, 0)]
    #[case(1, 7)]
    #[case(3, 1)]
    #[case(4, 50)]
    #[case(16, 200)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_job_yields_exactly_one_result(#[case] workers: usize, #[case] jobs: u32) {
        let pool = WorkerPool::new(workers, 8, Arc::new(CountingFetcher::default()))
            .expect("pool should build");
        pool.run().expect("pool should start");

        let capacity = usize::try_from(jobs).expect("fits").max(1);
        let (reply, mut results) = mpsc::channel(capacity);
        for page in 1..=jobs {
            pool.submit(job(page, &reply)).await.expect("submit should succeed");
        }
        drop(reply);

        let mut seen = HashSet::new();
        while let Some(result) = results.recv().await {
            assert!(seen.insert(result.page_index), "duplicate result");
            assert_eq!(result.outcome.expect("fetch should succeed"), page_of(result.page_index));
        }
        assert_eq!(seen, (1..=jobs).collect::<HashSet<_>>());

        pool.stop().await.expect("pool should stop");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn never_exceeds_worker_count_in_flight() {
        let fetcher = Arc::new(CountingFetcher::with_delay(Duration::from_millis(20)));
        let pool = WorkerPool::new(3, 4, fetcher.clone()).expect("pool should build");
        pool.run().expect("pool should start");

        let (reply, mut results) = mpsc::channel(30);
        for page in 1..=30 {
            pool.submit(job(page, &reply)).await.expect("submit should succeed");
        }
        drop(reply);

        let mut received = 0;
        while results.recv().await.is_some() {
            received += 1;
        }

        assert_eq!(received, 30);
        assert!((1..=3).contains(&fetcher.max_in_flight()));
        pool.stop().await.expect("pool should stop");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_job_does_not_disturb_the_others() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch_page().returning(|job| {
            if job.page_index == 2 {
                Err(PageFetchError::RateLimited {
                    status: StatusCode::FORBIDDEN,
                })
            } else {
                Ok(vec![i64::from(job.page_index)])
            }
        });
        let pool = WorkerPool::new(2, 4, Arc::new(fetcher)).expect("pool should build");
        pool.run().expect("pool should start");

        let (reply, mut results) = mpsc::channel(4);
        for page in 1..=4 {
            pool.submit(job(page, &reply)).await.expect("submit should succeed");
        }
        drop(reply);

        let mut failures = 0;
        let mut successes = 0;
        while let Some(result) = results.recv().await {
            match result.outcome {
                Ok(values) => {
                    assert_eq!(values, vec![i64::from(result.page_index)]);
                    successes += 1;
                }
                Err(PageFetchError::RateLimited { .. }) => failures += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!((successes, failures), (3, 1));
        assert_eq!(pool.state(), PoolState::Running);
        pool.stop().await.expect("pool should stop");
    }

    #[tokio::test]
    async fn lifecycle_is_monotonic() {
        let pool = WorkerPool::new(2, 2, Arc::new(CountingFetcher::default()))
            .expect("pool should build");
        assert_eq!(pool.state(), PoolState::Created);

        let early = pool.stop().await;
        assert!(matches!(
            early,
            Err(PoolLifecycleError::NotRunning {
                state: PoolState::Created
            })
        ));
        assert_eq!(pool.state(), PoolState::Created);

        pool.run().expect("pool should start");
        assert_eq!(pool.state(), PoolState::Running);
        assert!(matches!(
            pool.run(),
            Err(PoolLifecycleError::AlreadyStarted {
                state: PoolState::Running
            })
        ));

        pool.stop().await.expect("pool should stop");
        assert_eq!(pool.state(), PoolState::Stopped);
        assert!(pool.run().is_err());
        assert!(matches!(
            pool.stop().await,
            Err(PoolLifecycleError::NotRunning {
                state: PoolState::Stopped
            })
        ));
    }

    #[tokio::test]
    async fn stop_with_an_empty_queue_returns_promptly() {
        let pool = WorkerPool::new(4, 4, Arc::new(CountingFetcher::default()))
            .expect("pool should build");
        pool.run().expect("pool should start");

        tokio::time::timeout(Duration::from_secs(5), pool.stop())
            .await
            .expect("stop should not hang")
            .expect("pool should stop");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_with_a_populated_queue_drops_pending_jobs() {
        let fetcher = Arc::new(CountingFetcher::with_delay(Duration::from_millis(200)));
        let pool = WorkerPool::new(1, 16, fetcher.clone()).expect("pool should build");
        pool.run().expect("pool should start");

        let (reply, mut results) = mpsc::channel(16);
        for page in 1..=10 {
            pool.submit(job(page, &reply)).await.expect("submit should succeed");
        }
        drop(reply);

        // Let the single worker pick up its first job.
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(5), pool.stop())
            .await
            .expect("stop should not hang")
            .expect("pool should stop");

        let mut delivered = 0_usize;
        while results.recv().await.is_some() {
            delivered += 1;
        }

        // The in-progress job finishes; queued ones are dropped, and the
        // reply channel closes instead of hanging.
        assert!(delivered >= 1);
        assert!(delivered < 10);
        assert_eq!(fetcher.calls(), delivered);
    }

    #[tokio::test]
    async fn submit_after_stop_is_rejected() {
        let pool = WorkerPool::new(1, 1, Arc::new(CountingFetcher::default()))
            .expect("pool should build");
        pool.run().expect("pool should start");
        pool.stop().await.expect("pool should stop");

        let (reply, _results) = mpsc::channel(1);
        let err = pool.submit(job(1, &reply)).await;
        assert!(matches!(err, Err(SubmitError::Stopped)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_waits_for_queue_capacity() {
        let fetcher = Arc::new(CountingFetcher::with_delay(Duration::from_millis(100)));
        let pool = Arc::new(WorkerPool::new(1, 1, fetcher).expect("pool should build"));

        let (reply, mut results) = mpsc::channel(3);
        // Not running yet: the first job fills the queue.
        pool.submit(job(1, &reply)).await.expect("submit should succeed");

        let blocked = {
            let pool = Arc::clone(&pool);
            let reply = reply.clone();
            tokio::spawn(async move { pool.submit(job(2, &reply)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished(), "submit should wait for room");

        pool.run().expect("pool should start");
        blocked
            .await
            .expect("task should not panic")
            .expect("submit should succeed once there is room");
        drop(reply);

        let mut received = 0;
        while results.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 2);
        pool.stop().await.expect("pool should stop");
    }
}
