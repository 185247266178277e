//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, OAuthConfig};
use crate::fetcher::{PageFetchError, PageFetcher};
use crate::pool::{Job, JobQueue, SubmitError};

/// Deterministic page contents: two timestamps derived from the page index.
pub fn page_of(page_index: u32) -> Vec<i64> {
    let base = i64::from(page_index) * 1_000;
    vec![base, base + 1]
}

/// Succeeds with [`page_of`] after an optional delay, tracking how many
/// fetches overlap.
#[derive(Default)]
pub struct CountingFetcher {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingFetcher {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for CountingFetcher {
    async fn fetch_page(&self, job: &Job) -> Result<Vec<i64>, PageFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(page_of(job.page_index))
    }
}

type Responder = dyn Fn(&Job) -> Result<Vec<i64>, PageFetchError> + Send + Sync;

/// [`JobQueue`] that answers every job inline, without any workers.
pub struct InlineQueue {
    respond: Box<Responder>,
    submitted: Mutex<Vec<u32>>,
    reject_from: Option<u32>,
}

impl InlineQueue {
    pub fn new(
        respond: impl Fn(&Job) -> Result<Vec<i64>, PageFetchError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            submitted: Mutex::new(Vec::new()),
            reject_from: None,
        }
    }

    /// Refuses every job whose page index is `page` or later.
    pub fn rejecting_from(mut self, page: u32) -> Self {
        self.reject_from = Some(page);
        self
    }

    pub fn submitted(&self) -> Vec<u32> {
        self.submitted.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl JobQueue for InlineQueue {
    async fn submit(&self, job: Job) -> Result<(), SubmitError> {
        if self.reject_from.is_some_and(|page| job.page_index >= page) {
            return Err(SubmitError::Stopped);
        }
        self.submitted
            .lock()
            .expect("lock poisoned")
            .push(job.page_index);
        let outcome = (self.respond)(&job);
        job.complete(outcome).await;
        Ok(())
    }
}

/// [`JobQueue`] that accepts jobs and silently drops them, as a stopped
/// pool does with whatever is left in its queue.
#[derive(Default)]
pub struct DroppingQueue;

#[async_trait]
impl JobQueue for DroppingQueue {
    async fn submit(&self, job: Job) -> Result<(), SubmitError> {
        drop(job);
        Ok(())
    }
}

/// Config pointing every GitHub endpoint at `server_uri`.
pub fn test_config(server_uri: &str) -> Config {
    Config {
        host: "127.0.0.1".to_owned(),
        port: 0,
        worker_count: 2,
        queue_capacity: 8,
        page_size: 100,
        request_timeout: Duration::from_secs(5),
        log_level: "debug".to_owned(),
        github_api_url: server_uri.to_owned(),
        oauth: OAuthConfig {
            client_id: "client".to_owned(),
            client_secret: "shh".to_owned(),
            access_token_url: format!("{server_uri}/login/oauth/access_token"),
        },
    }
}
