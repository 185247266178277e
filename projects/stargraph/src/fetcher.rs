use std::time::Duration;

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use interfaces_github_stargazers::index::{fetch_stargazers_page, StargazersPageRequest};
use reqwest::Client;
use tracing::warn;

use crate::pool::Job;

pub use interfaces_github_stargazers::index::FetchStargazersPageError as PageFetchError;

/// Pause before the single retry of a transient failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Executes one [`Job`]: a single page of `starred_at` timestamps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, job: &Job) -> Result<Vec<i64>, PageFetchError>;
}

/// [`PageFetcher`] backed by the GitHub REST API.
///
/// Every attempt is bounded by `request_timeout`. Transport errors, timeouts
/// and 5xx responses get one more attempt; everything else fails the page
/// immediately.
#[derive(Debug, Clone)]
pub struct GitHubPageFetcher {
    client: Client,
    api_url: String,
    request_timeout: Duration,
    retry_delay: Duration,
}

impl GitHubPageFetcher {
    pub fn new(client: Client, api_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            request_timeout,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

#[async_trait]
impl PageFetcher for GitHubPageFetcher {
    async fn fetch_page(&self, job: &Job) -> Result<Vec<i64>, PageFetchError> {
        let request = StargazersPageRequest {
            api_url: &self.api_url,
            token: &job.token,
            owner: &job.owner,
            name: &job.name,
            page: job.page_index,
            per_page: job.page_size,
            timeout: self.request_timeout,
        };

        (|| fetch_stargazers_page(&self.client, &request))
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.retry_delay)
                    .with_max_times(1),
            )
            .when(PageFetchError::is_transient)
            .notify(|err, delay| {
                warn!(
                    owner = %job.owner,
                    name = %job.name,
                    page = job.page_index,
                    error = %err,
                    ?delay,
                    "Retrying page fetch"
                );
            })
            .await
    }
}
