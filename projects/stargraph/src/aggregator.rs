//! Fan-out of one repository's stargazer pages and all-or-nothing
//! collection of the results.
//!
//! The page count comes from the star count in the repository metadata, so
//! every page is known up front and can be submitted at once instead of
//! following next-page links one response at a time.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::fetcher::PageFetchError;
use crate::pool::{Job, JobQueue, JobResult, SubmitError};
use interfaces_github_stargazers::repo::RepoInfo;

/// Page size GitHub allows at most for the stargazers listing.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("InvalidPageSize: page size must be at least 1")]
    InvalidPageSize,

    #[error("TooManyPages: {total_pages} pages")]
    TooManyPages { total_pages: u64 },

    #[error("PageFetch: page {page}: {source}")]
    PageFetch {
        page: u32,
        #[source]
        source: PageFetchError,
    },

    #[error("Submit: page {page}: {source}")]
    Submit {
        page: u32,
        #[source]
        source: SubmitError,
    },

    #[error("Interrupted: {missing} of {expected} pages never reported back")]
    Interrupted { expected: u32, missing: u32 },
}

/// Number of pages needed to list `star_count` items `page_size` at a time.
pub fn total_pages(star_count: u64, page_size: u32) -> Result<u32, AggregateError> {
    if page_size == 0 {
        return Err(AggregateError::InvalidPageSize);
    }
    let total = star_count.div_ceil(u64::from(page_size));
    u32::try_from(total).map_err(|_| AggregateError::TooManyPages { total_pages: total })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Dispatching,
    Collecting,
    Done,
    Failed,
}

/// Accumulates page results until every expected one has arrived.
///
/// The first error wins; later pages are still drained so no worker is left
/// waiting on a full reply channel, but their data is discarded.
struct Collector {
    expected: u32,
    received: u32,
    pages: Vec<(u32, Vec<i64>)>,
    first_error: Option<AggregateError>,
}

impl Collector {
    fn new(expected: u32) -> Self {
        Self {
            expected,
            received: 0,
            pages: Vec::new(),
            first_error: None,
        }
    }

    const fn phase(&self) -> Phase {
        if self.first_error.is_some() {
            Phase::Failed
        } else if self.received == self.expected {
            Phase::Done
        } else {
            Phase::Collecting
        }
    }

    const fn outstanding(&self) -> u32 {
        self.expected - self.received
    }

    fn fail(&mut self, err: AggregateError) {
        if self.first_error.is_none() {
            debug!(error = %err, "Aggregation failed, draining remaining pages");
            self.pages = Vec::new();
            self.first_error = Some(err);
        }
    }

    fn accept(&mut self, result: JobResult) {
        self.received += 1;
        match result.outcome {
            Ok(timestamps) if self.first_error.is_none() => {
                self.pages.push((result.page_index, timestamps));
            }
            Ok(_) => {}
            Err(source) => self.fail(AggregateError::PageFetch {
                page: result.page_index,
                source,
            }),
        }
    }

    fn finish(mut self) -> Result<Vec<i64>, AggregateError> {
        if let Some(err) = self.first_error {
            return Err(err);
        }
        self.pages.sort_unstable_by_key(|(page, _)| *page);
        Ok(self
            .pages
            .into_iter()
            .flat_map(|(_, timestamps)| timestamps)
            .collect())
    }
}

/// Fetches every `starred_at` timestamp of `repo` through `queue`.
///
/// Either every page succeeds and all timestamps come back, or the first
/// failure is returned and nothing else. Timestamps keep their order within
/// a page; callers must not rely on any order across pages.
#[instrument(
    skip(queue, token, repo),
    fields(owner = %repo.owner, name = %repo.name, stars = repo.star_count)
)]
pub async fn get_all_timestamps<Q>(
    queue: &Q,
    page_size: u32,
    token: &str,
    repo: &RepoInfo,
) -> Result<Vec<i64>, AggregateError>
where
    Q: JobQueue + ?Sized,
{
    let total = total_pages(repo.star_count, page_size)?;
    if total == 0 {
        debug!("No stars, nothing to fetch");
        return Ok(Vec::new());
    }

    debug!(phase = ?Phase::Dispatching, pages = total, "Submitting jobs");
    let capacity = usize::try_from(total).map_err(|_| AggregateError::TooManyPages {
        total_pages: u64::from(total),
    })?;
    let (reply, mut results) = mpsc::channel(capacity);

    let mut submitted = 0_u32;
    let mut submit_error = None;
    for page in 1..=total {
        let job = Job::new(
            repo.owner.as_str(),
            repo.name.as_str(),
            token,
            page,
            page_size,
            reply.clone(),
        );
        if let Err(source) = queue.submit(job).await {
            submit_error = Some(AggregateError::Submit { page, source });
            break;
        }
        submitted += 1;
    }
    drop(reply);

    let mut collector = Collector::new(submitted);
    if let Some(err) = submit_error {
        collector.fail(err);
    }

    debug!(phase = ?collector.phase(), expected = submitted, "Collecting results");
    while collector.outstanding() > 0 {
        match results.recv().await {
            Some(result) => collector.accept(result),
            None => {
                // Every sender is gone but results are missing: jobs were
                // dropped without running, e.g. by a pool shutdown.
                collector.fail(AggregateError::Interrupted {
                    expected: total,
                    missing: collector.outstanding(),
                });
                break;
            }
        }
    }
    debug!(phase = ?collector.phase(), received = collector.received, "Collection finished");

    let timestamps = collector.finish()?;
    if timestamps.len() as u64 != repo.star_count {
        warn!(
            fetched = timestamps.len(),
            reported = repo.star_count,
            "Fetched star count differs from repository metadata"
        );
    }
    Ok(timestamps)
}
