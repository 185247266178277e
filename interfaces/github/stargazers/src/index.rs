use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT},
    Client, StatusCode,
};
use serde::Deserialize;
use thiserror::Error;

/// Media type that makes GitHub include `starred_at` in stargazer entries.
const STAR_MEDIA_TYPE: &str = "application/vnd.github.star+json";

/// Everything needed to address one page of a repository's stargazers.
#[derive(Debug, Clone, Copy)]
pub struct StargazersPageRequest<'a> {
    pub api_url: &'a str,
    pub token: &'a str,
    pub owner: &'a str,
    pub name: &'a str,
    /// 1-based page index.
    pub page: u32,
    pub per_page: u32,
    /// Deadline for the whole request, body included.
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct StargazerEntry {
    starred_at: DateTime<Utc>,
}

/// Fetches one page of stargazers and returns their `starred_at` moments as
/// Unix-epoch seconds, in the order GitHub listed them.
pub async fn fetch_stargazers_page(
    client: &Client,
    request: &StargazersPageRequest<'_>,
) -> Result<Vec<i64>, FetchStargazersPageError> {
    let url = format!(
        "{}/repos/{}/{}/stargazers",
        request.api_url.trim_end_matches('/'),
        request.owner,
        request.name,
    );

    let mut builder = client
        .get(&url)
        .query(&[("per_page", request.per_page), ("page", request.page)])
        .header(ACCEPT, STAR_MEDIA_TYPE)
        .header(USER_AGENT, crate::USER_AGENT)
        .timeout(request.timeout);
    if !request.token.is_empty() {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", request.token));
    }

    let response = builder.send().await.map_err(classify_transport_error)?;

    let status = response.status();
    if !status.is_success() {
        if is_rate_limited(status, response.headers()) {
            return Err(FetchStargazersPageError::RateLimited { status });
        }
        return Err(FetchStargazersPageError::UnexpectedStatus { status });
    }

    let body = response.text().await.map_err(classify_transport_error)?;

    let entries: Vec<StargazerEntry> = serde_json::from_str(&body)
        .map_err(|source| FetchStargazersPageError::DeserializeResponseBody { source })?;

    Ok(entries
        .into_iter()
        .map(|entry| entry.starred_at.timestamp())
        .collect())
}

/// GitHub signals primary rate limits with 403 plus an exhausted quota
/// header, and secondary ones with 429.
fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|remaining| remaining.trim() == "0")
}

fn classify_transport_error(source: reqwest::Error) -> FetchStargazersPageError {
    if source.is_timeout() {
        FetchStargazersPageError::Timeout { source }
    } else {
        FetchStargazersPageError::RequestSend { source }
    }
}

#[derive(Debug, Error)]
pub enum FetchStargazersPageError {
    #[error("RequestSend: {source}")]
    RequestSend { source: reqwest::Error },

    #[error("Timeout: {source}")]
    Timeout { source: reqwest::Error },

    #[error("RateLimited: {status}")]
    RateLimited { status: StatusCode },

    #[error("UnexpectedStatus: {status}")]
    UnexpectedStatus { status: StatusCode },

    #[error("DeserializeResponseBody: {source}")]
    DeserializeResponseBody { source: serde_json::Error },
}

impl FetchStargazersPageError {
    /// Whether a second attempt has a reasonable chance of succeeding.
    ///
    /// Rate limits are excluded: the quota will not have reset by the time a
    /// short retry fires.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestSend { .. } | Self::Timeout { .. } => true,
            Self::UnexpectedStatus { status } => status.is_server_error(),
            Self::RateLimited { .. } | Self::DeserializeResponseBody { .. } => false,
        }
    }
}
