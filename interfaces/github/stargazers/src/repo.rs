use std::fmt;
use std::time::Duration;

use reqwest::{
    header::{ACCEPT, AUTHORIZATION, USER_AGENT},
    Client, StatusCode,
};
use serde::Deserialize;
use thiserror::Error;

/// Repository identity and the star count GitHub reports for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub owner: String,
    pub name: String,
    pub star_count: u64,
}

/// `owner/name` pair parsed from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum ParseRepoSpecError {
    #[error("InvalidRepoSpec: expected owner/name, got {input:?}")]
    InvalidRepoSpec { input: String },
}

impl RepoSpec {
    /// Accepts `owner/name`, optionally as a `github.com` URL, with a
    /// trailing slash or `.git` suffix.
    pub fn parse(input: &str) -> Result<Self, ParseRepoSpecError> {
        let invalid = || ParseRepoSpecError::InvalidRepoSpec {
            input: input.to_owned(),
        };

        let trimmed = input.trim();
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let without_host = without_scheme
            .strip_prefix("www.github.com/")
            .or_else(|| without_scheme.strip_prefix("github.com/"))
            .unwrap_or(without_scheme);
        let path = without_host.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);

        let mut parts = path.split('/');
        let (Some(owner), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };

        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_owned(),
            name: name.to_owned(),
        })
    }
}

impl fmt::Display for RepoSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Deserialize)]
struct RepositoryResponse {
    name: String,
    owner: RepositoryOwner,
    stargazers_count: u64,
}

#[derive(Deserialize)]
struct RepositoryOwner {
    login: String,
}

/// Looks up the repository named by `repo_spec` and returns its star count.
pub async fn fetch_repo_info(
    client: &Client,
    api_url: &str,
    token: &str,
    repo_spec: &str,
    timeout: Duration,
) -> Result<RepoInfo, FetchRepoInfoError> {
    let spec = RepoSpec::parse(repo_spec)?;
    let url = format!(
        "{}/repos/{}/{}",
        api_url.trim_end_matches('/'),
        spec.owner,
        spec.name
    );

    let mut builder = client
        .get(&url)
        .header(ACCEPT, "application/vnd.github+json")
        .header(USER_AGENT, crate::USER_AGENT)
        .timeout(timeout);
    if !token.is_empty() {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }

    let response = builder
        .send()
        .await
        .map_err(|source| FetchRepoInfoError::RequestSend { source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchRepoInfoError::UnexpectedStatus {
            repo: spec.to_string(),
            status,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|source| FetchRepoInfoError::ResponseRead { source })?;

    let parsed: RepositoryResponse = serde_json::from_str(&body)
        .map_err(|source| FetchRepoInfoError::DeserializeResponseBody { source })?;

    // GitHub resolves renames and case differences; keep its canonical names.
    Ok(RepoInfo {
        owner: parsed.owner.login,
        name: parsed.name,
        star_count: parsed.stargazers_count,
    })
}

#[derive(Debug, Error)]
pub enum FetchRepoInfoError {
    #[error("ParseRepoSpec: {source}")]
    ParseRepoSpec {
        #[from]
        source: ParseRepoSpecError,
    },

    #[error("RequestSend: {source}")]
    RequestSend { source: reqwest::Error },

    #[error("UnexpectedStatus: {status} for {repo}")]
    UnexpectedStatus { repo: String, status: StatusCode },

    #[error("ResponseRead: {source}")]
    ResponseRead { source: reqwest::Error },

    #[error("DeserializeResponseBody: {source}")]
    DeserializeResponseBody { source: serde_json::Error },
}
