//! GitHub REST client pieces used by the star graph service
//!
//! - `index`: one page of the stargazers listing, with `starred_at` timestamps
//! - `repo`: repository metadata (star count) and `owner/name` parsing

pub mod index;
pub mod repo;

/// Default GitHub REST API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

pub(crate) const USER_AGENT: &str = "stargraph-rust-client";
