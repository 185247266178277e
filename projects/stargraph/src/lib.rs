//! GitHub star history service
//!
//! - Worker pool and page-fetch jobs in `pool/`
//! - Fan-out and all-or-nothing collection in `aggregator`
//! - HTTP endpoints in `endpoints/`
//! - Chart rendering in `utils/`
//! - Settings come from the environment, see `config`

pub mod aggregator;
pub mod config;
pub mod endpoints;
pub mod fetcher;
pub mod pool;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
