//! HTTP surface: the star chart endpoint, the OAuth callback and a health
//! probe.

pub mod api;
pub mod callback;
pub mod health;

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use crate::config::Config;
use crate::pool::JobQueue;

/// Shared by every handler through an [`Extension`].
pub struct AppState {
    pub config: Config,
    pub http: reqwest::Client,
    /// Usually the process-wide [`WorkerPool`](crate::pool::WorkerPool).
    pub jobs: Arc<dyn JobQueue>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api", get(api::index::handler))
        .route("/callback", get(callback::index::handler))
        .route("/health", get(health::index::handler))
        .layer(Extension(state))
}
