use std::sync::Arc;

use projects_stargraph::{
    config::{Config, ConfigLoadError},
    endpoints::{router, AppState},
    fetcher::GitHubPageFetcher,
    pool::{PoolConfigError, PoolLifecycleError, WorkerPool},
};
use thiserror::Error;
use tracing::{info, warn};
use utils_trace::{tracing_init, TracingInitError};

#[derive(Debug, Error)]
pub enum MainError {
    #[error("LoadConfig: {source}")]
    LoadConfig {
        #[source]
        source: ConfigLoadError,
    },
    #[error("TracingInit: {source}")]
    TracingInit {
        #[source]
        source: TracingInitError,
    },
    #[error("BuildHttpClient: {source}")]
    BuildHttpClient {
        #[source]
        source: reqwest::Error,
    },
    #[error("CreateWorkerPool: {source}")]
    CreateWorkerPool {
        #[source]
        source: PoolConfigError,
    },
    #[error("WorkerPoolLifecycle: {source}")]
    WorkerPoolLifecycle {
        #[source]
        source: PoolLifecycleError,
    },
    #[error("TcpListenerBind: {source}")]
    TcpListenerBind {
        #[source]
        source: std::io::Error,
    },
    #[error("Serve: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let config = Config::from_env().map_err(|source| MainError::LoadConfig { source })?;

    tracing_init(&config.log_level).map_err(|source| MainError::TracingInit { source })?;

    let http = reqwest::Client::builder()
        .build()
        .map_err(|source| MainError::BuildHttpClient { source })?;

    let fetcher = GitHubPageFetcher::new(
        http.clone(),
        config.github_api_url.clone(),
        config.request_timeout,
    );
    let pool = Arc::new(
        WorkerPool::new(config.worker_count, config.queue_capacity, Arc::new(fetcher))
            .map_err(|source| MainError::CreateWorkerPool { source })?,
    );
    pool.run()
        .map_err(|source| MainError::WorkerPoolLifecycle { source })?;

    let addr = format!("{}:{}", config.host, config.port);
    let app = router(Arc::new(AppState {
        config,
        http,
        jobs: pool.clone(),
    }));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| MainError::TcpListenerBind { source })?;

    info!("Server running on addr: {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|source| MainError::Serve { source });

    // Stop the workers even when serving failed.
    pool.stop()
        .await
        .map_err(|source| MainError::WorkerPoolLifecycle { source })?;

    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Could not listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
