use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use interfaces_github_stargazers::repo::{fetch_repo_info, FetchRepoInfoError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::aggregator::{get_all_timestamps, AggregateError};
use crate::endpoints::AppState;
use crate::utils::{
    canvas::{write_canvas_script, CanvasScriptError},
    chart::{generate_star_chart, ChartError},
    timeline::{cumulative_series, daily_star_counts},
};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("FetchRepoInfo: {source}")]
    FetchRepoInfo {
        #[from]
        source: FetchRepoInfoError,
    },

    #[error("GetAllTimestamps: {source}")]
    GetAllTimestamps {
        #[from]
        source: AggregateError,
    },

    #[error("WriteCanvasScript: {source}")]
    WriteCanvasScript {
        #[from]
        source: CanvasScriptError,
    },

    #[error("GenerateStarChart: {source}")]
    GenerateStarChart {
        #[from]
        source: ChartError,
    },
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        // Details stay in the server log.
        error!(error = %self, "Star graph request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChartFormat {
    /// CanvasJS script for the browser.
    #[default]
    Script,
    Svg,
}

/// Query parameters for the endpoint.
#[derive(Deserialize)]
pub struct ApiQuery {
    repo: String,
    token: Option<String>,
    #[serde(default)]
    format: ChartFormat,
}

/// Axum handler: GET /api?repo=owner/name[&token=...][&format=svg]
///
/// Without a `token` parameter the `token` cookie set by `/callback` is
/// used.
pub async fn handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(input): Query<ApiQuery>,
) -> Result<Response, HandlerError> {
    let token = input
        .token
        .filter(|token| !token.is_empty())
        .or_else(|| token_from_cookies(&headers))
        .unwrap_or_default();

    let info = fetch_repo_info(
        &state.http,
        &state.config.github_api_url,
        &token,
        &input.repo,
        state.config.request_timeout,
    )
    .await?;

    let timestamps =
        get_all_timestamps(state.jobs.as_ref(), state.config.page_size, &token, &info).await?;
    info!(
        owner = %info.owner,
        name = %info.name,
        stars = timestamps.len(),
        "Fetched star timestamps"
    );

    let points = cumulative_series(&daily_star_counts(&timestamps));

    let response = match input.format {
        ChartFormat::Script => {
            let script = write_canvas_script(&points, &info.owner, &info.name)?;
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/javascript")],
                script,
            )
                .into_response()
        }
        ChartFormat::Svg => {
            let svg = generate_star_chart(&points, &info.owner, &info.name)?;
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "image/svg+xml")],
                svg,
            )
                .into_response()
        }
    };

    Ok(response)
}

fn token_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == "token" && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}
