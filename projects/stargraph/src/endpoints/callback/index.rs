use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::endpoints::AppState;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("MissingCode: no authorization code in callback")]
    MissingCode,

    #[error("RequestSend: {source}")]
    RequestSend { source: reqwest::Error },

    #[error("UnexpectedStatus: {status}")]
    UnexpectedStatus { status: reqwest::StatusCode },

    #[error("DeserializeResponseBody: {source}")]
    DeserializeResponseBody { source: reqwest::Error },

    #[error("ExchangeRejected: {reason}")]
    ExchangeRejected { reason: String },
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        error!(error = %self, "OAuth callback failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Axum handler: GET /callback?code=...
///
/// Trades the authorization code for an access token, stores it in the
/// `token` cookie and sends the browser back to `/`.
pub async fn handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(input): Query<CallbackQuery>,
) -> Result<Response, HandlerError> {
    let code = input
        .code
        .filter(|code| !code.is_empty())
        .ok_or(HandlerError::MissingCode)?;

    let oauth = &state.config.oauth;
    let response = state
        .http
        .post(&oauth.access_token_url)
        .header(header::ACCEPT, "application/json")
        .form(&[
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("code", code.as_str()),
        ])
        .timeout(state.config.request_timeout)
        .send()
        .await
        .map_err(|source| HandlerError::RequestSend { source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(HandlerError::UnexpectedStatus { status });
    }

    let body: AccessTokenResponse = response
        .json()
        .await
        .map_err(|source| HandlerError::DeserializeResponseBody { source })?;

    let token = match body.access_token {
        Some(token) if is_cookie_safe(&token) => token,
        _ => {
            let reason = body
                .error_description
                .or(body.error)
                .unwrap_or_else(|| "no usable access_token in response".to_owned());
            return Err(HandlerError::ExchangeRejected { reason });
        }
    };

    info!("OAuth code exchanged for access token");
    let cookie = format!("token={token}; Path=/; SameSite=Lax");
    Ok(([(header::SET_COOKIE, cookie)], Redirect::temporary("/")).into_response())
}

fn is_cookie_safe(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
