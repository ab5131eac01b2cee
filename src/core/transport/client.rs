#![allow(clippy::result_large_err)]

use super::{AuthenticatedHttp, HttpFailure, HttpRequest};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Source of OAuth bearer tokens. Acquisition and refresh live outside this crate.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AppError>;

    /// Called once after a 401; `Some` triggers a single re-send with the new token.
    async fn refresh(&self) -> Result<Option<String>, AppError> {
        Ok(None)
    }
}

/// Fixed token, e.g. read from `KOMMO_ACCESS_TOKEN`.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new<T: Into<String>>(token: T) -> Self {
        StaticToken {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken").field("token", &"***").finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, AppError> {
        Ok(self.token.clone())
    }
}

/// reqwest-backed [`AuthenticatedHttp`] that injects a bearer token.
#[derive(Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl ReqwestHttp {
    pub fn new(tokens: Arc<dyn TokenSource>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                AppError::with_source(
                    ErrorCategory::ConfigurationError,
                    "failed to build HTTP client",
                    err,
                )
            })?;
        Ok(ReqwestHttp { client, tokens })
    }

    async fn dispatch(
        &self,
        request: &HttpRequest,
        token: &str,
    ) -> Result<reqwest::Response, HttpFailure> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .bearer_auth(token)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }
        builder
            .send()
            .await
            .map_err(|err| HttpFailure::Network(describe_reqwest_error(&err)))
    }
}

#[async_trait]
impl AuthenticatedHttp for ReqwestHttp {
    async fn send(&self, request: HttpRequest) -> Result<Value, HttpFailure> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|err| HttpFailure::Credentials(err.message))?;
        let response = self.dispatch(&request, &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let refreshed = self
                .tokens
                .refresh()
                .await
                .map_err(|err| HttpFailure::Credentials(err.message))?;
            if let Some(fresh) = refreshed {
                tracing::debug!(url = %request.url, "access token refreshed after 401, re-sending");
                let retried = self.dispatch(&request, &fresh).await?;
                return decode_response(&request.url, retried).await;
            }
        }
        decode_response(&request.url, response).await
    }
}

/// Decode a response: empty success bodies become `null`, non-2xx become [`HttpFailure::Status`].
pub async fn decode_response(url: &Url, response: reqwest::Response) -> Result<Value, HttpFailure> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| HttpFailure::Network(describe_reqwest_error(&err)))?;
    let is_empty = bytes.iter().all(u8::is_ascii_whitespace);

    if status.is_success() {
        if is_empty {
            return Ok(Value::Null);
        }
        return serde_json::from_slice(&bytes).map_err(|err| HttpFailure::Decode {
            url: url.to_string(),
            message: err.to_string(),
        });
    }

    let body = if is_empty {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        )
    };
    Err(HttpFailure::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn describe_reqwest_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else {
        err.to_string()
    }
}
