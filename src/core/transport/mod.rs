#![allow(clippy::result_large_err)] // Transport helpers return AppError for consistent diagnostics.

//! Authenticated access to the Kommo REST API.
//!
//! [`Transport`] is the single choke point for outbound calls: it resolves the
//! tenant base URL, encodes query parameters, delegates authentication to an
//! [`AuthenticatedHttp`] collaborator and folds every failure into an
//! [`AppError`] whose category tells field validation problems apart from
//! everything else.

pub mod client;
pub mod pagination;
pub mod query;

pub use client::{ReqwestHttp, StaticToken, TokenSource};
pub use pagination::{flatten_embedded, has_next_page};
pub use query::{append_query, parse_query_pair, ParseQueryError, Query};

use crate::core::config::{CredentialsConfig, KommoConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use url::Url;

/// One outbound call, fully described before it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the API base, e.g. `leads` or `catalogs/7/elements`.
    pub endpoint: String,
    pub body: Option<Value>,
    pub query: Query,
}

impl RequestDescriptor {
    pub fn new<T: Into<String>>(method: Method, endpoint: T) -> Self {
        RequestDescriptor {
            method,
            endpoint: endpoint.into(),
            body: None,
            query: Query::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn query_param<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.query.insert(key.into(), value);
        self
    }
}

/// Supplies the tenant API base URL.
pub trait CredentialsProvider: Send + Sync {
    fn api_base(&self) -> Result<Url, AppError>;
}

/// Subdomain-based tenant addressing with an optional full override.
#[derive(Debug, Clone, Default)]
pub struct TenantCredentials {
    subdomain: Option<String>,
    base_override: Option<String>,
}

impl TenantCredentials {
    pub fn for_subdomain<T: Into<String>>(subdomain: T) -> Self {
        TenantCredentials {
            subdomain: Some(subdomain.into()),
            base_override: None,
        }
    }

    pub fn with_base_url<T: Into<String>>(base_url: T) -> Self {
        TenantCredentials {
            subdomain: None,
            base_override: Some(base_url.into()),
        }
    }

    pub fn from_config(config: &CredentialsConfig) -> Self {
        TenantCredentials {
            subdomain: config.subdomain.clone(),
            base_override: config.api_base_url.clone(),
        }
    }
}

impl CredentialsProvider for TenantCredentials {
    fn api_base(&self) -> Result<Url, AppError> {
        let raw = match (&self.base_override, &self.subdomain) {
            (Some(base), _) => base.clone(),
            (None, Some(subdomain)) => format!("https://{}.kommo.com/api/v4/", subdomain),
            (None, None) => {
                return Err(AppError::new(
                    ErrorCategory::ConfigurationError,
                    "Kommo subdomain is not configured (credentials.subdomain or KOMMO_SUBDOMAIN)",
                ))
            }
        };
        Url::parse(&raw).map_err(|err| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("invalid Kommo API base URL {}: {}", raw, err),
            )
        })
    }
}

/// Wire-level request handed to the authenticated HTTP collaborator.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

/// Raw failure reported by an [`AuthenticatedHttp`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum HttpFailure {
    #[error("network failure: {0}")]
    Network(String),
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: u16,
        body: Option<Value>,
    },
    #[error("undecodable response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

/// Performs an HTTP request with credentials attached.
#[async_trait]
pub trait AuthenticatedHttp: Send + Sync {
    /// Returns the decoded JSON body; an empty success body decodes to `null`.
    async fn send(&self, request: HttpRequest) -> Result<Value, HttpFailure>;
}

/// Outbound REST transport bound to one tenant.
#[derive(Clone)]
pub struct Transport {
    credentials: Arc<dyn CredentialsProvider>,
    http: Arc<dyn AuthenticatedHttp>,
    page_limit: u32,
}

impl Transport {
    pub fn new(
        credentials: Arc<dyn CredentialsProvider>,
        http: Arc<dyn AuthenticatedHttp>,
    ) -> Self {
        Transport {
            credentials,
            http,
            page_limit: pagination::DEFAULT_PAGE_LIMIT,
        }
    }

    /// Wire a reqwest-backed transport from configuration and the resolved access token.
    pub fn from_config(config: &KommoConfig) -> Result<Self, AppError> {
        let token = config.credentials.resolve_access_token().ok_or_else(|| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!(
                    "no access token available; set {} or credentials.access_token",
                    config.credentials.access_token_env
                ),
            )
        })?;
        let http = ReqwestHttp::new(Arc::new(StaticToken::new(token)), config.transport.timeout())?;
        Ok(Transport::new(
            Arc::new(TenantCredentials::from_config(&config.credentials)),
            Arc::new(http),
        )
        .with_page_limit(config.transport.default_page_limit))
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Value, AppError> {
        self.request(
            descriptor.method.clone(),
            &descriptor.endpoint,
            descriptor.body.as_ref(),
            &descriptor.query,
        )
        .await
    }

    /// Perform one authenticated call against `{api_base}/{endpoint}`.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        query: &Query,
    ) -> Result<Value, AppError> {
        let url = self.build_url(endpoint, query)?;
        let body = if method == Method::GET || method == Method::HEAD {
            None
        } else {
            body.cloned()
        };
        let span = tracing::debug_span!("kommo_request", method = %method, endpoint = %endpoint);
        let started = Instant::now();
        let request = HttpRequest {
            method: method.clone(),
            url,
            body,
        };
        let outcome = self.http.send(request).instrument(span).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                tracing::debug!(%method, endpoint, elapsed_ms, "kommo request succeeded");
                Ok(value)
            }
            Err(failure) => {
                tracing::debug!(%method, endpoint, elapsed_ms, error = %failure, "kommo request failed");
                Err(map_failure(failure, &method, endpoint))
            }
        }
    }

    /// Resolve the absolute URL for an endpoint with its encoded query.
    pub fn build_url(&self, endpoint: &str, query: &Query) -> Result<Url, AppError> {
        let mut url = self.credentials.api_base()?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AppError::new(
                    ErrorCategory::ConfigurationError,
                    "Kommo API base URL cannot carry a path",
                )
            })?;
            segments.pop_if_empty();
            segments.extend(endpoint.split('/').filter(|segment| !segment.is_empty()));
        }
        append_query(&mut url, query);
        Ok(url)
    }
}

fn map_failure(failure: HttpFailure, method: &Method, endpoint: &str) -> AppError {
    let error = match failure {
        HttpFailure::Status { url, status, body } => {
            let validation = body
                .as_ref()
                .and_then(|body| body.get("validation-errors"))
                .filter(|detail| !detail.is_null());
            let mut error = match validation {
                Some(detail) => AppError::new(ErrorCategory::ValidationError, "Incorrect fields")
                    .with_description(
                        serde_json::to_string_pretty(detail).unwrap_or_else(|_| detail.to_string()),
                    ),
                None => AppError::new(
                    ErrorCategory::TransportError,
                    format!("Kommo answered {} for {} {}", status, method, endpoint),
                ),
            };
            error.add_context("status", &status.to_string());
            error.add_context("url", &url);
            if let Some(body) = body {
                error.add_context("response_body", &body.to_string());
            }
            error
        }
        other => {
            let message = other.to_string();
            AppError::with_source(ErrorCategory::TransportError, message, other)
        }
    };
    error
        .with_context("method", method.as_str())
        .with_context("endpoint", endpoint)
}
