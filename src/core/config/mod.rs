use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main configuration loaded from kommo.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KommoConfig {
    /// Tenant identity and access token lookup
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Outbound REST transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Inbound webhook listener and guard settings
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Credentials configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Account subdomain, i.e. `{subdomain}.kommo.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,

    /// Full API base URL; replaces the subdomain-derived one when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Inline access token (prefer `access_token_env`)
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    /// Environment variable holding the OAuth access token
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-request timeout enforced by the HTTP client
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Page size used by the pagination driver when the caller gives none
    #[serde(default = "default_page_limit")]
    pub default_page_limit: u32,
}

/// Shape of the acknowledgement body sent back to Kommo.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Simple,
    Detailed,
}

/// Webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Listener bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Route the listener accepts deliveries on
    #[serde(default = "default_path")]
    pub path: String,

    /// Request body limit in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Inline signing secret (prefer `secret_key_env`)
    #[serde(default, skip_serializing)]
    pub secret_key: Option<String>,

    /// Environment variable holding the signing secret
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,

    #[serde(default = "default_true")]
    pub validate_signature: bool,

    #[serde(default = "default_true")]
    pub validate_timestamp: bool,

    #[serde(default = "default_true")]
    pub prevent_duplicates: bool,

    #[serde(default = "default_duplicate_window_seconds")]
    pub duplicate_window_seconds: u64,

    #[serde(default = "default_max_event_age_seconds")]
    pub max_event_age_seconds: u64,

    /// Allowed event types; empty accepts every event
    #[serde(default)]
    pub events: Vec<String>,

    /// Copy request headers into the emitted record
    #[serde(default)]
    pub include_headers: bool,

    /// Copy query parameters into the emitted record
    #[serde(default)]
    pub include_query: bool,

    #[serde(default)]
    pub response_format: ResponseFormat,

    /// Log accepted events at info level instead of debug
    #[serde(default)]
    pub enable_logging: bool,

    /// How often expired duplicate fingerprints are swept (humantime, e.g. "5m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval: Option<String>,
}

fn default_access_token_env() -> String {
    "KOMMO_ACCESS_TOKEN".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_page_limit() -> u32 {
    250
}

fn default_bind() -> String {
    "127.0.0.1:5680".to_string()
}

fn default_path() -> String {
    "/webhook/kommo".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_secret_key_env() -> String {
    "KOMMO_WEBHOOK_SECRET".to_string()
}

fn default_true() -> bool {
    true
}

fn default_duplicate_window_seconds() -> u64 {
    60
}

fn default_max_event_age_seconds() -> u64 {
    300
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        CredentialsConfig {
            subdomain: None,
            api_base_url: None,
            access_token: None,
            access_token_env: default_access_token_env(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            timeout_seconds: default_timeout_seconds(),
            default_page_limit: default_page_limit(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            bind: default_bind(),
            path: default_path(),
            max_body_bytes: default_max_body_bytes(),
            secret_key: None,
            secret_key_env: default_secret_key_env(),
            validate_signature: true,
            validate_timestamp: true,
            prevent_duplicates: true,
            duplicate_window_seconds: default_duplicate_window_seconds(),
            max_event_age_seconds: default_max_event_age_seconds(),
            events: Vec::new(),
            include_headers: false,
            include_query: false,
            response_format: ResponseFormat::Simple,
            enable_logging: false,
            sweep_interval: None,
        }
    }
}

impl CredentialsConfig {
    /// Inline token first, then the configured environment variable.
    pub fn resolve_access_token(&self) -> Option<String> {
        non_empty(self.access_token.clone())
            .or_else(|| non_empty(env::var(&self.access_token_env).ok()))
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl WebhookConfig {
    /// Inline secret first, then the configured environment variable.
    pub fn resolve_secret(&self) -> Option<String> {
        non_empty(self.secret_key.clone()).or_else(|| non_empty(env::var(&self.secret_key_env).ok()))
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.duplicate_window_seconds)
    }

    pub fn max_event_age(&self) -> Duration {
        Duration::from_secs(self.max_event_age_seconds)
    }

    /// Parsed sweep interval; `None` leaves expiry to lookups only.
    pub fn sweep_every(&self) -> Result<Option<Duration>, humantime::DurationError> {
        self.sweep_interval
            .as_deref()
            .map(humantime::parse_duration)
            .transpose()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
