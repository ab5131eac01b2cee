#![allow(clippy::result_large_err)]

use super::{ConfigValidator, KommoConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "kommo.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/kommo.toml)
    /// Environment variables override config file values
    /// A missing file yields defaults + env vars
    pub fn load_from_workspace(workspace_path: &Path) -> Result<KommoConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        Self::load(&config_path)
    }

    /// Load from an explicit path with env overrides and validation applied.
    pub fn load(config_path: &Path) -> Result<KommoConfig, AppError> {
        let mut config = Self::load_from_file(config_path)?.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<KommoConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: KommoConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    /// Unparseable values are ignored and the file/default value is kept
    fn apply_env_overrides(config: &mut KommoConfig) {
        if let Ok(subdomain) = env::var("KOMMO_SUBDOMAIN") {
            config.credentials.subdomain = Some(subdomain);
        }

        if let Ok(base_url) = env::var("KOMMO_API_BASE_URL") {
            config.credentials.api_base_url = Some(base_url);
        }

        if let Some(timeout) = parsed_env::<u64>("KOMMO_TRANSPORT_TIMEOUT_SECONDS") {
            config.transport.timeout_seconds = timeout;
        }

        if let Ok(bind) = env::var("KOMMO_WEBHOOK_BIND") {
            config.webhook.bind = bind;
        }

        if let Some(flag) = parsed_env::<bool>("KOMMO_WEBHOOK_VALIDATE_SIGNATURE") {
            config.webhook.validate_signature = flag;
        }

        if let Some(flag) = parsed_env::<bool>("KOMMO_WEBHOOK_VALIDATE_TIMESTAMP") {
            config.webhook.validate_timestamp = flag;
        }

        if let Some(flag) = parsed_env::<bool>("KOMMO_WEBHOOK_PREVENT_DUPLICATES") {
            config.webhook.prevent_duplicates = flag;
        }

        if let Some(seconds) = parsed_env::<u64>("KOMMO_WEBHOOK_DUPLICATE_WINDOW_SECONDS") {
            config.webhook.duplicate_window_seconds = seconds;
        }

        if let Some(seconds) = parsed_env::<u64>("KOMMO_WEBHOOK_MAX_EVENT_AGE_SECONDS") {
            config.webhook.max_event_age_seconds = seconds;
        }

        if let Ok(events) = env::var("KOMMO_WEBHOOK_EVENTS") {
            config.webhook.events = events
                .split(',')
                .map(str::trim)
                .filter(|event| !event.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "KOMMO_SUBDOMAIN - Override the account subdomain",
            "KOMMO_API_BASE_URL - Override the full API base URL (sandboxes, tests)",
            "KOMMO_ACCESS_TOKEN - OAuth access token (name configurable via credentials.access_token_env)",
            "KOMMO_TRANSPORT_TIMEOUT_SECONDS - Override the per-request timeout (default: 30)",
            "KOMMO_WEBHOOK_SECRET - Webhook signing secret (name configurable via webhook.secret_key_env)",
            "KOMMO_WEBHOOK_BIND - Override the webhook listener address (default: 127.0.0.1:5680)",
            "KOMMO_WEBHOOK_VALIDATE_SIGNATURE - Toggle signature validation (true/false, default: true)",
            "KOMMO_WEBHOOK_VALIDATE_TIMESTAMP - Toggle timestamp validation (true/false, default: true)",
            "KOMMO_WEBHOOK_PREVENT_DUPLICATES - Toggle duplicate suppression (true/false, default: true)",
            "KOMMO_WEBHOOK_DUPLICATE_WINDOW_SECONDS - Duplicate window in seconds (default: 60)",
            "KOMMO_WEBHOOK_MAX_EVENT_AGE_SECONDS - Maximum event age in seconds (default: 300)",
            "KOMMO_WEBHOOK_EVENTS - Comma separated event allow-list (default: all events)",
        ]
    }
}

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse::<T>().ok())
}
