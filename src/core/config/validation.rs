#![allow(clippy::result_large_err)]

use super::KommoConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::webhook::EventType;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use url::Url;

const DUPLICATE_WINDOW_RANGE: RangeInclusive<u64> = 10..=300;
const MAX_EVENT_AGE_RANGE: RangeInclusive<u64> = 60..=3600;
const PAGE_LIMIT_RANGE: RangeInclusive<u32> = 1..=250;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &KommoConfig) -> Result<(), AppError> {
        if let Some(subdomain) = &config.credentials.subdomain {
            let valid = !subdomain.is_empty()
                && subdomain
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-');
            if !valid {
                return Err(invalid(format!(
                    "credentials.subdomain '{}' must be a bare DNS label",
                    subdomain
                )));
            }
        }

        if let Some(base_url) = &config.credentials.api_base_url {
            Url::parse(base_url).map_err(|err| {
                invalid(format!("credentials.api_base_url is not a URL: {}", err))
            })?;
        }

        if config.transport.timeout_seconds == 0 {
            return Err(invalid("transport.timeout_seconds must be greater than zero"));
        }

        if !PAGE_LIMIT_RANGE.contains(&config.transport.default_page_limit) {
            return Err(invalid(
                "transport.default_page_limit must be between 1 and 250",
            ));
        }

        let webhook = &config.webhook;
        webhook.bind.parse::<SocketAddr>().map_err(|err| {
            invalid(format!("webhook.bind '{}' is invalid: {}", webhook.bind, err))
        })?;

        if !webhook.path.starts_with('/') {
            return Err(invalid("webhook.path must start with '/'"));
        }

        if !DUPLICATE_WINDOW_RANGE.contains(&webhook.duplicate_window_seconds) {
            return Err(invalid(
                "webhook.duplicate_window_seconds must be between 10 and 300",
            ));
        }

        if !MAX_EVENT_AGE_RANGE.contains(&webhook.max_event_age_seconds) {
            return Err(invalid(
                "webhook.max_event_age_seconds must be between 60 and 3600",
            ));
        }

        for event in &webhook.events {
            event
                .parse::<EventType>()
                .map_err(|err| invalid(format!("webhook.events: {}", err)))?;
        }

        let sweep_every = webhook
            .sweep_every()
            .map_err(|err| invalid(format!("webhook.sweep_interval is invalid: {}", err)))?;
        if sweep_every.is_some_and(|every| every.is_zero()) {
            return Err(invalid("webhook.sweep_interval must be greater than zero"));
        }

        Ok(())
    }
}

fn invalid<T: Into<String>>(message: T) -> AppError {
    AppError::new(ErrorCategory::ConfigurationError, message)
}
