use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The CRM rejected field content; the description carries the per-field detail.
    ValidationError,
    /// Network failure, timeout or a non-2xx response without validation detail.
    TransportError,
    /// Webhook body does not have the expected shape.
    MalformedEventError,
    /// Missing or bad signature, stale timestamp.
    AuthenticityError,
    ConfigurationError,
    SerializationError,
    IoError,
    InternalError,
}

impl ErrorCategory {
    /// Stable error code used when the caller does not supply one.
    pub fn default_code(self) -> &'static str {
        match self {
            ErrorCategory::ValidationError => "KOMMO-VALIDATION",
            ErrorCategory::TransportError => "KOMMO-TRANSPORT",
            ErrorCategory::MalformedEventError => "KOMMO-WEBHOOK-MALFORMED",
            ErrorCategory::AuthenticityError => "KOMMO-WEBHOOK-AUTH",
            ErrorCategory::ConfigurationError => "KOMMO-CONFIG",
            ErrorCategory::SerializationError => "KOMMO-SERDE",
            ErrorCategory::IoError => "KOMMO-IO",
            ErrorCategory::InternalError => "KOMMO-INTERNAL",
        }
    }

    /// Whether the failure was caused by the caller's input rather than by this process.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorCategory::ValidationError
                | ErrorCategory::MalformedEventError
                | ErrorCategory::AuthenticityError
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}
