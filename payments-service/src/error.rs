use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use thiserror::Error;
use uuid::Uuid;

/// Domain error taxonomy. Lookup and validation failures surface as 4xx,
/// wrapped vendor failures as 502 with the upstream message preserved.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("no active {provider} credential configured for app {app_id}")]
    ConfigNotFound { app_id: Uuid, provider: String },

    #[error("provider \"{0}\" not supported")]
    UnsupportedProvider(String),

    #[error("{0}")]
    UnsupportedVariant(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("payment not found for reference \"{0}\"")]
    PaymentNotFound(String),

    #[error("{provider} error: {message}")]
    Vendor { provider: String, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("app {0} not found")]
    AppNotFound(Uuid),

    #[error("API key missing")]
    ApiKeyMissing,

    #[error("invalid or inactive API key")]
    InvalidApiKey,

    #[error("authenticated app does not match the requested app")]
    AppMismatch,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl PlatformError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn vendor(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Vendor { provider: provider.into(), message: message.to_string() }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PlatformError::ConfigNotFound { .. } => "config_not_found",
            PlatformError::UnsupportedProvider(_) => "unsupported_provider",
            PlatformError::UnsupportedVariant(_) => "unsupported_variant",
            PlatformError::InvalidSignature => "invalid_signature",
            PlatformError::PaymentNotFound(_) => "payment_not_found",
            PlatformError::Vendor { .. } => "vendor_error",
            PlatformError::Validation(_) => "validation_error",
            PlatformError::AppNotFound(_) => "app_not_found",
            PlatformError::ApiKeyMissing => "api_key_missing",
            PlatformError::InvalidApiKey => "invalid_api_key",
            PlatformError::AppMismatch => "app_mismatch",
            PlatformError::Storage(_) => "internal_error",
        }
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = self.to_string();
        let api = match &self {
            PlatformError::ConfigNotFound { .. }
            | PlatformError::UnsupportedProvider(_)
            | PlatformError::UnsupportedVariant(_)
            | PlatformError::Validation(_) => ApiError::bad_request(code, message),
            PlatformError::InvalidSignature | PlatformError::ApiKeyMissing => {
                ApiError::unauthorized(code, message)
            }
            PlatformError::InvalidApiKey | PlatformError::AppMismatch => {
                ApiError::forbidden(code, message)
            }
            PlatformError::PaymentNotFound(_) | PlatformError::AppNotFound(_) => {
                ApiError::not_found(code, message)
            }
            PlatformError::Vendor { .. } => ApiError::bad_gateway(code, message),
            PlatformError::Storage(err) => {
                tracing::error!(error = %err, "storage failure");
                ApiError::internal("internal error")
            }
        };
        api.into_response()
    }
}
