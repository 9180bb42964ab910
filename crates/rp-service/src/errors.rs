use crate::observability::ErrorCategory;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message shown to users for every failed identification.
pub const GENERIC_FAILURE_MESSAGE: &str = "Identity could not be verified";

/// Errors raised by the token-trust pipeline and the web layer.
///
/// Every variant is terminal for the current attempt. The carried strings
/// are for logs only; responses use fixed messages.
#[derive(Debug, Error)]
pub enum RpError {
    #[error("Key material unavailable: {0}")]
    KeyLoad(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Broker key resolution failed: {0}")]
    KeyResolution(String),

    #[error("Broker trust validation failed: {0}")]
    TrustValidation(String),

    #[error("ID token verification failed: {0}")]
    SignatureVerification(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Nonce does not match")]
    NonceMismatch,

    #[error("State does not match")]
    StateMismatch,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpError {
    /// Bounded metric label for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RpError::KeyLoad(_) | RpError::Signing(_) => ErrorCategory::KeyMaterial,
            RpError::Decryption(_) | RpError::SignatureVerification(_) => {
                ErrorCategory::Cryptographic
            }
            RpError::KeyResolution(_) | RpError::TrustValidation(_) => ErrorCategory::Trust,
            RpError::TokenExchange(_) => ErrorCategory::Broker,
            RpError::NonceMismatch | RpError::StateMismatch => ErrorCategory::Session,
            RpError::Configuration(_) | RpError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Broker key failures may indicate an attack and are logged at `error`.
    pub fn is_security_relevant(&self) -> bool {
        matches!(self, RpError::KeyResolution(_) | RpError::TrustValidation(_))
    }

    /// Log the error with its detail at the level its kind calls for.
    pub fn log(&self, context: &'static str) {
        if self.is_security_relevant() {
            tracing::error!(
                target: "rp.pipeline",
                context,
                category = self.category().as_str(),
                error = %self,
                "Identification failed"
            );
        } else {
            tracing::warn!(
                target: "rp.pipeline",
                context,
                category = self.category().as_str(),
                error = %self,
                "Identification failed"
            );
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for RpError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RpError::KeyLoad(_) | RpError::Signing(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "KEY_MATERIAL_ERROR",
                "An internal cryptographic error occurred",
            ),
            RpError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                "The service is not configured",
            ),
            RpError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred",
            ),
            RpError::KeyResolution(_) | RpError::TrustValidation(_) | RpError::TokenExchange(_) => (
                StatusCode::BAD_GATEWAY,
                "BROKER_ERROR",
                GENERIC_FAILURE_MESSAGE,
            ),
            RpError::Decryption(_)
            | RpError::SignatureVerification(_)
            | RpError::NonceMismatch
            | RpError::StateMismatch => (
                StatusCode::UNAUTHORIZED,
                "IDENTIFICATION_FAILED",
                GENERIC_FAILURE_MESSAGE,
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail { code, message },
        };

        (status, Json(error_response)).into_response()
    }
}
