use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// HTTP-facing error taxonomy shared by the vault services.
///
/// Domain variants carry a machine-readable `code` (e.g. `SCOPE_BROADEN`)
/// that is returned verbatim in the `error` field of the response body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error [{code}]: {message}")]
    Validation { code: String, message: String },

    #[error("Not found [{code}]: {message}")]
    NotFound { code: String, message: String },

    #[error("Precondition failed [{code}]: {message}")]
    PreconditionFailed { code: String, message: String },

    #[error("Forbidden [{code}]: {message}")]
    Forbidden { code: String, message: String },

    #[error("Internal fault [{code}]: {message}")]
    InternalFault { code: String, message: String },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn precondition_failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::PreconditionFailed {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Forbidden {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal_fault(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::InternalFault {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::InternalFault { .. }
            | AppError::InternalError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error, message, details) = match self {
            AppError::Validation { code, message }
            | AppError::NotFound { code, message }
            | AppError::PreconditionFailed { code, message }
            | AppError::Forbidden { code, message } => (code, message, None),
            AppError::InternalFault { code, message } => {
                tracing::error!(code = %code, "{}", message);
                (code, message, None)
            }
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal server error");
                (
                    "INTERNAL_ERROR".to_string(),
                    "Internal server error".to_string(),
                    Some(err.to_string()),
                )
            }
            AppError::ServiceUnavailable => (
                "SERVICE_UNAVAILABLE".to_string(),
                "Service unavailable".to_string(),
                None,
            ),
            AppError::ConfigError(err) => (
                "CONFIG_ERROR".to_string(),
                "Configuration error".to_string(),
                Some(err.to_string()),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error,
                message,
                details,
            }),
        )
            .into_response()
    }
}
