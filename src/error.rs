//! Error types shared by the registry, the backend clients and the HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error type
///
/// Probe failures are stored inside host snapshots, so every variant carries
/// owned, cloneable data rather than the underlying library error.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// A host was referenced that has no bound client
    #[error("Host not registered: {0}")]
    Configuration(String),

    /// Connection refused, DNS failure, timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from a backend
    #[error("Backend returned {status}: {body}")]
    Protocol { status: u16, body: String },

    /// Malformed response body
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The backend protocol has no equivalent for the requested operation
    #[error("Operation not supported by backend: {0}")]
    Unsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No online host serves model '{0}'")]
    NoRoute(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short machine-readable name used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "host_not_registered",
            AppError::Network(_) => "network_error",
            AppError::Protocol { .. } => "protocol_error",
            AppError::Decode(_) => "decode_error",
            AppError::Unsupported(_) => "unsupported",
            AppError::NotFound(_) => "not_found",
            AppError::NoRoute(_) => "no_route",
            AppError::Config(_) => "config_error",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NoRoute(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Network(_) | AppError::Protocol { .. } | AppError::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::Decode(err.to_string())
        } else if err.is_timeout() {
            AppError::Network(format!("request timed out: {}", err))
        } else {
            AppError::Network(err.to_string())
        }
    }
}

impl From<::config::ConfigError> for AppError {
    fn from(err: ::config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
            }
        });

        (status, Json(body)).into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
