use std::io::Error as IoError;

use actix_web::http::StatusCode;
use actix_web::http::header::{self, HeaderValue};
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use watchup_service::gate::GateError;
use watchup_service::registry::RegistryError;

/// Startup failures
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("{0:#}")]
    Setup(#[from] anyhow::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] watchup_service::config::Error),
}

/// Request failures, rendered as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Monitor not found")]
    NotFound,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Message safe to show to callers; store failures are logged, not echoed
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Gate(GateError::Store(_))
            | ApiError::Registry(RegistryError::Store(_))
            | ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Gate(GateError::MissingCredentials | GateError::InvalidCredentials) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Gate(GateError::Forbidden) => StatusCode::FORBIDDEN,
            ApiError::Gate(GateError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Registry(RegistryError::MissingUrl | RegistryError::InvalidUrl(_))
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Gate(GateError::Store(_))
            | ApiError::Registry(RegistryError::Store(_))
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {self:#}");
        }

        let mut response = HttpResponse::build(status);
        if let ApiError::Gate(GateError::RateLimited { retry_after_secs }) = self {
            response.insert_header((header::RETRY_AFTER, HeaderValue::from(*retry_after_secs)));
        }
        response.json(json!({ "error": self.public_message() }))
    }
}
