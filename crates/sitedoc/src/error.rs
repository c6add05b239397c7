//! Error types for the document service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing request parameters
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing file, sidecar or split output
    #[error("Not found: {0}")]
    NotFound(String),

    /// AI API or external process failure
    #[error("External service error: {0}")]
    ExternalService(String),

    /// External process or request exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Malformed AI output where structured data was required
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request body over the configured limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// DOCX/ZIP container error
    #[error("Archive error: {0}")]
    Archive(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an external service error
    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalService(message.into())
    }

    /// Create an archive error
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ExternalService(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Archive(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::ExternalService(_) => "external_service_error",
            Error::Timeout(_) => "timeout",
            Error::Parse(_) => "parse_error",
            Error::PayloadTooLarge(_) => "payload_too_large",
            Error::Archive(_) => "archive_error",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Http(_) => "http_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::Archive(other.to_string()),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Archive(format!("malformed document XML: {}", err))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Error::Validation(msg)
            | Error::NotFound(msg)
            | Error::ExternalService(msg)
            | Error::Timeout(msg)
            | Error::Parse(msg)
            | Error::PayloadTooLarge(msg)
            | Error::Archive(msg)
            | Error::Config(msg)
            | Error::Internal(msg) => msg.clone(),
            Error::Io(err) => err.to_string(),
            Error::Json(err) => err.to_string(),
            Error::Http(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("{} ({}): {}", status, self.kind(), message);
        }

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::external("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Error::Timeout("x".into()).status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_zip_io_error_stays_io() {
        let err: Error = zip::result::ZipError::Io(std::io::Error::other("disk")).into();
        assert!(matches!(err, Error::Io(_)));

        let err: Error = zip::result::ZipError::InvalidArchive("bad".into()).into();
        assert!(matches!(err, Error::Archive(_)));
    }
}
