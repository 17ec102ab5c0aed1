//! Error taxonomy shared by every service and adapter.

use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, SdkError};
use serde::Serialize;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad credentials or an unusable token. The message never says which field was wrong.
    #[error("authentication failed")]
    Authentication,

    /// Authenticated, but the role does not allow the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing or malformed input, detected before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid playlist url: {0}")]
    InvalidPlaylistUrl(String),

    #[error("invalid video duration: {0}")]
    InvalidDuration(String),

    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    /// Store or third-party API unreachable or erroring. Callers may retry.
    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound(entity, id.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authentication => 401,
            Self::Forbidden(_) => 403,
            Self::Validation(_) | Self::InvalidPlaylistUrl(_) | Self::InvalidDuration(_) => 400,
            Self::NotFound(..) => 404,
            Self::ExternalService(_) => 502,
            Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication => "AuthenticationFailure",
            Self::Forbidden(_) => "Forbidden",
            Self::Validation(_) => "ValidationFailure",
            Self::InvalidPlaylistUrl(_) => "InvalidPlaylistUrl",
            Self::InvalidDuration(_) => "InvalidDuration",
            Self::NotFound(..) => "NotFoundFailure",
            Self::ExternalService(_) => "ExternalServiceFailure",
            Self::Config(_) => "ConfigurationFailure",
            Self::Internal(_) => "InternalFailure",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService(_))
    }

    /// Body sent to the client. Internal details of external failures stay in the logs.
    pub fn to_error_response(&self) -> ErrorResponse {
        let message = match self {
            Self::ExternalService(_) => {
                "A backing service is unavailable. Please try again.".to_string()
            }
            Self::Config(_) => "The service is misconfigured.".to_string(),
            Self::Internal(_) => "Something went wrong.".to_string(),
            other => other.to_string(),
        };
        ErrorResponse {
            error: self.kind().to_string(),
            message,
            retryable: self.is_retryable(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}

impl<E, R> From<SdkError<E, R>> for AppError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        Self::ExternalService(DisplayErrorContext(&err).to_string())
    }
}

impl From<BuildError> for AppError {
    fn from(err: BuildError) -> Self {
        Self::ExternalService(format!("failed to build request: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::ExternalService(format!("video platform request failed: {}", err))
    }
}
