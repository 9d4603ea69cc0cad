// Service error taxonomy for the refinement pipeline

use std::time::Duration;
use thiserror::Error;

/// Errors raised by external collaborators (model providers, the styled
/// document, the capture pipeline) and by response parsing.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("render capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("failed to apply styles to document: {0}")]
    DocumentApply(String),
}

/// Whether re-attempting the same operation could plausibly succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

impl ServiceError {
    /// Standard classification: transient server-side conditions are
    /// retryable, everything else is fatal. Retrying a malformed response
    /// will not change a model's formatting choice.
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::Network(_)
            | ServiceError::Timeout(_)
            | ServiceError::RateLimited(_)
            | ServiceError::Overloaded(_) => ErrorClass::Retryable,
            ServiceError::Auth(_)
            | ServiceError::BadRequest(_)
            | ServiceError::MalformedResponse(_)
            | ServiceError::CaptureUnavailable(_)
            | ServiceError::DocumentApply(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}
