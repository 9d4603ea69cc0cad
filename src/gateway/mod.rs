// Model service gateway
//
// Abstraction over text/image generation providers. A gateway sends one
// structured multi-part request and returns raw text; it knows nothing
// about CSS semantics. Provider choice is a configuration concern handled
// by the factory, not by the refinement pipeline.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::errors::ServiceError;
use crate::session::SessionToken;

pub mod claude;
pub mod factory;
pub mod gemini;

pub use claude::ClaudeGateway;
pub use factory::create_gateway;
pub use gemini::GeminiGateway;

/// One part of a multi-part request: prompt text or a base64 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    Text(String),
    Image { media_type: String, data: String },
}

impl RequestPart {
    pub fn text(text: impl Into<String>) -> Self {
        RequestPart::Text(text.into())
    }

    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        RequestPart::Image {
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// Trait for model service providers.
///
/// Each call is stateless with respect to the provider: the caller supplies
/// a fresh session token per attempt and no conversation history is ever
/// sent or retained.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send a single-turn request and return the raw response text.
    async fn send(
        &self,
        session: &SessionToken,
        system: &str,
        parts: &[RequestPart],
    ) -> Result<String, ServiceError>;

    /// Provider name (e.g. "claude", "gemini").
    fn name(&self) -> &str;

    /// Default model for this provider.
    fn default_model(&self) -> &str;
}

/// Map an HTTP error status to the service error taxonomy. Shared by all
/// providers; the retry policy keys its transient/fatal split on these
/// variants rather than on message content.
pub(crate) fn error_for_status(status: StatusCode, body: String) -> ServiceError {
    match status.as_u16() {
        401 | 403 => ServiceError::Auth(body),
        429 => ServiceError::RateLimited(body),
        400 | 404 | 422 => ServiceError::BadRequest(body),
        500 | 502 | 503 | 529 => ServiceError::Overloaded(body),
        _ => ServiceError::Network(format!("unexpected status {status}: {body}")),
    }
}

/// Map a transport-level reqwest error, distinguishing timeouts so the
/// retry policy can treat them as transient.
pub(crate) fn transport_error(err: reqwest::Error, timeout: std::time::Duration) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout(timeout)
    } else {
        ServiceError::Network(err.to_string())
    }
}
