use thiserror::Error;

/// Errors surfaced by the external provider boundaries (speech-to-text,
/// generative text, synthesis).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network-level failure reaching the provider.
    #[error("network error: {0}")]
    Network(String),

    /// Provider answered with a non-success HTTP status that may clear up
    /// on retry (timeout, rate limit, server error).
    #[error("provider returned status {code}: {message}")]
    Status { code: u16, message: String },

    /// The stream or payload violated the expected framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The request was rejected and will never succeed as-is
    /// (authentication failure, malformed request).
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Classifies an HTTP status into a retryable or permanent fault.
    /// 408 and 429 are transient despite being 4xx; every other 4xx is a
    /// request defect that retrying cannot fix.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            408 | 429 => Self::Status { code, message },
            400..=499 => Self::Rejected(format!("status {code}: {message}")),
            _ => Self::Status { code, message },
        }
    }

    /// Whether retrying the same request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Fatal failure of the transport leg. Always ends the session.
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);
