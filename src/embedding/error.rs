//! Error taxonomy for the embedding pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    /// A required setting or credential is missing. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// Every load path failed for `model_id`. The cache does not retry; asking
    /// again starts a fresh load.
    #[error("failed to load model {model_id}: {reason}")]
    ModelLoad { model_id: String, reason: String },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    /// Rate limiting, connectivity failure and timeouts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimit(_) | Self::Connection(_) | Self::Timeout(_)
        )
    }

    /// Short category name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::RateLimit(_) => "rate_limit",
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::ModelLoad { .. } => "model_load",
            Self::Inference(_) => "inference",
            Self::InvalidInput(_) => "invalid_input",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
        }
    }
}

impl From<tokio::task::JoinError> for EmbedError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Inference(format!("embedding task failed: {e}"))
    }
}

pub type EmbedResult<T> = std::result::Result<T, EmbedError>;
