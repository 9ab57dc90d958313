use thiserror::Error;

/// Result backend error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// An AMQP connection or channel operation failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A key-value store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// A state record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The result backend URL names a store this build does not provide.
    #[error("unsupported result backend URL: {0}")]
    UnsupportedUrl(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
