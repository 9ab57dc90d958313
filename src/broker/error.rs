use thiserror::Error;

/// Transport layer error type.
///
/// The split between `Transport` and `Protocol` carries the retry signal:
/// connection-level faults are worth handing back to the consume harness
/// for another attempt, while protocol or configuration faults will fail
/// the same way every time.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BrokerError {
    /// A connection-level fault (dial, channel, mid-consume stream, ack).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol or configuration fault (declare, QoS, consume setup).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The signature could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The broker URL names a transport this build does not provide.
    #[error("unsupported broker URL: {0}")]
    UnsupportedUrl(String),
}

impl BrokerError {
    /// Returns true when the surrounding harness should retry consuming.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
