use thiserror::Error;

/// Core error type for the ergates task queue.
///
/// Covers the argument-coercion failures a worker can hit while preparing a
/// dispatch, plus parse failures on persisted state strings. Transport and
/// backend layers carry their own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    /// The number of positional arguments does not match the task's
    /// parameter list. Variadic tasks report their fixed-parameter count.
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArgCount { expected: usize, got: usize },

    /// An argument could not be coerced to the task's declared parameter
    /// type at the given position.
    #[error("wrong argument type at position {position}: {reason}")]
    WrongArgType { position: usize, reason: String },

    /// An invalid task state string was encountered during parsing.
    #[error("invalid task state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
