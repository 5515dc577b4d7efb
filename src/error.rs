use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    /// Incompatible configuration detected at option-setting time.
    #[error("usage error: {0}")]
    Usage(String),

    /// Malformed input graph reached the writer.
    #[error("invalid input data: {0}")]
    Data(String),

    /// A stream could not be decoded or re-encoded even after the raw retry.
    #[error("error while getting stream data for {id} 0: {message}")]
    Stream { id: u32, message: String },

    /// Broken internal invariant (padding mismatch, popper out of order,
    /// negative new object id). No output is usable.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WriteResult<T> = Result<T, WriteError>;

impl WriteError {
    pub fn usage(msg: impl Into<String>) -> Self {
        WriteError::Usage(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        WriteError::Data(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        WriteError::Internal(msg.into())
    }
}
