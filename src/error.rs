use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AvrError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A configuration problem that ends the session. Nothing was opened
    /// or kept when this is returned.
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl AvrError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AvrError::Fatal(_))
    }
}

pub type AvrResult<T> = std::result::Result<T, AvrError>;
