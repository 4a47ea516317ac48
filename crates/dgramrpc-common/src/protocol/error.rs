use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Invalid envelope: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: Box<RpcError>,
    },

    #[error("Call cancelled")]
    Cancelled,

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("request already processed")]
    Duplicate,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RpcError {
    /// Returns `true` for failures a client may recover from by resending.
    ///
    /// Only transport-level conditions qualify. Anything the server answered,
    /// including ERROR and DUPLICATE, is a definitive outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_) | RpcError::Io(_) | RpcError::Timeout(_)
        )
    }
}

impl From<std::net::AddrParseError> for RpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        RpcError::InvalidAddress(err.to_string())
    }
}

/// Failure to extract a typed parameter from a [`Params`](super::Params) map.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("missing parameter '{0}'")]
    Missing(String),

    #[error("parameter '{name}' must be {expected}")]
    WrongType { name: String, expected: &'static str },
}

pub type Result<T> = std::result::Result<T, RpcError>;
