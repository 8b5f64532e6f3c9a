#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Rejected before any request was made.
    #[error("{0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(String),

    /// Backend answered with a failure; the message is shown verbatim.
    #[error("{0}")]
    Backend(String),

    #[error("download not found: {0}")]
    NotFound(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
