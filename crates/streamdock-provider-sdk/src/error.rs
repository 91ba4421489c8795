//! Provider error types.

/// Errors a provider may return from an operation.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The upstream site could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// The upstream response could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// The operation is not offered by this provider
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Custom(String),
}

/// Provider result type
pub type ProviderResult<T> = Result<T, ProviderError>;

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Parse(err.to_string())
    }
}
