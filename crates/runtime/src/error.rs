use thiserror::Error;

/// Errors from model provider calls.
///
/// These pause the loop at the sending boundary; everything else in the
/// cycle degrades into structured transcript values instead of erroring.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// A network error occurred during the API call.
    #[error("network: {0}")]
    Network(String),

    /// The provider returned an error response.
    #[error("provider api: {0}")]
    Api(String),

    /// The provider response could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] store::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
