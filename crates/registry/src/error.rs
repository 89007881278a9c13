use thiserror::Error;

/// Errors raised by a capability while executing.
///
/// These never cross the dispatch boundary: [`crate::Registry::execute`]
/// converts them into structured results the model can react to.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A capability unit that could not be loaded during discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read unit: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse unit: {0}")]
    Parse(String),

    #[error("unit declares no capabilities")]
    Empty,
}
