use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Alert delivery error: {0}")]
    AlertDelivery(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RoutingError {
    /// Whether a caller may retry the same unit of work
    pub fn is_transient(&self) -> bool {
        matches!(self, RoutingError::Storage(_) | RoutingError::AlertDelivery(_))
    }
}

pub type RoutingResult<T> = Result<T, RoutingError>;
