//! Error types for the strategy engine

use message_sink::SinkError;
use thiserror::Error;
use torq_types::{SignalValidationError, StrategyState};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Strategy '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Strategy '{0}' not found")]
    NotFound(String),

    #[error("Strategy '{0}' is disabled")]
    Disabled(String),

    #[error("Strategy '{id}' cannot {operation} from state {state}")]
    InvalidState {
        id: String,
        operation: &'static str,
        state: StrategyState,
    },

    #[error("Lifecycle hook failed for '{id}': {message}")]
    Lifecycle { id: String, message: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid signal: {0}")]
    InvalidSignal(#[from] SignalValidationError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Engine setup error: {message}")]
    Setup { message: String },
}

impl EngineError {
    pub fn setup(err: impl std::fmt::Display) -> Self {
        EngineError::Setup {
            message: format!("{:#}", err),
        }
    }
}

/// Strategy configuration failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Every violation found, in check order
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Configuration '{0}' not found")]
    NotFound(String),
}

impl ConfigurationError {
    pub fn violations(&self) -> &[String] {
        match self {
            ConfigurationError::Invalid(v) => v,
            ConfigurationError::NotFound(_) => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_lists_every_violation() {
        let err = ConfigurationError::Invalid(vec![
            "missing required parameter 'rsi_period'".to_string(),
            "quantity must be positive".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("rsi_period"));
        assert!(text.contains("quantity must be positive"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn test_invalid_state_display() {
        let err = EngineError::InvalidState {
            id: "s1".to_string(),
            operation: "stop",
            state: StrategyState::Error,
        };
        assert_eq!(err.to_string(), "Strategy 's1' cannot stop from state ERROR");
    }
}
