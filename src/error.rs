//! Error types and handling for flows
//!
//! Every failure raised while an activation runs is funnelled into
//! [`FlowError`] and delivered as that activation's terminal signal.

use std::fmt::Display;
use thiserror::Error;

/// Main error type for flow operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// The producer behavior failed (explicit error or panic)
    #[error("producer failed: {0}")]
    Producer(String),
    /// A transformation stage failed while processing a value
    #[error("operator `{stage}` failed: {message}")]
    Operator {
        stage: &'static str,
        message: String,
    },
    /// The activation was cancelled; not a failure
    #[error("activation cancelled")]
    Cancelled,
    /// The consumer side of a bridge queue has terminated
    #[error("channel closed: the consumer has terminated")]
    Closed,
    /// The API was used outside of its contract
    #[error("usage error: {0}")]
    Usage(String),
}

impl FlowError {
    /// Build a producer failure from anything printable.
    pub fn producer(message: impl Display) -> Self {
        FlowError::Producer(message.to_string())
    }

    pub fn operator(stage: &'static str, message: impl Display) -> Self {
        FlowError::Operator {
            stage,
            message: message.to_string(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        FlowError::Usage(message.into())
    }

    /// True for the cancellation signal, which is a terminal outcome rather than an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowError::Cancelled)
    }
}

impl From<tokio::task::JoinError> for FlowError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            FlowError::Cancelled
        } else {
            FlowError::Producer(format!("task panicked: {}", err))
        }
    }
}

/// Result type for flow operations
pub type FlowResult<T> = Result<T, FlowError>;
