//! Error types for zonewise
//!
//! This module defines the error taxonomy shared by the placement engine and
//! the admin tooling. Poor spread is never an error: it is reported as a
//! `PlacementPolicyAdherence::Fail` value by the evaluators.

use thiserror::Error;

/// Common result type for zonewise operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for zonewise
#[derive(Debug, Error)]
pub enum Error {
    // Argument errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("division by zero: {0}")]
    DivisionByZero(&'static str),

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    // Format errors
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),

    #[error("invalid domain path: {0:?}")]
    InvalidDomainPath(String),

    // Placement errors
    #[error("not enough nodes for ensemble: have {available}, need {required}")]
    NotEnoughNodes { available: usize, required: usize },

    #[error("unable to resolve fault domain for {0}")]
    UnresolvedAddress(String),

    // Lifecycle errors
    #[error("placement policy has been uninitialized")]
    PolicyClosed,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if the caller may retry once cluster membership changes
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotEnoughNodes { .. })
    }

    /// Check if this error was caused by a malformed request
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::DivisionByZero(_)
                | Self::MissingArgument(_)
                | Self::InvalidNodeId(_)
                | Self::InvalidDomainPath(_)
        )
    }
}
