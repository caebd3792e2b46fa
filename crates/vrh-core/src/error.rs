//! Error types for VRH operations
//!
//! Every failure aborts the whole operation; the ledger rolls back any partial
//! state. Reason strings are part of the observable contract.

use serde::Serialize;
use thiserror::Error;

use crate::types::Address;

/// Result type alias for VRH operations
pub type Result<T> = std::result::Result<T, DaoError>;

/// Errors that can occur in VRH operations
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DaoError {
    // === Authorization ===
    /// Caller does not hold the required role
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // === State preconditions ===
    /// A state precondition was violated
    #[error("{0}")]
    PreconditionFailed(String),

    /// Guild does not exist
    #[error("Unknown guild: {0}")]
    UnknownGuild(Address),

    /// Guild type does not exist
    #[error("Unknown guild type: {0}")]
    UnknownType(u32),

    // === Bounds ===
    /// Mint would exceed the available supply
    #[error("exceeds allowable mint amount: requested {requested}, available {available}")]
    ExceedsAllowance { requested: u128, available: u128 },

    /// Arithmetic overflow
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    // === Configuration ===
    /// Invalid protocol configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DaoError {
    /// Build a precondition failure from a reason string
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed(reason.into())
    }

    /// Build an authorization failure from a reason string
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::Unauthorized(_) => 1001,
            Self::PreconditionFailed(_) => 1002,
            Self::UnknownGuild(_) | Self::UnknownType(_) => 1003,
            Self::ExceedsAllowance { .. } => 1004,
            Self::Overflow(_) => 1005,
            Self::InvalidConfig(_) => 1006,
        }
    }

    /// The contract-level reason string
    pub fn reason(&self) -> String {
        match self {
            Self::Unauthorized(reason) | Self::PreconditionFailed(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Fail with `PreconditionFailed(reason)` unless `cond` holds
pub fn ensure(cond: bool, reason: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(DaoError::precondition(reason))
    }
}
