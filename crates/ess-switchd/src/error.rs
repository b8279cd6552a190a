//! Error types for supervisor operations.

use ess_hal::HalError;
use thiserror::Error;

/// Result type alias for supervisor operations.
pub type SwitchResult<T> = Result<T, SwitchError>;

/// Errors surfaced by the management plane and the bring-up sequence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwitchError {
    /// Port index outside the fabric.
    #[error("Invalid port {port}")]
    InvalidPort {
        /// The offending port index.
        port: usize,
    },

    /// VLAN table slot outside the table capacity.
    #[error("Invalid VLAN table slot {slot}")]
    InvalidVlanSlot {
        /// The offending slot index.
        slot: usize,
    },

    /// VLAN id outside 0..=4094.
    #[error("Invalid VLAN id {vid}")]
    InvalidVid {
        /// The offending id.
        vid: u32,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Register access layer failure.
    #[error(transparent)]
    Hal(#[from] HalError),
}

impl SwitchError {
    /// Creates a configuration validation error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SwitchError::InvalidPort { port: 9 }.to_string(), "Invalid port 9");
        assert_eq!(SwitchError::InvalidVid { vid: 5000 }.to_string(), "Invalid VLAN id 5000");
    }

    #[test]
    fn test_hal_error_is_transparent() {
        let err: SwitchError = HalError::unmapped("psgmii").into();
        assert_eq!(err.to_string(), "Register window 'psgmii' is not mapped");
    }
}
