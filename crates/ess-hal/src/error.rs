//! Error types for register access layer operations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use thiserror::Error;

/// Result type alias for HAL operations.
pub type HalResult<T> = Result<T, HalError>;

/// Errors that can occur while talking to the switch hardware.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HalError {
    /// A bounded register poll exhausted its retry budget.
    #[error("Timeout waiting for reg {reg:#x}: {last:#x} & {mask:#x} != {want:#x}")]
    Timeout {
        /// The register that was polled.
        reg: u32,
        /// The bits that were checked.
        mask: u32,
        /// The value the masked bits were expected to reach.
        want: u32,
        /// The last value observed before giving up.
        last: u32,
    },

    /// A bus-level transaction failed (MMIO access fault, MDIO ioctl error).
    #[error("Bus failure during {op}: {detail}")]
    Bus {
        /// The operation that failed (e.g. "mdio_read", "mmap").
        op: String,
        /// Error detail from the transport.
        detail: String,
    },

    /// A register window is not mapped on this backend.
    #[error("Register window '{window}' is not mapped")]
    Unmapped {
        /// The window name ("switch", "psgmii").
        window: String,
    },

    /// MDIO address outside the bus range (0..=31).
    #[error("Invalid PHY address {phy}")]
    InvalidPhy {
        /// The offending address.
        phy: u8,
    },
}

impl HalError {
    /// Creates a bus failure error.
    pub fn bus(op: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Bus {
            op: op.into(),
            detail: detail.into(),
        }
    }

    /// Creates an unmapped-window error.
    pub fn unmapped(window: impl Into<String>) -> Self {
        Self::Unmapped {
            window: window.into(),
        }
    }

    /// Returns true if this error is a poll timeout.
    ///
    /// Callers use this to distinguish "hardware is slow or miscalibrated"
    /// (sometimes tolerable, see the calibration engine) from hard bus faults.
    pub fn is_timeout(&self) -> bool {
        matches!(self, HalError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = HalError::Timeout {
            reg: 0x614,
            mask: 0x8000_0000,
            want: 0,
            last: 0x8000_0000,
        };
        assert!(err.to_string().contains("0x614"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_bus_display() {
        let err = HalError::bus("mdio_read", "ioctl failed: EINVAL");
        assert_eq!(
            err.to_string(),
            "Bus failure during mdio_read: ioctl failed: EINVAL"
        );
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_unmapped_display() {
        let err = HalError::unmapped("psgmii");
        assert_eq!(err.to_string(), "Register window 'psgmii' is not mapped");
    }
}
