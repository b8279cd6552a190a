//! Register access layer for the ESS switch fabric.
//!
//! This crate is the hardware boundary of the switch supervisor:
//!
//! - [`Hal`]: the access trait — two MMIO windows (switch core, PSGMII
//!   wrapper), clause-22 MDIO, vendor debug/MMD register pairs, and the
//!   fabric reset line
//! - [`regs`]: the complete register map as named constants
//! - [`poll`]: bounded polling with explicit attempt budgets
//! - [`mock`]: scripted in-memory backend used by tests and the daemon's
//!   simulation mode
//! - [`mmio`]: the physical backend (`/dev/mem` + MII ioctls)
//!
//! The layer guarantees atomicity of single word accesses only; callers
//! serialize multi-register sequences with their own locks.

pub mod bus;
pub mod error;
pub mod mmio;
pub mod mock;
pub mod poll;
pub mod regs;

pub use bus::Hal;
pub use error::{HalError, HalResult};
pub use poll::{poll_until, wait_reg, PollStatus};
