//! Supervisor for a PSGMII-attached multi-port switch fabric.
//!
//! Brings the fabric up, calibrates the serial link between the switch
//! MACs and the PHY package, and keeps the fabric healthy from then on:
//!
//! - [`calib`]: loopback traffic self-test with bounded retraining of the
//!   PSGMII interface — status bits are advisory, exact frame counts are
//!   the verdict
//! - [`vlan`]: derives VLAN-table entries and per-port destination masks
//!   from the VLAN/port model and pushes them atomically (software-level)
//! - [`link`]: edge-driven link supervision working around the
//!   queue-manager stale-frame erratum
//! - [`mib`]: wraparound-safe 64-bit accumulation of the hardware MIB
//!   counters
//! - [`switch`]: the context object tying it together — three independent
//!   locks, two periodic tasks, the management attribute surface
//!
//! All state is rebuilt from [`config::SwitchConfig`] on every
//! initialization; nothing survives a restart.

pub mod calib;
pub mod config;
pub mod error;
pub mod link;
pub mod mib;
pub mod switch;
pub mod task;
pub mod types;
pub mod vlan;

pub use config::{PlatformConfig, SwitchConfig};
pub use error::{SwitchError, SwitchResult};
pub use switch::EssSwitch;
