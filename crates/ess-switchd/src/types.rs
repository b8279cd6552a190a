//! Port-level types and the port/PHY translation table.

use std::fmt;

use ess_hal::regs;

/// Link speed as encoded in the two-bit MAC/PHY speed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    M10,
    M100,
    M1000,
}

impl Speed {
    /// Decodes the two-bit speed field shared by the MAC status register
    /// and the PHY-specific status register.
    pub fn from_field(field: u32) -> Option<Self> {
        match field {
            regs::PORT_SPEED_10M => Some(Speed::M10),
            regs::PORT_SPEED_100M => Some(Speed::M100),
            regs::PORT_SPEED_1000M => Some(Speed::M1000),
            _ => None,
        }
    }

    /// The field encoding for this speed.
    pub fn field(self) -> u32 {
        match self {
            Speed::M10 => regs::PORT_SPEED_10M,
            Speed::M100 => regs::PORT_SPEED_100M,
            Speed::M1000 => regs::PORT_SPEED_1000M,
        }
    }

    /// Megabits per second.
    pub fn mbps(self) -> u32 {
        match self {
            Speed::M10 => 10,
            Speed::M100 => 100,
            Speed::M1000 => 1000,
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Mb/s", self.mbps())
    }
}

/// Link duplex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    Half,
    Full,
}

/// Snapshot of one port's MAC-side link status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLink {
    pub link: bool,
    pub aneg: bool,
    pub duplex: Duplex,
    pub speed: Option<Speed>,
    pub tx_flow: bool,
    pub rx_flow: bool,
}

impl PortLink {
    /// Decodes a MAC port status register value.
    ///
    /// A CPU port in forced mode has no meaningful link bit; it is
    /// reported as always up.
    pub fn from_status(port: usize, status: u32) -> Self {
        let aneg = status & regs::PORT_AUTO_LINK_EN != 0;
        let link = if aneg || port != regs::CPU_PORT {
            status & regs::PORT_STATUS_LINK_UP != 0
        } else {
            true
        };
        if !link {
            return Self {
                link: false,
                aneg,
                duplex: Duplex::Half,
                speed: None,
                tx_flow: false,
                rx_flow: false,
            };
        }
        Self {
            link: true,
            aneg,
            duplex: if status & regs::PORT_DUPLEX != 0 {
                Duplex::Full
            } else {
                Duplex::Half
            },
            speed: Speed::from_field(status & regs::PORT_SPEED_MASK),
            tx_flow: status & regs::PORT_STATUS_TXFLOW != 0,
            rx_flow: status & regs::PORT_STATUS_RXFLOW != 0,
        }
    }
}

/// Snapshot of one PHY's negotiated state, decoded from the
/// PHY-specific status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyStatus {
    pub link: bool,
    pub duplex: Duplex,
    pub speed: Option<Speed>,
}

impl PhyStatus {
    /// Decodes the vendor PHY-specific status register.
    pub fn from_spec_status(val: u16) -> Self {
        Self {
            link: val & regs::PHY_SPEC_STATUS_LINK != 0,
            duplex: if val & regs::PHY_SPEC_STATUS_DUPLEX != 0 {
                Duplex::Full
            } else {
                Duplex::Half
            },
            speed: Speed::from_field(
                ((val & regs::PHY_SPEC_STATUS_SPEED_MASK) >> regs::PHY_SPEC_STATUS_SPEED_S) as u32,
            ),
        }
    }
}

/// MDIO address of the PHY serving `port`.
///
/// PHY addressing excludes the CPU port, so ports 1..=5 map to PHY
/// addresses 0..=4 and the CPU port has no PHY.
pub fn phy_addr(port: usize) -> Option<u8> {
    if (1..regs::NUM_PORTS).contains(&port) {
        Some((port - 1) as u8)
    } else {
        None
    }
}

/// The port served by PHY address `phy`.
pub fn port_of_phy(phy: u8) -> usize {
    phy as usize + 1
}

/// Iterates the port indices set in a member bitmask.
pub fn ports_in(mask: u32) -> impl Iterator<Item = usize> {
    (0..regs::NUM_PORTS).filter(move |p| mask & (1 << p) != 0)
}
