//! The register access layer trait.
//!
//! [`Hal`] is the single seam between the supervisor logic and the silicon:
//! word access to the two MMIO windows, clause-22 MDIO, and the fabric reset
//! line. The vendor debug and MMD register pairs are provided methods built
//! from the MDIO primitives, so every backend (hardware or mock) gets them
//! for free and the mock's operation log records the primitive sequence the
//! hardware would see.
//!
//! The layer guarantees atomicity of a single read or write only. Callers
//! hold the appropriate coarse lock around multi-register sequences; the
//! debug/MMD pairs in particular must not be interleaved by two callers.

use crate::error::HalResult;
use crate::regs;

/// Register access layer over the switch hardware.
pub trait Hal: Send + Sync {
    /// Reads a 32-bit word from the switch-core window.
    fn ess_read(&self, reg: u32) -> HalResult<u32>;

    /// Writes a 32-bit word to the switch-core window.
    fn ess_write(&self, reg: u32, val: u32) -> HalResult<()>;

    /// Reads a 32-bit word from the PSGMII wrapper window.
    fn psgmii_read(&self, reg: u32) -> HalResult<u32>;

    /// Writes a 32-bit word to the PSGMII wrapper window.
    fn psgmii_write(&self, reg: u32, val: u32) -> HalResult<()>;

    /// Reads a clause-22 PHY register.
    fn mdio_read(&self, phy: u8, reg: u16) -> HalResult<u16>;

    /// Writes a clause-22 PHY register.
    fn mdio_write(&self, phy: u8, reg: u16, val: u16) -> HalResult<()>;

    /// Asserts the fabric reset line. Settle delays are the caller's job.
    fn assert_ess_reset(&self) -> HalResult<()>;

    /// Deasserts the fabric reset line.
    fn deassert_ess_reset(&self) -> HalResult<()>;

    /// Read-modify-write on a switch-core register: clears `clear`, sets
    /// `set`, returns the value written back.
    fn ess_rmw(&self, reg: u32, clear: u32, set: u32) -> HalResult<u32> {
        let mut val = self.ess_read(reg)?;
        val &= !clear;
        val |= set;
        self.ess_write(reg, val)?;
        Ok(val)
    }

    /// Reads a vendor debug register through the address/data pair.
    fn phy_dbg_read(&self, phy: u8, dbg_reg: u16) -> HalResult<u16> {
        self.mdio_write(phy, regs::MII_DBG_ADDR, dbg_reg)?;
        self.mdio_read(phy, regs::MII_DBG_DATA)
    }

    /// Writes a vendor debug register through the address/data pair.
    fn phy_dbg_write(&self, phy: u8, dbg_reg: u16, val: u16) -> HalResult<()> {
        self.mdio_write(phy, regs::MII_DBG_ADDR, dbg_reg)?;
        self.mdio_write(phy, regs::MII_DBG_DATA, val)
    }

    /// Reads a vendor MMD (extended) register.
    fn phy_mmd_read(&self, phy: u8, mmd: u16, reg: u16) -> HalResult<u16> {
        self.mdio_write(phy, regs::MII_MMD_ADDR, mmd)?;
        self.mdio_write(phy, regs::MII_MMD_DATA, reg)?;
        self.mdio_write(phy, regs::MII_MMD_ADDR, regs::MMD_DATA_LATCH | mmd)?;
        self.mdio_read(phy, regs::MII_MMD_DATA)
    }

    /// Writes a vendor MMD (extended) register.
    fn phy_mmd_write(&self, phy: u8, mmd: u16, reg: u16, val: u16) -> HalResult<()> {
        self.mdio_write(phy, regs::MII_MMD_ADDR, mmd)?;
        self.mdio_write(phy, regs::MII_MMD_DATA, reg)?;
        self.mdio_write(phy, regs::MII_MMD_ADDR, regs::MMD_DATA_LATCH | mmd)?;
        self.mdio_write(phy, regs::MII_MMD_DATA, val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockHal, Op};

    #[test]
    fn test_rmw_clears_then_sets() {
        let hal = MockHal::new();
        hal.set_ess(0x660, 0x0000_00ff);

        let val = hal.ess_rmw(0x660, 0x0f, 0x100).unwrap();
        assert_eq!(val, 0x0000_01f0);
        assert_eq!(hal.ess_read(0x660).unwrap(), 0x0000_01f0);
    }

    #[test]
    fn test_mmd_write_emits_latch_sequence() {
        let hal = MockHal::new();
        hal.phy_mmd_write(3, regs::MMD_AN, regs::MMD_AN_GEN_CTRL, regs::GEN_CTRL_START)
            .unwrap();

        let ops = hal.ops();
        assert_eq!(
            ops,
            vec![
                Op::MdioWrite { phy: 3, reg: regs::MII_MMD_ADDR, val: regs::MMD_AN },
                Op::MdioWrite { phy: 3, reg: regs::MII_MMD_DATA, val: regs::MMD_AN_GEN_CTRL },
                Op::MdioWrite {
                    phy: 3,
                    reg: regs::MII_MMD_ADDR,
                    val: regs::MMD_DATA_LATCH | regs::MMD_AN,
                },
                Op::MdioWrite { phy: 3, reg: regs::MII_MMD_DATA, val: regs::GEN_CTRL_START },
            ]
        );
    }

    #[test]
    fn test_dbg_pair_round_trip() {
        let hal = MockHal::new();
        hal.phy_dbg_write(0, regs::PHY_DEBUG_0, regs::PHY_MANU_CTRL_EN)
            .unwrap();
        let val = hal.phy_dbg_read(0, regs::PHY_DEBUG_0).unwrap();
        assert_eq!(val, regs::PHY_MANU_CTRL_EN);
    }
}
