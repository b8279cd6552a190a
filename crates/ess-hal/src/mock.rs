//! Scripted in-memory HAL backend.
//!
//! [`MockHal`] is both the simulation backend for the daemon's `mock`
//! platform and the test double for every component test. It keeps a
//! register store per address space, serves reads from per-register script
//! queues before falling back to the store, records every mutation in
//! order, and emulates the vendor debug/MMD pair protocol so tests can
//! seed and inspect vendor registers directly instead of scripting the
//! four-write latch dance.
//!
//! The broadcast MDIO address (0x1f) is modeled as its own pseudo device:
//! broadcast writes are recorded and stored under 0x1f rather than fanned
//! out, which is sufficient because the supervisor only ever *writes*
//! through it.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::HalResult;
use crate::regs::{
    ATU_FUNC_BUSY, MIB_BUSY, MII_DBG_ADDR, MII_DBG_DATA, MII_MMD_ADDR, MII_MMD_DATA,
    MMD_DATA_LATCH, REG_ATU_FUNC, REG_MIB_FUNC, REG_VTU_FUNC1, VTU_FUNC1_BUSY,
};
use crate::Hal;

/// A recorded hardware mutation, in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Write to the switch-core window.
    EssWrite { reg: u32, val: u32 },
    /// Write to the PSGMII wrapper window.
    PsgmiiWrite { reg: u32, val: u32 },
    /// Raw clause-22 write (vendor pair protocol writes included).
    MdioWrite { phy: u8, reg: u16, val: u16 },
    /// Fabric reset asserted.
    ResetAssert,
    /// Fabric reset deasserted.
    ResetDeassert,
}

/// Per-PHY state of the vendor register-pair protocols.
#[derive(Debug, Default, Clone, Copy)]
struct PairState {
    dbg_sel: u16,
    mmd_sel: u16,
    mmd_reg: u16,
    mmd_latched: bool,
}

#[derive(Default)]
struct Inner {
    ess: HashMap<u32, u32>,
    psgmii: HashMap<u32, u32>,
    mdio: HashMap<(u8, u16), u16>,
    dbg: HashMap<(u8, u16), u16>,
    mmd: HashMap<(u8, u16, u16), u16>,

    ess_script: HashMap<u32, VecDeque<u32>>,
    psgmii_script: HashMap<u32, VecDeque<u32>>,
    mdio_script: HashMap<(u8, u16), VecDeque<u16>>,
    mmd_script: HashMap<(u8, u16, u16), VecDeque<u16>>,

    pair: HashMap<u8, PairState>,
    ops: Vec<Op>,
    reset_asserts: u32,
}

/// In-memory [`Hal`] with scripted reads and an ordered operation log.
#[derive(Default)]
pub struct MockHal {
    inner: Mutex<Inner>,
}

impl MockHal {
    /// Creates an empty mock; unseeded registers read as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a switch-core register.
    pub fn set_ess(&self, reg: u32, val: u32) {
        self.inner.lock().unwrap().ess.insert(reg, val);
    }

    /// Seeds a PSGMII wrapper register.
    pub fn set_psgmii(&self, reg: u32, val: u32) {
        self.inner.lock().unwrap().psgmii.insert(reg, val);
    }

    /// Seeds a clause-22 PHY register.
    pub fn set_mdio(&self, phy: u8, reg: u16, val: u16) {
        self.inner.lock().unwrap().mdio.insert((phy, reg), val);
    }

    /// Seeds a vendor debug register.
    pub fn set_dbg(&self, phy: u8, dbg_reg: u16, val: u16) {
        self.inner.lock().unwrap().dbg.insert((phy, dbg_reg), val);
    }

    /// Seeds a vendor MMD register.
    pub fn set_mmd(&self, phy: u8, mmd: u16, reg: u16, val: u16) {
        self.inner.lock().unwrap().mmd.insert((phy, mmd, reg), val);
    }

    /// Queues successive read values for a switch-core register; once the
    /// queue drains, reads fall back to the store.
    pub fn script_ess(&self, reg: u32, vals: impl IntoIterator<Item = u32>) {
        self.inner
            .lock()
            .unwrap()
            .ess_script
            .entry(reg)
            .or_default()
            .extend(vals);
    }

    /// Queues successive read values for a PSGMII register.
    pub fn script_psgmii(&self, reg: u32, vals: impl IntoIterator<Item = u32>) {
        self.inner
            .lock()
            .unwrap()
            .psgmii_script
            .entry(reg)
            .or_default()
            .extend(vals);
    }

    /// Queues successive read values for a clause-22 PHY register.
    pub fn script_mdio(&self, phy: u8, reg: u16, vals: impl IntoIterator<Item = u16>) {
        self.inner
            .lock()
            .unwrap()
            .mdio_script
            .entry((phy, reg))
            .or_default()
            .extend(vals);
    }

    /// Queues successive read values for a vendor MMD register.
    pub fn script_mmd(&self, phy: u8, mmd: u16, reg: u16, vals: impl IntoIterator<Item = u16>) {
        self.inner
            .lock()
            .unwrap()
            .mmd_script
            .entry((phy, mmd, reg))
            .or_default()
            .extend(vals);
    }

    /// Returns the recorded mutations in issue order.
    pub fn ops(&self) -> Vec<Op> {
        self.inner.lock().unwrap().ops.clone()
    }

    /// Drops the recorded mutations (read state is untouched).
    pub fn clear_ops(&self) {
        self.inner.lock().unwrap().ops.clear();
    }

    /// Number of reset assertions seen so far.
    pub fn reset_asserts(&self) -> u32 {
        self.inner.lock().unwrap().reset_asserts
    }

    /// Reads back a vendor MMD register without going through the pair
    /// protocol (inspection helper).
    pub fn mmd(&self, phy: u8, mmd: u16, reg: u16) -> u16 {
        *self
            .inner
            .lock()
            .unwrap()
            .mmd
            .get(&(phy, mmd, reg))
            .unwrap_or(&0)
    }

    /// Reads back a vendor debug register directly (inspection helper).
    pub fn dbg(&self, phy: u8, dbg_reg: u16) -> u16 {
        *self
            .inner
            .lock()
            .unwrap()
            .dbg
            .get(&(phy, dbg_reg))
            .unwrap_or(&0)
    }
}

impl Hal for MockHal {
    fn ess_read(&self, reg: u32) -> HalResult<u32> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(v) = inner.ess_script.get_mut(&reg).and_then(VecDeque::pop_front) {
            return Ok(v);
        }
        Ok(*inner.ess.get(&reg).unwrap_or(&0))
    }

    fn ess_write(&self, reg: u32, val: u32) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        // Function registers complete instantly in simulation: the
        // written busy bit never reads back. The op log keeps the raw
        // value. Seeding a stuck-busy value via `set_ess` still works
        // because it bypasses this path.
        let stored = match reg {
            REG_VTU_FUNC1 => val & !VTU_FUNC1_BUSY,
            REG_ATU_FUNC => val & !ATU_FUNC_BUSY,
            REG_MIB_FUNC => val & !MIB_BUSY,
            _ => val,
        };
        inner.ess.insert(reg, stored);
        inner.ops.push(Op::EssWrite { reg, val });
        Ok(())
    }

    fn psgmii_read(&self, reg: u32) -> HalResult<u32> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(v) = inner
            .psgmii_script
            .get_mut(&reg)
            .and_then(VecDeque::pop_front)
        {
            return Ok(v);
        }
        Ok(*inner.psgmii.get(&reg).unwrap_or(&0))
    }

    fn psgmii_write(&self, reg: u32, val: u32) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.psgmii.insert(reg, val);
        inner.ops.push(Op::PsgmiiWrite { reg, val });
        Ok(())
    }

    fn mdio_read(&self, phy: u8, reg: u16) -> HalResult<u16> {
        let mut inner = self.inner.lock().unwrap();
        match reg {
            MII_DBG_DATA => {
                let sel = inner.pair.entry(phy).or_default().dbg_sel;
                Ok(*inner.dbg.get(&(phy, sel)).unwrap_or(&0))
            }
            MII_MMD_DATA if inner.pair.get(&phy).is_some_and(|p| p.mmd_latched) => {
                let p = *inner.pair.get(&phy).unwrap();
                let key = (phy, p.mmd_sel, p.mmd_reg);
                if let Some(v) = inner.mmd_script.get_mut(&key).and_then(VecDeque::pop_front) {
                    return Ok(v);
                }
                Ok(*inner.mmd.get(&key).unwrap_or(&0))
            }
            _ => {
                if let Some(v) = inner
                    .mdio_script
                    .get_mut(&(phy, reg))
                    .and_then(VecDeque::pop_front)
                {
                    return Ok(v);
                }
                Ok(*inner.mdio.get(&(phy, reg)).unwrap_or(&0))
            }
        }
    }

    fn mdio_write(&self, phy: u8, reg: u16, val: u16) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(Op::MdioWrite { phy, reg, val });
        match reg {
            MII_DBG_ADDR => {
                inner.pair.entry(phy).or_default().dbg_sel = val;
            }
            MII_DBG_DATA => {
                let sel = inner.pair.entry(phy).or_default().dbg_sel;
                inner.dbg.insert((phy, sel), val);
            }
            MII_MMD_ADDR => {
                let pair = inner.pair.entry(phy).or_default();
                if val & MMD_DATA_LATCH != 0 {
                    pair.mmd_sel = val & !MMD_DATA_LATCH;
                    pair.mmd_latched = true;
                } else {
                    pair.mmd_sel = val;
                    pair.mmd_latched = false;
                }
            }
            MII_MMD_DATA => {
                let pair = *inner.pair.entry(phy).or_default();
                if pair.mmd_latched {
                    inner.mmd.insert((phy, pair.mmd_sel, pair.mmd_reg), val);
                } else {
                    inner.pair.entry(phy).or_default().mmd_reg = val;
                }
            }
            _ => {
                inner.mdio.insert((phy, reg), val);
            }
        }
        Ok(())
    }

    fn assert_ess_reset(&self) -> HalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.reset_asserts += 1;
        inner.ops.push(Op::ResetAssert);
        Ok(())
    }

    fn deassert_ess_reset(&self) -> HalResult<()> {
        self.inner.lock().unwrap().ops.push(Op::ResetDeassert);
        Ok(())
    }
}
