//! Register map for the ESS switch core, the PSGMII wrapper, and the
//! PHY management (MDIO) plane.
//!
//! Three address spaces:
//!
//! - switch-core MMIO window (`REG_*`, `reg_*` per-port helpers)
//! - PSGMII wrapper MMIO window (`PSGMII_*`)
//! - MDIO plane: clause-22 registers plus the vendor debug/MMD register
//!   pairs (`MII_*`, `DBG_*`, `MMD*`)

/// Total ports on the fabric, CPU port included.
pub const NUM_PORTS: usize = 6;
/// PHY-attached ports (everything but the CPU port).
pub const NUM_PHYS: usize = 5;
/// The host-facing CPU port.
pub const CPU_PORT: usize = 0;
/// Member mask covering all six ports.
pub const PORTS_ALL: u32 = 0x3f;

/// VLAN translation table capacity.
pub const MAX_VLANS: usize = 128;
/// Highest programmable VLAN id.
pub const MAX_VID: u16 = 4094;

// ---------------------------------------------------------------------------
// Switch-core window
// ---------------------------------------------------------------------------

/// Module enable register.
pub const REG_MODULE_EN: u32 = 0x030;
pub const MODULE_EN_MIB: u32 = 1 << 0;

/// MIB function/status register.
pub const REG_MIB_FUNC: u32 = 0x034;
pub const MIB_FUNC_MASK: u32 = 0x7 << 24;
pub const MIB_FUNC_S: u32 = 24;
pub const MIB_BUSY: u32 = 1 << 17;
/// MIB function field values.
pub const MIB_FUNC_NO_OP: u32 = 0;
pub const MIB_FUNC_FLUSH: u32 = 1;
pub const MIB_FUNC_CAPTURE: u32 = 3;

/// Global maximum frame size.
pub const REG_MAX_FRAME_SIZE: u32 = 0x078;
pub const MAX_FRAME_SIZE_MTU: u32 = 0x3fff;

/// Per-port MAC status/control register.
pub const fn reg_port_status(port: usize) -> u32 {
    0x07c + 0x4 * port as u32
}
pub const PORT_SPEED_MASK: u32 = 0x3;
pub const PORT_SPEED_10M: u32 = 0;
pub const PORT_SPEED_100M: u32 = 1;
pub const PORT_SPEED_1000M: u32 = 2;
pub const PORT_TX_EN: u32 = 1 << 2;
pub const PORT_RX_EN: u32 = 1 << 3;
pub const PORT_STATUS_TXFLOW: u32 = 1 << 4;
pub const PORT_STATUS_RXFLOW: u32 = 1 << 5;
pub const PORT_DUPLEX: u32 = 1 << 6;
pub const PORT_TXHALF_FLOW: u32 = 1 << 7;
pub const PORT_STATUS_LINK_UP: u32 = 1 << 8;
/// MAC follows the PHY link automatically while set.
pub const PORT_AUTO_LINK_EN: u32 = 1 << 9;

/// Per-port header control.
pub const fn reg_port_header(port: usize) -> u32 {
    0x09c + 0x4 * port as u32
}

/// Energy-efficient-ethernet control.
pub const REG_EEE_CTRL: u32 = 0x100;

/// Per-port VLAN0 register: default ingress VLAN ids.
pub const fn reg_port_vlan0(port: usize) -> u32 {
    0x420 + 0x8 * port as u32
}
pub const PORT_VLAN0_DEF_SVID_S: u32 = 0;
pub const PORT_VLAN0_DEF_CVID_S: u32 = 16;

/// Per-port VLAN1 register: egress mode and VLAN propagation.
pub const fn reg_port_vlan1(port: usize) -> u32 {
    0x424 + 0x8 * port as u32
}
pub const PORT_VLAN1_PORT_VLAN_PROP: u32 = 1 << 6;
pub const PORT_VLAN1_OUT_MODE_S: u32 = 12;
pub const PORT_VLAN1_OUT_MODE_UNMOD: u32 = 0;
pub const PORT_VLAN1_OUT_MODE_UNTAG: u32 = 1;
pub const PORT_VLAN1_OUT_MODE_TAG: u32 = 2;
pub const PORT_VLAN1_OUT_MODE_UNTOUCH: u32 = 3;

/// Address-translation-unit (learned MAC table) function register.
pub const REG_ATU_FUNC: u32 = 0x60c;
pub const ATU_FUNC_OP_MASK: u32 = 0xf;
pub const ATU_FUNC_OP_FLUSH: u32 = 1;
pub const ATU_FUNC_BUSY: u32 = 1 << 31;

/// VLAN-table function register 0: entry payload.
pub const REG_VTU_FUNC0: u32 = 0x610;
pub const VTU_FUNC0_VALID: u32 = 1 << 20;
pub const VTU_FUNC0_IVL: u32 = 1 << 19;
/// Per-port egress mode field, two bits per port.
pub const fn vtu_func0_eg_mode_s(port: usize) -> u32 {
    4 + 2 * port as u32
}
pub const VTU_FUNC0_EG_MODE_KEEP: u32 = 0;
pub const VTU_FUNC0_EG_MODE_UNTAG: u32 = 1;
pub const VTU_FUNC0_EG_MODE_TAG: u32 = 2;
pub const VTU_FUNC0_EG_MODE_NOT: u32 = 3;

/// VLAN-table function register 1: opcode, vid, busy.
pub const REG_VTU_FUNC1: u32 = 0x614;
pub const VTU_FUNC1_OP_MASK: u32 = 0x7;
pub const VTU_FUNC1_OP_FLUSH: u32 = 1;
pub const VTU_FUNC1_OP_LOAD: u32 = 2;
pub const VTU_FUNC1_FULL: u32 = 1 << 4;
pub const VTU_FUNC1_VID_S: u32 = 16;
pub const VTU_FUNC1_BUSY: u32 = 1 << 31;

/// Forward control 0: CPU port enable, mirror destination port.
pub const REG_FWD_CTRL0: u32 = 0x620;
pub const FWD_CTRL0_CPU_PORT_EN: u32 = 1 << 10;
pub const FWD_CTRL0_MIRROR_PORT_MASK: u32 = 0xf << 4;
pub const FWD_CTRL0_MIRROR_PORT_S: u32 = 4;
/// Mirror-port field value meaning "no mirror destination".
pub const FWD_CTRL0_MIRROR_PORT_NONE: u32 = 0xf;

/// Forward control 1: flood masks.
pub const REG_FWD_CTRL1: u32 = 0x624;
pub const FWD_CTRL1_UC_FLOOD_S: u32 = 0;
pub const FWD_CTRL1_MC_FLOOD_S: u32 = 8;
pub const FWD_CTRL1_BC_FLOOD_S: u32 = 16;

/// Per-port lookup control: membership, learning, state, loopback, mirror.
pub const fn reg_port_lookup(port: usize) -> u32 {
    0x660 + 0xc * port as u32
}
pub const PORT_LOOKUP_MEMBER_MASK: u32 = 0x3f;
pub const PORT_LOOKUP_IN_MODE_S: u32 = 8;
pub const PORT_LOOKUP_STATE_S: u32 = 16;
pub const PORT_LOOKUP_LEARN: u32 = 1 << 20;
pub const PORT_LOOKUP_LOOPBACK: u32 = 1 << 21;
pub const PORT_LOOKUP_ING_MIRROR_EN: u32 = 1 << 25;

/// 802.1Q ingress filter modes (lookup IN_MODE field).
pub const IN_PORT_ONLY: u32 = 0;
pub const IN_PORT_FALLBACK: u32 = 1;
pub const IN_SECURE: u32 = 2;

/// Port STP-like forwarding states (lookup STATE field).
pub const PORT_STATE_DISABLED: u32 = 0;
pub const PORT_STATE_FORWARD: u32 = 4;

/// Queue-manager debug indirection pair.
pub const REG_QM_DEBUG_ADDR: u32 = 0x820;
pub const REG_QM_DEBUG_VALUE: u32 = 0x824;
/// Grouped queue occupancy words selected through the debug pair,
/// eight bits of occupancy per port.
pub const QM_PORT0_3_QNUM: u32 = 0x1d;
pub const QM_PORT4_6_QNUM: u32 = 0x1e;

/// Per-port head-of-line control 1 (egress mirror enable lives here).
pub const fn reg_port_hol_ctrl1(port: usize) -> u32 {
    0x974 + 0x8 * port as u32
}
pub const PORT_HOL_CTRL1_EG_MIRROR_EN: u32 = 1 << 16;

/// Per-port flow-control thresholds.
pub const fn reg_port_flowctrl_thresh(port: usize) -> u32 {
    0x9b0 + 0x4 * port as u32
}
pub const PORT0_FC_THRESH_ON_DFLT: u32 = 0x60;
pub const PORT0_FC_THRESH_OFF_DFLT: u32 = 0x90;

/// Per-port statistics block.
pub const REG_PORT_STATS_START: u32 = 0x1000;
pub const REG_PORT_STATS_LEN: u32 = 0x100;

// ---------------------------------------------------------------------------
// PSGMII wrapper window
// ---------------------------------------------------------------------------

/// Fabric-side calibration status; bit 0 reads 1 once the PLL has trained.
pub const PSGMII_CAL_STATUS: u32 = 0xa0;
pub const PSGMII_CAL_DONE: u32 = 1 << 0;

pub const PSGMII_MODE_CONTROL: u32 = 0x1b4;
/// Mode-control value selecting PSGMII athr-CSCO mode.
pub const PSGMII_MODE_PSGMII: u32 = 0x2200;

pub const PSGMIIPHY_TX_CONTROL: u32 = 0x288;
/// TX driver setting used with PSGMII mode.
pub const PSGMIIPHY_TX_DEFAULT: u32 = 0x8380;

/// MAC mode selector carried by the platform configuration.
pub const MAC_MODE_PSGMII: u32 = 0;

// ---------------------------------------------------------------------------
// MDIO plane
// ---------------------------------------------------------------------------

/// MDIO address that broadcasts a write to every PHY on the bus.
pub const MDIO_BROADCAST: u8 = 0x1f;
/// MDIO address of the PHY package's PSGMII lane block.
pub const PSGMII_LANE_PHY: u8 = 5;

/// Clause-22 basic mode control.
pub const MII_BMCR: u16 = 0x00;
pub const BMCR_SPEED1000: u16 = 0x0040;
pub const BMCR_FULLDPLX: u16 = 0x0100;
pub const BMCR_ANRESTART: u16 = 0x0200;
pub const BMCR_ISOLATE: u16 = 0x0400;
pub const BMCR_PDOWN: u16 = 0x0800;
pub const BMCR_ANENABLE: u16 = 0x1000;
pub const BMCR_LOOPBACK: u16 = 0x4000;
pub const BMCR_RESET: u16 = 0x8000;

/// Clause-22 auto-negotiation advertisement.
pub const MII_ADVERTISE: u16 = 0x04;
pub const ADVERTISE_ALL: u16 = 0x01e1;
pub const ADVERTISE_PAUSE_CAP: u16 = 0x0400;
pub const ADVERTISE_PAUSE_ASYM: u16 = 0x0800;

/// Clause-22 1000BASE-T control.
pub const MII_CTRL1000: u16 = 0x09;
pub const ADVERTISE_1000FULL: u16 = 0x0200;

/// Vendor copper/fiber page select.
pub const MII_PAGE_SELECT: u16 = 0x1f;
pub const PAGE_COPPER: u16 = 0x8500;

/// Vendor PHY-specific control (MDI fix values used by the self-test).
pub const MII_PHY_SPEC_CONTROL: u16 = 0x10;
pub const PHY_SPEC_CONTROL_MDI_TEST: u16 = 0x6800;
pub const PHY_SPEC_CONTROL_MDI_NORMAL: u16 = 0x6860;

/// Vendor PHY-specific status.
pub const MII_PHY_SPEC_STATUS: u16 = 0x11;
pub const PHY_SPEC_STATUS_LINK: u16 = 1 << 10;
pub const PHY_SPEC_STATUS_DUPLEX: u16 = 1 << 13;
pub const PHY_SPEC_STATUS_SPEED_MASK: u16 = 0x3 << 14;
pub const PHY_SPEC_STATUS_SPEED_S: u16 = 14;

/// Vendor debug register pair.
pub const MII_DBG_ADDR: u16 = 0x1d;
pub const MII_DBG_DATA: u16 = 0x1e;

/// Debug register 0 carries the manual speed-control bit; leaving it set
/// can wedge the PHY in 100BASE-T mode across a relink.
pub const PHY_DEBUG_0: u16 = 0x00;
pub const PHY_MANU_CTRL_EN: u16 = 1 << 12;
/// Debug register 2: transmit driver bits; the keep-mask preserves the
/// fields that must survive a transmit disable.
pub const PHY_DEBUG_2: u16 = 0x02;
pub const PHY_DEBUG_2_TX_KEEP: u16 = 0xf00f;

/// Vendor MMD (extended register) access pair.
pub const MII_MMD_ADDR: u16 = 0x0d;
pub const MII_MMD_DATA: u16 = 0x0e;
/// OR'd into the second address write to latch data access.
pub const MMD_DATA_LATCH: u16 = 0x4000;

/// PCS MMD; register 0x28 bit 0 is the PHY-side calibration-done flag.
pub const MMD_PCS: u16 = 1;
pub const MMD_PCS_CAL_STATUS: u16 = 0x28;
pub const MMD_PCS_CAL_DONE: u16 = 1 << 0;

/// Autoneg-vendor MMD hosting the embedded packet generator/checker.
pub const MMD_AN: u16 = 7;
/// Generator control; `0xa000` starts traffic.
pub const MMD_AN_GEN_CTRL: u16 = 0x8020;
pub const GEN_CTRL_START: u16 = 0xa000;
/// Number of frames to inject.
pub const MMD_AN_GEN_PKT_COUNT: u16 = 0x8021;
pub const GEN_PKT_COUNT: u16 = 0x1000;
/// Broadcast-write membership control.
pub const MMD_AN_MDIO_BCAST: u16 = 0x8028;
pub const MDIO_BCAST_JOIN: u16 = 0x801f;
pub const MDIO_BCAST_LEAVE: u16 = 0x001f;
/// Frame checker control; cleared then set to reset-and-arm the counters.
pub const MMD_AN_CHECK_CTRL: u16 = 0x8029;
pub const CHECK_CTRL_ARM: u16 = 0x0003;
/// Good/error frame counters, 16 bits each; the *_HI halves extend the
/// good counters to 32 bits.
pub const MMD_AN_RX_OK_HI: u16 = 0x802a;
pub const MMD_AN_RX_OK: u16 = 0x802b;
pub const MMD_AN_RX_ERR: u16 = 0x802c;
pub const MMD_AN_TX_OK_HI: u16 = 0x802d;
pub const MMD_AN_TX_OK: u16 = 0x802e;
pub const MMD_AN_TX_ERR: u16 = 0x802f;
/// Generator payload size.
pub const MMD_AN_GEN_PKT_SIZE: u16 = 0x8062;
pub const GEN_PKT_SIZE: u16 = 0x05e0;
/// LED behavior register restored after the self-test.
pub const MMD_AN_LED_CTRL: u16 = 0x8076;
pub const LED_CTRL_DEFAULT: u16 = 0x0670;

/// PSGMII lane PHY control values (register 0 of the lane block).
pub const LANE_RX20_RESET_RELEASE: u16 = 0x005b;
pub const LANE_RESET: u16 = 0x001b;
pub const LANE_RELEASE: u16 = 0x005f;
/// Lane CDR control (register 0x1a): freeze/release values.
pub const MII_LANE_CDR: u16 = 0x1a;
pub const LANE_CDR_FREEZE: u16 = 0x2230;
pub const LANE_CDR_RELEASE: u16 = 0x3230;
