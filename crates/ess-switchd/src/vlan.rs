//! Forwarding-table synchronizer.
//!
//! Translates the VLAN/port model into the two structures the switch
//! consults on every frame: VLAN-table entries (membership plus per-port
//! tag handling) and per-port destination masks. The whole model is
//! recomputed and pushed on every [`ForwardingConfig::synchronize`] pass,
//! so no state ever drifts between software and silicon.

use std::time::Duration;

use tracing::{debug, instrument};

use ess_hal::poll::wait_reg;
use ess_hal::{regs, Hal};

use crate::config::{PortRole, SwitchConfig};
use crate::error::{SwitchError, SwitchResult};
use crate::types::ports_in;

/// Default VLAN table slot for LAN ports.
pub const LAN_VLAN_SLOT: usize = 1;
/// Default VLAN table slot for WAN ports.
pub const WAN_VLAN_SLOT: usize = 2;

/// VTU/ATU function-busy wait budget.
const FUNC_WAIT_ATTEMPTS: u32 = 20;
const FUNC_WAIT_INTERVAL: Duration = Duration::from_micros(10);

/// CPU-port bring-up settle time between forcing the MAC mode and
/// enabling TX/RX.
const CPU_PORT_SETTLE: Duration = Duration::from_micros(10);

/// Frame mirroring configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MirrorConfig {
    pub rx_enabled: bool,
    pub tx_enabled: bool,
    pub source_port: usize,
    pub monitor_port: usize,
}

impl MirrorConfig {
    /// Mirroring only engages for distinct, in-range source and monitor
    /// ports; anything else leaves the mirror registers cleared.
    pub fn is_active(&self) -> bool {
        self.source_port < regs::NUM_PORTS
            && self.monitor_port < regs::NUM_PORTS
            && self.source_port != self.monitor_port
    }
}

/// Egress handling for one port in one VLAN-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressMode {
    /// Port is not a member of the VLAN.
    NotMember,
    /// Forward frames as received (802.1Q disabled).
    Keep,
    /// Forward tagged.
    Tagged,
    /// Forward untagged.
    Untagged,
}

impl EgressMode {
    fn field(self) -> u32 {
        match self {
            EgressMode::NotMember => regs::VTU_FUNC0_EG_MODE_NOT,
            EgressMode::Keep => regs::VTU_FUNC0_EG_MODE_KEEP,
            EgressMode::Tagged => regs::VTU_FUNC0_EG_MODE_TAG,
            EgressMode::Untagged => regs::VTU_FUNC0_EG_MODE_UNTAG,
        }
    }
}

/// Software model of the VLAN, forwarding and mirror state.
///
/// Owned by the supervisor behind the configuration lock; every mutator
/// validates before touching state, every hardware effect goes through
/// [`Self::synchronize`].
#[derive(Debug, Clone)]
pub struct ForwardingConfig {
    /// 802.1Q processing enabled.
    pub vlan_enabled: bool,
    /// Member-port bitmask per table slot.
    vlan_members: [u8; regs::MAX_VLANS],
    /// VLAN id per table slot.
    vlan_id: [u16; regs::MAX_VLANS],
    /// Ports whose member VLANs egress tagged.
    vlan_tagged: u8,
    /// Default VLAN (table slot, not id) per port.
    pvid: [usize; regs::NUM_PORTS],
    /// Mirroring state.
    pub mirror: MirrorConfig,
}

impl ForwardingConfig {
    /// Builds the default forwarding layout for the configured bitmaps.
    pub fn new(cfg: &SwitchConfig) -> Self {
        let mut fwd = Self {
            vlan_enabled: true,
            vlan_members: [0; regs::MAX_VLANS],
            vlan_id: [0; regs::MAX_VLANS],
            vlan_tagged: 0,
            pvid: [0; regs::NUM_PORTS],
            mirror: MirrorConfig::default(),
        };
        fwd.reset_defaults(cfg);
        fwd
    }

    /// Restores the default state: VLAN ids mapped 1:1 to table slots,
    /// LAN/WAN membership derived from the configured bitmaps, CPU port
    /// tagged, mirroring disabled.
    pub fn reset_defaults(&mut self, cfg: &SwitchConfig) {
        self.vlan_enabled = true;
        self.vlan_members = [0; regs::MAX_VLANS];
        for (slot, vid) in self.vlan_id.iter_mut().enumerate() {
            *vid = slot as u16;
        }
        self.vlan_members[LAN_VLAN_SLOT] = cfg.cpu_bmp | cfg.lan_bmp;
        self.vlan_members[WAN_VLAN_SLOT] = cfg.cpu_bmp | cfg.wan_bmp;
        self.vlan_tagged = cfg.cpu_bmp;
        self.pvid = [0; regs::NUM_PORTS];
        for port in 0..regs::NUM_PORTS {
            match cfg.role(port) {
                PortRole::Lan => self.pvid[port] = LAN_VLAN_SLOT,
                PortRole::Wan => self.pvid[port] = WAN_VLAN_SLOT,
                PortRole::Cpu | PortRole::Unused => {}
            }
        }
        self.mirror = MirrorConfig::default();
    }

    fn check_port(port: usize) -> SwitchResult<()> {
        if port >= regs::NUM_PORTS {
            return Err(SwitchError::InvalidPort { port });
        }
        Ok(())
    }

    fn check_slot(slot: usize) -> SwitchResult<()> {
        if slot >= regs::MAX_VLANS {
            return Err(SwitchError::InvalidVlanSlot { slot });
        }
        Ok(())
    }

    /// Default VLAN table slot of `port`.
    pub fn pvid(&self, port: usize) -> SwitchResult<usize> {
        Self::check_port(port)?;
        Ok(self.pvid[port])
    }

    /// Sets a port's default VLAN table slot.
    ///
    /// Rejected without mutating state when the slot is out of range, so a
    /// later synchronize pass can never index an invalid table entry.
    pub fn set_pvid(&mut self, port: usize, slot: usize) -> SwitchResult<()> {
        Self::check_port(port)?;
        Self::check_slot(slot)?;
        self.pvid[port] = slot;
        Ok(())
    }

    /// VLAN id programmed in a table slot.
    pub fn vid(&self, slot: usize) -> SwitchResult<u16> {
        Self::check_slot(slot)?;
        Ok(self.vlan_id[slot])
    }

    /// Sets the VLAN id for a table slot.
    pub fn set_vid(&mut self, slot: usize, vid: u32) -> SwitchResult<()> {
        Self::check_slot(slot)?;
        if vid > regs::MAX_VID as u32 {
            return Err(SwitchError::InvalidVid { vid });
        }
        self.vlan_id[slot] = vid as u16;
        Ok(())
    }

    /// Member ports of a table slot, with each port's tagged flag.
    pub fn vlan_ports(&self, slot: usize) -> SwitchResult<Vec<(usize, bool)>> {
        Self::check_slot(slot)?;
        Ok(ports_in(self.vlan_members[slot] as u32)
            .map(|port| {
                let tagged =
                    self.vlan_tagged & (1 << port) != 0 || self.pvid[port] != slot;
                (port, tagged)
            })
            .collect())
    }

    /// Replaces a table slot's membership.
    ///
    /// An untagged membership also claims the port's PVID, mirroring how
    /// the external configuration model expresses "this is the port's
    /// native VLAN".
    pub fn set_vlan_ports(
        &mut self,
        slot: usize,
        members: &[(usize, bool)],
    ) -> SwitchResult<()> {
        Self::check_slot(slot)?;
        for &(port, _) in members {
            Self::check_port(port)?;
        }
        let mut mask = 0u8;
        for &(port, tagged) in members {
            let bit = 1u8 << port;
            if tagged {
                if self.pvid[port] == slot {
                    self.vlan_tagged |= bit;
                }
            } else {
                self.vlan_tagged &= !bit;
                self.pvid[port] = slot;
            }
            mask |= bit;
        }
        self.vlan_members[slot] = mask;
        Ok(())
    }

    /// Egress mode of `port` for the VLAN in `slot`.
    pub fn egress_mode(&self, slot: usize, port: usize) -> EgressMode {
        if self.vlan_members[slot] & (1 << port) == 0 {
            EgressMode::NotMember
        } else if !self.vlan_enabled {
            EgressMode::Keep
        } else if self.vlan_tagged & (1 << port) != 0
            || self.vlan_id[self.pvid[port]] != self.vlan_id[slot]
        {
            EgressMode::Tagged
        } else {
            EgressMode::Untagged
        }
    }

    /// Destination bitmask per port.
    ///
    /// With VLANs enabled, two ports reach each other iff they share a
    /// VLAN; a port never appears in its own mask. With VLANs disabled the
    /// topology is a star through the CPU port.
    pub fn dest_masks(&self) -> [u32; regs::NUM_PORTS] {
        let mut masks = [0u32; regs::NUM_PORTS];
        if self.vlan_enabled {
            for slot in 0..regs::MAX_VLANS {
                let members = self.vlan_members[slot] as u32;
                if members == 0 {
                    continue;
                }
                for port in ports_in(members) {
                    masks[port] |= members & !(1 << port);
                }
            }
        } else {
            for port in 0..regs::NUM_PORTS {
                if port == regs::CPU_PORT {
                    continue;
                }
                masks[port] = 1 << regs::CPU_PORT;
                masks[regs::CPU_PORT] |= 1 << port;
            }
        }
        masks
    }

    /// Encodes a slot's VTU entry payload.
    fn vtu_entry(&self, slot: usize) -> u32 {
        let mut val = regs::VTU_FUNC0_VALID | regs::VTU_FUNC0_IVL;
        for port in 0..regs::NUM_PORTS {
            val |= self.egress_mode(slot, port).field() << regs::vtu_func0_eg_mode_s(port);
        }
        val
    }

    /// Pushes the whole model into the hardware.
    ///
    /// Runs under the configuration lock so no concurrent reader of the
    /// forwarding tables observes a half-applied pass. The hardware itself
    /// applies register-by-register; atomicity here is software-level.
    #[instrument(skip(self, hal))]
    pub async fn synchronize(&self, hal: &dyn Hal) -> SwitchResult<()> {
        vtu_flush(hal).await?;

        if self.vlan_enabled {
            for slot in 0..regs::MAX_VLANS {
                if self.vlan_members[slot] == 0 {
                    continue;
                }
                vtu_load(hal, self.vlan_id[slot], self.vtu_entry(slot)).await?;
            }
        }

        let masks = self.dest_masks();
        for port in 0..regs::NUM_PORTS {
            self.setup_port(hal, port, masks[port])?;
        }

        self.set_mirror_regs(hal)?;
        debug!("forwarding state synchronized");
        Ok(())
    }

    /// Programs one port's VLAN0/VLAN1/lookup registers.
    fn setup_port(&self, hal: &dyn Hal, port: usize, members: u32) -> SwitchResult<()> {
        let (egress, ingress) = if self.vlan_enabled {
            (regs::PORT_VLAN1_OUT_MODE_UNMOD, regs::IN_SECURE)
        } else {
            (regs::PORT_VLAN1_OUT_MODE_UNTOUCH, regs::IN_PORT_ONLY)
        };
        let pvid = self.vlan_id[self.pvid[port]] as u32;

        let vlan0 = pvid << regs::PORT_VLAN0_DEF_SVID_S | pvid << regs::PORT_VLAN0_DEF_CVID_S;
        hal.ess_write(regs::reg_port_vlan0(port), vlan0)?;

        let vlan1 = regs::PORT_VLAN1_PORT_VLAN_PROP | egress << regs::PORT_VLAN1_OUT_MODE_S;
        hal.ess_write(regs::reg_port_vlan1(port), vlan1)?;

        let lookup = members
            | regs::PORT_LOOKUP_LEARN
            | ingress << regs::PORT_LOOKUP_IN_MODE_S
            | regs::PORT_STATE_FORWARD << regs::PORT_LOOKUP_STATE_S;
        hal.ess_write(regs::reg_port_lookup(port), lookup)?;
        Ok(())
    }

    /// Reprograms the mirror registers from the current configuration.
    ///
    /// Always clears everything first, then enables mirroring only for a
    /// valid source/monitor pair.
    pub fn set_mirror_regs(&self, hal: &dyn Hal) -> SwitchResult<()> {
        hal.ess_rmw(
            regs::REG_FWD_CTRL0,
            regs::FWD_CTRL0_MIRROR_PORT_MASK,
            regs::FWD_CTRL0_MIRROR_PORT_NONE << regs::FWD_CTRL0_MIRROR_PORT_S,
        )?;
        for port in 0..regs::NUM_PORTS {
            hal.ess_rmw(regs::reg_port_lookup(port), regs::PORT_LOOKUP_ING_MIRROR_EN, 0)?;
            hal.ess_rmw(
                regs::reg_port_hol_ctrl1(port),
                regs::PORT_HOL_CTRL1_EG_MIRROR_EN,
                0,
            )?;
        }

        if !self.mirror.is_active() {
            return Ok(());
        }

        hal.ess_rmw(
            regs::REG_FWD_CTRL0,
            regs::FWD_CTRL0_MIRROR_PORT_MASK,
            (self.mirror.monitor_port as u32) << regs::FWD_CTRL0_MIRROR_PORT_S,
        )?;
        if self.mirror.rx_enabled {
            hal.ess_rmw(
                regs::reg_port_lookup(self.mirror.source_port),
                0,
                regs::PORT_LOOKUP_ING_MIRROR_EN,
            )?;
        }
        if self.mirror.tx_enabled {
            hal.ess_rmw(
                regs::reg_port_hol_ctrl1(self.mirror.source_port),
                0,
                regs::PORT_HOL_CTRL1_EG_MIRROR_EN,
            )?;
        }
        Ok(())
    }
}

async fn vtu_wait(hal: &dyn Hal) -> SwitchResult<()> {
    wait_reg(
        hal,
        regs::REG_VTU_FUNC1,
        regs::VTU_FUNC1_BUSY,
        0,
        FUNC_WAIT_ATTEMPTS,
        FUNC_WAIT_INTERVAL,
    )
    .await?;
    Ok(())
}

/// Invalidates every VLAN-table entry.
pub async fn vtu_flush(hal: &dyn Hal) -> SwitchResult<()> {
    vtu_wait(hal).await?;
    hal.ess_write(
        regs::REG_VTU_FUNC1,
        regs::VTU_FUNC1_OP_FLUSH | regs::VTU_FUNC1_BUSY,
    )?;
    Ok(())
}

/// Loads one VLAN-table entry.
pub async fn vtu_load(hal: &dyn Hal, vid: u16, entry: u32) -> SwitchResult<()> {
    vtu_wait(hal).await?;
    hal.ess_write(regs::REG_VTU_FUNC0, entry)?;
    hal.ess_write(
        regs::REG_VTU_FUNC1,
        regs::VTU_FUNC1_OP_LOAD | (vid as u32) << regs::VTU_FUNC1_VID_S | regs::VTU_FUNC1_BUSY,
    )?;
    Ok(())
}

/// Flushes the learned-address cache.
pub async fn atu_flush(hal: &dyn Hal) -> SwitchResult<()> {
    wait_reg(
        hal,
        regs::REG_ATU_FUNC,
        regs::ATU_FUNC_BUSY,
        0,
        FUNC_WAIT_ATTEMPTS,
        FUNC_WAIT_INTERVAL,
    )
    .await?;
    hal.ess_write(
        regs::REG_ATU_FUNC,
        regs::ATU_FUNC_OP_FLUSH | regs::ATU_FUNC_BUSY,
    )?;
    Ok(())
}

/// Quiesces one port: MAC down, no header insertion, VLAN scrubbed,
/// learning on, forwarding state.
pub fn init_port(hal: &dyn Hal, port: usize) -> SwitchResult<()> {
    hal.ess_write(regs::reg_port_status(port), 0)?;
    hal.ess_write(regs::reg_port_header(port), 0)?;
    hal.ess_write(regs::reg_port_vlan0(port), 0)?;
    hal.ess_write(
        regs::reg_port_vlan1(port),
        regs::PORT_VLAN1_OUT_MODE_UNTOUCH << regs::PORT_VLAN1_OUT_MODE_S,
    )?;
    hal.ess_write(
        regs::reg_port_lookup(port),
        regs::PORT_LOOKUP_LEARN | regs::PORT_STATE_FORWARD << regs::PORT_LOOKUP_STATE_S,
    )?;
    Ok(())
}

/// Global fabric defaults: CPU port on, mirror off, flood to all ports,
/// jumbo frames, MIB engine on, EEE off, CPU-port flow-control thresholds.
pub fn init_globals(hal: &dyn Hal) -> SwitchResult<()> {
    hal.ess_write(
        regs::REG_FWD_CTRL0,
        regs::FWD_CTRL0_CPU_PORT_EN | regs::FWD_CTRL0_MIRROR_PORT_MASK,
    )?;
    hal.ess_write(
        regs::REG_FWD_CTRL1,
        regs::PORTS_ALL << regs::FWD_CTRL1_UC_FLOOD_S
            | regs::PORTS_ALL << regs::FWD_CTRL1_MC_FLOOD_S
            | regs::PORTS_ALL << regs::FWD_CTRL1_BC_FLOOD_S,
    )?;
    hal.ess_rmw(
        regs::REG_MAX_FRAME_SIZE,
        regs::MAX_FRAME_SIZE_MTU,
        9018 + 8 + 2,
    )?;
    hal.ess_rmw(regs::REG_MODULE_EN, 0, regs::MODULE_EN_MIB)?;
    hal.ess_write(regs::REG_EEE_CTRL, 0)?;
    hal.ess_write(
        regs::reg_port_flowctrl_thresh(regs::CPU_PORT),
        regs::PORT0_FC_THRESH_ON_DFLT << 16 | regs::PORT0_FC_THRESH_OFF_DFLT,
    )?;
    Ok(())
}

/// Brings up the CPU port: forced 1000FD with flow control, then TX/RX
/// enable after the MAC mode has settled.
pub async fn cpuport_setup(hal: &dyn Hal) -> SwitchResult<()> {
    let forced = regs::PORT_STATUS_TXFLOW
        | regs::PORT_STATUS_RXFLOW
        | regs::PORT_TXHALF_FLOW
        | regs::PORT_DUPLEX
        | regs::PORT_SPEED_1000M;
    hal.ess_write(regs::reg_port_status(regs::CPU_PORT), forced)?;
    tokio::time::sleep(CPU_PORT_SETTLE).await;
    hal.ess_write(
        regs::reg_port_status(regs::CPU_PORT),
        forced | regs::PORT_TX_EN | regs::PORT_RX_EN,
    )?;
    Ok(())
}

/// Programs the MAC wrapper for the configured mode.
pub fn mac_mode_init(hal: &dyn Hal, mac_mode: u32) -> SwitchResult<()> {
    if mac_mode == regs::MAC_MODE_PSGMII {
        hal.psgmii_write(regs::PSGMII_MODE_CONTROL, regs::PSGMII_MODE_PSGMII)?;
        hal.psgmii_write(regs::PSGMIIPHY_TX_CONTROL, regs::PSGMIIPHY_TX_DEFAULT)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use ess_hal::mock::{MockHal, Op};
    use pretty_assertions::assert_eq;

    fn cfg() -> SwitchConfig {
        SwitchConfig {
            cpu_bmp: 0x01,
            lan_bmp: 0x1e,
            wan_bmp: 0x20,
            mac_mode: regs::MAC_MODE_PSGMII,
            platform: PlatformConfig::Mock,
        }
    }

    #[test]
    fn test_defaults() {
        let fwd = ForwardingConfig::new(&cfg());
        assert!(fwd.vlan_enabled);
        assert_eq!(fwd.vid(LAN_VLAN_SLOT).unwrap(), 1);
        assert_eq!(fwd.vid(WAN_VLAN_SLOT).unwrap(), 2);
        assert_eq!(fwd.pvid(1).unwrap(), LAN_VLAN_SLOT);
        assert_eq!(fwd.pvid(5).unwrap(), WAN_VLAN_SLOT);
    }

    #[test]
    fn test_dest_mask_never_contains_self() {
        let mut fwd = ForwardingConfig::new(&cfg());
        // Overlapping membership on top of the defaults.
        fwd.set_vlan_ports(7, &[(1, true), (5, true), (3, true)]).unwrap();
        for (port, mask) in fwd.dest_masks().iter().enumerate() {
            assert_eq!(mask & (1 << port), 0, "port {port} reaches itself");
        }

        fwd.vlan_enabled = false;
        for (port, mask) in fwd.dest_masks().iter().enumerate() {
            assert_eq!(mask & (1 << port), 0, "port {port} reaches itself");
        }
    }

    #[test]
    fn test_dest_masks_pairwise() {
        let fwd = ForwardingConfig::new(&cfg());
        let masks = fwd.dest_masks();
        // LAN ports reach each other and the CPU port, never the WAN port.
        assert_eq!(masks[1], 0x1d);
        assert_eq!(masks[5], 0x01);
        // CPU port reaches everything.
        assert_eq!(masks[0], 0x3e);
    }

    #[test]
    fn test_star_topology_when_vlan_disabled() {
        let mut fwd = ForwardingConfig::new(&cfg());
        fwd.vlan_enabled = false;
        let masks = fwd.dest_masks();
        for port in 1..regs::NUM_PORTS {
            assert_eq!(masks[port], 1 << regs::CPU_PORT);
        }
        assert_eq!(masks[regs::CPU_PORT], 0x3e);
    }

    #[test]
    fn test_egress_invariant() {
        let mut fwd = ForwardingConfig::new(&cfg());
        fwd.set_vlan_ports(7, &[(2, true), (3, false)]).unwrap();
        for vlan_enabled in [true, false] {
            fwd.vlan_enabled = vlan_enabled;
            for slot in 0..regs::MAX_VLANS {
                for port in 0..regs::NUM_PORTS {
                    let member = fwd.vlan_members[slot] & (1 << port) != 0;
                    let mode = fwd.egress_mode(slot, port);
                    if member {
                        assert_ne!(mode, EgressMode::NotMember);
                    } else {
                        assert_eq!(mode, EgressMode::NotMember);
                    }
                }
            }
        }
    }

    #[test]
    fn test_egress_tagging_rules() {
        let fwd = ForwardingConfig::new(&cfg());
        // CPU port is in the tagged mask.
        assert_eq!(fwd.egress_mode(LAN_VLAN_SLOT, 0), EgressMode::Tagged);
        // LAN port egresses its own PVID untagged.
        assert_eq!(fwd.egress_mode(LAN_VLAN_SLOT, 1), EgressMode::Untagged);
        // WAN port in the WAN VLAN, untagged; not a member of the LAN VLAN.
        assert_eq!(fwd.egress_mode(WAN_VLAN_SLOT, 5), EgressMode::Untagged);
        assert_eq!(fwd.egress_mode(LAN_VLAN_SLOT, 5), EgressMode::NotMember);
    }

    #[test]
    fn test_pvid_boundary_rejected_without_mutation() {
        let mut fwd = ForwardingConfig::new(&cfg());
        let before = fwd.pvid(3).unwrap();
        let err = fwd.set_pvid(3, regs::MAX_VLANS).unwrap_err();
        assert_eq!(err, SwitchError::InvalidVlanSlot { slot: regs::MAX_VLANS });
        assert_eq!(fwd.pvid(3).unwrap(), before);
    }

    #[test]
    fn test_vid_boundary() {
        let mut fwd = ForwardingConfig::new(&cfg());
        fwd.set_vid(10, 4094).unwrap();
        assert_eq!(fwd.vid(10).unwrap(), 4094);
        assert!(matches!(
            fwd.set_vid(10, 4095),
            Err(SwitchError::InvalidVid { vid: 4095 })
        ));
        assert_eq!(fwd.vid(10).unwrap(), 4094);
    }

    #[test]
    fn test_vlan_ports_round_trip() {
        let mut fwd = ForwardingConfig::new(&cfg());
        fwd.set_vlan_ports(9, &[(0, true), (2, false)]).unwrap();
        // Port 2's untagged membership claimed its PVID.
        assert_eq!(fwd.pvid(2).unwrap(), 9);
        let ports = fwd.vlan_ports(9).unwrap();
        assert_eq!(ports, vec![(0, true), (2, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synchronize_is_idempotent() {
        let hal = MockHal::new();
        let fwd = ForwardingConfig::new(&cfg());

        fwd.synchronize(&hal).await.unwrap();
        let first = hal.ops();
        hal.clear_ops();
        fwd.synchronize(&hal).await.unwrap();
        let second = hal.ops();

        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_synchronize_loads_nonempty_slots_only() {
        let hal = MockHal::new();
        let fwd = ForwardingConfig::new(&cfg());
        fwd.synchronize(&hal).await.unwrap();

        let vtu_writes: Vec<Op> = hal
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::EssWrite { reg, .. } if *reg == regs::REG_VTU_FUNC1))
            .collect();
        // One flush plus the two default VLANs.
        assert_eq!(vtu_writes.len(), 3);
        assert_eq!(
            vtu_writes[0],
            Op::EssWrite {
                reg: regs::REG_VTU_FUNC1,
                val: regs::VTU_FUNC1_OP_FLUSH | regs::VTU_FUNC1_BUSY,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_vtu_busy_timeout_skips_write() {
        let hal = MockHal::new();
        hal.set_ess(regs::REG_VTU_FUNC1, regs::VTU_FUNC1_BUSY);

        let fwd = ForwardingConfig::new(&cfg());
        let err = fwd.synchronize(&hal).await.unwrap_err();
        assert!(matches!(err, SwitchError::Hal(e) if e.is_timeout()));
        // The flush write itself was skipped: the only value ever in the
        // register is the seeded busy bit.
        assert!(hal.ops().iter().all(|op| !matches!(
            op,
            Op::EssWrite { reg, .. } if *reg == regs::REG_VTU_FUNC0
        )));
    }

    #[test]
    fn test_mirror_validation() {
        let hal = MockHal::new();
        let mut fwd = ForwardingConfig::new(&cfg());
        fwd.mirror = MirrorConfig {
            rx_enabled: true,
            tx_enabled: true,
            source_port: 2,
            monitor_port: 2,
        };
        assert!(!fwd.mirror.is_active());
        fwd.set_mirror_regs(&hal).unwrap();

        // Mirror destination stays parked at the "none" value and no
        // ingress mirror bit is set anywhere.
        let ctrl0 = hal.ess_read(regs::REG_FWD_CTRL0).unwrap();
        assert_eq!(
            ctrl0 & regs::FWD_CTRL0_MIRROR_PORT_MASK,
            regs::FWD_CTRL0_MIRROR_PORT_NONE << regs::FWD_CTRL0_MIRROR_PORT_S
        );
        for port in 0..regs::NUM_PORTS {
            let lookup = hal.ess_read(regs::reg_port_lookup(port)).unwrap();
            assert_eq!(lookup & regs::PORT_LOOKUP_ING_MIRROR_EN, 0);
        }
    }

    #[test]
    fn test_mirror_programming() {
        let hal = MockHal::new();
        let mut fwd = ForwardingConfig::new(&cfg());
        fwd.mirror = MirrorConfig {
            rx_enabled: true,
            tx_enabled: false,
            source_port: 3,
            monitor_port: 1,
        };
        fwd.set_mirror_regs(&hal).unwrap();

        let ctrl0 = hal.ess_read(regs::REG_FWD_CTRL0).unwrap();
        assert_eq!(
            ctrl0 & regs::FWD_CTRL0_MIRROR_PORT_MASK,
            1 << regs::FWD_CTRL0_MIRROR_PORT_S
        );
        let lookup = hal.ess_read(regs::reg_port_lookup(3)).unwrap();
        assert_ne!(lookup & regs::PORT_LOOKUP_ING_MIRROR_EN, 0);
        let hol = hal.ess_read(regs::reg_port_hol_ctrl1(3)).unwrap();
        assert_eq!(hol & regs::PORT_HOL_CTRL1_EG_MIRROR_EN, 0);
    }

    #[test]
    fn test_vtu_entry_encoding() {
        let fwd = ForwardingConfig::new(&cfg());
        let entry = fwd.vtu_entry(LAN_VLAN_SLOT);
        assert_ne!(entry & regs::VTU_FUNC0_VALID, 0);
        assert_ne!(entry & regs::VTU_FUNC0_IVL, 0);
        // CPU port tagged, port 1 untagged, port 5 not a member.
        assert_eq!(
            entry >> regs::vtu_func0_eg_mode_s(0) & 0x3,
            regs::VTU_FUNC0_EG_MODE_TAG
        );
        assert_eq!(
            entry >> regs::vtu_func0_eg_mode_s(1) & 0x3,
            regs::VTU_FUNC0_EG_MODE_UNTAG
        );
        assert_eq!(
            entry >> regs::vtu_func0_eg_mode_s(5) & 0x3,
            regs::VTU_FUNC0_EG_MODE_NOT
        );
    }
}
