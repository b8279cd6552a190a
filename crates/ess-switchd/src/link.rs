//! Link supervisor and queue-manager erratum workaround.
//!
//! A periodic task polls each PHY port's negotiated state and reacts to
//! link *edges*, never levels. The queue manager can latch stale frames in
//! a port's queue across a link-down event; re-enabling the MAC while the
//! queue is occupied wedges the port. The workaround: on every down edge
//! the MAC is taken out of automatic link-follow mode and the queue
//! occupancy is checked — a non-empty queue parks the port as suspect
//! until the queue drains, an empty one gets the safe 1000FD baseline
//! immediately.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use ess_hal::{regs, Hal};

use crate::error::{SwitchError, SwitchResult};
use crate::types::{phy_addr, Duplex, PhyStatus, Speed};

/// Supervisor poll cadence.
pub const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Clock-switch settle time around forced-mode updates on relink.
const RELINK_SETTLE: Duration = Duration::from_micros(100);

/// Consecutive up observations required before the MAC is re-enabled.
const LINK_UP_CONFIRMATIONS: u8 = 2;

/// PHY reset completion budget; 802.3 allows up to 500 ms.
const PHY_RESET_ATTEMPTS: u32 = 500;
const PHY_RESET_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkLevel {
    Up,
    Down,
}

/// Queue-manager occupancy verdict for a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QmState {
    /// Queue drained; port may run in follow mode.
    Clear,
    /// Queue held frames at link down; recheck every poll until empty.
    Suspect,
}

/// Per-port link state machine driving the erratum workaround.
pub struct LinkSupervisor {
    old_link: [LinkLevel; regs::NUM_PORTS],
    pending_up: [u8; regs::NUM_PORTS],
    qm_state: [QmState; regs::NUM_PORTS],
    qm_err_count: [u32; regs::NUM_PORTS],
}

impl LinkSupervisor {
    /// All ports start presumed down with drained queues.
    pub fn new() -> Self {
        Self {
            old_link: [LinkLevel::Down; regs::NUM_PORTS],
            pending_up: [0; regs::NUM_PORTS],
            qm_state: [QmState::Clear; regs::NUM_PORTS],
            qm_err_count: [0; regs::NUM_PORTS],
        }
    }

    /// Current queue verdict for a port.
    pub fn qm_state(&self, port: usize) -> QmState {
        self.qm_state[port]
    }

    /// One supervision pass over every PHY port.
    #[instrument(skip(self, hal))]
    pub async fn poll_once(&mut self, hal: &dyn Hal) -> SwitchResult<()> {
        for port in 1..regs::NUM_PORTS {
            let Some(phy) = phy_addr(port) else {
                continue;
            };
            let status =
                PhyStatus::from_spec_status(hal.mdio_read(phy, regs::MII_PHY_SPEC_STATUS)?);
            let level = if status.link {
                LinkLevel::Up
            } else {
                LinkLevel::Down
            };

            match (self.old_link[port], level) {
                (LinkLevel::Up, LinkLevel::Down) => self.handle_link_down(hal, port)?,
                (LinkLevel::Down, LinkLevel::Up) => {
                    self.handle_link_up(hal, port, status).await?
                }
                (LinkLevel::Down, LinkLevel::Down) => {
                    // A bounce that fell back down forfeits its debounce
                    // credit; recovery needs two consecutive up polls.
                    self.pending_up[port] = 0;
                }
                (LinkLevel::Up, LinkLevel::Up) => {}
            }

            if self.qm_state[port] == QmState::Suspect {
                self.recheck_queue(hal, port)?;
            }
        }
        Ok(())
    }

    /// Up → down edge: freeze the MAC, then decide whether the queue held
    /// stale frames.
    fn handle_link_down(&mut self, hal: &dyn Hal, port: usize) -> SwitchResult<()> {
        hal.ess_rmw(regs::reg_port_status(port), regs::PORT_AUTO_LINK_EN, 0)?;

        self.qm_err_count[port] = 0;
        let occupancy = qm_occupancy(hal, port)?;
        if occupancy != 0 {
            warn!(port, occupancy, "queue held frames at link down, parking port");
            self.qm_state[port] = QmState::Suspect;
        } else {
            self.qm_state[port] = QmState::Clear;
            force_1g_full(hal, port)?;
            // A set manual-control bit can wedge the PHY in 100BASE-T on
            // the next link up.
            update_manual_ctrl(hal, port, false)?;
        }

        self.old_link[port] = LinkLevel::Down;
        self.pending_up[port] = 0;
        info!(port, "link down");
        Ok(())
    }

    /// Down → up observation: act only on the second consecutive one.
    async fn handle_link_up(
        &mut self,
        hal: &dyn Hal,
        port: usize,
        status: PhyStatus,
    ) -> SwitchResult<()> {
        self.pending_up[port] += 1;
        if self.pending_up[port] < LINK_UP_CONFIRMATIONS {
            debug!(port, "link up observed once, waiting for confirmation");
            return Ok(());
        }
        self.pending_up[port] = 0;

        let reg = regs::reg_port_status(port);
        let mut value = hal.ess_read(reg)?;
        value &= !(regs::PORT_DUPLEX | regs::PORT_SPEED_MASK);
        if let Some(speed) = status.speed {
            value |= speed.field();
        }
        if status.duplex == Duplex::Full {
            value |= regs::PORT_DUPLEX;
        }
        hal.ess_write(reg, value)?;
        // The MAC clock switches on the forced-mode write; enabling
        // follow mode inside the switch window glitches the link.
        tokio::time::sleep(RELINK_SETTLE).await;

        value |= regs::PORT_AUTO_LINK_EN;
        hal.ess_write(reg, value)?;
        tokio::time::sleep(RELINK_SETTLE).await;

        if status.speed == Some(Speed::M100) {
            // At 100M the manual-control bit must be held so a later
            // fallback to 10M switches clocks cleanly.
            update_manual_ctrl(hal, port, true)?;
        }

        self.old_link[port] = LinkLevel::Up;
        info!(port, speed = ?status.speed, duplex = ?status.duplex, "link up");
        Ok(())
    }

    /// Suspect steady state: wait for the queue to drain, then restore
    /// the safe baseline.
    fn recheck_queue(&mut self, hal: &dyn Hal, port: usize) -> SwitchResult<()> {
        let occupancy = qm_occupancy(hal, port)?;
        if occupancy != 0 {
            self.qm_err_count[port] += 1;
            debug!(
                port,
                occupancy,
                polls = self.qm_err_count[port],
                "queue still occupied"
            );
        } else {
            info!(port, "queue drained, recovering port");
            self.qm_state[port] = QmState::Clear;
            self.qm_err_count[port] = 0;
            force_1g_full(hal, port)?;
        }
        Ok(())
    }
}

impl Default for LinkSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a port's queue occupancy through the QM debug pair.
///
/// Two grouped status words cover ports 1-3 and 4-6, eight bits each.
/// The CPU port has no queue-occupancy slot.
pub fn qm_occupancy(hal: &dyn Hal, port: usize) -> SwitchResult<u32> {
    if !(1..regs::NUM_PORTS).contains(&port) {
        return Err(SwitchError::InvalidPort { port });
    }
    let (group, shift) = if port < 4 {
        (regs::QM_PORT0_3_QNUM, 8 * port as u32)
    } else {
        (regs::QM_PORT4_6_QNUM, 8 * (port as u32 - 4))
    };
    hal.ess_write(regs::REG_QM_DEBUG_ADDR, group)?;
    let val = hal.ess_read(regs::REG_QM_DEBUG_VALUE)?;
    Ok(val >> shift & 0xff)
}

/// Forces a port's MAC to the 1000 Mb/s full-duplex safe baseline.
fn force_1g_full(hal: &dyn Hal, port: usize) -> SwitchResult<()> {
    hal.ess_rmw(
        regs::reg_port_status(port),
        regs::PORT_SPEED_MASK | regs::PORT_DUPLEX,
        regs::PORT_SPEED_1000M | regs::PORT_DUPLEX,
    )?;
    Ok(())
}

/// Sets or clears the PHY debug manual-control bit.
fn update_manual_ctrl(hal: &dyn Hal, port: usize, set: bool) -> SwitchResult<()> {
    let phy = phy_addr(port).ok_or(SwitchError::InvalidPort { port })?;
    let mut val = hal.phy_dbg_read(phy, regs::PHY_DEBUG_0)?;
    if set {
        val |= regs::PHY_MANU_CTRL_EN;
    } else {
        val &= !regs::PHY_MANU_CTRL_EN;
    }
    hal.phy_dbg_write(phy, regs::PHY_DEBUG_0, val)?;
    Ok(())
}

/// Re-initializes every PHY: autoneg advertisement restored, reset issued,
/// and the reset completion polled out.
pub async fn phy_init(hal: &dyn Hal) -> SwitchResult<()> {
    for phy in 0..regs::NUM_PHYS as u8 {
        let val = hal.phy_dbg_read(phy, regs::PHY_DEBUG_0)?;
        hal.phy_dbg_write(phy, regs::PHY_DEBUG_0, val & !regs::PHY_MANU_CTRL_EN)?;
        hal.mdio_write(
            phy,
            regs::MII_ADVERTISE,
            regs::ADVERTISE_ALL | regs::ADVERTISE_PAUSE_CAP | regs::ADVERTISE_PAUSE_ASYM,
        )?;
        hal.mdio_write(phy, regs::MII_CTRL1000, regs::ADVERTISE_1000FULL)?;
        hal.mdio_write(phy, regs::MII_BMCR, regs::BMCR_RESET | regs::BMCR_ANENABLE)?;
    }
    phy_poll_reset(hal).await
}

/// Forces every PHY down: advertisement withdrawn, transmit disabled,
/// manual control held.
pub fn phy_linkdown(hal: &dyn Hal) -> SwitchResult<()> {
    for phy in 0..regs::NUM_PHYS as u8 {
        hal.mdio_write(phy, regs::MII_CTRL1000, 0)?;
        hal.mdio_write(phy, regs::MII_ADVERTISE, 0)?;
        hal.mdio_write(phy, regs::MII_BMCR, regs::BMCR_RESET | regs::BMCR_ANENABLE)?;
        let val = hal.phy_dbg_read(phy, regs::PHY_DEBUG_0)?;
        hal.phy_dbg_write(phy, regs::PHY_DEBUG_0, val | regs::PHY_MANU_CTRL_EN)?;
        let val = hal.phy_dbg_read(phy, regs::PHY_DEBUG_2)?;
        hal.phy_dbg_write(phy, regs::PHY_DEBUG_2, val & regs::PHY_DEBUG_2_TX_KEEP)?;
    }
    Ok(())
}

/// Polls all PHYs out of BMCR reset, within the 802.3 envelope.
async fn phy_poll_reset(hal: &dyn Hal) -> SwitchResult<()> {
    let mut in_reset: u32 = (1 << regs::NUM_PHYS) - 1;
    for _ in 0..PHY_RESET_ATTEMPTS {
        tokio::time::sleep(PHY_RESET_INTERVAL).await;
        for phy in 0..regs::NUM_PHYS as u8 {
            if in_reset & (1 << phy) == 0 {
                continue;
            }
            let val = hal.mdio_read(phy, regs::MII_BMCR)?;
            if val & regs::BMCR_RESET == 0 {
                in_reset &= !(1 << phy);
            }
        }
        if in_reset == 0 {
            return Ok(());
        }
    }
    warn!("not all PHYs left reset (mask {in_reset:#x})");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ess_hal::mock::{MockHal, Op};

    /// PHY status word: link up, 1000M, full duplex.
    const UP_1000F: u16 = regs::PHY_SPEC_STATUS_LINK
        | regs::PHY_SPEC_STATUS_DUPLEX
        | (2 << regs::PHY_SPEC_STATUS_SPEED_S);
    /// PHY status word: link up, 100M, full duplex.
    const UP_100F: u16 = regs::PHY_SPEC_STATUS_LINK
        | regs::PHY_SPEC_STATUS_DUPLEX
        | (1 << regs::PHY_SPEC_STATUS_SPEED_S);
    const DOWN: u16 = 0;

    fn qm_addr_writes(hal: &MockHal) -> usize {
        hal.ops()
            .iter()
            .filter(|op| matches!(op, Op::EssWrite { reg, .. } if *reg == regs::REG_QM_DEBUG_ADDR))
            .count()
    }

    #[test]
    fn test_qm_occupancy_decode() {
        let hal = MockHal::new();
        hal.set_ess(regs::REG_QM_DEBUG_VALUE, 0x0403_0201);
        assert_eq!(qm_occupancy(&hal, 1).unwrap(), 0x02);
        assert_eq!(qm_occupancy(&hal, 3).unwrap(), 0x04);
        assert_eq!(qm_occupancy(&hal, 4).unwrap(), 0x01);
        assert_eq!(qm_occupancy(&hal, 5).unwrap(), 0x02);

        // Group register selection goes through the debug address.
        qm_occupancy(&hal, 2).unwrap();
        assert_eq!(
            hal.ess_read(regs::REG_QM_DEBUG_ADDR).unwrap(),
            regs::QM_PORT0_3_QNUM
        );
        qm_occupancy(&hal, 5).unwrap();
        assert_eq!(
            hal.ess_read(regs::REG_QM_DEBUG_ADDR).unwrap(),
            regs::QM_PORT4_6_QNUM
        );
    }

    #[test]
    fn test_qm_occupancy_rejects_cpu_port() {
        let hal = MockHal::new();
        assert_eq!(
            qm_occupancy(&hal, regs::CPU_PORT),
            Err(SwitchError::InvalidPort { port: 0 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_down_edge_activates_workaround_once() {
        let hal = MockHal::new();
        let mut sup = LinkSupervisor::new();
        // Port 1 confirmed up; the next polls observe (DOWN, DOWN).
        sup.old_link[1] = LinkLevel::Up;
        hal.set_mdio(0, regs::MII_PHY_SPEC_STATUS, DOWN);

        sup.poll_once(&hal).await.unwrap();
        sup.poll_once(&hal).await.unwrap();

        // Exactly one queue query: the edge fired once, the level did not
        // re-trigger it.
        assert_eq!(qm_addr_writes(&hal), 1);
        assert_eq!(sup.qm_state(1), QmState::Clear);
        // The MAC was frozen and forced to the 1000FD baseline.
        let status = hal.ess_read(regs::reg_port_status(1)).unwrap();
        assert_eq!(status & regs::PORT_AUTO_LINK_EN, 0);
        assert_eq!(status & regs::PORT_SPEED_MASK, regs::PORT_SPEED_1000M);
        assert_ne!(status & regs::PORT_DUPLEX, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_down_edge_with_occupied_queue_parks_port() {
        let hal = MockHal::new();
        let mut sup = LinkSupervisor::new();
        sup.old_link[1] = LinkLevel::Up;
        hal.set_mdio(0, regs::MII_PHY_SPEC_STATUS, DOWN);
        hal.set_ess(regs::REG_QM_DEBUG_VALUE, 0x05 << 8);

        sup.poll_once(&hal).await.unwrap();
        assert_eq!(sup.qm_state(1), QmState::Suspect);
        // No forced baseline while suspect.
        let status = hal.ess_read(regs::reg_port_status(1)).unwrap();
        assert_eq!(status & regs::PORT_SPEED_MASK, 0);

        // Queue drains: the next poll recovers the port.
        hal.set_ess(regs::REG_QM_DEBUG_VALUE, 0);
        sup.poll_once(&hal).await.unwrap();
        assert_eq!(sup.qm_state(1), QmState::Clear);
        let status = hal.ess_read(regs::reg_port_status(1)).unwrap();
        assert_eq!(status & regs::PORT_SPEED_MASK, regs::PORT_SPEED_1000M);
    }

    #[tokio::test(start_paused = true)]
    async fn test_up_debounce_requires_two_consecutive_observations() {
        let hal = MockHal::new();
        let mut sup = LinkSupervisor::new();
        hal.script_mdio(0, regs::MII_PHY_SPEC_STATUS, [DOWN, UP_1000F, DOWN, UP_1000F]);

        for _ in 0..4 {
            sup.poll_once(&hal).await.unwrap();
        }
        // Every up observation was a single one; the recovery action
        // (a port-status write) never ran.
        assert!(hal
            .ops()
            .iter()
            .all(|op| !matches!(op, Op::EssWrite { reg, .. } if *reg == regs::reg_port_status(1))));

        // A second consecutive up confirms.
        hal.script_mdio(0, regs::MII_PHY_SPEC_STATUS, [UP_1000F]);
        sup.poll_once(&hal).await.unwrap();
        let status = hal.ess_read(regs::reg_port_status(1)).unwrap();
        assert_ne!(status & regs::PORT_AUTO_LINK_EN, 0);
        assert_eq!(status & regs::PORT_SPEED_MASK, regs::PORT_SPEED_1000M);
        assert_ne!(status & regs::PORT_DUPLEX, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_100m_relink_sets_manual_ctrl() {
        let hal = MockHal::new();
        let mut sup = LinkSupervisor::new();
        hal.set_mdio(0, regs::MII_PHY_SPEC_STATUS, UP_100F);

        sup.poll_once(&hal).await.unwrap();
        assert_eq!(hal.dbg(0, regs::PHY_DEBUG_0) & regs::PHY_MANU_CTRL_EN, 0);
        sup.poll_once(&hal).await.unwrap();
        assert_ne!(hal.dbg(0, regs::PHY_DEBUG_0) & regs::PHY_MANU_CTRL_EN, 0);

        let status = hal.ess_read(regs::reg_port_status(1)).unwrap();
        assert_eq!(status & regs::PORT_SPEED_MASK, regs::PORT_SPEED_100M);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phy_init_polls_reset_completion() {
        let hal = MockHal::new();
        for phy in 0..regs::NUM_PHYS as u8 {
            // First BMCR read still in reset, second clear.
            hal.script_mdio(phy, regs::MII_BMCR, [regs::BMCR_RESET, 0]);
        }
        phy_init(&hal).await.unwrap();
        for phy in 0..regs::NUM_PHYS as u8 {
            // Advertisement restored on every PHY.
            assert_eq!(
                hal.mdio_read(phy, regs::MII_CTRL1000).unwrap(),
                regs::ADVERTISE_1000FULL
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_phy_linkdown_withdraws_advertisement() {
        let hal = MockHal::new();
        hal.set_dbg(2, regs::PHY_DEBUG_2, 0xffff);
        phy_linkdown(&hal).unwrap();
        for phy in 0..regs::NUM_PHYS as u8 {
            assert_eq!(hal.mdio_read(phy, regs::MII_ADVERTISE).unwrap(), 0);
            assert_ne!(hal.dbg(phy, regs::PHY_DEBUG_0) & regs::PHY_MANU_CTRL_EN, 0);
        }
        assert_eq!(hal.dbg(2, regs::PHY_DEBUG_2), regs::PHY_DEBUG_2_TX_KEEP);
    }
}
