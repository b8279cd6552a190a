//! PSGMII link self-test and calibration engine.
//!
//! The serial link between the switch MACs and the PHY package is known to
//! intermittently fail clock training after a reset. Status bits alone are
//! not trusted: the engine injects a known frame count through each PHY's
//! embedded packet generator in loopback and demands exact TX counters.
//! Any mismatch re-resets the PSGMII interface and reruns the whole round,
//! up to a fixed bound. Calibration-done status bits are advisory — a poll
//! timeout proceeds to the traffic test, which is authoritative.

use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use ess_hal::poll::poll_until;
use ess_hal::{regs, Hal};

use crate::error::SwitchResult;
use crate::types::port_of_phy;
use crate::vlan::atu_flush;

/// Calibration retry rounds before giving up.
const CALIB_ROUNDS: u32 = 10;

/// Calibration-done poll budget; the PHY-side PLL worst case is under
/// 9 ms on a 25 MHz reference clock.
const CAL_POLL_ATTEMPTS: u32 = 100;
const CAL_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Loopback link-up poll budget, sized to the 802.3 auto-negotiation
/// timing envelope (max wait 750 ms).
const LINK_POLL_ATTEMPTS: u32 = 100;
const LINK_POLL_INTERVAL: Duration = Duration::from_millis(8);

/// Drain time for the injected traffic: 4096 frames of 1524 bytes at
/// 125 MHz is just under 50 ms.
const TRAFFIC_DRAIN: Duration = Duration::from_millis(50);

/// Fabric reset settle time on each edge.
const ESS_RESET_SETTLE: Duration = Duration::from_millis(10);

/// Outcome of a self-test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfTestReport {
    /// Rounds executed (1-based; equals the bound on exhaustion).
    pub rounds: u32,
    /// Ports still failing after the final round; zero means a clean pass.
    pub failed_ports: u8,
}

impl SelfTestReport {
    /// True when every port passed.
    pub fn passed(&self) -> bool {
        self.failed_ports == 0
    }
}

/// Full fabric reset: assert, settle, deassert, then wait for the inner
/// tables to finish initializing.
pub async fn ess_reset(hal: &dyn Hal) -> SwitchResult<()> {
    hal.assert_ess_reset()?;
    tokio::time::sleep(ESS_RESET_SETTLE).await;
    hal.deassert_ess_reset()?;
    tokio::time::sleep(ESS_RESET_SETTLE).await;
    debug!("fabric reset complete");
    Ok(())
}

/// Forces the PHY-side serializer through a reset and retrains both ends
/// of the PSGMII link.
///
/// Failure to observe either calibration-done bit is logged and otherwise
/// ignored; the traffic test decides whether the link actually trained.
#[instrument(skip(hal))]
pub async fn reset_psgmii_interface(hal: &dyn Hal) -> SwitchResult<()> {
    let lane = regs::PSGMII_LANE_PHY;

    // Serializer reset with the RX path pinned to 20-bit mode.
    hal.mdio_write(lane, regs::MII_BMCR, regs::LANE_RX20_RESET_RELEASE)?;
    hal.mdio_write(lane, regs::MII_BMCR, regs::LANE_RESET)?;
    hal.mdio_write(lane, regs::MII_BMCR, regs::LANE_RX20_RESET_RELEASE)?;

    let phy_cal = poll_until(
        CAL_POLL_ATTEMPTS,
        CAL_POLL_INTERVAL,
        || hal.phy_mmd_read(lane, regs::MMD_PCS, regs::MMD_PCS_CAL_STATUS),
        |v| v & regs::MMD_PCS_CAL_DONE != 0,
    )
    .await?;
    if !phy_cal.is_ready() {
        warn!("PHY-side calibration-done not observed, continuing");
    }

    // The CDR must not chase the link while the fabric resets.
    hal.mdio_write(lane, regs::MII_LANE_CDR, regs::LANE_CDR_FREEZE)?;

    ess_reset(hal).await?;

    let ess_cal = poll_until(
        CAL_POLL_ATTEMPTS,
        CAL_POLL_INTERVAL,
        || hal.psgmii_read(regs::PSGMII_CAL_STATUS),
        |v| v & regs::PSGMII_CAL_DONE != 0,
    )
    .await?;
    if !ess_cal.is_ready() {
        warn!("fabric-side calibration-done not observed, continuing");
    }

    hal.mdio_write(lane, regs::MII_LANE_CDR, regs::LANE_CDR_RELEASE)?;
    hal.mdio_write(lane, regs::MII_BMCR, regs::LANE_RELEASE)?;
    Ok(())
}

/// One-time test setup: copper page, broadcast membership, generator
/// frame count and payload size, MDI pinned for loopback.
fn preamble(hal: &dyn Hal) -> SwitchResult<()> {
    hal.mdio_write(
        regs::NUM_PHYS as u8 - 1,
        regs::MII_PAGE_SELECT,
        regs::PAGE_COPPER,
    )?;
    for phy in 0..regs::NUM_PHYS as u8 {
        hal.phy_mmd_write(phy, regs::MMD_AN, regs::MMD_AN_MDIO_BCAST, regs::MDIO_BCAST_JOIN)?;
    }
    hal.mdio_write(
        regs::MDIO_BROADCAST,
        regs::MII_BMCR,
        regs::BMCR_ANENABLE | regs::BMCR_PDOWN | regs::BMCR_SPEED1000,
    )?;
    hal.phy_mmd_write(
        regs::MDIO_BROADCAST,
        regs::MMD_AN,
        regs::MMD_AN_GEN_PKT_COUNT,
        regs::GEN_PKT_COUNT,
    )?;
    hal.phy_mmd_write(
        regs::MDIO_BROADCAST,
        regs::MMD_AN,
        regs::MMD_AN_GEN_PKT_SIZE,
        regs::GEN_PKT_SIZE,
    )?;
    hal.mdio_write(
        regs::MDIO_BROADCAST,
        regs::MII_PHY_SPEC_CONTROL,
        regs::PHY_SPEC_CONTROL_MDI_TEST,
    )?;
    Ok(())
}

/// Reads one PHY's generator counters and applies the pass rule: the TX
/// good count must equal the injected count exactly with zero TX errors.
fn check_counters(hal: &dyn Hal, phy: u8) -> SwitchResult<bool> {
    let tx_ok = hal.phy_mmd_read(phy, regs::MMD_AN, regs::MMD_AN_TX_OK)? as u32;
    let tx_ok_hi = hal.phy_mmd_read(phy, regs::MMD_AN, regs::MMD_AN_TX_OK_HI)? as u32;
    let tx_err = hal.phy_mmd_read(phy, regs::MMD_AN, regs::MMD_AN_TX_ERR)?;
    let rx_ok = hal.phy_mmd_read(phy, regs::MMD_AN, regs::MMD_AN_RX_OK)? as u32;
    let rx_ok_hi = hal.phy_mmd_read(phy, regs::MMD_AN, regs::MMD_AN_RX_OK_HI)? as u32;
    let rx_err = hal.phy_mmd_read(phy, regs::MMD_AN, regs::MMD_AN_RX_ERR)?;

    let tx_all = tx_ok | tx_ok_hi << 16;
    let rx_all = rx_ok | rx_ok_hi << 16;
    let pass = tx_all == regs::GEN_PKT_COUNT as u32 && tx_err == 0;
    debug!(phy, tx_all, tx_err, rx_all, rx_err, pass, "loopback counters");
    Ok(pass)
}

/// Arms the checker and fires the generator on `addr` (a PHY or the
/// broadcast address), then lets the traffic drain.
async fn run_generator(hal: &dyn Hal, addr: u8) -> SwitchResult<()> {
    hal.phy_mmd_write(addr, regs::MMD_AN, regs::MMD_AN_CHECK_CTRL, 0)?;
    hal.phy_mmd_write(addr, regs::MMD_AN, regs::MMD_AN_CHECK_CTRL, regs::CHECK_CTRL_ARM)?;
    hal.phy_mmd_write(addr, regs::MMD_AN, regs::MMD_AN_GEN_CTRL, regs::GEN_CTRL_START)?;
    tokio::time::sleep(TRAFFIC_DRAIN).await;
    Ok(())
}

/// Tests one PHY alone: fixed-speed loopback, power cycle, injected
/// traffic, exact-count verdict.
async fn single_port_test(hal: &dyn Hal, phy: u8) -> SwitchResult<bool> {
    hal.mdio_write(phy, regs::MII_BMCR, regs::BMCR_RESET | regs::BMCR_ANENABLE)?;
    hal.mdio_write(
        phy,
        regs::MII_BMCR,
        regs::BMCR_LOOPBACK | regs::BMCR_FULLDPLX | regs::BMCR_SPEED1000,
    )?;

    let link = poll_until(
        LINK_POLL_ATTEMPTS,
        LINK_POLL_INTERVAL,
        || hal.mdio_read(phy, regs::MII_PHY_SPEC_STATUS),
        |v| v & regs::PHY_SPEC_STATUS_LINK != 0,
    )
    .await?;
    if !link.is_ready() {
        warn!(phy, "loopback link never came up");
    }

    run_generator(hal, phy).await?;
    let pass = check_counters(hal, phy)?;

    hal.mdio_write(
        phy,
        regs::MII_BMCR,
        regs::BMCR_ANENABLE | regs::BMCR_PDOWN | regs::BMCR_SPEED1000,
    )?;
    Ok(pass)
}

/// Tests all PHYs at once through the broadcast address; returns the mask
/// of failing ports.
async fn all_ports_test(hal: &dyn Hal) -> SwitchResult<u8> {
    hal.mdio_write(
        regs::MDIO_BROADCAST,
        regs::MII_BMCR,
        regs::BMCR_RESET | regs::BMCR_ANENABLE,
    )?;
    hal.mdio_write(
        regs::MDIO_BROADCAST,
        regs::MII_BMCR,
        regs::BMCR_LOOPBACK | regs::BMCR_FULLDPLX | regs::BMCR_SPEED1000,
    )?;

    let all_up = poll_until(
        LINK_POLL_ATTEMPTS,
        LINK_POLL_INTERVAL,
        || {
            for phy in 0..regs::NUM_PHYS as u8 {
                let status = hal.mdio_read(phy, regs::MII_PHY_SPEC_STATUS)?;
                if status & regs::PHY_SPEC_STATUS_LINK == 0 {
                    return Ok(false);
                }
            }
            Ok(true)
        },
        |up| *up,
    )
    .await?;
    if !all_up.is_ready() {
        warn!("not every loopback link came up");
    }

    run_generator(hal, regs::MDIO_BROADCAST).await?;

    let mut failed = 0u8;
    for phy in 0..regs::NUM_PHYS as u8 {
        if !check_counters(hal, phy)? {
            failed |= 1 << port_of_phy(phy);
        }
    }
    Ok(failed)
}

/// One calibration round: MAC loopback on every PHY port, each port
/// tested alone, then all ports together.
async fn run_round(hal: &dyn Hal) -> SwitchResult<u8> {
    for phy in 0..regs::NUM_PHYS as u8 {
        hal.ess_rmw(
            regs::reg_port_lookup(port_of_phy(phy)),
            regs::PORT_LOOKUP_LOOPBACK,
            regs::PORT_LOOKUP_LOOPBACK,
        )?;
    }

    let mut failed = 0u8;
    for phy in 0..regs::NUM_PHYS as u8 {
        if !single_port_test(hal, phy).await? {
            failed |= 1 << port_of_phy(phy);
        }
    }
    failed |= all_ports_test(hal).await?;
    Ok(failed)
}

/// Runs the calibration loop: test, and on any failure retrain the
/// PSGMII interface and try again, up to the round bound.
///
/// Exhaustion is non-fatal by design — the fabric may still pass some
/// traffic, and refusing to come up would leave the device unmanageable.
/// The report carries the verdict either way.
#[instrument(skip(hal))]
pub async fn run_self_test(hal: &dyn Hal) -> SwitchResult<SelfTestReport> {
    preamble(hal)?;

    let mut failed = 0u8;
    let mut rounds = 0;
    for round in 0..CALIB_ROUNDS {
        rounds = round + 1;
        failed = run_round(hal).await?;
        if failed == 0 {
            break;
        }
        warn!(round, "loopback traffic test failed for ports {failed:#x}, retraining PSGMII");
        reset_psgmii_interface(hal).await?;
    }

    if failed != 0 {
        error!(rounds, "PSGMII link did not recover for ports {failed:#x}, fabric may be degraded");
    } else {
        info!(resets = rounds - 1, "PSGMII link calibrated");
    }

    // Generator shutdown happens regardless of the verdict.
    hal.phy_mmd_write(regs::MDIO_BROADCAST, regs::MMD_AN, regs::MMD_AN_GEN_PKT_COUNT, 0)?;
    hal.phy_mmd_write(regs::MDIO_BROADCAST, regs::MMD_AN, regs::MMD_AN_CHECK_CTRL, 0)?;
    hal.phy_mmd_write(regs::MDIO_BROADCAST, regs::MMD_AN, regs::MMD_AN_GEN_CTRL, 0)?;

    Ok(SelfTestReport {
        rounds,
        failed_ports: failed,
    })
}

/// Restores the fabric after the self-test: loopbacks off, broadcast
/// membership left, LEDs and MDI back to normal, learned addresses
/// flushed. Runs exactly once, whatever the test outcome was.
#[instrument(skip(hal))]
pub async fn cleanup(hal: &dyn Hal) -> SwitchResult<()> {
    hal.mdio_write(
        regs::MDIO_BROADCAST,
        regs::MII_PHY_SPEC_CONTROL,
        regs::PHY_SPEC_CONTROL_MDI_NORMAL,
    )?;
    hal.mdio_write(
        regs::MDIO_BROADCAST,
        regs::MII_BMCR,
        regs::BMCR_RESET | regs::BMCR_ANENABLE | regs::BMCR_SPEED1000,
    )?;
    hal.phy_mmd_write(
        regs::MDIO_BROADCAST,
        regs::MMD_AN,
        regs::MMD_AN_LED_CTRL,
        regs::LED_CTRL_DEFAULT,
    )?;

    for phy in 0..regs::NUM_PHYS as u8 {
        hal.ess_rmw(
            regs::reg_port_lookup(port_of_phy(phy)),
            regs::PORT_LOOKUP_LOOPBACK,
            0,
        )?;
        hal.phy_mmd_write(phy, regs::MMD_AN, regs::MMD_AN_MDIO_BCAST, regs::MDIO_BCAST_LEAVE)?;
    }

    atu_flush(hal).await
}
