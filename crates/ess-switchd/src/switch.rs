//! The supervisor context: bring-up, management surface, lifecycle.
//!
//! [`EssSwitch`] owns the HAL handle and every piece of mutable state
//! behind three independent locks:
//!
//! - the configuration lock (forwarding/mirror/VLAN state) — a reader of
//!   the forwarding tables never sees a half-applied pass
//! - the statistics lock (MIB accumulators and the capture register)
//! - the supervisor lock (link state machines), deliberately separate so
//!   link flapping and slow configuration changes cannot starve each other

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use ess_hal::{regs, Hal};

use crate::calib::{self, SelfTestReport};
use crate::config::SwitchConfig;
use crate::error::{SwitchError, SwitchResult};
use crate::link::{self, LinkSupervisor, POLL_INTERVAL};
use crate::mib::{MibStats, MIB_WORK_INTERVAL};
use crate::task::{spawn_periodic, Periodic};
use crate::types::PortLink;
use crate::vlan::{self, ForwardingConfig, MirrorConfig};

/// The switch fabric supervisor.
pub struct EssSwitch {
    hal: Arc<dyn Hal>,
    config: SwitchConfig,
    /// Configuration lock.
    fwd: Mutex<ForwardingConfig>,
    /// Statistics lock.
    mib: Mutex<MibStats>,
    /// Supervisor lock.
    link: Mutex<LinkSupervisor>,
    self_test: StdMutex<Option<SelfTestReport>>,
    cancel: CancellationToken,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl EssSwitch {
    /// Builds an inert supervisor; nothing touches hardware until
    /// [`Self::initialize`].
    pub fn new(hal: Arc<dyn Hal>, config: SwitchConfig) -> SwitchResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            hal,
            fwd: Mutex::new(ForwardingConfig::new(&config)),
            mib: Mutex::new(MibStats::new()),
            link: Mutex::new(LinkSupervisor::new()),
            self_test: StdMutex::new(None),
            cancel: CancellationToken::new(),
            tasks: StdMutex::new(Vec::new()),
            config,
        }))
    }

    /// Full bring-up: fabric reset, PSGMII calibration and self-test,
    /// port and global initialization, forwarding defaults, CPU port
    /// enable, then both periodic tasks.
    ///
    /// A hardware failure anywhere leaves the supervisor inert — the
    /// periodic tasks are spawned last and only on success. A failed
    /// self-test is not a failure here; the report says so and operation
    /// continues best-effort.
    #[instrument(skip(self))]
    pub async fn initialize(self: &Arc<Self>) -> SwitchResult<SelfTestReport> {
        let hal = self.hal.as_ref();
        info!("bringing up switch fabric");

        calib::ess_reset(hal).await?;
        calib::reset_psgmii_interface(hal).await?;
        let report = calib::run_self_test(hal).await?;
        calib::cleanup(hal).await?;
        *self.self_test.lock().unwrap() = Some(report);

        vlan::mac_mode_init(hal, self.config.mac_mode)?;
        for port in 0..regs::NUM_PORTS {
            vlan::init_port(hal, port)?;
        }
        vlan::init_globals(hal)?;

        self.reset_switch().await?;
        vlan::cpuport_setup(hal).await?;

        self.spawn_tasks();
        info!(
            rounds = report.rounds,
            passed = report.passed(),
            "switch fabric up"
        );
        Ok(report)
    }

    /// Stops both periodic tasks, waiting out any in-flight iteration.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
        info!("switch supervisor stopped");
    }

    fn spawn_tasks(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(spawn_periodic(
            Arc::new(LinkTask { sw: self.clone() }),
            POLL_INTERVAL,
            self.cancel.clone(),
        ));
        tasks.push(spawn_periodic(
            Arc::new(MibTask { sw: self.clone() }),
            MIB_WORK_INTERVAL,
            self.cancel.clone(),
        ));
    }

    /// The self-test outcome of the last bring-up, if one ran.
    pub fn self_test_report(&self) -> Option<SelfTestReport> {
        *self.self_test.lock().unwrap()
    }

    // --- global attributes -------------------------------------------------

    /// 802.1Q processing state.
    pub async fn vlan_enabled(&self) -> bool {
        self.fwd.lock().await.vlan_enabled
    }

    /// Sets the 802.1Q processing state; takes effect on the next
    /// [`Self::apply`].
    pub async fn set_vlan_enabled(&self, enabled: bool) {
        self.fwd.lock().await.vlan_enabled = enabled;
    }

    /// Pushes the current forwarding/mirror model into the hardware.
    pub async fn apply(&self) -> SwitchResult<()> {
        let fwd = self.fwd.lock().await;
        fwd.synchronize(self.hal.as_ref()).await
    }

    /// Restores forwarding defaults and synchronizes.
    pub async fn reset_switch(&self) -> SwitchResult<()> {
        let mut fwd = self.fwd.lock().await;
        fwd.reset_defaults(&self.config);
        fwd.synchronize(self.hal.as_ref()).await
    }

    /// Current mirror configuration.
    pub async fn mirror(&self) -> MirrorConfig {
        self.fwd.lock().await.mirror
    }

    /// Enables or disables RX mirroring; reprograms the mirror registers
    /// immediately.
    pub async fn set_mirror_rx(&self, enabled: bool) -> SwitchResult<()> {
        let mut fwd = self.fwd.lock().await;
        fwd.mirror.rx_enabled = enabled;
        fwd.set_mirror_regs(self.hal.as_ref())
    }

    /// Enables or disables TX mirroring.
    pub async fn set_mirror_tx(&self, enabled: bool) -> SwitchResult<()> {
        let mut fwd = self.fwd.lock().await;
        fwd.mirror.tx_enabled = enabled;
        fwd.set_mirror_regs(self.hal.as_ref())
    }

    /// Sets the mirror monitor port.
    pub async fn set_mirror_monitor_port(&self, port: usize) -> SwitchResult<()> {
        if port >= regs::NUM_PORTS {
            return Err(SwitchError::InvalidPort { port });
        }
        let mut fwd = self.fwd.lock().await;
        fwd.mirror.monitor_port = port;
        fwd.set_mirror_regs(self.hal.as_ref())
    }

    /// Sets the mirror source port.
    pub async fn set_mirror_source_port(&self, port: usize) -> SwitchResult<()> {
        if port >= regs::NUM_PORTS {
            return Err(SwitchError::InvalidPort { port });
        }
        let mut fwd = self.fwd.lock().await;
        fwd.mirror.source_port = port;
        fwd.set_mirror_regs(self.hal.as_ref())
    }

    /// Forces every PHY down, or re-initializes them.
    ///
    /// Runs under the supervisor lock so the link state machines never
    /// observe a PHY mid-reconfiguration.
    pub async fn set_phys_down(&self, down: bool) -> SwitchResult<()> {
        let _sup = self.link.lock().await;
        if down {
            link::phy_linkdown(self.hal.as_ref())
        } else {
            link::phy_init(self.hal.as_ref()).await
        }
    }

    /// Zeroes every MIB accumulator and the hardware latches.
    pub async fn reset_all_mibs(&self) -> SwitchResult<()> {
        let mut mib = self.mib.lock().await;
        mib.reset_all(self.hal.as_ref()).await
    }

    // --- per-port attributes -----------------------------------------------

    /// Live MAC-side link status of a port.
    pub async fn port_link(&self, port: usize) -> SwitchResult<PortLink> {
        if port >= regs::NUM_PORTS {
            return Err(SwitchError::InvalidPort { port });
        }
        let status = self.hal.ess_read(regs::reg_port_status(port))?;
        Ok(PortLink::from_status(port, status))
    }

    /// Formatted MIB counter report for a port.
    pub async fn port_mib_report(&self, port: usize) -> SwitchResult<String> {
        let mut mib = self.mib.lock().await;
        mib.port_report(self.hal.as_ref(), port).await
    }

    /// (tx_bytes, rx_bytes) totals for a port.
    pub async fn port_byte_counters(&self, port: usize) -> SwitchResult<(u64, u64)> {
        let mut mib = self.mib.lock().await;
        mib.byte_counters(self.hal.as_ref(), port).await
    }

    /// Zeroes one port's MIB accumulators.
    pub async fn reset_port_mib(&self, port: usize) -> SwitchResult<()> {
        let mut mib = self.mib.lock().await;
        mib.reset_port(self.hal.as_ref(), port).await
    }

    /// A port's default VLAN table slot.
    pub async fn pvid(&self, port: usize) -> SwitchResult<usize> {
        self.fwd.lock().await.pvid(port)
    }

    /// Sets a port's default VLAN table slot.
    pub async fn set_pvid(&self, port: usize, slot: usize) -> SwitchResult<()> {
        self.fwd.lock().await.set_pvid(port, slot)
    }

    // --- per-VLAN attributes -----------------------------------------------

    /// VLAN id of a table slot.
    pub async fn vid(&self, slot: usize) -> SwitchResult<u16> {
        self.fwd.lock().await.vid(slot)
    }

    /// Sets the VLAN id of a table slot.
    pub async fn set_vid(&self, slot: usize, vid: u32) -> SwitchResult<()> {
        self.fwd.lock().await.set_vid(slot, vid)
    }

    /// Member ports of a VLAN slot with their tagged flags.
    pub async fn vlan_ports(&self, slot: usize) -> SwitchResult<Vec<(usize, bool)>> {
        self.fwd.lock().await.vlan_ports(slot)
    }

    /// Replaces a VLAN slot's membership.
    pub async fn set_vlan_ports(
        &self,
        slot: usize,
        members: &[(usize, bool)],
    ) -> SwitchResult<()> {
        self.fwd.lock().await.set_vlan_ports(slot, members)
    }
}

struct LinkTask {
    sw: Arc<EssSwitch>,
}

#[async_trait]
impl Periodic for LinkTask {
    fn name(&self) -> &'static str {
        "link-supervisor"
    }

    async fn tick(&self) {
        let mut sup = self.sw.link.lock().await;
        if let Err(e) = sup.poll_once(self.sw.hal.as_ref()).await {
            warn!(error = %e, "link supervision pass failed");
        }
    }
}

struct MibTask {
    sw: Arc<EssSwitch>,
}

#[async_trait]
impl Periodic for MibTask {
    fn name(&self) -> &'static str {
        "mib-collector"
    }

    async fn tick(&self) {
        let mut mib = self.sw.mib.lock().await;
        if let Err(e) = mib.tick(self.sw.hal.as_ref()).await {
            warn!(error = %e, "MIB collection pass failed");
        }
    }
}
