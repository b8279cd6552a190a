//! ess-switchd daemon entry point.
//!
//! Initializes logging, loads the host-supplied configuration, builds the
//! register transport, runs the bring-up sequence, and supervises until
//! shutdown.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ess_hal::mmio::DevMemHal;
use ess_hal::mock::MockHal;
use ess_hal::Hal;
use ess_switchd::{EssSwitch, PlatformConfig, SwitchConfig};

#[derive(Debug, Parser)]
#[command(name = "ess-switchd", about = "ESS switch fabric supervisor")]
struct Cli {
    /// Path to the switch configuration file.
    #[arg(short, long, default_value = "/etc/ess-switchd.json")]
    config: PathBuf,

    /// Log filter when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn build_hal(config: &SwitchConfig) -> anyhow::Result<Arc<dyn Hal>> {
    match &config.platform {
        PlatformConfig::Mock => {
            warn!("mock platform backend selected, no hardware will be touched");
            Ok(Arc::new(MockHal::new()))
        }
        PlatformConfig::DevMem {
            switch_base,
            psgmii_base,
            mdio_dev,
            reset_ctrl,
        } => {
            let hal = DevMemHal::new(*switch_base, *psgmii_base, mdio_dev, reset_ctrl)
                .context("mapping switch hardware")?;
            Ok(Arc::new(hal))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SwitchConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let hal = build_hal(&config)?;

    let switch = EssSwitch::new(hal, config)?;
    let report = switch.initialize().await.context("fabric bring-up")?;
    if !report.passed() {
        warn!(
            "self-test did not pass (failed ports {:#x}), fabric may be degraded",
            report.failed_ports
        );
    }

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    switch.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    info!("--- starting ess-switchd ---");
    match run(cli).await {
        Ok(()) => {
            info!("ess-switchd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("ess-switchd error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
