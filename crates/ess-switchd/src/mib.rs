//! Statistics collector.
//!
//! The hardware keeps MIB counters in a per-port register block that is
//! latched by a capture command and cleared on capture. Every captured
//! value is therefore an unsigned delta since the previous capture, and
//! accumulating deltas into 64-bit totals is wraparound-safe without any
//! subtraction trickery.
//!
//! The scheduled task captures one port per tick, round-robining across
//! ports; on-demand reads share the capture primitive and the statistics
//! lock so the two can never interleave on the capture-busy register.

use std::fmt::Write as _;
use std::time::Duration;

use tracing::instrument;

use ess_hal::poll::wait_reg;
use ess_hal::{regs, Hal};

use crate::error::{SwitchError, SwitchResult};

/// Collector cadence.
pub const MIB_WORK_INTERVAL: Duration = Duration::from_secs(3);

/// Capture-busy wait budget.
const MIB_WAIT_ATTEMPTS: u32 = 10;
const MIB_WAIT_INTERVAL: Duration = Duration::from_millis(1);

/// One hardware counter: register word count, offset in the port's stats
/// block, report name.
#[derive(Debug, Clone, Copy)]
pub struct MibDesc {
    pub words: u32,
    pub offset: u32,
    pub name: &'static str,
}

const fn d(words: u32, offset: u32, name: &'static str) -> MibDesc {
    MibDesc {
        words,
        offset,
        name,
    }
}

/// The counter layout of one port's statistics block.
pub const MIB_DESCS: &[MibDesc] = &[
    d(1, 0x00, "RxBroad"),
    d(1, 0x04, "RxPause"),
    d(1, 0x08, "RxMulti"),
    d(1, 0x0c, "RxFcsErr"),
    d(1, 0x10, "RxAlignErr"),
    d(1, 0x14, "RxRunt"),
    d(1, 0x18, "RxFragment"),
    d(1, 0x1c, "Rx64Byte"),
    d(1, 0x20, "Rx128Byte"),
    d(1, 0x24, "Rx256Byte"),
    d(1, 0x28, "Rx512Byte"),
    d(1, 0x2c, "Rx1024Byte"),
    d(1, 0x30, "Rx1518Byte"),
    d(1, 0x34, "RxMaxByte"),
    d(1, 0x38, "RxTooLong"),
    d(2, 0x3c, "RxGoodByte"),
    d(2, 0x44, "RxBadByte"),
    d(1, 0x4c, "RxOverFlow"),
    d(1, 0x50, "Filtered"),
    d(1, 0x54, "TxBroad"),
    d(1, 0x58, "TxPause"),
    d(1, 0x5c, "TxMulti"),
    d(1, 0x60, "TxUnderRun"),
    d(1, 0x64, "Tx64Byte"),
    d(1, 0x68, "Tx128Byte"),
    d(1, 0x6c, "Tx256Byte"),
    d(1, 0x70, "Tx512Byte"),
    d(1, 0x74, "Tx1024Byte"),
    d(1, 0x78, "Tx1518Byte"),
    d(1, 0x7c, "TxMaxByte"),
    d(1, 0x80, "TxOverSize"),
    d(2, 0x84, "TxByte"),
    d(1, 0x8c, "TxCollision"),
    d(1, 0x90, "TxAbortCol"),
    d(1, 0x94, "TxMultiCol"),
    d(1, 0x98, "TxSingleCol"),
    d(1, 0x9c, "TxExcDefer"),
    d(1, 0xa0, "TxDefer"),
    d(1, 0xa4, "TxLateCol"),
];

/// Number of counters per port.
pub const NUM_MIBS: usize = MIB_DESCS.len();

/// Accumulator index of the TxByte counter (checked by a test against the
/// descriptor table, so a table edit cannot silently skew the byte stats).
const TXBYTE_IDX: usize = 31;
/// Accumulator index of the RxGoodByte counter.
const RXGOODBYTE_IDX: usize = 15;

/// Per-port 64-bit running totals plus the round-robin cursor.
pub struct MibStats {
    counters: [[u64; NUM_MIBS]; regs::NUM_PORTS],
    next_port: usize,
}

impl MibStats {
    /// All totals start at zero.
    pub fn new() -> Self {
        Self {
            counters: [[0; NUM_MIBS]; regs::NUM_PORTS],
            next_port: 0,
        }
    }

    fn check_port(port: usize) -> SwitchResult<()> {
        if port >= regs::NUM_PORTS {
            return Err(SwitchError::InvalidPort { port });
        }
        Ok(())
    }

    /// Reads one port's captured block and folds it into the totals.
    fn fetch_port(&mut self, hal: &dyn Hal, port: usize) -> SwitchResult<()> {
        let base = regs::REG_PORT_STATS_START + regs::REG_PORT_STATS_LEN * port as u32;
        for (i, desc) in MIB_DESCS.iter().enumerate() {
            let mut val = hal.ess_read(base + desc.offset)? as u64;
            if desc.words == 2 {
                let hi = hal.ess_read(base + desc.offset + 4)? as u64;
                val |= hi << 32;
            }
            self.counters[port][i] = self.counters[port][i].wrapping_add(val);
        }
        Ok(())
    }

    /// One scheduled collection pass: captures the hardware and folds the
    /// cursor port's block in. The cursor advances even when the capture
    /// times out, so one stuck capture cannot starve the other ports.
    #[instrument(skip(self, hal))]
    pub async fn tick(&mut self, hal: &dyn Hal) -> SwitchResult<usize> {
        let port = self.next_port;
        self.next_port = (self.next_port + 1) % regs::NUM_PORTS;
        capture(hal).await?;
        self.fetch_port(hal, port)?;
        Ok(port)
    }

    /// Captures and renders one port's full counter set.
    pub async fn port_report(&mut self, hal: &dyn Hal, port: usize) -> SwitchResult<String> {
        Self::check_port(port)?;
        capture(hal).await?;
        self.fetch_port(hal, port)?;

        let mut out = format!("Port {port} MIB counters\n");
        for (i, desc) in MIB_DESCS.iter().enumerate() {
            let _ = writeln!(out, "{:<12}: {}", desc.name, self.counters[port][i]);
        }
        Ok(out)
    }

    /// Captures and returns one port's (tx_bytes, rx_bytes) totals.
    pub async fn byte_counters(&mut self, hal: &dyn Hal, port: usize) -> SwitchResult<(u64, u64)> {
        Self::check_port(port)?;
        capture(hal).await?;
        self.fetch_port(hal, port)?;
        Ok((
            self.counters[port][TXBYTE_IDX],
            self.counters[port][RXGOODBYTE_IDX],
        ))
    }

    /// Zeroes one port's software totals; a capture first consumes the
    /// pending hardware deltas so they cannot leak into the next pass.
    pub async fn reset_port(&mut self, hal: &dyn Hal, port: usize) -> SwitchResult<()> {
        Self::check_port(port)?;
        capture(hal).await?;
        self.counters[port] = [0; NUM_MIBS];
        Ok(())
    }

    /// Zeroes every total and resets the hardware-side latches.
    pub async fn reset_all(&mut self, hal: &dyn Hal) -> SwitchResult<()> {
        self.counters = [[0; NUM_MIBS]; regs::NUM_PORTS];
        flush(hal).await
    }
}

impl Default for MibStats {
    fn default() -> Self {
        Self::new()
    }
}

async fn mib_op(hal: &dyn Hal, func: u32) -> SwitchResult<()> {
    hal.ess_rmw(regs::REG_MIB_FUNC, regs::MIB_FUNC_MASK, func << regs::MIB_FUNC_S)?;
    wait_reg(
        hal,
        regs::REG_MIB_FUNC,
        regs::MIB_BUSY,
        0,
        MIB_WAIT_ATTEMPTS,
        MIB_WAIT_INTERVAL,
    )
    .await?;
    Ok(())
}

/// Latches (and clears) every port's hardware counters.
pub async fn capture(hal: &dyn Hal) -> SwitchResult<()> {
    mib_op(hal, regs::MIB_FUNC_CAPTURE).await
}

/// Resets the hardware-side counter latches.
pub async fn flush(hal: &dyn Hal) -> SwitchResult<()> {
    mib_op(hal, regs::MIB_FUNC_FLUSH).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ess_hal::mock::MockHal;

    fn stats_base(port: usize) -> u32 {
        regs::REG_PORT_STATS_START + regs::REG_PORT_STATS_LEN * port as u32
    }

    #[test]
    fn test_byte_counter_indices_match_table() {
        assert_eq!(MIB_DESCS[TXBYTE_IDX].name, "TxByte");
        assert_eq!(MIB_DESCS[TXBYTE_IDX].words, 2);
        assert_eq!(MIB_DESCS[RXGOODBYTE_IDX].name, "RxGoodByte");
        assert_eq!(MIB_DESCS[RXGOODBYTE_IDX].words, 2);
    }

    #[test]
    fn test_descriptor_offsets_are_contiguous() {
        let mut expected = 0;
        for desc in MIB_DESCS {
            assert_eq!(desc.offset, expected, "{} misplaced", desc.name);
            expected += 4 * desc.words;
        }
        assert!(expected <= regs::REG_PORT_STATS_LEN);
    }

    #[test]
    fn test_wraparound_accumulation() {
        let hal = MockHal::new();
        let mut stats = MibStats::new();
        // Three captures of the first counter, the middle one near the
        // 32-bit ceiling: deltas sum without corrupting the total.
        hal.script_ess(stats_base(1), [100, 4_294_967_290, 20]);
        for _ in 0..3 {
            stats.fetch_port(&hal, 1).unwrap();
        }
        assert_eq!(stats.counters[1][0], 4_294_967_410);
    }

    #[test]
    fn test_two_word_counter_concatenation() {
        let hal = MockHal::new();
        let mut stats = MibStats::new();
        let base = stats_base(0);
        let desc = &MIB_DESCS[TXBYTE_IDX];
        hal.set_ess(base + desc.offset, 0x9abc_def0);
        hal.set_ess(base + desc.offset + 4, 0x1234_5678);

        stats.fetch_port(&hal, 0).unwrap();
        assert_eq!(stats.counters[0][TXBYTE_IDX], 0x1234_5678_9abc_def0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_round_robins_and_advances_on_timeout() {
        let hal = MockHal::new();
        let mut stats = MibStats::new();

        assert_eq!(stats.tick(&hal).await.unwrap(), 0);
        assert_eq!(stats.tick(&hal).await.unwrap(), 1);

        // A stuck capture: rmw read sees idle, then every busy-wait poll
        // reads busy.
        hal.script_ess(
            regs::REG_MIB_FUNC,
            std::iter::once(0).chain(std::iter::repeat(regs::MIB_BUSY).take(10)),
        );
        let err = stats.tick(&hal).await.unwrap_err();
        assert!(matches!(err, SwitchError::Hal(e) if e.is_timeout()));

        // The cursor still advanced past the failed port.
        assert_eq!(stats.tick(&hal).await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_report_lists_every_counter() {
        let hal = MockHal::new();
        let mut stats = MibStats::new();
        hal.set_ess(stats_base(2), 42);

        let report = stats.port_report(&hal, 2).await.unwrap();
        assert!(report.starts_with("Port 2 MIB counters\n"));
        for desc in MIB_DESCS {
            assert!(report.contains(desc.name), "missing {}", desc.name);
        }
        assert!(report.contains("RxBroad     : 42"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_byte_counters() {
        let hal = MockHal::new();
        let mut stats = MibStats::new();
        let base = stats_base(3);
        hal.set_ess(base + MIB_DESCS[TXBYTE_IDX].offset, 1000);
        hal.set_ess(base + MIB_DESCS[RXGOODBYTE_IDX].offset, 2000);

        let (tx, rx) = stats.byte_counters(&hal, 3).await.unwrap();
        assert_eq!((tx, rx), (1000, 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_port_zeroes_only_that_port() {
        let hal = MockHal::new();
        let mut stats = MibStats::new();
        stats.counters[1][0] = 7;
        stats.counters[2][0] = 9;

        stats.reset_port(&hal, 1).await.unwrap();
        assert_eq!(stats.counters[1][0], 0);
        assert_eq!(stats.counters[2][0], 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_all_flushes_hardware() {
        let hal = MockHal::new();
        let mut stats = MibStats::new();
        stats.counters[4][5] = 3;

        stats.reset_all(&hal).await.unwrap();
        assert_eq!(stats.counters[4][5], 0);
        let func = hal.ess_read(regs::REG_MIB_FUNC).unwrap();
        assert_eq!(
            func & regs::MIB_FUNC_MASK,
            regs::MIB_FUNC_FLUSH << regs::MIB_FUNC_S
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_port_rejected() {
        let hal = MockHal::new();
        let mut stats = MibStats::new();
        assert_eq!(
            stats.port_report(&hal, 6).await.unwrap_err(),
            SwitchError::InvalidPort { port: 6 }
        );
    }
}
