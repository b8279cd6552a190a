//! Bounded polling helpers.
//!
//! Hardware readiness is always waited on with an explicit attempt budget
//! and a fixed inter-attempt sleep, never an open-ended spin. The helpers
//! return the last observed value on exhaustion so callers can decide
//! whether a timeout is fatal (VTU busy) or advisory (calibration status).

use std::time::Duration;

use crate::bus::Hal;
use crate::error::{HalError, HalResult};

/// Outcome of a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// The predicate was satisfied; carries the satisfying observation.
    Ready(T),
    /// The attempt budget ran out; carries the last observation.
    TimedOut {
        /// Last value probed before giving up.
        last: T,
    },
}

impl<T> PollStatus<T> {
    /// Returns true if the poll completed before the budget ran out.
    pub fn is_ready(&self) -> bool {
        matches!(self, PollStatus::Ready(_))
    }

    /// Returns the observed value regardless of outcome.
    pub fn into_inner(self) -> T {
        match self {
            PollStatus::Ready(v) | PollStatus::TimedOut { last: v } => v,
        }
    }
}

/// Probes `probe` up to `attempts` times, sleeping `interval` between
/// attempts, until `done` accepts the observation.
///
/// Probe errors abort immediately; only predicate exhaustion yields
/// [`PollStatus::TimedOut`].
pub async fn poll_until<T, P, D>(
    attempts: u32,
    interval: Duration,
    mut probe: P,
    done: D,
) -> HalResult<PollStatus<T>>
where
    P: FnMut() -> HalResult<T>,
    D: Fn(&T) -> bool,
{
    let mut last = probe()?;
    for _ in 1..attempts.max(1) {
        if done(&last) {
            return Ok(PollStatus::Ready(last));
        }
        tokio::time::sleep(interval).await;
        last = probe()?;
    }
    if done(&last) {
        Ok(PollStatus::Ready(last))
    } else {
        Ok(PollStatus::TimedOut { last })
    }
}

/// Waits for `(reg & mask) == want` on the switch-core window.
///
/// Returns [`HalError::Timeout`] carrying the last observed value when the
/// attempt budget is exhausted.
pub async fn wait_reg(
    hal: &dyn Hal,
    reg: u32,
    mask: u32,
    want: u32,
    attempts: u32,
    interval: Duration,
) -> HalResult<()> {
    match poll_until(attempts, interval, || hal.ess_read(reg), |v| v & mask == want).await? {
        PollStatus::Ready(_) => Ok(()),
        PollStatus::TimedOut { last } => Err(HalError::Timeout {
            reg,
            mask,
            want,
            last,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHal;

    #[tokio::test(start_paused = true)]
    async fn test_poll_ready_first_attempt() {
        let mut calls = 0;
        let status = poll_until(
            10,
            Duration::from_millis(2),
            || {
                calls += 1;
                Ok(7u32)
            },
            |v| *v == 7,
        )
        .await
        .unwrap();
        assert_eq!(status, PollStatus::Ready(7));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_exhausts_budget() {
        let mut calls = 0u32;
        let status = poll_until(
            5,
            Duration::from_millis(2),
            || {
                calls += 1;
                Ok(calls)
            },
            |_| false,
        )
        .await
        .unwrap();
        assert_eq!(status, PollStatus::TimedOut { last: 5 });
        assert_eq!(calls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_becomes_ready_midway() {
        let mut calls = 0u32;
        let status = poll_until(
            10,
            Duration::from_millis(2),
            || {
                calls += 1;
                Ok(calls)
            },
            |v| *v >= 3,
        )
        .await
        .unwrap();
        assert_eq!(status, PollStatus::Ready(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_reg_timeout_carries_last_value() {
        let hal = MockHal::new();
        hal.set_ess(0x614, 0x8000_0000);

        let err = wait_reg(&hal, 0x614, 0x8000_0000, 0, 3, Duration::from_micros(10))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            HalError::Timeout {
                reg: 0x614,
                mask: 0x8000_0000,
                want: 0,
                last: 0x8000_0000,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_reg_ready() {
        let hal = MockHal::new();
        hal.set_ess(0x614, 0);
        wait_reg(&hal, 0x614, 0x8000_0000, 0, 3, Duration::from_micros(10))
            .await
            .unwrap();
    }
}
