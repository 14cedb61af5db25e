//! Bounded readiness polling
//!
//! The ready-wait before every transfer is the only place the cycle blocks.
//! It must never hang: the probe is retried until it reports ready or the
//! [`PollLimit`] is exhausted.
//!
//! Two budgets are offered:
//!
//! | Limit                      | Duration depends on         | Use                      |
//! |----------------------------|-----------------------------|--------------------------|
//! | `Iterations(n)`            | CPU and bus speed           | identical to the bench   |
//! | `Deadline(d)`              | wall clock only             | portable across targets  |
//!
//! [`MMC_READY_POLL_ITERATIONS`] is the default iteration budget.

use embassy_time::Duration;

use crate::clock::MonotonicClock;

/// Default number of status queries before the card is declared not ready.
pub const MMC_READY_POLL_ITERATIONS: u32 = 0x0010_0000;

/// Budget for one ready-wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollLimit {
    /// At most this many probe calls. Zero never probes.
    Iterations(u32),
    /// Keep probing until this much time has elapsed on the injected clock.
    /// The probe always runs at least once.
    Deadline(Duration),
}

impl Default for PollLimit {
    fn default() -> Self {
        Self::Iterations(MMC_READY_POLL_ITERATIONS)
    }
}

/// Result of a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollOutcome {
    /// Probe reported ready after `attempts` calls.
    Ready {
        /// Probe calls made, including the successful one.
        attempts: u32,
    },
    /// Budget ran out after `attempts` calls.
    Exhausted {
        /// Probe calls made.
        attempts: u32,
    },
}

impl PollOutcome {
    /// `true` if the probe reported ready.
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Number of probe calls made.
    pub const fn attempts(self) -> u32 {
        match self {
            Self::Ready { attempts } | Self::Exhausted { attempts } => attempts,
        }
    }
}

/// Call `probe` until it returns `true` or `limit` is exhausted.
///
/// The clock is only read for [`PollLimit::Deadline`].
pub fn poll_until<C, F>(limit: PollLimit, clock: &C, mut probe: F) -> PollOutcome
where
    C: MonotonicClock + ?Sized,
    F: FnMut() -> bool,
{
    let mut attempts: u32 = 0;
    match limit {
        PollLimit::Iterations(max) => {
            while attempts < max {
                attempts = attempts.saturating_add(1);
                if probe() {
                    return PollOutcome::Ready { attempts };
                }
            }
            PollOutcome::Exhausted { attempts }
        }
        PollLimit::Deadline(budget) => {
            let start = clock.now();
            loop {
                attempts = attempts.saturating_add(1);
                if probe() {
                    return PollOutcome::Ready { attempts };
                }
                if clock.now().saturating_duration_since(start) >= budget {
                    return PollOutcome::Exhausted { attempts };
                }
            }
        }
    }
}
