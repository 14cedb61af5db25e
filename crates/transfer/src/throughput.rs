//! Phase timing and throughput.
//!
//! Throughput is KiB per millisecond, which the bench prints as MB/s. It is
//! kept in hundredths so no floating point is needed on the target.

use core::fmt;

use embassy_time::Duration;

/// Elapsed time and size of one write or read phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseTiming {
    /// Bytes moved in the phase.
    pub bytes: u64,
    /// Time from phase start to the last completion.
    pub elapsed: Duration,
}

impl PhaseTiming {
    /// Record a phase.
    pub const fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }

    /// Whole milliseconds elapsed.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis()
    }

    /// Throughput, or `None` when the phase took under a millisecond.
    pub fn speed(&self) -> Option<Speed> {
        let kib = self.bytes >> 10;
        let centi = kib.checked_mul(100)?.checked_div(self.elapsed_ms())?;
        Some(Speed { centi })
    }

    /// Whole MiB moved, as the bench announces it.
    pub fn mebibytes(&self) -> u64 {
        self.bytes >> 20
    }
}

/// Throughput in hundredths of a KiB/ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Speed {
    centi: u64,
}

impl Speed {
    /// Hundredths of a KiB/ms.
    pub const fn centi(self) -> u64 {
        self.centi
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.centi.checked_div(100).unwrap_or(0);
        let frac = self.centi.checked_rem(100).unwrap_or(0);
        write!(f, "{whole}.{frac:02}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bench_sized_phase() {
        // 100 MiB in 4000 ms = 102400 KiB / 4000 ms = 25.60
        let t = PhaseTiming::new(0x0640_0000, Duration::from_millis(4000));
        assert_eq!(t.mebibytes(), 100);
        assert_eq!(t.speed().unwrap().to_string(), "25.60");
    }

    #[test]
    fn test_zero_elapsed_has_no_speed() {
        let t = PhaseTiming::new(2048, Duration::from_micros(300));
        assert_eq!(t.elapsed_ms(), 0);
        assert_eq!(t.speed(), None);
    }

    #[test]
    fn test_fraction_is_zero_padded() {
        let t = PhaseTiming::new(1024 * 103, Duration::from_millis(100));
        assert_eq!(t.speed().unwrap().to_string(), "1.03");
    }
}
