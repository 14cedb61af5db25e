//! Monotonic time source
//!
//! The cycle only reads time for throughput reporting and for
//! [`PollLimit::Deadline`](crate::poll::PollLimit::Deadline) budgets; control
//! decisions never depend on it. Tests inject
//! [`MockClock`](crate::mocks::MockClock) so timeouts elapse without real time
//! passing.

use embassy_time::Instant;

/// Source of monotonically non-decreasing timestamps.
pub trait MonotonicClock {
    /// Current time.
    fn now(&self) -> Instant;
}

/// Clock backed by the Embassy time driver (TIM2 on hardware, std on host).
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl MonotonicClock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: MonotonicClock + ?Sized> MonotonicClock for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
