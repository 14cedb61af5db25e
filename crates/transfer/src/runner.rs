//! Bench runner: the cycle plus its success and error indicators.
//!
//! The runner owns all user-visible signaling. The success indicator goes
//! off as each write phase starts, and a verified cycle toggles it back on
//! and pauses. The first fault prints `" - Error "`, turns
//! the success indicator off and the error indicator on; [`BenchRunner::halt`]
//! then blinks the error indicator forever.

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use platform::card_info::CardSummary;
use platform::{BlockDevice, CacheMaintenance, DiagnosticSink, MonotonicClock, StatusIndicator};

use crate::controller::{CycleReport, StepEvent, TransferCycle};
use crate::error::CycleError;
use crate::state::CycleState;

/// Error indicator half-period while halted.
pub const ERROR_BLINK_PERIOD: Duration = Duration::from_millis(100);

fn duration_ms(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}

/// Cycle driver with indicators and a blocking delay.
pub struct BenchRunner<'a, D, C, K, S, G, R, W> {
    cycle: TransferCycle<'a, D, C, K, S>,
    ok_led: G,
    err_led: R,
    delay: W,
}

impl<'a, D, C, K, S, G, R, W> BenchRunner<'a, D, C, K, S, G, R, W>
where
    D: BlockDevice,
    C: CacheMaintenance,
    K: MonotonicClock,
    S: DiagnosticSink,
    G: StatusIndicator,
    R: StatusIndicator,
    W: DelayNs,
{
    /// Wrap `cycle`. Both indicators are driven off.
    pub fn new(cycle: TransferCycle<'a, D, C, K, S>, mut ok_led: G, mut err_led: R, delay: W) -> Self {
        ok_led.off();
        err_led.off();
        Self {
            cycle,
            ok_led,
            err_led,
            delay,
        }
    }

    /// Prepare the card, signaling a failure on the indicators.
    pub fn prepare(&mut self) -> Result<Option<CardSummary>, CycleError> {
        self.cycle.prepare_card().inspect_err(|_| self.signal_error())
    }

    /// Execute one controller step.
    ///
    /// Each write phase starts with the success indicator off; a verification
    /// toggles it on and blocks for the configured pause. A fault is
    /// signaled once and returned.
    pub fn poll(&mut self) -> Result<StepEvent, CycleError> {
        let first_fault = self.cycle.fault().is_none();
        let from = self.cycle.state();
        match self.cycle.step() {
            Ok(event) => {
                match event {
                    StepEvent::Entered(CycleState::IssueWrite) if from == CycleState::PrepareWrite => {
                        self.ok_led.off();
                    }
                    StepEvent::Verified(_) => {
                        self.ok_led.toggle();
                        let pause = duration_ms(self.cycle.success_pause());
                        self.delay.delay_ms(pause);
                    }
                    _ => {}
                }
                Ok(event)
            }
            Err(err) => {
                if first_fault {
                    self.signal_error();
                }
                Err(err)
            }
        }
    }

    /// Poll until the next verified cycle.
    pub fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        loop {
            if let StepEvent::Verified(report) = self.poll()? {
                return Ok(report);
            }
        }
    }

    /// Cycle forever; halt on the first fault.
    pub fn run(mut self) -> ! {
        loop {
            if self.poll().is_err() {
                self.halt();
            }
        }
    }

    /// Blink the error indicator forever.
    pub fn halt(&mut self) -> ! {
        let period = duration_ms(ERROR_BLINK_PERIOD);
        loop {
            self.err_led.toggle();
            self.delay.delay_ms(period);
        }
    }

    fn signal_error(&mut self) {
        self.cycle.sink_mut().line(format_args!(" - Error "));
        self.ok_led.off();
        self.err_led.on();
    }

    /// The wrapped cycle.
    pub fn cycle(&self) -> &TransferCycle<'a, D, C, K, S> {
        &self.cycle
    }

    /// The wrapped cycle, mutably.
    pub fn cycle_mut(&mut self) -> &mut TransferCycle<'a, D, C, K, S> {
        &mut self.cycle
    }

    /// Release the parts.
    pub fn free(self) -> (TransferCycle<'a, D, C, K, S>, G, R, W) {
        (self.cycle, self.ok_led, self.err_led, self.delay)
    }
}
