//! Transfer cycle controller.
//!
//! [`TransferCycle`] owns the source and destination buffers and sequences
//! chunked write / read / verify passes against a [`BlockDevice`] whose
//! transfers complete out-of-band. Each [`TransferCycle::step`] call executes
//! exactly one [`CycleState`]:
//!
//! ```text
//! PrepareWrite → IssueWrite ⇄ AwaitWrite → PrepareRead → IssueRead ⇄ AwaitRead → Verify
//!      ↑                                                                            │
//!      └──────────────────────────────── verified ─────────────────────────────────┘
//! ```
//!
//! Two rules hold throughout:
//!
//! - no transfer is issued before the device reports ready (bounded by the
//!   configured [`PollLimit`]);
//! - a buffer window is never touched while its transfer is in flight. The
//!   completion flag is cleared before the issue call and consumed exactly
//!   once afterwards.
//!
//! Every failure is fatal. The first [`CycleError`] is latched and returned
//! by every later call.

use embassy_time::{Duration, Instant};
use platform::card_info::CardSummary;
use platform::{
    poll_until, BlockDevice, CacheMaintenance, DeviceStatus, DiagnosticSink, MonotonicClock,
    PollLimit, TransferDirection, TransferFlags,
};

use crate::config::{ChunkPlan, CycleConfig};
use crate::error::{ConfigError, CycleError};
use crate::pattern;
use crate::state::CycleState;
use crate::throughput::PhaseTiming;

/// Outcome of one [`TransferCycle::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepEvent {
    /// The controller moved to this state.
    Entered(CycleState),
    /// The awaited completion has not been signaled yet.
    Pending(TransferDirection),
    /// Source and destination matched; the next step starts a new cycle.
    Verified(CycleReport),
}

/// Summary of one verified cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    /// Verified cycles so far, including this one.
    pub cycle: u32,
    /// Transfers per phase.
    pub chunks: u32,
    /// Write phase timing.
    pub write: PhaseTiming,
    /// Read phase timing.
    pub read: PhaseTiming,
}

/// Chunked write / read / verify state machine.
pub struct TransferCycle<'a, D, C, K, S> {
    plan: ChunkPlan,
    pattern_base: u32,
    ready_poll: PollLimit,
    success_pause: Duration,
    tx: &'a mut [u8],
    rx: &'a mut [u8],
    flags: &'a TransferFlags,
    device: D,
    cache: C,
    clock: K,
    sink: S,
    state: CycleState,
    completed: u32,
    phase_start: Instant,
    write_timing: Option<PhaseTiming>,
    read_timing: Option<PhaseTiming>,
    cycles: u32,
    fault: Option<CycleError>,
}

impl<'a, D, C, K, S> TransferCycle<'a, D, C, K, S>
where
    D: BlockDevice,
    C: CacheMaintenance,
    K: MonotonicClock,
    S: DiagnosticSink,
{
    /// Build a controller in [`CycleState::PrepareWrite`].
    ///
    /// `flags` must be the set `device` signals. Both buffers must be exactly
    /// [`ChunkPlan::buffer_bytes`] long.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CycleConfig,
        tx: &'a mut [u8],
        rx: &'a mut [u8],
        flags: &'a TransferFlags,
        device: D,
        cache: C,
        clock: K,
        sink: S,
    ) -> Result<Self, ConfigError> {
        let plan = config.validate()?;
        let expected = plan.buffer_bytes();
        if tx.len() != expected || rx.len() != expected {
            return Err(ConfigError::BufferSizeMismatch {
                expected,
                tx: tx.len(),
                rx: rx.len(),
            });
        }
        let phase_start = clock.now();
        Ok(Self {
            plan,
            pattern_base: config.pattern_base,
            ready_poll: config.ready_poll,
            success_pause: config.success_pause,
            tx,
            rx,
            flags,
            device,
            cache,
            clock,
            sink,
            state: CycleState::PrepareWrite,
            completed: 0,
            phase_start,
            write_timing: None,
            read_timing: None,
            cycles: 0,
            fault: None,
        })
    }

    /// Erase the target range, wait for ready and decode the card registers.
    ///
    /// Returns `Ok(None)` when the device does not expose CID/CSD.
    pub fn prepare_card(&mut self) -> Result<Option<CardSummary>, CycleError> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        let result = self.prepare_card_inner();
        if let Err(err) = result {
            self.fault = Some(err);
        }
        result
    }

    fn prepare_card_inner(&mut self) -> Result<Option<CardSummary>, CycleError> {
        let (start, end) = self.plan.erase_range();
        if let Err(err) = self.device.erase(start, end) {
            self.sink
                .line(format_args!(" - Erase of blocks {start}..{end} failed: {err}"));
            return Err(CycleError::EraseFailed);
        }
        self.wait_ready(TransferDirection::Write)?;

        let summary = self
            .device
            .card_registers()
            .map(|regs| CardSummary::from_registers(&regs));
        if let Some(summary) = &summary {
            self.sink.line(format_args!(" - CID: {}", summary.identity));
            match summary.specific.capacity_bytes() {
                Some(bytes) => self
                    .sink
                    .line(format_args!(" - Capacity: {} MB", bytes >> 20)),
                None => self
                    .sink
                    .line(format_args!(" - Capacity: sector addressed (see EXT_CSD)")),
            }
        }
        Ok(summary)
    }

    /// Execute the current state once.
    ///
    /// Only the ready-wait inside the issue states blocks, and only for the
    /// configured poll budget.
    pub fn step(&mut self) -> Result<StepEvent, CycleError> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        let result = match self.state {
            CycleState::PrepareWrite => Ok(self.prepare_write()),
            CycleState::IssueWrite => self.issue(TransferDirection::Write),
            CycleState::AwaitWrite => self.await_completion(TransferDirection::Write),
            CycleState::PrepareRead => Ok(self.prepare_read()),
            CycleState::IssueRead => self.issue(TransferDirection::Read),
            CycleState::AwaitRead => self.await_completion(TransferDirection::Read),
            CycleState::Verify => self.verify(),
        };
        if let Err(err) = result {
            self.fault = Some(err);
        }
        result
    }

    /// Step until the next successful verification.
    ///
    /// Spins on [`StepEvent::Pending`], so the device must complete
    /// transfers without help from this thread.
    pub fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        loop {
            if let StepEvent::Verified(report) = self.step()? {
                return Ok(report);
            }
        }
    }

    fn prepare_write(&mut self) -> StepEvent {
        pattern::fill(self.tx, self.pattern_base);
        self.cache.flush(self.tx);
        self.sink
            .line(format_args!(" ****************** Start Write test ******************* "));
        self.sink.line(format_args!(
            " - Buffer size to write: {} MB   ",
            self.plan.total_bytes() >> 20
        ));
        self.start_phase(CycleState::IssueWrite)
    }

    fn prepare_read(&mut self) -> StepEvent {
        self.rx.fill(0);
        self.cache.flush(self.rx);
        self.sink
            .line(format_args!(" ******************* Start Read test ******************* "));
        self.sink.line(format_args!(
            " - Buffer size to read: {} MB   ",
            self.plan.total_bytes() >> 20
        ));
        self.start_phase(CycleState::IssueRead)
    }

    fn start_phase(&mut self, next: CycleState) -> StepEvent {
        self.completed = 0;
        self.phase_start = self.clock.now();
        self.enter(next)
    }

    fn enter(&mut self, next: CycleState) -> StepEvent {
        self.state = next;
        StepEvent::Entered(next)
    }

    fn wait_ready(&mut self, direction: TransferDirection) -> Result<(), CycleError> {
        let device = &mut self.device;
        let outcome = poll_until(self.ready_poll, &self.clock, || {
            matches!(device.status(), Ok(DeviceStatus::Ready))
        });
        if outcome.is_ready() {
            Ok(())
        } else {
            Err(CycleError::DeviceNotReady {
                direction,
                attempts: outcome.attempts(),
            })
        }
    }

    fn issue(&mut self, direction: TransferDirection) -> Result<StepEvent, CycleError> {
        self.wait_ready(direction)?;

        let chunk = self.completed;
        let rejected = CycleError::TransferRejected { direction, chunk };
        let addr = self.plan.block_addr_of(chunk);
        let blocks = self.plan.blocks_per_chunk();
        let window = self.plan.window(chunk);

        self.flags.flag(direction).clear();
        self.flags.error.clear();

        let issued = match direction {
            TransferDirection::Write => {
                // validate() sized the buffers to cover every window
                let data = self.tx.get(window).ok_or(rejected)?;
                // SAFETY: `tx` stays borrowed by `self` and is not written
                // again until the next PrepareWrite, which only runs after
                // this chunk's completion flag has been consumed. The window
                // was cleaned from the D-cache in PrepareWrite.
                unsafe { self.device.start_write(data, addr, blocks) }
            }
            TransferDirection::Read => {
                let data = self.rx.get_mut(window).ok_or(rejected)?;
                // SAFETY: `rx` is neither read nor written until AwaitRead
                // consumes this chunk's completion flag and invalidates the
                // window.
                unsafe { self.device.start_read(data, addr, blocks) }
            }
        };
        if let Err(err) = issued {
            self.sink
                .line(format_args!(" - {direction} of chunk {chunk} rejected: {err}"));
            return Err(rejected);
        }

        let next = match direction {
            TransferDirection::Write => CycleState::AwaitWrite,
            TransferDirection::Read => CycleState::AwaitRead,
        };
        Ok(self.enter(next))
    }

    fn await_completion(&mut self, direction: TransferDirection) -> Result<StepEvent, CycleError> {
        let chunk = self.completed;
        if self.flags.error.take() {
            return Err(CycleError::TransferFailed { direction, chunk });
        }
        if !self.flags.flag(direction).take() {
            return Ok(StepEvent::Pending(direction));
        }

        if direction == TransferDirection::Read {
            let window = self.plan.window(chunk);
            if let Some(data) = self.rx.get_mut(window) {
                self.cache.invalidate(data);
            }
        }

        self.completed = chunk.saturating_add(1);
        if self.completed < self.plan.chunks() {
            let again = match direction {
                TransferDirection::Write => CycleState::IssueWrite,
                TransferDirection::Read => CycleState::IssueRead,
            };
            return Ok(self.enter(again));
        }

        let timing = self.finish_phase(direction);
        match direction {
            TransferDirection::Write => {
                self.write_timing = Some(timing);
                Ok(self.enter(CycleState::PrepareRead))
            }
            TransferDirection::Read => {
                self.read_timing = Some(timing);
                Ok(self.enter(CycleState::Verify))
            }
        }
    }

    fn finish_phase(&mut self, direction: TransferDirection) -> PhaseTiming {
        let elapsed = self.clock.now().saturating_duration_since(self.phase_start);
        let timing = PhaseTiming::new(self.plan.total_bytes(), elapsed);
        let label = match direction {
            TransferDirection::Write => "Write",
            TransferDirection::Read => "Read",
        };
        match timing.speed() {
            Some(speed) => self.sink.line(format_args!(
                " - {label} Time(ms): {}  -  {label} Speed: {speed} MB/s  ",
                timing.elapsed_ms()
            )),
            None => self.sink.line(format_args!(
                " - {label} Time(ms): {}  -  {label} Speed: n/a  ",
                timing.elapsed_ms()
            )),
        }
        timing
    }

    fn verify(&mut self) -> Result<StepEvent, CycleError> {
        self.sink
            .line(format_args!(" ********************* Check data ********************** "));
        if let Some(m) = pattern::first_mismatch(self.tx, self.rx) {
            self.sink.line(format_args!(" - Check data Error !!!!   "));
            return Err(CycleError::DataMismatch {
                offset: m.offset,
                expected: m.expected,
                actual: m.actual,
            });
        }
        self.sink.line(format_args!(" - Check data OK  "));

        self.cycles = self.cycles.saturating_add(1);
        let unmeasured = PhaseTiming::new(self.plan.total_bytes(), Duration::from_ticks(0));
        let report = CycleReport {
            cycle: self.cycles,
            chunks: self.plan.chunks(),
            write: self.write_timing.take().unwrap_or(unmeasured),
            read: self.read_timing.take().unwrap_or(unmeasured),
        };
        self.state = CycleState::PrepareWrite;
        Ok(StepEvent::Verified(report))
    }

    /// Current state.
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Chunks completed in the current phase.
    pub fn completed_chunks(&self) -> u32 {
        self.completed
    }

    /// Verified cycles so far.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Latched fault, if any.
    pub fn fault(&self) -> Option<CycleError> {
        self.fault
    }

    /// Validated chunk plan.
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Pause the runner takes after a verified cycle.
    pub fn success_pause(&self) -> Duration {
        self.success_pause
    }

    /// Source buffer.
    pub fn tx(&self) -> &[u8] {
        self.tx
    }

    /// Destination buffer.
    pub fn rx(&self) -> &[u8] {
        self.rx
    }

    /// The block device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The block device, mutably (deferred completion in tests).
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The cache maintenance provider.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// The diagnostic sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The diagnostic sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
