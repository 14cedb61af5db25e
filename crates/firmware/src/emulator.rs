//! Desktop bench: the real cycle and SDMMC front end against an in-memory card.
//!
//! [`EmulatedMmc`] plays the part of the hardware I/O task. It serves the same
//! [`SdmmcLink`] from a tokio task, so requests cross a task boundary and
//! completions arrive asynchronously exactly as they do on the board. The
//! cycle itself runs on a blocking thread, since its ready-wait spins.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write as _;
use std::time::Duration as StdDuration;

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use platform::block_device::BLOCK_SIZE;
use platform::{CardRegisters, CoherentMemory, EmbassyClock, PollLimit, StatusIndicator};
use transfer::{BenchRunner, ConfigError, CycleConfig, CycleError, CycleReport, StepEvent, TransferCycle};

use crate::console::Console;
use crate::sdmmc::{Request, SdmmcBlockDevice, SdmmcLink};

/// CID/CSD of the emulated part: a 256 MiB byte-addressed eMMC.
pub const SAMPLE_REGISTERS: CardRegisters = CardRegisters {
    cid: [0x1501_4E38, 0x4754_4634, 0x5207_DEAD, 0xBEEF_3A00],
    csd: [0x9000_0032, 0x0009_00FF, 0xC003_8000, 0x0000_0000],
};

/// Bench settings for a desktop run.
#[derive(Debug, Clone, Copy)]
pub struct EmulatorConfig {
    /// Cycle geometry and timing.
    pub cycle: CycleConfig,
    /// Time the emulated card takes per request.
    pub latency: StdDuration,
    /// Verified cycles to run before returning.
    pub cycles: u32,
}

impl Default for EmulatorConfig {
    /// A shortened board bench: 16 chunks of 256 KiB, short pause.
    fn default() -> Self {
        let mut cycle = CycleConfig::mmc_dma_bench();
        cycle.total_bytes = 4 * 1024 * 1024;
        cycle.success_pause = Duration::from_millis(200);
        // task latency makes iteration budgets meaningless on a host
        cycle.ready_poll = PollLimit::Deadline(Duration::from_millis(500));
        Self {
            cycle,
            latency: StdDuration::from_millis(2),
            cycles: 3,
        }
    }
}

/// Why a desktop run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorError {
    /// The cycle configuration was rejected.
    Config(ConfigError),
    /// The cycle faulted.
    Cycle(CycleError),
    /// The blocking bench thread panicked or was cancelled.
    Join,
}

impl fmt::Display for EmulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "config: {err}"),
            Self::Cycle(err) => write!(f, "cycle: {err}"),
            Self::Join => f.write_str("bench thread stopped"),
        }
    }
}

impl std::error::Error for EmulatorError {}

impl From<ConfigError> for EmulatorError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<CycleError> for EmulatorError {
    fn from(err: CycleError) -> Self {
        Self::Cycle(err)
    }
}

// ── Card ─────────────────────────────────────────────────────────────────────

/// Sparse in-memory eMMC. Unwritten and erased blocks read as zero.
#[derive(Debug, Default)]
pub struct EmulatedMmc {
    blocks: BTreeMap<u32, [u8; BLOCK_SIZE]>,
    latency: StdDuration,
    served: u32,
}

impl EmulatedMmc {
    /// Empty card answering after `latency`.
    pub fn new(latency: StdDuration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Requests served so far.
    pub fn served(&self) -> u32 {
        self.served
    }

    /// Contents of `block`, if it was written since the last erase.
    pub fn block(&self, block: u32) -> Option<&[u8; BLOCK_SIZE]> {
        self.blocks.get(&block)
    }

    /// Serve `link` until the task is dropped.
    pub async fn serve(mut self, link: &'static SdmmcLink) {
        loop {
            let request = link.next_request().await;
            tokio::time::sleep(self.latency).await;
            // SAFETY: the request is outstanding until `finish` below.
            let succeeded = unsafe { self.execute(&request) };
            if !succeeded {
                tracing::warn!(target: "mmc", request = request.label(), "request failed");
            }
            link.finish(&request, succeeded);
        }
    }

    /// Apply one request to the card.
    ///
    /// # Safety
    /// `request` must be outstanding, so its buffer is live and untouched.
    pub unsafe fn execute(&mut self, request: &Request) -> bool {
        self.served = self.served.saturating_add(1);
        match *request {
            Request::Write {
                data,
                block_addr,
                block_count,
            } => {
                // SAFETY: forwarded to the caller.
                let src = unsafe { data.as_slice() };
                tracing::trace!(target: "mmc", block_addr, block_count, "write");
                for (addr, chunk) in (block_addr..).zip(src.chunks_exact(BLOCK_SIZE)) {
                    let mut block = [0u8; BLOCK_SIZE];
                    block.copy_from_slice(chunk);
                    self.blocks.insert(addr, block);
                }
                true
            }
            Request::Read {
                data,
                block_addr,
                block_count,
            } => {
                // SAFETY: forwarded to the caller.
                let Some(dst) = (unsafe { data.as_mut_slice() }) else {
                    tracing::warn!(target: "mmc", "read into a read-only buffer");
                    return false;
                };
                tracing::trace!(target: "mmc", block_addr, block_count, "read");
                for (addr, chunk) in (block_addr..).zip(dst.chunks_exact_mut(BLOCK_SIZE)) {
                    match self.blocks.get(&addr) {
                        Some(block) => chunk.copy_from_slice(block),
                        None => chunk.fill(0),
                    }
                }
                true
            }
            Request::Erase {
                start_block,
                end_block,
            } => {
                tracing::debug!(target: "mmc", start_block, end_block, "erase");
                self.blocks.retain(|addr, _| !(start_block..end_block).contains(addr));
                true
            }
        }
    }
}

// ── Host peripherals ─────────────────────────────────────────────────────────

/// Blocking delay on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(StdDuration::from_nanos(u64::from(ns)));
    }
}

/// Console writer on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutWriter;

impl fmt::Write for StdoutWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        std::io::stdout().write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// Indicator that logs its transitions.
#[derive(Debug, Clone, Copy)]
pub struct LogLed {
    name: &'static str,
    lit: bool,
}

impl LogLed {
    /// Dark indicator called `name`.
    pub const fn new(name: &'static str) -> Self {
        Self { name, lit: false }
    }

    /// Current state.
    pub fn is_lit(&self) -> bool {
        self.lit
    }

    fn set(&mut self, lit: bool) {
        if self.lit != lit {
            tracing::debug!(target: "led", led = self.name, lit);
        }
        self.lit = lit;
    }
}

impl StatusIndicator for LogLed {
    fn on(&mut self) {
        self.set(true);
    }

    fn off(&mut self) {
        self.set(false);
    }

    fn toggle(&mut self) {
        self.set(!self.lit);
    }
}

// ── Bench ────────────────────────────────────────────────────────────────────

/// Run `config.cycles` verified cycles against an emulated card on `link`.
///
/// Must be called from a multi-threaded tokio runtime.
pub async fn run(config: EmulatorConfig, link: &'static SdmmcLink) -> Result<Vec<CycleReport>, EmulatorError> {
    let plan = config.cycle.validate()?;
    let card = tokio::spawn(EmulatedMmc::new(config.latency).serve(link));

    let bench = tokio::task::spawn_blocking(move || {
        // Requests hold raw pointers into these, so they outlive any
        // request the card task may still be executing.
        let tx: &'static mut [u8] = Box::leak(vec![0u8; plan.buffer_bytes()].into_boxed_slice());
        let rx: &'static mut [u8] = Box::leak(vec![0u8; plan.buffer_bytes()].into_boxed_slice());

        let mut console = Console::new(StdoutWriter);
        console.banner();
        let device = SdmmcBlockDevice::new(link).with_registers(SAMPLE_REGISTERS);
        let cycle = TransferCycle::new(
            config.cycle,
            tx,
            rx,
            link.flags(),
            device,
            CoherentMemory,
            EmbassyClock,
            console,
        )?;
        let mut runner = BenchRunner::new(cycle, LogLed::new("ok"), LogLed::new("err"), StdDelay);
        runner.prepare()?;

        let mut reports = Vec::new();
        while reports.len() < usize::try_from(config.cycles).unwrap_or(usize::MAX) {
            match runner.poll()? {
                StepEvent::Verified(report) => {
                    tracing::info!(target: "bench", cycle = report.cycle, "verified");
                    reports.push(report);
                }
                StepEvent::Pending(_) => std::thread::yield_now(),
                StepEvent::Entered(_) => {}
            }
        }
        Ok::<_, EmulatorError>(reports)
    });

    let result = bench.await.map_err(|_| EmulatorError::Join);
    card.abort();
    result?
}
