//! Bench runner signaling: LEDs, success pause and error reporting.

#![allow(clippy::unwrap_used)]

use embedded_hal::delay::DelayNs;
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
use platform::mocks::{MockBlockDevice, MockClock, RecordingCache, RecordingSink};
use platform::{Led, PollLimit, TransferDirection, TransferFlags};
use transfer::{BenchRunner, ChunkLayout, CycleConfig, CycleError, TransferCycle};

fn small_config() -> CycleConfig {
    CycleConfig {
        chunk_bytes: 512,
        total_bytes: 4 * 512,
        layout: ChunkLayout::Repeated,
        ready_poll: PollLimit::Iterations(8),
        ..CycleConfig::mmc_dma_bench()
    }
}

/// Delay that records each millisecond request instead of sleeping.
#[derive(Default)]
struct RecordingDelay {
    ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.ms.push(ms);
    }
}

#[test]
fn verified_cycle_toggles_ok_led_and_pauses() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
    let cycle = TransferCycle::new(
        small_config(),
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();

    // Active-low: construction, runner and the write phase start drive off
    // (high), the verify toggle lights it (low)
    let ok_pin = PinMock::new(&[
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::Low),
    ]);
    let err_pin = PinMock::new(&[
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
    ]);

    let mut runner = BenchRunner::new(
        cycle,
        Led::active_low(ok_pin),
        Led::active_low(err_pin),
        RecordingDelay::default(),
    );
    let report = runner.run_cycle().unwrap();
    assert_eq!(report.cycle, 1);

    let (cycle, ok_led, err_led, delay) = runner.free();
    assert!(ok_led.is_on());
    assert!(!err_led.is_on());
    assert_eq!(delay.ms, vec![2000]);
    assert!(!cycle.sink().contains(" - Error"));
    ok_led.free().done();
    err_led.free().done();
}

#[test]
fn ok_led_is_lit_after_every_verified_cycle() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
    let cycle = TransferCycle::new(
        small_config(),
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();

    // each cycle: off as the write phase starts, lit by the verify toggle
    let ok_pin = PinMock::new(&[
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::Low),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::Low),
    ]);
    let err_pin = PinMock::new(&[
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
    ]);

    let mut runner = BenchRunner::new(
        cycle,
        Led::active_low(ok_pin),
        Led::active_low(err_pin),
        NoopDelay::new(),
    );
    runner.run_cycle().unwrap();
    runner.run_cycle().unwrap();

    let (_, ok_led, err_led, _) = runner.free();
    assert!(ok_led.is_on(), "the second verify leaves the LED lit, not toggled off");
    ok_led.free().done();
    err_led.free().done();
}

#[test]
fn fault_turns_ok_off_and_error_on_once() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
    let cycle = TransferCycle::new(
        small_config(),
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags).reject_read_at(1),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();

    // off at construction, in the runner, at the write phase start and on the fault
    let ok_pin = PinMock::new(&[
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
    ]);
    let err_pin = PinMock::new(&[
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::Low),
    ]);

    let mut runner = BenchRunner::new(
        cycle,
        Led::active_low(ok_pin),
        Led::active_low(err_pin),
        NoopDelay::new(),
    );
    let expected = CycleError::TransferRejected {
        direction: TransferDirection::Read,
        chunk: 0,
    };
    assert_eq!(runner.run_cycle(), Err(expected));
    // the latched fault is returned again without re-driving the LEDs
    assert_eq!(runner.poll(), Err(expected));

    let (cycle, ok_led, err_led, _) = runner.free();
    assert!(err_led.is_on());
    let errors = cycle
        .sink()
        .lines()
        .iter()
        .filter(|l| l.as_str() == " - Error ")
        .count();
    assert_eq!(errors, 1);
    ok_led.free().done();
    err_led.free().done();
}

#[test]
fn failed_preparation_is_signaled() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
    let cycle = TransferCycle::new(
        small_config(),
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags).reject_erase(),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();
    let mut runner = BenchRunner::new(
        cycle,
        Led::active_low(platform::mocks::MockPin::new()),
        Led::active_low(platform::mocks::MockPin::new()),
        NoopDelay::new(),
    );
    assert_eq!(runner.prepare(), Err(CycleError::EraseFailed));
    let (cycle, ok_led, err_led, _) = runner.free();
    assert!(!ok_led.is_on());
    assert!(err_led.is_on());
    assert!(cycle.sink().contains("Erase of blocks 1024..1025 failed"));
}
