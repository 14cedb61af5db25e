//! End-to-end cycle scenarios against the fault-injecting mock device.

#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::panic)]

use embassy_time::Duration;
use platform::block_device::BLOCK_SIZE;
use platform::mocks::{MockBlockDevice, MockClock, RecordingCache, RecordingSink};
use platform::{PollLimit, TransferDirection, TransferFlags};
use transfer::pattern;
use transfer::{ChunkLayout, CycleConfig, CycleError, CycleState, StepEvent, TransferCycle};

const BASE: u32 = 0xB5F3_A5F3;

fn four_chunks(layout: ChunkLayout) -> CycleConfig {
    CycleConfig {
        chunk_bytes: 512,
        total_bytes: 2048,
        pattern_base: BASE,
        layout,
        ready_poll: PollLimit::Iterations(64),
        ..CycleConfig::mmc_dma_bench()
    }
}

#[test]
fn four_chunk_cycle_completes_and_restarts() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 2048], [0u8; 2048]);
    let mut cycle = TransferCycle::new(
        four_chunks(ChunkLayout::Striped),
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();

    let mut entered = Vec::new();
    let report = loop {
        match cycle.step().unwrap() {
            StepEvent::Entered(state) => entered.push(state),
            StepEvent::Pending(_) => unreachable!("mock completes immediately"),
            StepEvent::Verified(report) => break report,
        }
    };

    let awaits = |s: CycleState| entered.iter().filter(|&&e| e == s).count();
    assert_eq!(awaits(CycleState::AwaitWrite), 4);
    assert_eq!(awaits(CycleState::AwaitRead), 4);
    assert_eq!(entered.last(), Some(&CycleState::Verify));
    assert_eq!(report.chunks, 4);
    assert_eq!(cycle.state(), CycleState::PrepareWrite);
    assert_eq!(cycle.device().writes_issued(), 4);
    assert_eq!(cycle.device().reads_issued(), 4);

    // Striped chunks land on consecutive blocks
    for (i, block) in (0x400u32..0x404).enumerate() {
        let stored = cycle.device().stored_block(block).unwrap();
        assert_eq!(stored[0], pattern::byte_at(BASE, i * BLOCK_SIZE));
    }
    assert_eq!(cycle.rx(), cycle.tx());
}

#[test]
fn third_write_rejection_stops_before_reading() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
    let mut cycle = TransferCycle::new(
        four_chunks(ChunkLayout::Repeated),
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags).reject_write_at(3),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();

    let err = cycle.run_cycle().unwrap_err();
    assert_eq!(
        err,
        CycleError::TransferRejected {
            direction: TransferDirection::Write,
            chunk: 2
        }
    );
    assert_eq!(cycle.device().reads_issued(), 0);
    assert!(cycle.sink().contains("rejected: mock write #3 rejected"));
    // latched
    assert_eq!(cycle.step(), Err(err));
    assert_eq!(cycle.device().writes_issued(), 3);
}

#[test]
fn corrupted_byte_is_reported_at_its_offset() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 2048], [0u8; 2048]);
    let corrupt_at = 0x400 * BLOCK_SIZE as u64 + 1000;
    let mut cycle = TransferCycle::new(
        four_chunks(ChunkLayout::Striped),
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags).corrupt_read_at(corrupt_at),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();

    let expected = pattern::byte_at(BASE, 1000);
    assert_eq!(
        cycle.run_cycle(),
        Err(CycleError::DataMismatch {
            offset: 1000,
            expected,
            actual: expected ^ 0xFF,
        })
    );
    assert!(cycle.sink().contains("Check data Error"));
}

#[test]
fn always_busy_device_exhausts_iteration_budget() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
    let config = CycleConfig {
        ready_poll: PollLimit::Iterations(1000),
        ..four_chunks(ChunkLayout::Repeated)
    };
    let mut cycle = TransferCycle::new(
        config,
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags).always_busy(),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();

    assert_eq!(
        cycle.run_cycle(),
        Err(CycleError::DeviceNotReady {
            direction: TransferDirection::Write,
            attempts: 1000
        })
    );
    assert_eq!(cycle.device().status_queries(), 1000);
    assert_eq!(cycle.device().writes_issued(), 0);
}

#[test]
fn always_busy_device_exhausts_deadline_on_simulated_time() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
    let config = CycleConfig {
        ready_poll: PollLimit::Deadline(Duration::from_millis(50)),
        ..four_chunks(ChunkLayout::Repeated)
    };
    let mut cycle = TransferCycle::new(
        config,
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags).always_busy(),
        RecordingCache::new(),
        MockClock::with_auto_advance(Duration::from_millis(1)),
        RecordingSink::new(),
    )
    .unwrap();

    match cycle.run_cycle() {
        Err(CycleError::DeviceNotReady {
            direction: TransferDirection::Write,
            attempts,
        }) => assert!((49..=51).contains(&attempts), "attempts = {attempts}"),
        other => panic!("expected DeviceNotReady, got {other:?}"),
    }
}

#[test]
fn busy_device_that_recovers_is_waited_for() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
    let mut cycle = TransferCycle::new(
        four_chunks(ChunkLayout::Repeated),
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags).busy_after_transfer(10),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();
    cycle.run_cycle().unwrap();
    // 8 ready-waits, 7 of them after a transfer (10 busy + 1 ready each)
    assert_eq!(cycle.device().status_queries(), 1 + 7 * 11);
}

#[test]
fn repeated_cycles_are_identical() {
    let flags = TransferFlags::new();
    let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
    let mut cycle = TransferCycle::new(
        four_chunks(ChunkLayout::Repeated),
        &mut tx,
        &mut rx,
        &flags,
        MockBlockDevice::new(&flags),
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();

    let first = cycle.run_cycle().unwrap();
    let snapshot = (cycle.tx().to_vec(), cycle.rx().to_vec());
    for n in 2..=3 {
        let report = cycle.run_cycle().unwrap();
        assert_eq!(report.cycle, n);
        assert_eq!(report.write, first.write);
        assert_eq!(report.read, first.read);
        assert_eq!((cycle.tx().to_vec(), cycle.rx().to_vec()), snapshot);
    }
    assert_eq!(cycle.cycles(), 3);
    assert_eq!(cycle.device().writes_issued(), 12);
}

proptest::proptest! {
    /// Verify is reached after exactly N/chunk write and N/chunk read completions.
    #[test]
    fn verify_after_exactly_one_completion_per_chunk(
        chunks in 1u32..=24,
        blocks_per_chunk in 1usize..=4,
        striped in proptest::bool::ANY,
    ) {
        let chunk_bytes = blocks_per_chunk * BLOCK_SIZE;
        let total = chunk_bytes * chunks as usize;
        let layout = if striped { ChunkLayout::Striped } else { ChunkLayout::Repeated };
        let buffer = if striped { total } else { chunk_bytes };
        let (mut tx, mut rx) = (vec![0u8; buffer], vec![0u8; buffer]);
        let flags = TransferFlags::new();
        let config = CycleConfig {
            chunk_bytes,
            total_bytes: total as u64,
            layout,
            ready_poll: PollLimit::Iterations(8),
            ..CycleConfig::mmc_dma_bench()
        };
        let mut cycle = TransferCycle::new(
            config,
            &mut tx,
            &mut rx,
            &flags,
            MockBlockDevice::new(&flags),
            RecordingCache::new(),
            MockClock::new(),
            RecordingSink::new(),
        )
        .unwrap();

        let report = cycle.run_cycle().unwrap();
        proptest::prop_assert_eq!(report.chunks, chunks);
        proptest::prop_assert_eq!(cycle.device().writes_issued(), chunks);
        proptest::prop_assert_eq!(cycle.device().reads_issued(), chunks);
        proptest::prop_assert_eq!(cycle.cache().invalidations().len(), chunks as usize);
    }
}
