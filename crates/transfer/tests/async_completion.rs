//! Completions delivered from another task, the way the firmware's SDMMC
//! task and the emulator deliver them.

#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use platform::block_device::BLOCK_SIZE;
use platform::mocks::{MockClock, RecordingCache, RecordingSink};
use platform::{BlockDevice, DeviceStatus, PollLimit, TransferDirection, TransferFlags};
use transfer::{ChunkLayout, CycleConfig, StepEvent, TransferCycle};

static FLAGS: TransferFlags = TransferFlags::new();

/// Device whose completion arrives from a tokio task after `latency`.
struct TaskDevice {
    flags: &'static TransferFlags,
    busy: Arc<AtomicBool>,
    blocks: Arc<Mutex<BTreeMap<u32, Vec<u8>>>>,
    latency: StdDuration,
}

impl TaskDevice {
    fn complete_later(&self, direction: TransferDirection) {
        self.busy.store(true, Ordering::Release);
        let busy = Arc::clone(&self.busy);
        let flags = self.flags;
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            // ready before complete: the cycle polls status right after the flag
            busy.store(false, Ordering::Release);
            flags.complete(direction);
        });
    }
}

impl BlockDevice for TaskDevice {
    type Error = &'static str;

    fn status(&mut self) -> Result<DeviceStatus, Self::Error> {
        Ok(if self.busy.load(Ordering::Acquire) {
            DeviceStatus::Busy
        } else {
            DeviceStatus::Ready
        })
    }

    unsafe fn start_write(&mut self, data: &[u8], block_addr: u32, _count: u32) -> Result<(), Self::Error> {
        let mut blocks = self.blocks.lock().unwrap();
        for (i, block) in data.chunks(BLOCK_SIZE).enumerate() {
            blocks.insert(block_addr + i as u32, block.to_vec());
        }
        drop(blocks);
        self.complete_later(TransferDirection::Write);
        Ok(())
    }

    unsafe fn start_read(&mut self, data: &mut [u8], block_addr: u32, _count: u32) -> Result<(), Self::Error> {
        let blocks = self.blocks.lock().unwrap();
        for (i, block) in data.chunks_mut(BLOCK_SIZE).enumerate() {
            let stored = blocks.get(&(block_addr + i as u32)).ok_or("unwritten block")?;
            block.copy_from_slice(stored);
        }
        drop(blocks);
        self.complete_later(TransferDirection::Read);
        Ok(())
    }

    fn erase(&mut self, _start: u32, _end: u32) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[tokio::test]
async fn completions_from_another_task_drive_the_cycle() {
    let (mut tx, mut rx) = (vec![0u8; 4096], vec![0u8; 4096]);
    let device = TaskDevice {
        flags: &FLAGS,
        busy: Arc::new(AtomicBool::new(false)),
        blocks: Arc::new(Mutex::new(BTreeMap::new())),
        latency: StdDuration::from_millis(1),
    };
    let config = CycleConfig {
        chunk_bytes: 1024,
        total_bytes: 4096,
        layout: ChunkLayout::Striped,
        ready_poll: PollLimit::Iterations(4),
        ..CycleConfig::mmc_dma_bench()
    };
    let mut cycle = TransferCycle::new(
        config,
        &mut tx,
        &mut rx,
        &FLAGS,
        device,
        RecordingCache::new(),
        MockClock::new(),
        RecordingSink::new(),
    )
    .unwrap();

    let mut pending_polls = 0u32;
    let report = loop {
        match cycle.step().unwrap() {
            StepEvent::Pending(_) => {
                pending_polls += 1;
                tokio::task::yield_now().await;
            }
            StepEvent::Entered(_) => {}
            StepEvent::Verified(report) => break report,
        }
    };

    assert_eq!(report.chunks, 4);
    assert!(pending_polls >= 8, "every chunk waits at least once");
    assert_eq!(cycle.rx(), cycle.tx());
}
