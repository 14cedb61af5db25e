//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits
//! for use in unit and integration tests.

#![cfg(any(test, feature = "std"))]

use core::cell::Cell;
use core::convert::Infallible;
use core::fmt;
use std::collections::BTreeMap;
use std::string::String;
use std::vec::Vec;

use embassy_time::{Duration, Instant};
use embedded_hal::digital::{ErrorType, OutputPin, StatefulOutputPin};

use crate::block_device::{BlockDevice, CardRegisters, CardState, DeviceStatus, TransferDirection, BLOCK_SIZE};
use crate::cache::CacheMaintenance;
use crate::clock::MonotonicClock;
use crate::completion::TransferFlags;
use crate::diagnostics::DiagnosticSink;

/// When an accepted mock transfer reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Signal the flag before the issue call returns.
    #[default]
    Immediate,
    /// Hold the signal until [`MockBlockDevice::complete_pending`].
    ///
    /// Data still moves at issue time; only the notification is late.
    Deferred,
}

/// Errors returned by [`MockBlockDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockDeviceError {
    /// Issue refused by fault injection. `issue` is 1-based per direction.
    Rejected {
        /// Direction of the refused call.
        direction: TransferDirection,
        /// Issue number within that direction.
        issue: u32,
    },
    /// Buffer shorter than `block_count` blocks.
    BufferTooShort,
    /// Block range wraps the 32-bit address space.
    AddressOverflow,
    /// Erase refused by fault injection.
    EraseRejected,
}

impl fmt::Display for MockDeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { direction, issue } => {
                write!(f, "mock {direction} #{issue} rejected")
            }
            Self::BufferTooShort => f.write_str("buffer shorter than block count"),
            Self::AddressOverflow => f.write_str("block range overflows"),
            Self::EraseRejected => f.write_str("mock erase rejected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Complete(TransferDirection),
    Fail,
}

/// Sparse RAM-backed block device with fault injection.
///
/// Unwritten and erased blocks read back as zeros. Completions go to the
/// [`TransferFlags`] passed to [`MockBlockDevice::new`].
pub struct MockBlockDevice<'a> {
    flags: &'a TransferFlags,
    blocks: BTreeMap<u32, [u8; BLOCK_SIZE]>,
    mode: CompletionMode,
    pending: Option<Pending>,
    always_busy: bool,
    busy_after_transfer: u32,
    busy_remaining: u32,
    reject_write_at: Option<u32>,
    reject_read_at: Option<u32>,
    fail_write_at: Option<u32>,
    fail_read_at: Option<u32>,
    corrupt_read_at: Option<u64>,
    reject_erase: bool,
    registers: Option<CardRegisters>,
    writes_issued: u32,
    reads_issued: u32,
    status_queries: u32,
    erased: Vec<(u32, u32)>,
}

impl<'a> MockBlockDevice<'a> {
    /// Faithful device: always ready, completes immediately.
    pub fn new(flags: &'a TransferFlags) -> Self {
        Self {
            flags,
            blocks: BTreeMap::new(),
            mode: CompletionMode::Immediate,
            pending: None,
            always_busy: false,
            busy_after_transfer: 0,
            busy_remaining: 0,
            reject_write_at: None,
            reject_read_at: None,
            fail_write_at: None,
            fail_read_at: None,
            corrupt_read_at: None,
            reject_erase: false,
            registers: None,
            writes_issued: 0,
            reads_issued: 0,
            status_queries: 0,
            erased: Vec::new(),
        }
    }

    /// Choose when completions are signaled.
    #[must_use]
    pub fn with_completion(mut self, mode: CompletionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Refuse the `n`-th write issue (1-based).
    #[must_use]
    pub fn reject_write_at(mut self, n: u32) -> Self {
        self.reject_write_at = Some(n);
        self
    }

    /// Refuse the `n`-th read issue (1-based).
    #[must_use]
    pub fn reject_read_at(mut self, n: u32) -> Self {
        self.reject_read_at = Some(n);
        self
    }

    /// Accept the `n`-th write, then raise the error notification instead of
    /// completing it.
    #[must_use]
    pub fn fail_write_at(mut self, n: u32) -> Self {
        self.fail_write_at = Some(n);
        self
    }

    /// Accept the `n`-th read, then raise the error notification.
    #[must_use]
    pub fn fail_read_at(mut self, n: u32) -> Self {
        self.fail_read_at = Some(n);
        self
    }

    /// Invert the byte at device address `byte_addr` on every read covering it.
    #[must_use]
    pub fn corrupt_read_at(mut self, byte_addr: u64) -> Self {
        self.corrupt_read_at = Some(byte_addr);
        self
    }

    /// Report [`DeviceStatus::Busy`] forever.
    #[must_use]
    pub fn always_busy(mut self) -> Self {
        self.always_busy = true;
        self
    }

    /// Report busy for `polls` status queries after each transfer.
    #[must_use]
    pub fn busy_after_transfer(mut self, polls: u32) -> Self {
        self.busy_after_transfer = polls;
        self
    }

    /// Refuse every erase.
    #[must_use]
    pub fn reject_erase(mut self) -> Self {
        self.reject_erase = true;
        self
    }

    /// Expose CID/CSD registers.
    #[must_use]
    pub fn with_registers(mut self, registers: CardRegisters) -> Self {
        self.registers = Some(registers);
        self
    }

    /// Deliver a deferred notification. Returns `false` if none was pending.
    pub fn complete_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                self.notify(pending);
                true
            }
            None => false,
        }
    }

    /// `true` while a deferred notification is held back.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Write issue calls seen, accepted or not.
    pub fn writes_issued(&self) -> u32 {
        self.writes_issued
    }

    /// Read issue calls seen, accepted or not.
    pub fn reads_issued(&self) -> u32 {
        self.reads_issued
    }

    /// Status queries seen.
    pub fn status_queries(&self) -> u32 {
        self.status_queries
    }

    /// R1 card status word the device would answer CMD13 with.
    ///
    /// Programming while busy or holding a completion, Transfer otherwise.
    pub fn card_status(&self) -> u32 {
        let busy = self.always_busy || self.pending.is_some() || self.busy_remaining > 0;
        let state: u32 = if busy { 7 } else { 4 };
        state << 9
    }

    /// Erased ranges, in call order.
    pub fn erased(&self) -> &[(u32, u32)] {
        &self.erased
    }

    /// Stored content of `block`, if it has been written.
    pub fn stored_block(&self, block: u32) -> Option<&[u8; BLOCK_SIZE]> {
        self.blocks.get(&block)
    }

    fn notify(&self, pending: Pending) {
        match pending {
            Pending::Complete(direction) => self.flags.complete(direction),
            Pending::Fail => self.flags.fail(),
        }
    }

    fn finish(&mut self, direction: TransferDirection, fail: bool) {
        self.busy_remaining = self.busy_after_transfer;
        let pending = if fail {
            Pending::Fail
        } else {
            Pending::Complete(direction)
        };
        match self.mode {
            CompletionMode::Immediate => self.notify(pending),
            CompletionMode::Deferred => self.pending = Some(pending),
        }
    }

    fn extent(len: usize, block_addr: u32, block_count: u32) -> Result<usize, MockDeviceError> {
        let bytes = usize::try_from(block_count)
            .ok()
            .and_then(|n| n.checked_mul(BLOCK_SIZE))
            .ok_or(MockDeviceError::BufferTooShort)?;
        if bytes > len {
            return Err(MockDeviceError::BufferTooShort);
        }
        block_addr
            .checked_add(block_count)
            .ok_or(MockDeviceError::AddressOverflow)?;
        Ok(bytes)
    }

    fn corrupt(&self, block: u32, data: &mut [u8]) {
        let Some(target) = self.corrupt_read_at else {
            return;
        };
        let start = u64::from(block).saturating_mul(BLOCK_SIZE as u64);
        let Some(offset) = target.checked_sub(start) else {
            return;
        };
        let byte = usize::try_from(offset).ok().and_then(|i| data.get_mut(i));
        if let Some(byte) = byte {
            *byte ^= 0xFF;
        }
    }
}

impl BlockDevice for MockBlockDevice<'_> {
    type Error = MockDeviceError;

    fn status(&mut self) -> Result<DeviceStatus, Self::Error> {
        self.status_queries = self.status_queries.saturating_add(1);
        let state = CardState::from_card_status(self.card_status());
        if !self.always_busy && self.pending.is_none() {
            self.busy_remaining = self.busy_remaining.saturating_sub(1);
        }
        Ok(state.device_status())
    }

    unsafe fn start_write(
        &mut self,
        data: &[u8],
        block_addr: u32,
        block_count: u32,
    ) -> Result<(), Self::Error> {
        self.writes_issued = self.writes_issued.saturating_add(1);
        let issue = self.writes_issued;
        if self.reject_write_at == Some(issue) {
            return Err(MockDeviceError::Rejected {
                direction: TransferDirection::Write,
                issue,
            });
        }
        let bytes = Self::extent(data.len(), block_addr, block_count)?;
        let mut block = block_addr;
        for src in data.chunks_exact(BLOCK_SIZE).take(bytes / BLOCK_SIZE) {
            let mut stored = [0u8; BLOCK_SIZE];
            stored.copy_from_slice(src);
            self.blocks.insert(block, stored);
            block = block.saturating_add(1);
        }
        self.finish(TransferDirection::Write, self.fail_write_at == Some(issue));
        Ok(())
    }

    unsafe fn start_read(
        &mut self,
        data: &mut [u8],
        block_addr: u32,
        block_count: u32,
    ) -> Result<(), Self::Error> {
        self.reads_issued = self.reads_issued.saturating_add(1);
        let issue = self.reads_issued;
        if self.reject_read_at == Some(issue) {
            return Err(MockDeviceError::Rejected {
                direction: TransferDirection::Read,
                issue,
            });
        }
        let bytes = Self::extent(data.len(), block_addr, block_count)?;
        let mut block = block_addr;
        for dst in data.chunks_exact_mut(BLOCK_SIZE).take(bytes / BLOCK_SIZE) {
            match self.blocks.get(&block) {
                Some(stored) => dst.copy_from_slice(stored),
                None => dst.fill(0),
            }
            self.corrupt(block, dst);
            block = block.saturating_add(1);
        }
        self.finish(TransferDirection::Read, self.fail_read_at == Some(issue));
        Ok(())
    }

    fn erase(&mut self, start_block: u32, end_block: u32) -> Result<(), Self::Error> {
        if self.reject_erase {
            return Err(MockDeviceError::EraseRejected);
        }
        self.blocks.retain(|block, _| !(start_block..end_block).contains(block));
        self.erased.push((start_block, end_block));
        Ok(())
    }

    fn card_registers(&mut self) -> Option<CardRegisters> {
        self.registers
    }
}

/// Manually driven clock.
///
/// Every [`MonotonicClock::now`] call returns the current time and then moves
/// it forward by the auto-advance step, so deadline loops terminate without
/// real time passing.
#[derive(Debug)]
pub struct MockClock {
    now: Cell<Instant>,
    step: Duration,
}

impl MockClock {
    /// Clock frozen at tick 0.
    pub fn new() -> Self {
        Self::with_auto_advance(Duration::from_ticks(0))
    }

    /// Clock that advances by `step` on every read.
    pub fn with_auto_advance(step: Duration) -> Self {
        Self {
            now: Cell::new(Instant::from_ticks(0)),
            step,
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let next = self.now.get().checked_add(by).unwrap_or(Instant::MAX);
        self.now.set(next);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for MockClock {
    fn now(&self) -> Instant {
        let current = self.now.get();
        self.advance(self.step);
        current
    }
}

/// Output pin that remembers its level and counts writes.
#[derive(Debug, Default)]
pub struct MockPin {
    high: bool,
    transitions: usize,
}

impl MockPin {
    /// Pin starting low with no writes recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level.
    pub fn is_high(&self) -> bool {
        self.high
    }

    /// Number of `set_high` / `set_low` calls.
    pub fn transitions(&self) -> usize {
        self.transitions
    }

    fn drive(&mut self, high: bool) {
        self.high = high;
        self.transitions = self.transitions.saturating_add(1);
    }
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

impl StatefulOutputPin for MockPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}

/// Diagnostic sink that keeps every line.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Vec<String>,
}

impl RecordingSink {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines in emission order, without terminators.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// `true` if any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl DiagnosticSink for RecordingSink {
    fn line(&mut self, args: fmt::Arguments<'_>) {
        let mut text = String::new();
        let _ = fmt::Write::write_fmt(&mut text, args);
        self.lines.push(text);
    }
}

/// Cache maintenance recorder.
///
/// Each entry is the `(address, length)` of one maintenance call.
#[derive(Debug, Default)]
pub struct RecordingCache {
    flushes: Vec<(usize, usize)>,
    invalidations: Vec<(usize, usize)>,
}

impl RecordingCache {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded flushes.
    pub fn flushes(&self) -> &[(usize, usize)] {
        &self.flushes
    }

    /// Recorded invalidations.
    pub fn invalidations(&self) -> &[(usize, usize)] {
        &self.invalidations
    }
}

impl CacheMaintenance for RecordingCache {
    fn flush(&mut self, buf: &[u8]) {
        self.flushes.push((buf.as_ptr() as usize, buf.len()));
    }

    fn invalidate(&mut self, buf: &mut [u8]) {
        self.invalidations.push((buf.as_ptr() as usize, buf.len()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn write(dev: &mut MockBlockDevice<'_>, data: &[u8], addr: u32) -> Result<(), MockDeviceError> {
        let blocks = u32::try_from(data.len() / BLOCK_SIZE).unwrap();
        // SAFETY: the mock copies synchronously; `data` outlives the call.
        unsafe { dev.start_write(data, addr, blocks) }
    }

    fn read(dev: &mut MockBlockDevice<'_>, data: &mut [u8], addr: u32) -> Result<(), MockDeviceError> {
        let blocks = u32::try_from(data.len() / BLOCK_SIZE).unwrap();
        // SAFETY: as above.
        unsafe { dev.start_read(data, addr, blocks) }
    }

    #[test]
    fn test_mock_device_round_trip() {
        let flags = TransferFlags::new();
        let mut dev = MockBlockDevice::new(&flags);
        let src: Vec<u8> = (0..1024).map(|i| i as u8).collect();
        write(&mut dev, &src, 0x400).unwrap();
        assert!(flags.write.take());

        let mut dst = vec![0u8; 1024];
        read(&mut dev, &mut dst, 0x400).unwrap();
        assert!(flags.read.take());
        assert_eq!(src, dst);
        assert_eq!(dev.stored_block(0x401).unwrap()[0], 0);
    }

    #[test]
    fn test_mock_device_rejects_nth_issue() {
        let flags = TransferFlags::new();
        let mut dev = MockBlockDevice::new(&flags).reject_write_at(2);
        let block = [0u8; BLOCK_SIZE];
        assert!(write(&mut dev, &block, 0).is_ok());
        assert_eq!(
            write(&mut dev, &block, 0),
            Err(MockDeviceError::Rejected {
                direction: TransferDirection::Write,
                issue: 2
            })
        );
        assert_eq!(dev.writes_issued(), 2);
    }

    #[test]
    fn test_mock_device_corrupts_one_byte() {
        let flags = TransferFlags::new();
        let mut dev = MockBlockDevice::new(&flags).corrupt_read_at(BLOCK_SIZE as u64 + 3);
        let src = [0x5Au8; 2 * BLOCK_SIZE];
        write(&mut dev, &src, 0).unwrap();
        let mut dst = [0u8; 2 * BLOCK_SIZE];
        read(&mut dev, &mut dst, 0).unwrap();
        let diffs: Vec<usize> = (0..dst.len()).filter(|&i| dst[i] != src[i]).collect();
        assert_eq!(diffs, vec![BLOCK_SIZE + 3]);
    }

    #[test]
    fn test_mock_device_deferred_completion() {
        let flags = TransferFlags::new();
        let mut dev = MockBlockDevice::new(&flags).with_completion(CompletionMode::Deferred);
        write(&mut dev, &[1u8; BLOCK_SIZE], 7).unwrap();
        assert!(!flags.write.is_set());
        assert_eq!(dev.status().unwrap(), DeviceStatus::Busy);
        assert!(dev.complete_pending());
        assert!(flags.write.take());
        assert!(!dev.complete_pending());
    }

    #[test]
    fn test_mock_device_busy_after_transfer() {
        let flags = TransferFlags::new();
        let mut dev = MockBlockDevice::new(&flags).busy_after_transfer(2);
        write(&mut dev, &[0u8; BLOCK_SIZE], 0).unwrap();
        assert_eq!(CardState::from_card_status(dev.card_status()), CardState::Programming);
        assert_eq!(dev.status().unwrap(), DeviceStatus::Busy);
        assert_eq!(dev.status().unwrap(), DeviceStatus::Busy);
        assert_eq!(dev.status().unwrap(), DeviceStatus::Ready);
        assert_eq!(CardState::from_card_status(dev.card_status()), CardState::Transfer);
        assert_eq!(dev.status_queries(), 3);
    }

    #[test]
    fn test_mock_device_failure_raises_error_flag() {
        let flags = TransferFlags::new();
        let mut dev = MockBlockDevice::new(&flags).fail_read_at(1);
        let mut dst = [0u8; BLOCK_SIZE];
        read(&mut dev, &mut dst, 0).unwrap();
        assert!(flags.error.is_set());
        assert!(!flags.read.is_set());
    }

    #[test]
    fn test_mock_device_erase_clears_blocks() {
        let flags = TransferFlags::new();
        let mut dev = MockBlockDevice::new(&flags);
        write(&mut dev, &[9u8; 2 * BLOCK_SIZE], 4).unwrap();
        dev.erase(4, 5).unwrap();
        assert!(dev.stored_block(4).is_none());
        assert!(dev.stored_block(5).is_some());
        assert_eq!(dev.erased(), &[(4, 5)]);
    }

    #[test]
    fn test_short_buffer_is_refused() {
        let flags = TransferFlags::new();
        let mut dev = MockBlockDevice::new(&flags);
        // SAFETY: rejected before any data movement.
        let res = unsafe { dev.start_write(&[0u8; 100], 0, 1) };
        assert_eq!(res, Err(MockDeviceError::BufferTooShort));
    }

    #[test]
    fn test_mock_clock_auto_advance() {
        let clock = MockClock::with_auto_advance(Duration::from_millis(5));
        let a = clock.now();
        let b = clock.now();
        assert_eq!(b - a, Duration::from_millis(5));
        clock.advance(Duration::from_millis(100));
        assert_eq!(clock.now() - b, Duration::from_millis(105));
    }

    #[test]
    fn test_recording_sink_and_cache() {
        let mut sink = RecordingSink::new();
        sink.line(format_args!("{} MB", 100));
        assert!(sink.contains("100 MB"));

        let mut cache = RecordingCache::new();
        let mut buf = [0u8; 64];
        cache.flush(&buf);
        cache.invalidate(&mut buf);
        assert_eq!(cache.flushes().len(), 1);
        assert_eq!(cache.invalidations()[0].1, 64);
    }
}
