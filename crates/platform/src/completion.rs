//! Completion flags shared between the I/O completion path and the cycle
//!
//! The completion path (an interrupt handler, the SDMMC task, or a test
//! harness) only ever calls [`CompletionFlag::signal`]. The cycle clears the
//! flag before issuing a transfer and consumes it with
//! [`CompletionFlag::take`]. Release/Acquire ordering makes the data written
//! by the device visible to the cycle once it observes the flag.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::block_device::TransferDirection;

/// Single-writer, single-reader completion bit.
#[derive(Debug)]
pub struct CompletionFlag {
    set: AtomicBool,
}

impl CompletionFlag {
    /// New, cleared flag. `const` so it can back a `static`.
    pub const fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
        }
    }

    /// Mark the transfer complete. Safe to call from interrupt context.
    pub fn signal(&self) {
        self.set.store(true, Ordering::Release);
    }

    /// Clear the flag before issuing the next transfer.
    pub fn clear(&self) {
        self.set.store(false, Ordering::Release);
    }

    /// Observe the flag without consuming it.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Consume the flag: returns `true` once per signal.
    pub fn take(&self) -> bool {
        self.set.swap(false, Ordering::AcqRel)
    }
}

impl Default for CompletionFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Write, read and error flags for one block device.
#[derive(Debug, Default)]
pub struct TransferFlags {
    /// Set when an accepted write has finished moving data.
    pub write: CompletionFlag,
    /// Set when an accepted read has finished moving data.
    pub read: CompletionFlag,
    /// Set when an accepted transfer failed after issue.
    pub error: CompletionFlag,
}

impl TransferFlags {
    /// All flags cleared.
    pub const fn new() -> Self {
        Self {
            write: CompletionFlag::new(),
            read: CompletionFlag::new(),
            error: CompletionFlag::new(),
        }
    }

    /// Completion flag for `direction`.
    pub fn flag(&self, direction: TransferDirection) -> &CompletionFlag {
        match direction {
            TransferDirection::Write => &self.write,
            TransferDirection::Read => &self.read,
        }
    }

    /// Completion notification for an accepted transfer.
    pub fn complete(&self, direction: TransferDirection) {
        self.flag(direction).signal();
    }

    /// Error notification for an accepted transfer.
    pub fn fail(&self) {
        self.error.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static FLAGS: TransferFlags = TransferFlags::new();

    #[test]
    fn test_take_consumes_a_single_signal() {
        let flag = CompletionFlag::new();
        assert!(!flag.take());
        flag.signal();
        assert!(flag.is_set());
        assert!(flag.take());
        assert!(!flag.take(), "second take must see the flag cleared");
    }

    #[test]
    fn test_clear_discards_pending_signal() {
        let flag = CompletionFlag::new();
        flag.signal();
        flag.clear();
        assert!(!flag.is_set());
    }

    #[test]
    fn test_directions_are_independent() {
        let flags = TransferFlags::new();
        flags.complete(TransferDirection::Write);
        assert!(flags.write.is_set());
        assert!(!flags.read.is_set());
        assert!(!flags.error.is_set());
    }

    #[tokio::test]
    async fn test_signal_from_another_task_is_observed() {
        FLAGS.read.clear();
        let handle = tokio::spawn(async {
            FLAGS.complete(TransferDirection::Read);
        });
        handle.await.unwrap();
        assert!(FLAGS.read.take());
    }
}
