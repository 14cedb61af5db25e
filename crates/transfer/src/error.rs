//! Error types for the transfer cycle.

use core::fmt;

use platform::TransferDirection;

/// Fatal cycle fault. The controller latches the first one it raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleError {
    /// The ready poll ran out before the device reported ready.
    DeviceNotReady {
        /// Transfer that was about to be issued.
        direction: TransferDirection,
        /// Status queries made.
        attempts: u32,
    },
    /// The device refused to start a transfer.
    TransferRejected {
        /// Direction of the refused transfer.
        direction: TransferDirection,
        /// Zero-based chunk index within the phase.
        chunk: u32,
    },
    /// The device accepted a transfer and then reported an error.
    TransferFailed {
        /// Direction of the failed transfer.
        direction: TransferDirection,
        /// Zero-based chunk index within the phase.
        chunk: u32,
    },
    /// The device refused the pre-cycle erase.
    EraseFailed,
    /// Read-back data differs from what was written.
    DataMismatch {
        /// Byte offset of the first difference.
        offset: usize,
        /// Byte written.
        expected: u8,
        /// Byte read back.
        actual: u8,
    },
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceNotReady {
                direction,
                attempts,
            } => write!(f, "device not ready for {direction} after {attempts} polls"),
            Self::TransferRejected { direction, chunk } => {
                write!(f, "{direction} of chunk {chunk} rejected")
            }
            Self::TransferFailed { direction, chunk } => {
                write!(f, "{direction} of chunk {chunk} failed")
            }
            Self::EraseFailed => f.write_str("erase failed"),
            Self::DataMismatch {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "data mismatch at offset {offset}: expected 0x{expected:02X}, read 0x{actual:02X}"
            ),
        }
    }
}

/// Invalid [`CycleConfig`](crate::config::CycleConfig) or buffer pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Chunk size is zero or not a whole number of blocks.
    ChunkNotBlockMultiple {
        /// Configured chunk size.
        chunk_bytes: usize,
    },
    /// Total size is zero or leaves a partial chunk.
    TotalNotChunkMultiple {
        /// Configured total size.
        total_bytes: u64,
        /// Configured chunk size.
        chunk_bytes: usize,
    },
    /// More chunks or blocks than the 32-bit counters can hold.
    TooLarge,
    /// The last block addressed would pass the end of the 32-bit block space.
    AddressOverflow,
    /// A buffer's length does not match the layout.
    BufferSizeMismatch {
        /// Length the layout requires.
        expected: usize,
        /// Source buffer length.
        tx: usize,
        /// Destination buffer length.
        rx: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChunkNotBlockMultiple { chunk_bytes } => {
                write!(f, "chunk of {chunk_bytes} bytes is not a whole number of blocks")
            }
            Self::TotalNotChunkMultiple {
                total_bytes,
                chunk_bytes,
            } => write!(
                f,
                "total of {total_bytes} bytes is not a whole number of {chunk_bytes}-byte chunks"
            ),
            Self::TooLarge => f.write_str("transfer too large for 32-bit block counters"),
            Self::AddressOverflow => f.write_str("block range passes the end of the device"),
            Self::BufferSizeMismatch { expected, tx, rx } => write!(
                f,
                "buffers must be {expected} bytes (tx {tx}, rx {rx})"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message_shows_bytes() {
        let err = CycleError::DataMismatch {
            offset: 1000,
            expected: 0xDB,
            actual: 0x24,
        };
        assert_eq!(
            err.to_string(),
            "data mismatch at offset 1000: expected 0xDB, read 0x24"
        );
    }

    #[test]
    fn test_not_ready_names_direction() {
        let err = CycleError::DeviceNotReady {
            direction: TransferDirection::Read,
            attempts: 16,
        };
        assert_eq!(err.to_string(), "device not ready for read after 16 polls");
    }
}
