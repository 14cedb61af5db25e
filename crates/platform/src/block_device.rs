//! Block device abstraction for completion-signaled storage
//!
//! A [`BlockDevice`] accepts one asynchronous transfer per direction and
//! reports its completion out-of-band through the [`TransferFlags`] it was
//! constructed with. Issuing a transfer never blocks on the data movement.
//!
//! [`TransferFlags`]: crate::completion::TransferFlags

use core::fmt;

/// Size of one addressable block in bytes.
///
/// MMC and SD cards use 512-byte blocks for all data transfers.
pub const BLOCK_SIZE: usize = 512;

/// Readiness reported by a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceStatus {
    /// Device can accept a new transfer.
    Ready,
    /// Device is still programming or moving data.
    Busy,
    /// Device reported an error state.
    Error,
}

/// Direction of a data transfer, seen from the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferDirection {
    /// Memory to card.
    Write,
    /// Card to memory.
    Read,
}

impl TransferDirection {
    /// Lower-case label for console output.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// MMC card state as reported in the CURRENT_STATE field of an R1 response.
///
/// Only [`CardState::Transfer`] means the card accepts a new data command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardState {
    /// Idle (0)
    Idle,
    /// Ready (1)
    Ready,
    /// Identification (2)
    Ident,
    /// Stand-by (3)
    Standby,
    /// Transfer (4): ready for data commands
    Transfer,
    /// Sending data (5)
    SendingData,
    /// Receiving data (6)
    ReceiveData,
    /// Programming (7)
    Programming,
    /// Disconnect (8)
    Disconnect,
    /// Bus test (9)
    BusTest,
    /// Sleep (10)
    Sleep,
    /// Reserved encodings 11..=15
    Reserved(u8),
}

impl CardState {
    /// Decode CURRENT_STATE (bits 12:9) from a 32-bit R1 card status word.
    pub const fn from_card_status(status: u32) -> Self {
        // Masked to 4 bits; the cast cannot truncate.
        #[allow(clippy::cast_possible_truncation)]
        let state = ((status >> 9) & 0xF) as u8;
        match state {
            0 => Self::Idle,
            1 => Self::Ready,
            2 => Self::Ident,
            3 => Self::Standby,
            4 => Self::Transfer,
            5 => Self::SendingData,
            6 => Self::ReceiveData,
            7 => Self::Programming,
            8 => Self::Disconnect,
            9 => Self::BusTest,
            10 => Self::Sleep,
            other => Self::Reserved(other),
        }
    }

    /// Collapse the card state into the bench's ready/busy/error view.
    pub const fn device_status(self) -> DeviceStatus {
        match self {
            Self::Transfer => DeviceStatus::Ready,
            Self::SendingData | Self::ReceiveData | Self::Programming | Self::Disconnect => {
                DeviceStatus::Busy
            }
            Self::Idle
            | Self::Ready
            | Self::Ident
            | Self::Standby
            | Self::BusTest
            | Self::Sleep
            | Self::Reserved(_) => DeviceStatus::Error,
        }
    }
}

/// Raw CID and CSD registers, most significant word first.
///
/// `cid[0]` holds bits 127:96, `cid[3]` holds bits 31:0. Decode with
/// [`crate::card_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CardRegisters {
    /// Card identification register.
    pub cid: [u32; 4],
    /// Card-specific data register.
    pub csd: [u32; 4],
}

/// Block storage reachable only through asynchronous, completion-signaled I/O.
///
/// Implementations report each accepted transfer's completion exactly once by
/// signaling the matching flag in the [`TransferFlags`] they were built with,
/// and signal the error flag if the transfer fails after acceptance.
///
/// [`TransferFlags`]: crate::completion::TransferFlags
pub trait BlockDevice {
    /// Error type returned when a command is refused.
    type Error: fmt::Display;

    /// Query whether the device can accept a new transfer.
    fn status(&mut self) -> Result<DeviceStatus, Self::Error>;

    /// Start writing `block_count` blocks from `data` at `block_addr`.
    ///
    /// `Ok(())` means the transfer was accepted and a completion will follow.
    ///
    /// # Safety
    ///
    /// The device may keep reading from `data` after this call returns.
    /// The caller must keep the buffer alive and unmodified until the write
    /// completion flag is observed, and must have cleaned the D-cache lines
    /// covering `data` beforehand.
    unsafe fn start_write(
        &mut self,
        data: &[u8],
        block_addr: u32,
        block_count: u32,
    ) -> Result<(), Self::Error>;

    /// Start reading `block_count` blocks at `block_addr` into `data`.
    ///
    /// `Ok(())` means the transfer was accepted and a completion will follow.
    ///
    /// # Safety
    ///
    /// The device may keep writing into `data` after this call returns.
    /// The caller must not read or write the buffer until the read completion
    /// flag is observed, and must invalidate the D-cache lines covering
    /// `data` before reading it.
    unsafe fn start_read(
        &mut self,
        data: &mut [u8],
        block_addr: u32,
        block_count: u32,
    ) -> Result<(), Self::Error>;

    /// Erase the block range `[start_block, end_block)`.
    fn erase(&mut self, start_block: u32, end_block: u32) -> Result<(), Self::Error>;

    /// Raw identification registers, when the driver exposes them.
    fn card_registers(&mut self) -> Option<CardRegisters> {
        None
    }
}
