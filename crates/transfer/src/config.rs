//! Cycle configuration and the validated chunk plan derived from it.
//!
//! A [`CycleConfig`] is plain data. [`CycleConfig::validate`] checks every
//! divisibility and range rule once, up front, and produces a [`ChunkPlan`]
//! whose accessors cannot fail afterwards.

use core::ops::Range;

use embassy_time::Duration;
use platform::block_device::BLOCK_SIZE;
use platform::dma_safety::{TOTAL_TRANSFER_BYTES, TRANSFER_BUFFER_BYTES};
use platform::PollLimit;

use crate::error::ConfigError;

/// Block address the bench writes to and reads from.
pub const BENCH_BLOCK_ADDR: u32 = 0x0000_0400;

/// Base value of the test pattern.
pub const BENCH_PATTERN: u32 = 0xB5F3_A5F3;

/// Pause after a verified cycle.
pub const BENCH_SUCCESS_PAUSE: Duration = Duration::from_millis(2000);

/// How chunks map onto buffers and device addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChunkLayout {
    /// Buffers are one chunk long; every chunk re-sends the whole buffer to
    /// the same address.
    #[default]
    Repeated,
    /// Buffers hold the whole total; chunk `i` moves window `i` to
    /// `block_addr + i * blocks_per_chunk`.
    Striped,
}

/// Transfer cycle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleConfig {
    /// Bytes per transfer call. A whole number of blocks.
    pub chunk_bytes: usize,
    /// Bytes per phase. A whole number of chunks.
    pub total_bytes: u64,
    /// First block addressed.
    pub block_addr: u32,
    /// Pattern base: byte `i` of the source is `(base + i) as u8`.
    pub pattern_base: u32,
    /// Buffer / address mapping.
    pub layout: ChunkLayout,
    /// Budget for each ready-wait.
    pub ready_poll: PollLimit,
    /// Pause after a verified cycle.
    pub success_pause: Duration,
}

impl CycleConfig {
    /// The eMMC DMA bench: 400 × 256 KiB to block 0x400, repeated layout.
    pub const fn mmc_dma_bench() -> Self {
        Self {
            chunk_bytes: TRANSFER_BUFFER_BYTES,
            total_bytes: TOTAL_TRANSFER_BYTES,
            block_addr: BENCH_BLOCK_ADDR,
            pattern_base: BENCH_PATTERN,
            layout: ChunkLayout::Repeated,
            ready_poll: PollLimit::Iterations(platform::poll::MMC_READY_POLL_ITERATIONS),
            success_pause: BENCH_SUCCESS_PAUSE,
        }
    }

    /// Check the configuration and derive the chunk plan.
    pub fn validate(&self) -> Result<ChunkPlan, ConfigError> {
        let chunk_error = ConfigError::ChunkNotBlockMultiple {
            chunk_bytes: self.chunk_bytes,
        };
        if self.chunk_bytes == 0 || !self.chunk_bytes.is_multiple_of(BLOCK_SIZE) {
            return Err(chunk_error);
        }
        let chunk = u64::try_from(self.chunk_bytes).map_err(|_| ConfigError::TooLarge)?;
        if self.total_bytes == 0 || !self.total_bytes.is_multiple_of(chunk) {
            return Err(ConfigError::TotalNotChunkMultiple {
                total_bytes: self.total_bytes,
                chunk_bytes: self.chunk_bytes,
            });
        }

        let chunks = self
            .total_bytes
            .checked_div(chunk)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(ConfigError::TooLarge)?;
        let blocks_per_chunk = self
            .chunk_bytes
            .checked_div(BLOCK_SIZE)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(ConfigError::TooLarge)?;

        let (buffer_bytes, blocks_spanned) = match self.layout {
            ChunkLayout::Repeated => (self.chunk_bytes, blocks_per_chunk),
            ChunkLayout::Striped => (
                usize::try_from(self.total_bytes).map_err(|_| ConfigError::TooLarge)?,
                blocks_per_chunk
                    .checked_mul(chunks)
                    .ok_or(ConfigError::TooLarge)?,
            ),
        };
        self.block_addr
            .checked_add(blocks_spanned)
            .ok_or(ConfigError::AddressOverflow)?;

        Ok(ChunkPlan {
            layout: self.layout,
            chunk_bytes: self.chunk_bytes,
            chunks,
            blocks_per_chunk,
            buffer_bytes,
            block_addr: self.block_addr,
            total_bytes: self.total_bytes,
        })
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self::mmc_dma_bench()
    }
}

/// Validated chunk geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChunkPlan {
    layout: ChunkLayout,
    chunk_bytes: usize,
    chunks: u32,
    blocks_per_chunk: u32,
    buffer_bytes: usize,
    block_addr: u32,
    total_bytes: u64,
}

impl ChunkPlan {
    /// Chunk layout.
    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    /// Bytes per transfer call.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Transfers per phase.
    pub fn chunks(&self) -> u32 {
        self.chunks
    }

    /// Blocks per transfer call.
    pub fn blocks_per_chunk(&self) -> u32 {
        self.blocks_per_chunk
    }

    /// Required length of both buffers.
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    /// Bytes moved per phase.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Device block address of `chunk`.
    pub fn block_addr_of(&self, chunk: u32) -> u32 {
        match self.layout {
            ChunkLayout::Repeated => self.block_addr,
            // bounded by validate(): block_addr + chunks * blocks_per_chunk fits u32
            ChunkLayout::Striped => self
                .block_addr
                .saturating_add(chunk.saturating_mul(self.blocks_per_chunk)),
        }
    }

    /// Buffer window moved by `chunk`.
    pub fn window(&self, chunk: u32) -> Range<usize> {
        match self.layout {
            ChunkLayout::Repeated => 0..self.chunk_bytes,
            ChunkLayout::Striped => {
                let index = usize::try_from(chunk).unwrap_or(usize::MAX);
                let start = index.saturating_mul(self.chunk_bytes);
                start..start.saturating_add(self.chunk_bytes)
            }
        }
    }

    /// Block range `[start, end)` erased before the first cycle.
    pub fn erase_range(&self) -> (u32, u32) {
        (
            self.block_addr,
            self.block_addr.saturating_add(self.blocks_per_chunk),
        )
    }
}
