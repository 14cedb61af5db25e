//! DMA memory map, buffer sizing and region-tagged buffers for STM32H745.
//!
//! ## SDMMC1 internal DMA reachability
//!
//! SDMMC1 masters the AXI bus matrix through its own IDMA. It reaches the D1
//! domain only:
//!
//! | Memory Region | Base Address | Size   | SDMMC1 IDMA | Use case                     |
//! |---------------|--------------|--------|-------------|------------------------------|
//! | DTCM          | 0x2000_0000  | 128 KB | NO          | stack, `.data`, `.bss`       |
//! | AXI SRAM (D1) | 0x2400_0000  | 512 KB | YES         | TX / RX transfer buffers     |
//! | SRAM1/2 (D2)  | 0x3000_0000  | 256 KB | NO          |                              |
//! | SRAM4 (D3)    | 0x3800_0000  | 64 KB  | NO          |                              |
//!
//! The two 256 KiB transfer buffers fill AXI SRAM exactly: TX at the base,
//! RX directly behind it.
//!
//! ## Usage
//! ```rust
//! use platform::dma_safety::{AxiSramRegion, DmaBuffer};
//!
//! let mut buf: DmaBuffer<AxiSramRegion, [u8; 512]> = DmaBuffer::zeroed();
//! buf.as_mut_slice()[0] = 0xB5;
//! assert_eq!(buf.as_ptr() as usize % 32, 0);
//! ```

use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

// ── Memory region addresses ──────────────────────────────────────────────────

/// Base address of DTCM (CPU only).
pub const DTCM_BASE: u32 = 0x2000_0000;

/// Size of DTCM in bytes (128 KB).
pub const DTCM_SIZE_BYTES: usize = 128 * 1024;

/// Base address of AXI SRAM (D1 domain, SDMMC1 IDMA accessible).
pub const AXI_SRAM_BASE: u32 = 0x2400_0000;

/// Size of AXI SRAM in bytes (512 KB).
pub const AXI_SRAM_SIZE_BYTES: usize = 512 * 1024;

/// Base address of SRAM1 (D2 domain).
pub const SRAM1_BASE: u32 = 0x3000_0000;

/// Size of SRAM1 + SRAM2 in bytes (256 KB).
pub const SRAM12_SIZE_BYTES: usize = 256 * 1024;

/// Cortex-M7 D-cache line size. Cache maintenance works on whole lines.
pub const CACHE_LINE_BYTES: usize = 32;

// ── Bench buffer layout ──────────────────────────────────────────────────────

/// Bytes moved by one DMA transfer in the bench preset (256 KiB, 512 blocks).
pub const TRANSFER_BUFFER_BYTES: usize = 0x0004_0000;

/// Bytes moved per phase in the bench preset (100 MiB, 400 chunks).
pub const TOTAL_TRANSFER_BYTES: u64 = 0x0640_0000;

/// Address of the TX (source) buffer in AXI SRAM.
pub const TX_BUFFER_ADDR: u32 = AXI_SRAM_BASE;

/// Address of the RX (destination) buffer, directly behind TX.
pub const RX_BUFFER_ADDR: u32 = 0x2404_0000;

/// Memory regions relevant to DMA buffer placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemoryRegion {
    /// DTCM: tightly coupled, invisible to every DMA master.
    Dtcm,
    /// AXI SRAM: the only RAM SDMMC1 IDMA can reach.
    AxiSram,
    /// SRAM1/SRAM2 in D2.
    Sram12,
}

impl MemoryRegion {
    const ALL: [Self; 3] = [Self::Dtcm, Self::AxiSram, Self::Sram12];

    /// Base address.
    pub const fn base(self) -> u32 {
        match self {
            Self::Dtcm => DTCM_BASE,
            Self::AxiSram => AXI_SRAM_BASE,
            Self::Sram12 => SRAM1_BASE,
        }
    }

    /// Size in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Dtcm => DTCM_SIZE_BYTES,
            Self::AxiSram => AXI_SRAM_SIZE_BYTES,
            Self::Sram12 => SRAM12_SIZE_BYTES,
        }
    }

    /// `true` if `[addr, addr + len)` lies entirely inside this region.
    pub fn contains(self, addr: usize, len: usize) -> bool {
        let base = self.base() as usize;
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        let Some(region_end) = base.checked_add(self.size()) else {
            return false;
        };
        addr >= base && end <= region_end
    }

    /// Region holding `[addr, addr + len)`, if it lies in a single known region.
    pub fn containing(addr: usize, len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.contains(addr, len))
    }

    /// `true` if SDMMC1's internal DMA can read and write this region.
    pub const fn sdmmc1_reachable(self) -> bool {
        matches!(self, Self::AxiSram)
    }
}

/// `true` if `ptr` is aligned to a D-cache line.
pub fn is_cache_aligned(ptr: *const u8) -> bool {
    (ptr as usize).is_multiple_of(CACHE_LINE_BYTES)
}

// ── Marker traits ────────────────────────────────────────────────────────────

/// Marker trait: memory region reachable by the SDMMC1 internal DMA.
///
/// # Safety
/// Only implement for zero-sized types representing memory regions that
/// SDMMC1 IDMA can physically access. Implementing it for DTCM causes silent
/// DMA data corruption.
pub unsafe trait DmaAccessible: Sized {}

// ── Region zero-sized types ──────────────────────────────────────────────────

/// Zero-sized type representing AXI SRAM.
///
/// Buffers tagged with this region must be placed via
/// `#[link_section = ".axisram"]`.
#[derive(Debug, Clone, Copy)]
pub struct AxiSramRegion;

// SAFETY: AXI SRAM at 0x2400_0000 is in the D1 domain on the AXI matrix,
// which SDMMC1 IDMA masters (RM0399 bus matrix figure).
unsafe impl DmaAccessible for AxiSramRegion {}

/// Zero-sized type representing DTCM (CPU-only, NOT DMA-accessible).
#[derive(Debug, Clone, Copy)]
pub struct DtcmRegion;
// DtcmRegion intentionally does NOT implement DmaAccessible.

// ── Region-tagged buffer ─────────────────────────────────────────────────────

/// Cache-line-aligned DMA buffer tagged with the memory region it lives in.
///
/// The 32-byte alignment keeps every buffer on whole cache lines, so
/// invalidating it never discards a neighbour's dirty data.
#[repr(C, align(32))]
pub struct DmaBuffer<R: DmaAccessible, B> {
    data: B,
    _region: PhantomData<R>,
}

impl<R: DmaAccessible, const N: usize> DmaBuffer<R, [u8; N]> {
    /// Buffer length in bytes.
    pub const LEN: usize = N;

    /// Zero-filled buffer.
    pub const fn zeroed() -> Self {
        Self {
            data: [0; N],
            _region: PhantomData,
        }
    }

    /// Contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable contents.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Start address, for placement checks.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

impl<R: DmaAccessible, const N: usize> Deref for DmaBuffer<R, [u8; N]> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl<R: DmaAccessible, const N: usize> DerefMut for DmaBuffer<R, [u8; N]> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_buffers_fill_axi_sram() {
        assert_eq!(RX_BUFFER_ADDR as usize, TX_BUFFER_ADDR as usize + TRANSFER_BUFFER_BYTES);
        assert_eq!(2 * TRANSFER_BUFFER_BYTES, AXI_SRAM_SIZE_BYTES);
        assert_eq!(
            MemoryRegion::containing(RX_BUFFER_ADDR as usize, TRANSFER_BUFFER_BYTES),
            Some(MemoryRegion::AxiSram)
        );
    }

    #[test]
    fn test_bench_total_is_whole_chunks() {
        assert_eq!(TOTAL_TRANSFER_BYTES % TRANSFER_BUFFER_BYTES as u64, 0);
        assert_eq!(TOTAL_TRANSFER_BYTES / TRANSFER_BUFFER_BYTES as u64, 400);
    }

    #[test]
    fn test_only_axi_sram_is_sdmmc1_reachable() {
        assert!(MemoryRegion::AxiSram.sdmmc1_reachable());
        assert!(!MemoryRegion::Dtcm.sdmmc1_reachable());
        assert!(!MemoryRegion::Sram12.sdmmc1_reachable());
    }

    #[test]
    fn test_range_straddling_region_end_is_rejected() {
        let addr = AXI_SRAM_BASE as usize + AXI_SRAM_SIZE_BYTES - 16;
        assert_eq!(MemoryRegion::containing(addr, 32), None);
    }

    #[test]
    fn test_dma_buffer_is_cache_line_aligned() {
        let bufs: [DmaBuffer<AxiSramRegion, [u8; 40]>; 2] =
            [DmaBuffer::zeroed(), DmaBuffer::zeroed()];
        for buf in &bufs {
            assert!(is_cache_aligned(buf.as_ptr()));
        }
        assert_eq!(core::mem::size_of::<DmaBuffer<AxiSramRegion, [u8; 40]>>(), 64);
    }

    #[test]
    fn test_dma_buffer_derefs_to_bytes() {
        let mut buf: DmaBuffer<AxiSramRegion, [u8; 4]> = DmaBuffer::zeroed();
        buf[2] = 7;
        assert_eq!(&*buf, &[0, 0, 7, 0]);
        assert_eq!(DmaBuffer::<AxiSramRegion, [u8; 4]>::LEN, 4);
    }
}
