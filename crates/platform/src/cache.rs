//! D-cache maintenance for buffers shared with a DMA master
//!
//! The Cortex-M7 D-cache is not coherent with the SDMMC internal DMA.
//! Before the device reads a buffer the CPU wrote, the dirty lines must be
//! cleaned to memory ([`CacheMaintenance::flush`]). Before the CPU reads a
//! buffer the device wrote, stale lines must be discarded
//! ([`CacheMaintenance::invalidate`]).
//!
//! Maintenance works on whole 32-byte lines. Buffers handed to a DMA master
//! should be 32-byte aligned and a multiple of 32 bytes long so that
//! invalidation never discards unrelated data sharing a line; see
//! [`crate::dma_safety::DmaBuffer`].

/// Cache synchronization capability.
pub trait CacheMaintenance {
    /// Write back dirty lines covering `buf` so a DMA read sees CPU data.
    fn flush(&mut self, buf: &[u8]);

    /// Discard lines covering `buf` so the CPU sees DMA-written data.
    fn invalidate(&mut self, buf: &mut [u8]);
}

/// No-op maintenance for coherent memory (host builds, non-cacheable regions).
#[derive(Debug, Clone, Copy, Default)]
pub struct CoherentMemory;

impl CacheMaintenance for CoherentMemory {
    fn flush(&mut self, _buf: &[u8]) {}

    fn invalidate(&mut self, _buf: &mut [u8]) {}
}

impl<T: CacheMaintenance + ?Sized> CacheMaintenance for &mut T {
    fn flush(&mut self, buf: &[u8]) {
        (**self).flush(buf);
    }

    fn invalidate(&mut self, buf: &mut [u8]) {
        (**self).invalidate(buf);
    }
}
