//! Cortex-M7 D-cache maintenance for the transfer buffers.
//!
//! AXI SRAM stays cacheable (write-back) during the bench, so every DMA
//! hand-off needs explicit maintenance: clean before the SDMMC reads a
//! buffer, invalidate after it wrote one.

use platform::dma_safety::{is_cache_aligned, CACHE_LINE_BYTES};

/// `true` if `buf` covers whole cache lines only.
///
/// Invalidating a partial line would discard whatever else shares it, so
/// partial ranges get clean-and-invalidate instead.
pub fn covers_whole_lines(buf: &[u8]) -> bool {
    is_cache_aligned(buf.as_ptr()) && buf.len().is_multiple_of(CACHE_LINE_BYTES)
}

#[cfg(feature = "hardware")]
pub use hw::ScbCache;

#[cfg(feature = "hardware")]
mod hw {
    use cortex_m::peripheral::SCB;
    use platform::CacheMaintenance;

    use super::covers_whole_lines;

    /// [`CacheMaintenance`] over the SCB cache-maintenance operations.
    pub struct ScbCache {
        scb: SCB,
    }

    impl ScbCache {
        /// Take over the SCB for cache maintenance.
        ///
        /// # Safety
        /// Other SCB users must not run cache maintenance concurrently.
        /// The bench calls this once, after boot has enabled the caches.
        pub unsafe fn steal() -> Self {
            // SAFETY: forwarded to the caller; SCB is a zero-sized handle.
            let peripherals = unsafe { cortex_m::Peripherals::steal() };
            Self {
                scb: peripherals.SCB,
            }
        }
    }

    impl CacheMaintenance for ScbCache {
        fn flush(&mut self, buf: &[u8]) {
            self.scb.clean_dcache_by_slice(buf);
        }

        fn invalidate(&mut self, buf: &mut [u8]) {
            if covers_whole_lines(buf) {
                // SAFETY: buf spans whole lines, so no neighbouring data is
                // discarded, and the DMA write into it has completed.
                unsafe { self.scb.invalidate_dcache_by_slice(buf) };
            } else {
                self.scb
                    .clean_invalidate_dcache_by_address(buf.as_ptr() as usize, buf.len());
            }
        }
    }
}
