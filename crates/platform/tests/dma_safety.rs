//! Architecture tests: DMA buffer placement.
//! These tests enforce the guarantees the bench relies on when handing
//! buffers to the SDMMC1 internal DMA.

// Test files legitimately use arithmetic for verification; allow at file level.
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
// Some assertions check documented compile-time constants for architectural correctness.
#![allow(clippy::assertions_on_constants)]

use platform::dma_safety::{
    AxiSramRegion, DmaAccessible, DmaBuffer, MemoryRegion, AXI_SRAM_BASE, AXI_SRAM_SIZE_BYTES,
    CACHE_LINE_BYTES, RX_BUFFER_ADDR, TRANSFER_BUFFER_BYTES, TX_BUFFER_ADDR,
};

// Test 1: AxiSramRegion implements DmaAccessible and is zero-sized
#[test]
fn axi_sram_region_implements_dma_accessible() {
    fn assert_dma_accessible<T: DmaAccessible>() {}
    assert_dma_accessible::<AxiSramRegion>();
    assert_eq!(core::mem::size_of::<AxiSramRegion>(), 0);
}

// Test 2: the region tag adds no storage
#[test]
fn region_tag_is_free() {
    assert_eq!(
        core::mem::size_of::<DmaBuffer<AxiSramRegion, [u8; TRANSFER_BUFFER_BYTES]>>(),
        TRANSFER_BUFFER_BYTES
    );
}

// Test 3: bench buffers are cache-line aligned and do not share a line
#[test]
fn bench_buffers_are_line_aligned_and_disjoint() {
    assert_eq!(TX_BUFFER_ADDR as usize % CACHE_LINE_BYTES, 0);
    assert_eq!(RX_BUFFER_ADDR as usize % CACHE_LINE_BYTES, 0);
    assert_eq!(TRANSFER_BUFFER_BYTES % CACHE_LINE_BYTES, 0);
    assert!(TX_BUFFER_ADDR as usize + TRANSFER_BUFFER_BYTES <= RX_BUFFER_ADDR as usize);
}

// Test 4: both bench buffers lie inside AXI SRAM, which SDMMC1 can reach
#[test]
fn bench_buffers_are_sdmmc1_reachable() {
    for addr in [TX_BUFFER_ADDR, RX_BUFFER_ADDR] {
        let region = MemoryRegion::containing(addr as usize, TRANSFER_BUFFER_BYTES);
        assert_eq!(region, Some(MemoryRegion::AxiSram));
        assert!(region.is_some_and(MemoryRegion::sdmmc1_reachable));
    }
}

// Test 5: DTCM buffers are refused by the reachability check
#[test]
fn dtcm_is_not_sdmmc1_reachable() {
    let region = MemoryRegion::containing(0x2000_1000, 512);
    assert_eq!(region, Some(MemoryRegion::Dtcm));
    assert!(!MemoryRegion::Dtcm.sdmmc1_reachable());
}

// Test 6: a range running past the end of AXI SRAM belongs to no region
#[test]
fn range_past_axi_sram_end_is_unplaced() {
    let end = AXI_SRAM_BASE as usize + AXI_SRAM_SIZE_BYTES;
    assert!(MemoryRegion::AxiSram.contains(end - 512, 512));
    assert!(!MemoryRegion::AxiSram.contains(end - 511, 512));
    assert_eq!(MemoryRegion::containing(usize::MAX, 2), None);
}
