//! Transfer buffers in AXI SRAM.
//!
//! Both buffers live in the `.axisram` output section, which `memory.x`
//! maps to 0x2400_0000 (D1 domain, reachable by the SDMMC1 internal DMA).
//! The section is `NOLOAD`: contents at reset are undefined until the cycle
//! fills them, which it does before every transfer.
//!
//! [`take`] hands the buffers out at most once; the guard flag itself lives
//! in ordinary `.bss` so it is zero at reset.

use core::sync::atomic::{AtomicBool, Ordering};

use platform::dma_safety::{MemoryRegion, TRANSFER_BUFFER_BYTES};
use platform::{AxiSramRegion, DmaBuffer};

type TransferBuffer = DmaBuffer<AxiSramRegion, [u8; TRANSFER_BUFFER_BYTES]>;

/// TX then RX, back to back.
#[repr(C)]
struct TransferBuffers {
    tx: TransferBuffer,
    rx: TransferBuffer,
}

#[cfg_attr(feature = "hardware", link_section = ".axisram")]
static mut BUFFERS: TransferBuffers = TransferBuffers {
    tx: DmaBuffer::zeroed(),
    rx: DmaBuffer::zeroed(),
};

static TAKEN: AtomicBool = AtomicBool::new(false);

/// The TX and RX buffers, or `None` if they were already taken.
pub fn take() -> Option<(&'static mut [u8], &'static mut [u8])> {
    if TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // SAFETY: TAKEN flips exactly once, so this is the only reference ever
    // created to BUFFERS. addr_of_mut! avoids an intermediate shared borrow.
    let buffers = unsafe { &mut *core::ptr::addr_of_mut!(BUFFERS) };
    Some((buffers.tx.as_mut_slice(), buffers.rx.as_mut_slice()))
}

/// `true` when both buffers sit wholly inside AXI SRAM.
///
/// Guards against a linker script that dropped the `.axisram` section.
pub fn in_axi_sram(tx: &[u8], rx: &[u8]) -> bool {
    [tx, rx]
        .iter()
        .all(|buf| extent_in_axi_sram(buf.as_ptr() as usize, buf.len()))
}

fn extent_in_axi_sram(addr: usize, len: usize) -> bool {
    MemoryRegion::containing(addr, len) == Some(MemoryRegion::AxiSram)
}
