//! Cortex-M exception handlers for the eMMC bench.
//!
//! - **HardFault**: raised for MPU violations, bus faults and illegal
//!   instructions. With the background region programmed by
//!   [`crate::boot::hardware::apply_mpu_config`], any access into the
//!   0x6000_0000..0xE000_0000 window (FMC banks, QUADSPI) lands here instead
//!   of stalling on a bus with nothing behind it.
//!
//! # Hardware-only handler
//!
//! The `#[cortex_m_rt::exception]` attribute requires ARM target intrinsics and
//! is therefore gated behind `#[cfg(feature = "hardware")]`. The module itself
//! compiles unconditionally so the fault window can be tested on the host.

#![allow(clippy::doc_markdown)]

use core::ops::Range;

/// Address window the background MPU region blocks (sub-regions 3..=6).
pub const BLOCKED_WINDOW: Range<u32> = 0x6000_0000..0xE000_0000;

/// `true` if a fault at `addr` is explained by the background region.
pub fn is_blocked_access(addr: u32) -> bool {
    BLOCKED_WINDOW.contains(&addr)
}

/// HardFault exception handler (hardware target only).
///
/// Reports the stacked PC and, if the MMFAR holds a valid address, whether
/// the access hit the blocked window. Never returns.
#[cfg(feature = "hardware")]
#[cortex_m_rt::exception]
#[allow(unsafe_code)]
unsafe fn HardFault(ef: &cortex_m_rt::ExceptionFrame) -> ! {
    // SAFETY: read-only access to SCB fault status registers from the fault
    // handler; nothing else runs at this priority.
    let scb = unsafe { &*cortex_m::peripheral::SCB::PTR };
    let cfsr = scb.cfsr.read();
    // MMARVALID
    let mmfar = if cfsr & (1 << 7) != 0 {
        Some(scb.mmfar.read())
    } else {
        None
    };
    match mmfar {
        Some(addr) => defmt::panic!(
            "HardFault: pc=0x{:08X} cfsr=0x{:08X} addr=0x{:08X} blocked={}",
            ef.pc(),
            cfsr,
            addr,
            is_blocked_access(addr)
        ),
        None => defmt::panic!("HardFault: pc=0x{:08X} cfsr=0x{:08X}", ef.pc(), cfsr),
    }
}
