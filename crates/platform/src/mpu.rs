//! MPU (Memory Protection Unit) configuration for STM32H745 / Cortex-M7
//!
//! # Purpose
//!
//! The Cortex-M7 speculatively reads any Normal memory it can see. On the
//! STM32H7 the 0x6000_0000..0xE000_0000 window (FMC banks, QUADSPI) has no
//! device behind it on this bench, and a speculative access there stalls the
//! AXI bus. The bench therefore installs one background region before
//! enabling the caches:
//!
//! - region 0 covers the whole 4 GiB address space
//! - no access, strongly ordered, shareable, execute-never
//! - sub-regions 0, 1, 2 and 7 disabled (SRD = 0x87), so code, SRAM and
//!   peripherals fall through to the default map via `PRIVDEFENA`
//!
//! The transfer buffers in AXI SRAM stay write-back cacheable; coherency with
//! the SDMMC IDMA comes from explicit clean / invalidate around every
//! transfer (see `platform::cache`).
//!
//! # References
//!
//! - ARM Cortex-M7 TRM DDI0489F: MPU Region Attribute and Size Register
//! - ST AN4838: Introduction to MPU Management on STM32 MCUs
//! - ST AN4839: Level 1 cache on STM32F7 and STM32H7
//!
//! # MPU Region Requirements (Cortex-M7, ARM DDI0489F §B3.5)
//!
//! - Minimum region size: **32 bytes** (SIZE field = 4)
//! - Size must be a **power of 2**, up to 4 GiB (SIZE field = 31)
//! - Base address must be **aligned to the region size**
//! - Sub-regions exist only for regions of 256 bytes or more
//! - ARM MPU SIZE field encoding: `SIZE = log2(size_bytes) − 1`
//!   - 32 B   → SIZE = 4
//!   - 256 KB → SIZE = 17
//!   - 4 GB   → SIZE = 31
//!
//! # Memory Attribute Bits (TEX, S, C, B)
//!
//! | Attribute                 | TEX | S | C | B |
//! |---------------------------|-----|---|---|---|
//! | Strongly ordered          | 000 | 1 | 0 | 0 |
//! | Normal, non-cacheable     | 001 | 0 | 0 | 0 |
//! | Write-back, no alloc      | 000 | 0 | 1 | 1 |
//! | Write-through, no alloc   | 000 | 0 | 1 | 0 |

/// MPU configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MpuError {
    /// Region size is below the minimum 32-byte floor imposed by Cortex-M7 MPU.
    SizeTooSmall,
    /// Region size exceeds the 4 GiB address space.
    SizeTooLarge,
    /// Base address is not aligned to the region size.
    ///
    /// ARM requires: `base_addr % size == 0`.
    AddressMisaligned,
    /// Sub-region disable bits on a region smaller than 256 bytes.
    SubregionsUnsupported,
    /// Region slot outside 0..=15.
    InvalidSlot,
}

impl core::fmt::Display for MpuError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::SizeTooSmall => "MPU region smaller than 32 bytes",
            Self::SizeTooLarge => "MPU region larger than 4 GiB",
            Self::AddressMisaligned => "MPU region base not aligned to its size",
            Self::SubregionsUnsupported => "MPU sub-regions need a region of 256 bytes or more",
            Self::InvalidSlot => "MPU region slot outside 0..=15",
        })
    }
}

/// MPU memory attributes for a region.
///
/// These map to the TEX, S, C, B bit fields in the ARM MPU Region Attribute
/// and Size Register (RASR). See ARM DDI0489F §B3.5.4 for the encoding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MpuAttributes {
    /// Strongly ordered: all accesses complete in program order, no buffering,
    /// no caching, no speculation. TEX=000, S=1, C=0, B=0
    StronglyOrdered,

    /// Non-cacheable normal memory. TEX=001, S=0, C=0, B=0
    NonCacheable,

    /// Write-back, no write-allocate: normal cached RAM. TEX=000, S=0, C=1, B=1
    WriteBackNoWriteAllocate,

    /// Write-through, no write-allocate. TEX=000, S=0, C=1, B=0
    WriteThrough,
}

impl MpuAttributes {
    /// `(TEX, S, C, B)` field values.
    pub const fn encoding(self) -> (u32, u32, u32, u32) {
        match self {
            Self::StronglyOrdered => (0b000, 1, 0, 0),
            Self::NonCacheable => (0b001, 0, 0, 0),
            Self::WriteBackNoWriteAllocate => (0b000, 0, 1, 1),
            Self::WriteThrough => (0b000, 0, 1, 0),
        }
    }
}

/// Data access permission (RASR.AP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccessPermission {
    /// Any access faults. AP=000
    NoAccess,
    /// Privileged read/write, unprivileged none. AP=001
    PrivilegedOnly,
    /// Full read/write. AP=011
    FullAccess,
    /// Read-only for everyone. AP=110
    ReadOnly,
}

impl AccessPermission {
    /// AP field value.
    pub const fn bits(self) -> u32 {
        match self {
            Self::NoAccess => 0b000,
            Self::PrivilegedOnly => 0b001,
            Self::FullAccess => 0b011,
            Self::ReadOnly => 0b110,
        }
    }
}

/// A validated MPU region descriptor.
///
/// Construction via [`MpuRegion::new`] enforces the ARM Cortex-M7 MPU
/// alignment and size invariants so callers cannot produce an invalid
/// hardware configuration. Size is held as `log2(bytes)` so the full 4 GiB
/// background region is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MpuRegion {
    base: u32,
    size_log2: u8,
    attrs: MpuAttributes,
    access: AccessPermission,
    subregion_disable: u8,
    execute_never: bool,
}

impl MpuRegion {
    /// Create a region of `2^size_log2` bytes at `base`.
    ///
    /// Defaults: full access, all sub-regions enabled, executable.
    pub fn new(base: u32, size_log2: u8, attrs: MpuAttributes) -> Result<Self, MpuError> {
        if size_log2 < 5 {
            return Err(MpuError::SizeTooSmall);
        }
        if size_log2 > 32 {
            return Err(MpuError::SizeTooLarge);
        }
        let size = 1u64 << size_log2;
        if !u64::from(base).is_multiple_of(size) {
            return Err(MpuError::AddressMisaligned);
        }
        Ok(Self {
            base,
            size_log2,
            attrs,
            access: AccessPermission::FullAccess,
            subregion_disable: 0,
            execute_never: false,
        })
    }

    /// Set the access permission.
    #[must_use]
    pub fn with_access(mut self, access: AccessPermission) -> Self {
        self.access = access;
        self
    }

    /// Disable sub-regions: bit n set removes the n-th eighth of the region.
    pub fn with_subregion_disable(mut self, srd: u8) -> Result<Self, MpuError> {
        if srd != 0 && self.size_log2 < 8 {
            return Err(MpuError::SubregionsUnsupported);
        }
        self.subregion_disable = srd;
        Ok(self)
    }

    /// Forbid instruction fetches.
    #[must_use]
    pub fn execute_never(mut self) -> Self {
        self.execute_never = true;
        self
    }

    /// Base address of this region.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Size of this region in bytes.
    pub fn size(&self) -> u64 {
        1u64 << self.size_log2
    }

    /// Exclusive end address of this region (`base + size`).
    pub fn end(&self) -> u64 {
        u64::from(self.base).saturating_add(self.size())
    }

    /// Memory attributes assigned to this region.
    pub fn attrs(&self) -> MpuAttributes {
        self.attrs
    }

    /// Check whether this region overlaps with `other`.
    ///
    /// Regions that share only a boundary point do NOT overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        u64::from(self.base) < other.end() && u64::from(other.base) < self.end()
    }

    /// ARM MPU `SIZE` field (`log2(size) − 1`).
    pub fn size_field(&self) -> u32 {
        u32::from(self.size_log2.saturating_sub(1))
    }

    /// RASR value with ENABLE set.
    ///
    /// ```text
    /// [28] XN  [26:24] AP  [21:19] TEX  [18] S  [17] C  [16] B
    /// [15:8] SRD  [5:1] SIZE  [0] ENABLE
    /// ```
    pub fn rasr(&self) -> u32 {
        let (tex, s, c, b) = self.attrs.encoding();
        (u32::from(self.execute_never) << 28)
            | (self.access.bits() << 24)
            | (tex << 19)
            | (s << 18)
            | (c << 17)
            | (b << 16)
            | (u32::from(self.subregion_disable) << 8)
            | (self.size_field() << 1)
            | 1
    }

    /// RBAR value selecting `slot` (VALID=1).
    ///
    /// ```text
    /// [31:5] ADDR  [4] VALID  [3:0] REGION
    /// ```
    pub fn rbar(&self, slot: u8) -> Result<u32, MpuError> {
        if slot > 15 {
            return Err(MpuError::InvalidSlot);
        }
        Ok((self.base & !0x1F) | (1 << 4) | u32::from(slot))
    }
}

/// MPU_CTRL value: ENABLE | PRIVDEFENA.
///
/// PRIVDEFENA lets privileged code use the default map wherever no region
/// (or a disabled sub-region) applies.
pub const MPU_CTRL_ENABLE_PRIVDEFENA: u32 = 0b101;

/// Pre-computed MPU configuration for the bench.
pub struct BenchMpuConfig;

impl BenchMpuConfig {
    /// Sub-regions 0, 1, 2 and 7 disabled: code/SRAM/peripherals/system fall
    /// through, 0x6000_0000..0xE000_0000 is blocked.
    pub const BACKGROUND_SRD: u8 = 0x87;

    /// Region 0: 4 GiB no-access, strongly ordered, execute-never.
    pub fn background_region() -> MpuRegion {
        // Safety: base 0 is aligned to every size, 4 GiB (2^32) is within range
        // and supports sub-regions. Parameters are statically correct.
        #[allow(clippy::expect_used)]
        MpuRegion::new(0, 32, MpuAttributes::StronglyOrdered)
            .and_then(|r| r.with_subregion_disable(Self::BACKGROUND_SRD))
            .expect("background MPU region parameters are statically valid")
            .with_access(AccessPermission::NoAccess)
            .execute_never()
    }

    /// `(RBAR, RASR)` pairs to program, in slot order.
    ///
    /// | Slot | Region     | RBAR        | RASR        |
    /// |------|------------|-------------|-------------|
    /// | 0    | background | 0x0000_0010 | 0x1004_873F |
    pub fn register_pairs() -> [(u32, u32); 1] {
        let background = Self::background_region();
        // Safety: slot 0 is always valid.
        #[allow(clippy::expect_used)]
        let rbar = background.rbar(0).expect("slot 0 is valid");
        [(rbar, background.rasr())]
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
