//! MMC CID / CSD register decoding
//!
//! Registers arrive as four 32-bit words, most significant first, the way the
//! SDMMC response registers deliver an R2 response. Field positions follow
//! JEDEC JESD84 (MMC / eMMC).
//!
//! | Register | Field        | Bits      |
//! |----------|--------------|-----------|
//! | CID      | MID          | [127:120] |
//! | CID      | CBX          | [113:112] |
//! | CID      | OID          | [111:104] |
//! | CID      | PNM          | [103:56]  |
//! | CID      | PRV          | [55:48]   |
//! | CID      | PSN          | [47:16]   |
//! | CID      | MDT          | [15:8]    |
//! | CSD      | CSD_STRUCTURE| [127:126] |
//! | CSD      | SPEC_VERS    | [125:122] |
//! | CSD      | TRAN_SPEED   | [103:96]  |
//! | CSD      | READ_BL_LEN  | [83:80]   |
//! | CSD      | C_SIZE       | [73:62]   |
//! | CSD      | C_SIZE_MULT  | [49:47]   |

use core::fmt;

use crate::block_device::CardRegisters;

/// C_SIZE value marking a sector-addressed device (capacity lives in EXT_CSD).
pub const C_SIZE_SECTOR_ADDRESSED: u32 = 0xFFF;

/// First year encoded by the MDT year nibble.
const MDT_BASE_YEAR: u16 = 1997;

fn join(raw: &[u32; 4]) -> u128 {
    let [w3, w2, w1, w0] = *raw;
    (u128::from(w3) << 96) | (u128::from(w2) << 64) | (u128::from(w1) << 32) | u128::from(w0)
}

/// Extract `width` bits starting at `lsb`. `width` is at most 32.
// masked to `width` bits (<= 32); the cast cannot truncate.
#[allow(clippy::cast_possible_truncation)]
fn field(value: u128, lsb: u32, width: u32) -> u32 {
    let mask = (1u128 << width).wrapping_sub(1);
    ((value >> lsb) & mask) as u32
}

// Single-byte fields: masked to 8 bits.
#[allow(clippy::cast_possible_truncation)]
fn byte(value: u128, lsb: u32, width: u32) -> u8 {
    field(value, lsb, width) as u8
}

/// Decoded card identification register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CardIdentity {
    /// Manufacturer ID (JEDEC assigned).
    pub manufacturer_id: u8,
    /// Device type: 0 removable, 1 BGA (eMMC), 2 POP.
    pub device_type: u8,
    /// OEM / application ID.
    pub oem_id: u8,
    /// Product name, six ASCII characters.
    pub product_name: [u8; 6],
    /// Product revision, BCD `major.minor`.
    pub revision: u8,
    /// Product serial number.
    pub serial: u32,
    /// Manufacturing month, 1..=12.
    pub month: u8,
    /// Manufacturing year.
    pub year: u16,
}

impl CardIdentity {
    /// Decode a raw CID.
    pub fn from_raw(cid: &[u32; 4]) -> Self {
        let v = join(cid);
        let mut product_name = [0u8; 6];
        // PNM occupies [103:56]; the first character is the most significant byte.
        let mut lsb = 96;
        for slot in &mut product_name {
            *slot = byte(v, lsb, 8);
            lsb = lsb.saturating_sub(8);
        }
        let year_code = u16::from(byte(v, 8, 4));
        Self {
            manufacturer_id: byte(v, 120, 8),
            device_type: byte(v, 112, 2),
            oem_id: byte(v, 104, 8),
            product_name,
            revision: byte(v, 48, 8),
            serial: field(v, 16, 32),
            month: byte(v, 12, 4),
            year: MDT_BASE_YEAR.saturating_add(year_code),
        }
    }

    /// Product name as text, trailing spaces and NULs removed.
    pub fn product_name(&self) -> Option<&str> {
        core::str::from_utf8(&self.product_name)
            .ok()
            .map(|s| s.trim_end_matches([' ', '\0']))
    }
}

impl fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MID 0x{:02X} OID 0x{:02X} PNM {} rev {}.{} SN 0x{:08X} {:02}/{}",
            self.manufacturer_id,
            self.oem_id,
            self.product_name().unwrap_or("?"),
            self.revision >> 4,
            self.revision & 0xF,
            self.serial,
            self.month,
            self.year,
        )
    }
}

/// Decoded card-specific data register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CardSpecific {
    /// CSD_STRUCTURE.
    pub structure: u8,
    /// SPEC_VERS (4 = MMC 4.x and later).
    pub spec_version: u8,
    /// Raw TRAN_SPEED byte.
    pub tran_speed: u8,
    /// log2 of the maximum read block length.
    pub read_block_len_log2: u8,
    /// C_SIZE.
    pub c_size: u32,
    /// C_SIZE_MULT.
    pub c_size_mult: u8,
}

impl CardSpecific {
    /// Decode a raw CSD.
    pub fn from_raw(csd: &[u32; 4]) -> Self {
        let v = join(csd);
        Self {
            structure: byte(v, 126, 2),
            spec_version: byte(v, 122, 4),
            tran_speed: byte(v, 96, 8),
            read_block_len_log2: byte(v, 80, 4),
            c_size: field(v, 62, 12),
            c_size_mult: byte(v, 47, 3),
        }
    }

    /// Capacity in bytes for byte-addressed devices (<= 2 GB).
    ///
    /// `None` for sector-addressed devices, whose capacity is SEC_COUNT in
    /// EXT_CSD.
    pub fn capacity_bytes(&self) -> Option<u64> {
        if self.c_size == C_SIZE_SECTOR_ADDRESSED {
            return None;
        }
        let blocks = u64::from(self.c_size).checked_add(1)?;
        let shift = u32::from(self.c_size_mult)
            .checked_add(2)?
            .checked_add(u32::from(self.read_block_len_log2))?;
        blocks.checked_shl(shift)
    }

    /// Maximum bus clock encoded by TRAN_SPEED, in Hz.
    pub fn max_bus_clock_hz(&self) -> Option<u32> {
        // Time value ×10, indexed by bits [6:3]. Zero is reserved.
        const MULT_X10: [u32; 16] = [0, 10, 12, 13, 15, 20, 26, 30, 35, 40, 45, 52, 55, 60, 70, 80];
        // Transfer rate unit ÷10, indexed by bits [2:0]. 4..=7 reserved.
        const UNIT_DIV10: [u32; 4] = [10_000, 100_000, 1_000_000, 10_000_000];

        let mult = *MULT_X10.get(usize::from((self.tran_speed >> 3) & 0xF))?;
        let unit = *UNIT_DIV10.get(usize::from(self.tran_speed & 0x7))?;
        if mult == 0 {
            return None;
        }
        unit.checked_mul(mult)
    }
}

/// Identification and capacity summary reported before the first cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CardSummary {
    /// Decoded CID.
    pub identity: CardIdentity,
    /// Decoded CSD.
    pub specific: CardSpecific,
}

impl CardSummary {
    /// Decode both registers.
    pub fn from_registers(regs: &CardRegisters) -> Self {
        Self {
            identity: CardIdentity::from_raw(&regs.cid),
            specific: CardSpecific::from_raw(&regs.csd),
        }
    }
}
