//! SDMMC1 bus parameters for the on-board eMMC
//!
//! The SDMMC bus clock is derived from the kernel clock:
//!
//! ```text
//! CLKDIV = 0:  f_bus = f_kernel
//! CLKDIV > 0:  f_bus = f_kernel / (2 × CLKDIV)
//! ```
//!
//! The bench runs a 200 MHz kernel clock with CLKDIV = 2, giving 50 MHz,
//! the High Speed MMC limit.

/// Maximum CLKDIV field value (10 bits).
pub const CLKDIV_MAX: u16 = 0x3FF;

/// Data bus width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusWidth {
    /// D0 only
    One,
    /// D0..D3
    Four,
    /// D0..D7 (eMMC only)
    Eight,
}

impl BusWidth {
    /// Number of data lines.
    pub const fn lines(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Four => 4,
            Self::Eight => 8,
        }
    }
}

/// SDMMC settings the driver applies: the data bus width and the clock divider.
///
/// The board wires all eight eMMC data lines, but the HAL drives at most
/// D0..D3, so the bench runs the bus 4 bits wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SdmmcConfig {
    /// Data bus width
    pub bus_width: BusWidth,
    /// CLKDIV field
    pub clock_div: u16,
}

impl SdmmcConfig {
    /// eMMC on STM32H745I-DISCO: 4-bit, 50 MHz.
    pub const fn discovery_emmc() -> Self {
        Self {
            bus_width: BusWidth::Four,
            clock_div: 2,
        }
    }

    /// Bus clock for a given kernel clock, or `None` if CLKDIV is out of range.
    pub fn bus_clock_hz(&self, kernel_hz: u32) -> Option<u32> {
        if self.clock_div > CLKDIV_MAX {
            return None;
        }
        if self.clock_div == 0 {
            return Some(kernel_hz);
        }
        let divisor = u32::from(self.clock_div).checked_mul(2)?;
        kernel_hz.checked_div(divisor)
    }

    /// Raw data bandwidth of the bus in bytes per second (no command overhead).
    pub fn bus_bandwidth_bytes_per_s(&self, kernel_hz: u32) -> Option<u32> {
        let clock = self.bus_clock_hz(kernel_hz)?;
        clock
            .checked_mul(u32::from(self.bus_width.lines()))?
            .checked_div(8)
    }
}
