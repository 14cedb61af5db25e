//! Serial console configuration
//!
//! The bench reports over USART3, which the STM32H745I-DISCO routes to the
//! ST-LINK virtual COM port (PB10 TX / PB11 RX).

/// UART configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits, excluding parity
    pub data_bits: DataBits,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
}

impl UartConfig {
    /// Bench console: 9600 baud, 8 data bits, odd parity, 1 stop bit.
    ///
    /// A 9-bit word on the wire. The USART driver has no 7-bit mode, so an
    /// 8-bit word of 7 data bits + parity is not available.
    pub const fn debug_console() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::Odd,
            stop_bits: StopBits::One,
        }
    }

    /// Hardware word length: data bits plus the parity bit, if any.
    pub const fn word_length(&self) -> u8 {
        let data = self.data_bits.count();
        match self.parity {
            Parity::None => data,
            Parity::Even | Parity::Odd => data.saturating_add(1),
        }
    }

    /// `true` if the USART driver can program this frame.
    pub const fn driver_supported(&self) -> bool {
        !matches!(self.data_bits, DataBits::Seven)
    }
}

/// Data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    /// 7 data bits
    Seven,
    /// 8 data bits
    Eight,
    /// 9 data bits
    Nine,
}

impl DataBits {
    /// Number of data bits.
    pub const fn count(self) -> u8 {
        match self {
            Self::Seven => 7,
            Self::Eight => 8,
            Self::Nine => 9,
        }
    }
}

/// Parity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// No parity
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    /// 1 stop bit
    One,
    /// 1.5 stop bits
    OnePointFive,
    /// 2 stop bits
    Two,
}
