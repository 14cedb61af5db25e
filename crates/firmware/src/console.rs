//! Bench console: the serial report plus a log echo.
//!
//! Each line is formatted once into a bounded buffer, written to the
//! console writer with a CRLF terminator, and echoed through `defmt` on
//! hardware or `tracing` in the emulator. Lines longer than
//! [`LINE_CAPACITY`] are truncated.

use core::fmt::{self, Write as _};

use platform::config::BANNER;
use platform::DiagnosticSink;

/// Longest line kept, in bytes.
pub const LINE_CAPACITY: usize = 128;

/// Line-oriented console over any [`fmt::Write`].
pub struct Console<W: fmt::Write> {
    out: W,
    lines: u32,
}

impl<W: fmt::Write> Console<W> {
    /// Console writing to `out`.
    pub const fn new(out: W) -> Self {
        Self { out, lines: 0 }
    }

    /// Print the boot banner.
    pub fn banner(&mut self) {
        for line in BANNER {
            self.line(format_args!("{line}"));
        }
    }

    /// Lines written so far.
    pub fn lines_written(&self) -> u32 {
        self.lines
    }

    /// The underlying writer.
    pub fn writer(&self) -> &W {
        &self.out
    }
}

impl<W: fmt::Write> DiagnosticSink for Console<W> {
    fn line(&mut self, args: fmt::Arguments<'_>) {
        let mut line: heapless::String<LINE_CAPACITY> = heapless::String::new();
        // overflow keeps what fit
        let _ = line.write_fmt(args);

        let _ = self.out.write_str(&line);
        let _ = self.out.write_str("\r\n");
        self.lines = self.lines.saturating_add(1);

        #[cfg(feature = "defmt")]
        defmt::info!("{=str}", line.as_str());
        #[cfg(feature = "emulator")]
        tracing::info!(target: "console", "{}", line.as_str());
    }
}

// ── USART3 writer (hardware) ─────────────────────────────────────────────────

#[cfg(feature = "hardware")]
pub use hw::{usart_config, UartWriter};

#[cfg(feature = "hardware")]
mod hw {
    use core::fmt;

    use embassy_stm32::peripherals::USART3;
    use embassy_stm32::usart::{self, UartTx};
    use platform::{DataBits, Parity, StopBits, UartConfig};

    /// Map the console settings onto the HAL's USART config.
    ///
    /// The HAL counts data bits without parity and widens the frame itself
    /// when parity is on, so 8 data bits plus odd parity is a 9-bit frame.
    /// Returns `None` for a frame the HAL cannot program (7 data bits).
    pub fn usart_config(cfg: &UartConfig) -> Option<usart::Config> {
        let mut config = usart::Config::default();
        config.baudrate = cfg.baud_rate;
        config.data_bits = match cfg.data_bits {
            DataBits::Seven => return None,
            DataBits::Eight => usart::DataBits::DataBits8,
            DataBits::Nine => usart::DataBits::DataBits9,
        };
        config.parity = match cfg.parity {
            Parity::None => usart::Parity::ParityNone,
            Parity::Even => usart::Parity::ParityEven,
            Parity::Odd => usart::Parity::ParityOdd,
        };
        config.stop_bits = match cfg.stop_bits {
            StopBits::One => usart::StopBits::STOP1,
            StopBits::OnePointFive => usart::StopBits::STOP1P5,
            StopBits::Two => usart::StopBits::STOP2,
        };
        Some(config)
    }

    /// Blocking USART transmitter; writes are dropped if the port failed to open.
    pub struct UartWriter {
        tx: Option<UartTx<'static, USART3>>,
    }

    impl UartWriter {
        /// Writer over `tx`, or a sink that discards output.
        pub fn new(tx: Option<UartTx<'static, USART3>>) -> Self {
            Self { tx }
        }
    }

    impl fmt::Write for UartWriter {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            match &mut self.tx {
                Some(tx) => tx.blocking_write(s.as_bytes()).map_err(|_| fmt::Error),
                None => Ok(()),
            }
        }
    }
}
