//! Clock tree for the STM32H745I-DISCO eMMC bench.
//!
//! The board has a 25 MHz HSE crystal. PLL1 produces both the system clock
//! and the SDMMC kernel clock:
//!
//! ```text
//! HSE 25 MHz ─/M=5→ 5 MHz ─×N=160→ VCO 800 MHz ┬─/P=2→ 400 MHz  SYSCLK
//!                                               ├─/Q=4→ 200 MHz  SDMMC1 kernel (SDMMCSEL = pll1_q)
//!                                               └─/R=2→ 400 MHz  (unused)
//! SYSCLK ─/2→ 200 MHz HCLK ─/2→ 100 MHz APB1..APB4
//! ```
//!
//! With CLKDIV = 2 the SDMMC bus runs at 200 MHz / (2 × 2) = 50 MHz, see
//! [`crate::sdmmc_config`].
//!
//! # Sources
//!
//! - STM32H745 Reference Manual (RM0399): RCC clock tree, PLL reference
//!   1..16 MHz, wide-range VCO 192..960 MHz
//! - Embassy issue \#3049: <https://github.com/embassy-rs/embassy/issues/3049>
//!   SDMMC on STM32H7 silently hangs during `init_card()` unless HSI48 is
//!   enabled in RCC before SDMMC initialisation.

/// Clock sources relevant to the bench.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// External 25 MHz crystal. PLL1 reference.
    Hse,

    /// Internal 48 MHz RC oscillator.
    ///
    /// Not the SDMMC kernel clock, but embassy-stm32 refuses to bring SDMMC
    /// up without it:
    /// ```text
    /// config.rcc.hsi48 = Some(Hsi48Config { sync_from_usb: false });
    /// ```
    Hsi48,

    /// PLL1 Q output: SDMMC1 kernel clock.
    Pll1Q,

    /// APB peripheral bus clock: USART3 console.
    Apb,
}

/// PLL divider set. Output frequencies are derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllConfig {
    /// Reference divider (DIVM).
    pub m: u32,
    /// VCO multiplier (DIVN).
    pub n: u32,
    /// P divider: system clock.
    pub p: u32,
    /// Q divider: kernel clocks.
    pub q: u32,
    /// R divider.
    pub r: u32,
}

/// Valid PLL reference input range after DIVM (wide range).
pub const PLL_INPUT_HZ: core::ops::RangeInclusive<u32> = 1_000_000..=16_000_000;

/// Valid VCO output range (wide VCO).
pub const PLL_VCO_HZ: core::ops::RangeInclusive<u32> = 192_000_000..=960_000_000;

/// HSE crystal frequency on STM32H745I-DISCO.
pub const HSE_HZ: u32 = 25_000_000;

/// PLL1 dividers used by the bench.
pub const BENCH_PLL1: PllConfig = PllConfig {
    m: 5,
    n: 160,
    p: 2,
    q: 4,
    r: 2,
};

/// AHB prescaler (SYSCLK → HCLK).
pub const AHB_DIVIDER: u32 = 2;

/// APB1..APB4 prescaler (HCLK → PCLKx).
pub const APB_DIVIDER: u32 = 2;

/// Flash wait states for 200 MHz HCLK at VOS1.
pub const FLASH_LATENCY_WS: u8 = 4;

impl PllConfig {
    /// Reference frequency after DIVM, if the divider is valid.
    pub fn reference_hz(&self, input_hz: u32) -> Option<u32> {
        input_hz.checked_div(self.m)
    }

    /// VCO frequency, if DIVM and DIVN keep it in range.
    pub fn vco_hz(&self, input_hz: u32) -> Option<u32> {
        let reference = self.reference_hz(input_hz)?;
        if !PLL_INPUT_HZ.contains(&reference) {
            return None;
        }
        let vco = reference.checked_mul(self.n)?;
        PLL_VCO_HZ.contains(&vco).then_some(vco)
    }

    /// P output (system clock).
    pub fn p_hz(&self, input_hz: u32) -> Option<u32> {
        self.vco_hz(input_hz)?.checked_div(self.p)
    }

    /// Q output (kernel clock).
    pub fn q_hz(&self, input_hz: u32) -> Option<u32> {
        self.vco_hz(input_hz)?.checked_div(self.q)
    }

    /// R output.
    pub fn r_hz(&self, input_hz: u32) -> Option<u32> {
        self.vco_hz(input_hz)?.checked_div(self.r)
    }
}

/// Resolved bus and kernel frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockTree {
    /// Core clock.
    pub sysclk_hz: u32,
    /// AXI / AHB clock.
    pub hclk_hz: u32,
    /// APB clocks.
    pub pclk_hz: u32,
    /// SDMMC1 kernel clock.
    pub sdmmc_kernel_hz: u32,
}

impl ClockTree {
    /// Resolve the bench clock tree from [`HSE_HZ`] and [`BENCH_PLL1`].
    pub fn bench() -> Option<Self> {
        let sysclk_hz = BENCH_PLL1.p_hz(HSE_HZ)?;
        let hclk_hz = sysclk_hz.checked_div(AHB_DIVIDER)?;
        Some(Self {
            sysclk_hz,
            hclk_hz,
            pclk_hz: hclk_hz.checked_div(APB_DIVIDER)?,
            sdmmc_kernel_hz: BENCH_PLL1.q_hz(HSE_HZ)?,
        })
    }
}

/// A peripheral and its mandatory clock-source dependency.
///
/// These are static documentation + runtime-assertion records.
/// They do **not** configure the hardware.
pub struct ClockRequirement {
    /// Short identifier for the peripheral (e.g. `"SDMMC1"`).
    pub peripheral: &'static str,
    /// The clock source that must be active before this peripheral is init'd.
    pub required_source: ClockSource,
    /// Why the requirement exists.
    pub note: &'static str,
}

/// All clock requirements for the bench peripherals.
///
/// A peripheral may appear more than once.
pub const BENCH_CLOCK_REQUIREMENTS: &[ClockRequirement] = &[
    ClockRequirement {
        peripheral: "SDMMC1",
        required_source: ClockSource::Pll1Q,
        note: "SDMMCSEL defaults to pll1_q; 200 MHz kernel with CLKDIV=2 gives a 50 MHz bus",
    },
    ClockRequirement {
        peripheral: "SDMMC1",
        required_source: ClockSource::Hsi48,
        note: "embassy-stm32 issue #3049: SDMMC requires HSI48 enabled before init; \
               failure produces silent chip lockup with no error code",
    },
    ClockRequirement {
        peripheral: "PLL1",
        required_source: ClockSource::Hse,
        note: "25 MHz crystal, DIVM=5 gives the 5 MHz PLL reference",
    },
    ClockRequirement {
        peripheral: "USART3",
        required_source: ClockSource::Apb,
        note: "console on the ST-LINK virtual COM port; 9600 baud from 100 MHz PCLK1",
    },
];

/// Iterate the requirements recorded for `peripheral`.
pub fn requirements_for(peripheral: &str) -> impl Iterator<Item = &'static ClockRequirement> + '_ {
    BENCH_CLOCK_REQUIREMENTS
        .iter()
        .filter(move |r| r.peripheral == peripheral)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bench_clock_tree() {
        let tree = ClockTree::bench().expect("bench PLL1 must be valid");
        assert_eq!(tree.sysclk_hz, 400_000_000);
        assert_eq!(tree.hclk_hz, 200_000_000);
        assert_eq!(tree.pclk_hz, 100_000_000);
        assert_eq!(tree.sdmmc_kernel_hz, 200_000_000);
    }

    #[test]
    fn test_vco_out_of_range_is_rejected() {
        let too_fast = PllConfig { n: 400, ..BENCH_PLL1 };
        assert_eq!(too_fast.vco_hz(HSE_HZ), None, "2 GHz VCO must be rejected");
        let zero_m = PllConfig { m: 0, ..BENCH_PLL1 };
        assert_eq!(zero_m.vco_hz(HSE_HZ), None);
    }

    #[test]
    fn test_sdmmc_kernel_requirement() {
        assert!(requirements_for("SDMMC1").any(|r| r.required_source == ClockSource::Pll1Q));
    }

    /// SDMMC1 must also require HSI48 (embassy issue #3049).
    #[test]
    fn test_sdmmc_requires_hsi48() {
        let sdmmc = requirements_for("SDMMC1")
            .find(|r| r.required_source == ClockSource::Hsi48)
            .expect("SDMMC1 must have an HSI48 requirement entry");
        assert!(
            sdmmc.note.contains("3049"),
            "SDMMC1 note must reference embassy issue #3049"
        );
    }

    #[test]
    fn test_all_requirements_have_notes() {
        for req in BENCH_CLOCK_REQUIREMENTS {
            assert!(!req.note.is_empty(), "{} must explain its requirement", req.peripheral);
        }
    }
}
