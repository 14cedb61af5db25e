//! Hardware boot sequence for the eMMC bench.
//!
//! Initialization order (MUST be respected, order matters for correctness):
//!   1. Configure MPU (background region: no access, strongly ordered)
//!   2. Enable I-cache and D-cache (after the MPU, so speculative fetches
//!      into unmapped external memory are already blocked)
//!   3. Wait for the CM4 core to park in stop mode
//!   4. `embassy_stm32::init` with the HSE/PLL1 clock tree
//!   5. LEDs, then the USART3 console
//!   6. SDMMC1 card init and the I/O task
//!   7. Bench loop
//!
//! # Safety
//! Steps 1-3 run from privileged thread mode before any interrupt is enabled.

use core::fmt;

use platform::clock_config::ClockTree;
use platform::mpu::BenchMpuConfig;
use platform::sdmmc_config::{BusWidth, SdmmcConfig};

/// Ordered list of boot sequence steps for documentation and testing.
///
/// Tests assert MPU < cache < embassy init < SDMMC ordering; `main.rs`
/// logs each step as it runs.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. MPU: background region 0, no access, strongly ordered, XN",
    "2. I-cache + D-cache: enable after the MPU is configured",
    "3. CM4 handshake: wait for D2 domain clock to stop",
    "4. RCC: HSE 25 MHz, PLL1 400 MHz SYSCLK / 200 MHz SDMMC kernel",
    "5. LEDs (PI13 green, PJ2 red) and USART3 console",
    "6. SDMMC1: card init, then spawn the I/O task",
    "7. Bench loop: write, read back, verify, repeat",
];

/// Status polls allowed while waiting for the CM4 core to stop.
pub const CM4_STOP_POLL_ITERATIONS: u32 = 0xFFFF;

/// Bus width `main.rs` opens SDMMC1 with (`Sdmmc::new_4bit`).
pub const SDMMC_DRIVER_WIDTH: BusWidth = BusWidth::Four;

/// SDMMC bus clock used when the clock tables cannot produce one.
pub const SDMMC_FALLBACK_BUS_HZ: u32 = 25_000_000;

/// Failures before the bench loop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootError {
    /// The CM4 core never released the D2 domain clock.
    Cm4StopTimeout,
    /// Card identification or bus setup failed.
    SdmmcInit,
    /// The SDMMC settings ask for a bus width the driver does not open.
    SdmmcBusWidth,
    /// The I/O task could not be spawned.
    TaskSpawn,
    /// Transfer buffers were already taken.
    BuffersTaken,
    /// Transfer buffers are not in AXI SRAM.
    BuffersMisplaced,
    /// The cycle rejected its configuration.
    Config,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cm4StopTimeout => "CM4 did not enter stop mode",
            Self::SdmmcInit => "eMMC initialization failed",
            Self::SdmmcBusWidth => "SDMMC bus width not supported by the driver",
            Self::TaskSpawn => "SDMMC task spawn failed",
            Self::BuffersTaken => "transfer buffers already taken",
            Self::BuffersMisplaced => "transfer buffers outside AXI SRAM",
            Self::Config => "invalid bench configuration",
        })
    }
}

/// Returns the `(RBAR, RASR)` register pairs for the bench MPU configuration.
///
/// | Slot | Region     | Base        | Size  | RBAR        | RASR        |
/// |------|------------|-------------|-------|-------------|-------------|
/// | 0    | background | 0x0000_0000 | 4 GiB | 0x0000_0010 | 0x1004_873F |
///
/// Pure math, no hardware access.
#[must_use]
pub fn mpu_register_pairs() -> [(u32, u32); 1] {
    BenchMpuConfig::register_pairs()
}

/// SDMMC1 bus clock for `init_card`: the kernel clock divided per the
/// board's SDMMC settings.
pub fn sdmmc_bus_hz() -> Result<u32, BootError> {
    sdmmc_bus_hz_for(&SdmmcConfig::discovery_emmc())
}

/// Bus clock for `config`, refusing a width other than [`SDMMC_DRIVER_WIDTH`].
pub fn sdmmc_bus_hz_for(config: &SdmmcConfig) -> Result<u32, BootError> {
    if config.bus_width != SDMMC_DRIVER_WIDTH {
        return Err(BootError::SdmmcBusWidth);
    }
    Ok(ClockTree::bench()
        .and_then(|tree| config.bus_clock_hz(tree.sdmmc_kernel_hz))
        .unwrap_or(SDMMC_FALLBACK_BUS_HZ))
}

// ── RCC clock configuration ───────────────────────────────────────────────────

/// Build the `embassy_stm32::Config` for the bench clock tree.
///
/// # Clock Tree (HSE → 400 MHz core), matching `platform::clock_config::BENCH_PLL1`
///
/// HSE (25 MHz) → PLL1 (prediv=5, mul=160) → VCO 800 MHz
/// PLL1_P: DIV2 → 400 MHz (sys)
/// PLL1_Q: DIV4 → 200 MHz (SDMMC1 kernel clock via SDMMCSEL mux)
/// AHB prescaler: DIV2 → 200 MHz
/// APB1/2/3/4:    DIV2 → 100 MHz
///
/// # DO NOT call `embassy_stm32::init(Default::default())`
///
/// `Default::default()` leaves HSI48 disabled, and SDMMC1 then hangs
/// silently in `init_card()` (embassy-stm32 issue #3049).
#[cfg(feature = "hardware")]
pub fn build_embassy_config() -> embassy_stm32::Config {
    use embassy_stm32::rcc::*;
    use embassy_stm32::time::Hertz;

    let mut config = embassy_stm32::Config::default();

    // ── Oscillators ─────────────────────────────────────────────────────────
    config.rcc.hse = Some(Hse {
        freq: Hertz(platform::clock_config::HSE_HZ),
        mode: HseMode::Oscillator,
    });
    // HSI48: REQUIRED for SDMMC1, see embassy-stm32 issue #3049.
    config.rcc.hsi48 = Some(Hsi48Config {
        sync_from_usb: false,
    });

    // ── PLL1: system clock + SDMMC kernel clock ──────────────────────────────
    config.rcc.pll1 = Some(Pll {
        source: PllSource::HSE,
        prediv: PllPreDiv::DIV5,
        mul: PllMul::MUL160,
        divp: Some(PllDiv::DIV2), // 400 MHz, system clock
        divq: Some(PllDiv::DIV4), // 200 MHz, SDMMC default mux (SDMMCSEL)
        divr: Some(PllDiv::DIV2),
    });

    // ── System clock + bus prescalers ────────────────────────────────────────
    config.rcc.sys = Sysclk::PLL1_P; // 400 MHz
    config.rcc.ahb_pre = AHBPrescaler::DIV2; // 200 MHz
    config.rcc.apb1_pre = APBPrescaler::DIV2; // 100 MHz
    config.rcc.apb2_pre = APBPrescaler::DIV2; // 100 MHz
    config.rcc.apb3_pre = APBPrescaler::DIV2; // 100 MHz
    config.rcc.apb4_pre = APBPrescaler::DIV2; // 100 MHz
    config.rcc.voltage_scale = VoltageScale::Scale1;

    config
}

// ── Hardware-only init ────────────────────────────────────────────────────────
//
// Host tests (cargo test -p firmware) never compile or link this module.

#[cfg(feature = "hardware")]
pub mod hardware {
    //! Register writes for steps 1-3.

    use cortex_m::peripheral::{CPUID, MPU, SCB};
    use platform::mpu::MPU_CTRL_ENABLE_PRIVDEFENA;
    use platform::{poll_until, EmbassyClock, PollLimit};

    use super::{BootError, CM4_STOP_POLL_ITERATIONS};

    /// Program the MPU from [`super::mpu_register_pairs`].
    ///
    /// # Safety
    ///
    /// - Must be called before the caches are enabled.
    /// - Must be called from privileged mode with no DMA running.
    pub unsafe fn apply_mpu_config(mpu: &mut MPU) {
        // Disable before reconfiguring (ARM DDI0489F §B3.5.1).
        // SAFETY: privileged boot context; nothing relies on the MPU yet.
        unsafe { mpu.ctrl.write(0) };

        // RBAR carries VALID=1 and the slot number, selecting the region.
        for (rbar, rasr) in super::mpu_register_pairs() {
            // SAFETY: values come from the validated BenchMpuConfig tables.
            unsafe {
                mpu.rbar.write(rbar);
                mpu.rasr.write(rasr);
            }
        }

        // ENABLE | PRIVDEFENA: privileged code keeps the default map for
        // everything the background region leaves enabled.
        // SAFETY: as above.
        unsafe { mpu.ctrl.write(MPU_CTRL_ENABLE_PRIVDEFENA) };

        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    /// Enable the instruction and data caches.
    pub fn enable_caches(scb: &mut SCB, cpuid: &mut CPUID) {
        scb.enable_icache();
        scb.enable_dcache(cpuid);
    }

    /// Steps 1 and 2, zero-argument entry point for `main.rs`.
    ///
    /// Call this as the **very first statement** in `main`, before
    /// `embassy_stm32::init()`.
    pub fn configure_memory() {
        // SAFETY: called once at boot before any task or interrupt handler
        // has started; no other code holds Cortex-M peripherals yet.
        let mut cp = unsafe { cortex_m::Peripherals::steal() };
        // SAFETY: boot context, caches still off, no DMA initialised.
        unsafe { apply_mpu_config(&mut cp.MPU) };
        enable_caches(&mut cp.SCB, &mut cp.CPUID);
    }

    /// Step 3: wait until the CM4 core has stopped its D2 domain clock.
    pub fn wait_for_cm4_stop() -> Result<(), BootError> {
        let stopped = || !embassy_stm32::pac::RCC.cr().read().d2ckrdy();
        // Iteration budgets never read the clock, which is not running yet.
        let outcome = poll_until(
            PollLimit::Iterations(CM4_STOP_POLL_ITERATIONS),
            &EmbassyClock,
            stopped,
        );
        if outcome.is_ready() {
            Ok(())
        } else {
            Err(BootError::Cm4StopTimeout)
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
