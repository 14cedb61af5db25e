//! eMMC DMA bench - Main Entry Point
//!
//! Hardware-only entry point for the STM32H745I-DISCO (CM7 core).

#![no_std]
#![no_main]

use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::sdmmc::{self, Sdmmc};
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::UartTx;
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::Delay;
use embedded_hal::delay::DelayNs;
use platform::{DiagnosticSink, EmbassyClock, Led, StatusIndicator, UartConfig};
use transfer::runner::ERROR_BLINK_PERIOD;
use transfer::{BenchRunner, CycleConfig, StepEvent, TransferCycle};

use firmware::boot::{self, BootError};
use firmware::console::{usart_config, Console, UartWriter};
use firmware::sdmmc::task::sdmmc_io_task;
use firmware::{buffers, ScbCache, SdmmcBlockDevice, LINK};

// Logger + panic handler
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    SDMMC1 => sdmmc::InterruptHandler<peripherals::SDMMC1>;
});

/// Runs the SDMMC I/O task above thread mode, so the cycle's blocking
/// ready-poll cannot starve it. UART4 is unused on this board.
static IO_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART4() {
    // SAFETY: UART4 is dedicated to IO_EXECUTOR, started below.
    unsafe { IO_EXECUTOR.on_interrupt() }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    // Steps 1-2: MPU, then caches. Must precede everything else.
    // See: firmware::boot::BOOT_SEQUENCE_STEPS for the full ordered sequence.
    boot::hardware::configure_memory();

    // Step 3: the CM4 core must park before the D1 clock tree is touched.
    // Reported once the console is up.
    let cm4 = boot::hardware::wait_for_cm4_stop();

    // Step 4: clocks. Never `Default::default()`, see build_embassy_config.
    let p = embassy_stm32::init(boot::build_embassy_config());
    defmt::info!("{=str} v{=str}", platform::config::APP_NAME, platform::config::APP_VERSION);

    // Step 5: LEDs (active-low) and the console
    let mut ok_led = Led::active_low(Output::new(p.PI13, Level::High, Speed::Low));
    let mut err_led = Led::active_low(Output::new(p.PJ2, Level::High, Speed::Low));

    let uart_config = UartConfig::debug_console();
    let uart = match usart_config(&uart_config) {
        Some(config) => match UartTx::new(p.USART3, p.PB10, NoDma, config) {
            Ok(tx) => Some(tx),
            Err(_) => {
                defmt::warn!("USART3 config rejected, report is RTT only");
                None
            }
        },
        None => {
            defmt::warn!("USART3 frame not supported by the driver, report is RTT only");
            None
        }
    };
    let mut console = Console::new(UartWriter::new(uart));
    console.banner();

    if let Err(err) = cm4 {
        boot_failed(err, &mut console, &mut ok_led, &mut err_led);
    }

    // Step 6: card, then the I/O task that owns it
    let bus_hz = match boot::sdmmc_bus_hz() {
        Ok(hz) => hz,
        Err(err) => boot_failed(err, &mut console, &mut ok_led, &mut err_led),
    };
    let mut sdmmc = Sdmmc::new_4bit(
        p.SDMMC1,
        Irqs,
        p.PC12, // CLK
        p.PD2,  // CMD
        p.PC8,  // D0
        p.PC9,  // D1
        p.PC10, // D2
        p.PC11, // D3
        Default::default(),
    );
    if let Err(err) = sdmmc.init_card(Hertz(bus_hz)).await {
        defmt::error!("init_card failed: {}", err);
        boot_failed(BootError::SdmmcInit, &mut console, &mut ok_led, &mut err_led);
    }
    defmt::info!("eMMC ready, bus clock {=u32} Hz", bus_hz);

    interrupt::UART4.set_priority(Priority::P6);
    let io_spawner = IO_EXECUTOR.start(interrupt::UART4);
    if io_spawner.spawn(sdmmc_io_task(sdmmc, &LINK)).is_err() {
        boot_failed(BootError::TaskSpawn, &mut console, &mut ok_led, &mut err_led);
    }

    // Step 7: bench loop
    let Some((tx, rx)) = buffers::take() else {
        boot_failed(BootError::BuffersTaken, &mut console, &mut ok_led, &mut err_led);
    };
    if !buffers::in_axi_sram(tx, rx) {
        boot_failed(BootError::BuffersMisplaced, &mut console, &mut ok_led, &mut err_led);
    }

    // SAFETY: boot is done with the SCB; the cycle is its only user from here.
    let cache = unsafe { ScbCache::steal() };
    let cycle = match TransferCycle::new(
        CycleConfig::mmc_dma_bench(),
        tx,
        rx,
        LINK.flags(),
        SdmmcBlockDevice::new(&LINK),
        cache,
        EmbassyClock,
        console,
    ) {
        Ok(cycle) => cycle,
        Err(err) => {
            defmt::error!("bench config rejected: {}", err);
            // the console went into the rejected cycle
            let mut silent = Console::new(UartWriter::new(None));
            boot_failed(BootError::Config, &mut silent, &mut ok_led, &mut err_led);
        }
    };

    let mut runner = BenchRunner::new(cycle, ok_led, err_led, Delay);
    if let Err(err) = runner.prepare() {
        defmt::error!("card preparation failed: {}", err);
        runner.halt();
    }

    loop {
        match runner.poll() {
            Ok(StepEvent::Pending(_)) => embassy_futures::yield_now().await,
            Ok(StepEvent::Verified(report)) => {
                defmt::info!("cycle {=u32} verified", report.cycle);
            }
            Ok(StepEvent::Entered(state)) => defmt::trace!("enter {}", state),
            Err(err) => {
                defmt::error!("bench fault: {}", err);
                runner.halt();
            }
        }
    }
}

/// Report a boot failure the way the bench reports a cycle fault, then
/// blink the error LED forever.
fn boot_failed(
    err: BootError,
    console: &mut impl DiagnosticSink,
    ok_led: &mut impl StatusIndicator,
    err_led: &mut impl StatusIndicator,
) -> ! {
    defmt::error!("boot failed: {}", err);
    console.line(format_args!(" - Error "));
    ok_led.off();
    let period = u32::try_from(ERROR_BLINK_PERIOD.as_millis()).unwrap_or(u32::MAX);
    let mut delay = Delay;
    loop {
        err_led.toggle();
        delay.delay_ms(period);
    }
}
