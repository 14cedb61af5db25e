//! eMMC DMA bench firmware
//!
//! Write/read-back/verify bench for the eMMC on the STM32H745I-DISCO (CM7 core),
//! built on the hardware-independent `transfer` cycle.
//!
//! # Architecture
//!
//! ```text
//! Bench loop (main.rs / emulator)
//!         ↓
//! transfer::BenchRunner → TransferCycle
//!         ↓
//! SdmmcBlockDevice ── SdmmcLink ──→ sdmmc_io_task (interrupt executor)
//!         ↓                                   ↓
//! ScbCache, Console, Led               embassy-stm32 SDMMC1
//! ```
//!
//! # Features
//!
//! - `hardware` - Build for the STM32H745 CM7 target (embassy, defmt)
//! - `emulator` - Build the desktop bench against an in-memory card (tokio, tracing)
//! - `std` - Enable standard library (for emulator and testing)
//!
//! # Examples
//!
//! ## Hardware Target
//!
//! ```bash
//! cargo build --release --target thumbv7em-none-eabihf --features hardware
//! ```
//!
//! ## Emulator Target
//!
//! ```bash
//! cargo run -p firmware --example emulator --features emulator
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Critical correctness: deny these
#![deny(clippy::await_holding_lock)] // holding a blocking Mutex across .await is a bug
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
// Logging discipline
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod boot;
pub mod buffers;
pub mod cache;
pub mod console;
pub mod exception_handlers;
pub mod sdmmc;

#[cfg(feature = "emulator")]
pub mod emulator;

pub use boot::BootError;
pub use console::Console;
pub use sdmmc::{Request, SdmmcBlockDevice, SdmmcError, SdmmcLink, LINK};

#[cfg(feature = "hardware")]
pub use cache::ScbCache;
#[cfg(feature = "hardware")]
pub use console::UartWriter;
