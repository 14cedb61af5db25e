//! Platform layer for the MMC DMA transfer bench
//!
//! This crate provides the collaborator traits the transfer cycle talks to,
//! plus the board configuration tables the firmware programs into hardware.
//! Everything here is `no_std` and host-testable.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (firmware crate: Embassy tasks, SDMMC adapter)
//!         ↓
//! Transfer cycle (transfer crate: state machine, runner)
//!         ↓
//! Platform (this crate - collaborator traits + register tables)
//!         ↓
//! Hardware Layer (Embassy HAL + PAC)
//! ```
//!
//! # Collaborators
//!
//! - [`BlockDevice`] - asynchronous, completion-signaled block storage
//! - [`CacheMaintenance`] - D-cache flush / invalidate for DMA buffers
//! - [`MonotonicClock`] - timestamps for throughput reporting and deadlines
//! - [`DiagnosticSink`] - line-oriented console output
//! - [`StatusIndicator`] - success / error LEDs
//!
//! # Board configuration
//!
//! - [`mpu`] - MPU background region and RBAR/RASR encoding
//! - [`clock_config`] - HSE/PLL1 clock tree and per-peripheral requirements
//! - [`sdmmc_config`] - SDMMC1 bus parameters for the on-board eMMC
//! - [`dma_safety`] - memory map and region-tagged DMA buffers
//!
//! # Features
//!
//! - `std`: expose [`mocks`] to downstream test suites
//! - `defmt`: enable defmt logging derives
//!
//! # Example
//!
//! ```no_run
//! use platform::{BlockDevice, DeviceStatus};
//!
//! fn is_idle<D: BlockDevice>(device: &mut D) -> bool {
//!     matches!(device.status(), Ok(DeviceStatus::Ready))
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::missing_panics_doc)] // statically-valid expect() with safety comments
#![allow(clippy::must_use_candidate)] // hardware accessors: callers decide
#![allow(clippy::match_same_arms)] // intentional for readability in DMA access tables
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub mod block_device;
pub mod cache;
pub mod card_info;
pub mod clock;
pub mod clock_config;
pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod dma_safety;
pub mod indicator;
pub mod mocks;
pub mod mpu;
pub mod peripheral;
pub mod poll;
pub mod sdmmc_config;

// Re-export the collaborator traits
pub use block_device::{BlockDevice, CardRegisters, CardState, DeviceStatus, TransferDirection};
pub use cache::{CacheMaintenance, CoherentMemory};
pub use clock::{EmbassyClock, MonotonicClock};
pub use completion::{CompletionFlag, TransferFlags};
pub use diagnostics::DiagnosticSink;
pub use indicator::{ActiveLevel, Led, StatusIndicator};
pub use poll::{poll_until, PollLimit, PollOutcome};

// Re-export peripheral types
pub use peripheral::{DataBits, Parity, StopBits, UartConfig};

// Re-export DMA buffer types
pub use dma_safety::{AxiSramRegion, DmaAccessible, DmaBuffer};
