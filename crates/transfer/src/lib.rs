//! Chunked DMA transfer cycle: write, read back, verify, repeat
//!
//! The cycle moves a fixed total in fixed-size chunks through a block device
//! whose transfers complete asynchronously, times each phase, and compares
//! the data byte by byte. It is hardware-independent: the device, cache
//! maintenance, clock, console and LEDs are all traits from `platform`.
//!
//! - [`TransferCycle`] - the state machine, one state per [`TransferCycle::step`]
//! - [`BenchRunner`] - indicators, success pause and halt-on-error around it
//! - [`CycleConfig`] - parameters, with [`CycleConfig::mmc_dma_bench`] as the preset
#![cfg_attr(not(test), no_std)]
#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod pattern;
pub mod runner;
pub mod state;
pub mod throughput;

pub use config::{ChunkLayout, ChunkPlan, CycleConfig};
pub use controller::{CycleReport, StepEvent, TransferCycle};
pub use error::{ConfigError, CycleError};
pub use runner::BenchRunner;
pub use state::CycleState;
pub use throughput::{PhaseTiming, Speed};
