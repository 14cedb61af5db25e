//! Application configuration and constants
//!
//! Console banner and naming used by every front end (hardware and emulator).
//! Reference these constants rather than hardcoding strings.

/// The application name
pub const APP_NAME: &str = "MMC DMA Bench";

/// Application version (synchronized with Cargo.toml)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Target board
pub const BOARD_NAME: &str = "STM32H745I-DISCO";

/// Banner lines printed once at boot, before card preparation.
pub const BANNER: [&str; 3] = [
    " #######################################################",
    " #       eMMC bench: DMA write / read / verify         #",
    " #######################################################",
];
