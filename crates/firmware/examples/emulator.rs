//! Desktop eMMC bench.
//!
//! Runs the transfer cycle against an in-memory card. The bench report goes
//! to stdout; logs go to stderr and are filtered by `RUST_LOG`.
//!
//! ```bash
//! RUST_LOG=mmc=debug cargo run -p firmware --example emulator --features emulator
//! ```

use firmware::emulator::{self, EmulatorConfig};
use firmware::LINK;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = EmulatorConfig::default();
    let reports = emulator::run(config, &LINK).await?;
    for report in &reports {
        tracing::info!(
            cycle = report.cycle,
            write_ms = report.write.elapsed_ms(),
            read_ms = report.read.elapsed_ms(),
            "cycle verified"
        );
    }
    Ok(())
}
