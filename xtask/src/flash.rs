use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

use crate::step::Step;

const TARGET: &str = "thumbv7em-none-eabihf";
const CHIP: &str = "STM32H745XIHx";
const BINARY: &str = "mmc-bench";

fn binary_path(release: bool) -> String {
    let profile = if release { "release" } else { "debug" };
    format!("target/{TARGET}/{profile}/{BINARY}")
}

pub fn run(release: bool) -> Result<()> {
    let mode = if release { "release" } else { "debug" };

    println!();
    println!("{}", format!("🔨 Building {BINARY} ({mode} mode)...").cyan().bold());
    println!();

    let mut args = vec!["build", "-p", "firmware", "--bin", BINARY, "--target", TARGET, "--features", "hardware"];
    if release {
        args.push("--release");
    }
    Step::cargo("Firmware build", &args).run()?;

    show_binary_size(release);

    // probe-rs run: flash, reset, then stream defmt over RTT
    println!("{}", format!("📡 Flashing to {CHIP} (CM7)...").cyan().bold());
    println!("   {}", "The bench report is on the ST-LINK VCP at 9600 8O1".dimmed());
    println!();

    let flash_start = Instant::now();
    let status = Command::new("probe-rs")
        .args(["run", "--chip", CHIP, "--probe-index", "0"])
        .arg(binary_path(release))
        .status()
        .context("Failed to run probe-rs. Is probe-rs installed? (cargo install probe-rs-tools)")?;

    if !status.success() {
        eprintln!("{}", "✗ Flash failed".red().bold());
        anyhow::bail!("Flash failed - check that the probe is connected and the board is powered");
    }

    println!(
        "{}",
        format!("✓ probe-rs session ended after {:.2}s", flash_start.elapsed().as_secs_f64()).green()
    );
    println!();

    Ok(())
}

fn show_binary_size(release: bool) {
    let output = Command::new("rust-size").arg(binary_path(release)).arg("-A").output();

    if let Ok(out) = output {
        if out.status.success() {
            println!("{}", "📊 Binary size:".cyan());
            for line in String::from_utf8_lossy(&out.stdout).lines() {
                println!("   {}", line.dimmed());
            }
            println!();
        }
    }
}
