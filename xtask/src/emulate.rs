use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;

pub fn run(log: &str) -> Result<()> {
    println!();
    println!("{}", "🖥  Running the bench against an emulated eMMC...".cyan().bold());
    println!("   {}", format!("RUST_LOG={log}").dimmed());
    println!();

    // inherit stdio: the bench report streams to the terminal
    let status = Command::new("cargo")
        .args(["run", "-p", "firmware", "--example", "emulator", "--features", "emulator"])
        .env("RUST_LOG", log)
        .status()
        .context("Failed to run the emulator")?;

    if !status.success() {
        anyhow::bail!("Emulator exited with {status}");
    }
    println!();
    println!("{}", "✓ Emulated bench finished".green().bold());
    Ok(())
}
