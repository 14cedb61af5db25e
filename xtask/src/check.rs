use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::step::Step;

const TARGET: &str = "thumbv7em-none-eabihf";

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking bench builds...".cyan().bold());
    println!();

    let total_start = Instant::now();

    let steps = [
        Step::cargo(
            "Hardware target (STM32H745 CM7)",
            &["check", "-p", "firmware", "--target", TARGET, "--features", "hardware"],
        ),
        Step::cargo(
            "Emulator target (host)",
            &["check", "-p", "firmware", "--features", "emulator", "--all-targets"],
        ),
        Step::cargo(
            "platform + transfer (no_std)",
            &["check", "-p", "platform", "-p", "transfer", "--target", TARGET],
        ),
        Step::cargo(
            "Clippy lints",
            &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        )
        .advisory(),
        Step::cargo("Formatting", &["fmt", "--all", "--check"]).advisory(),
    ];
    for step in &steps {
        step.run()?;
    }

    println!(
        "{}",
        format!("✓ All checks completed in {:.2}s", total_start.elapsed().as_secs_f64())
            .green()
            .bold()
    );
    println!();

    Ok(())
}
