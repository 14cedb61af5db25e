//! One `cargo` invocation with a timed, coloured status line.

use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

/// How a failed step affects the task.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Print stderr and stop.
    Abort,
    /// Print a warning and keep going.
    Warn,
}

/// A labelled command.
pub struct Step<'a> {
    pub label: &'a str,
    pub program: &'a str,
    pub args: &'a [&'a str],
    pub on_failure: OnFailure,
}

impl<'a> Step<'a> {
    /// `cargo <args>` that aborts the task on failure.
    pub const fn cargo(label: &'a str, args: &'a [&'a str]) -> Self {
        Self {
            label,
            program: "cargo",
            args,
            on_failure: OnFailure::Abort,
        }
    }

    /// Downgrade failures to warnings.
    pub const fn advisory(mut self) -> Self {
        self.on_failure = OnFailure::Warn;
        self
    }

    /// Run the step, returning its output if it succeeded.
    pub fn run(&self) -> Result<Option<Output>> {
        println!("{}", format!("  {}...", self.label).cyan());
        let start = Instant::now();
        let output = Command::new(self.program)
            .args(self.args)
            .output()
            .with_context(|| format!("Failed to run {} ({})", self.program, self.label))?;

        if output.status.success() {
            println!(
                "{}",
                format!("  ✓ {} passed in {:.2}s", self.label, start.elapsed().as_secs_f64()).green()
            );
            println!();
            return Ok(Some(output));
        }

        match self.on_failure {
            OnFailure::Abort => {
                eprintln!("{}", format!("  ✗ {} failed", self.label).red().bold());
                eprintln!();
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
                anyhow::bail!("{} failed", self.label);
            }
            OnFailure::Warn => {
                eprintln!("{}", format!("  ⚠ {} reported problems", self.label).yellow().bold());
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
                println!();
                Ok(None)
            }
        }
    }
}

/// The `test result:` summary from libtest output.
pub fn test_summary(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .filter_map(|line| line.split("test result:").nth(1))
        .map(|s| s.trim().to_string())
        .last()
        .unwrap_or_else(|| "(summary not available)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn output(stdout: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    #[test]
    fn summary_takes_last_result_line() {
        let out = output(
            "running 2 tests\ntest result: ok. 2 passed; 0 failed\n\
             running 1 test\ntest result: ok. 1 passed; 0 failed\n",
        );
        assert_eq!(test_summary(&out), "ok. 1 passed; 0 failed");
    }

    #[test]
    fn summary_without_result_line() {
        assert_eq!(test_summary(&output("nothing here")), "(summary not available)");
    }

    #[test]
    fn advisory_steps_only_warn() {
        let step = Step::cargo("fmt", &["fmt"]).advisory();
        assert!(step.on_failure == OnFailure::Warn);
    }
}
