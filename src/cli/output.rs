// Output formatting and display for CLI

use crate::probe::HealthResult;
use crate::process::{ResourceResult, StopOutcome};
use crate::supervisor::RunSummary;
use colored::*;
use std::path::Path;

/// Print the result of a one-shot health probe
pub fn print_health(url: &str, result: &HealthResult) {
    if result.healthy {
        println!("{} {} ({})", "✓ HTTP".green().bold(), url, result.detail);
    } else {
        println!("{} {} ({})", "✗ HTTP".red().bold(), url, result.detail.red());
    }
}

/// Print the result of a one-shot resource inspection
pub fn print_resource(pid: u32, result: &ResourceResult) {
    let label = format!("PID {}", pid);
    if result.healthy {
        println!("{} {} ({})", "✓ RES ".green().bold(), label, result.detail);
    } else {
        println!("{} {} ({})", "✗ RES ".red().bold(), label, result.detail.red());
    }
}

pub fn print_verdict(healthy: bool) {
    if healthy {
        println!("{}", "System healthy".green().bold());
    } else {
        println!("{}", "System unhealthy".red().bold());
    }
}

/// Print totals after the supervisor exits
pub fn print_summary(summary: &RunSummary) {
    println!("{}", "✓ Supervisor stopped".green().bold());
    println!("  {}: {}", "Cycles".bold(), summary.cycles);
    println!("  {}: {}", "Restarts".bold(), summary.restarts);
    println!(
        "  {}: {}",
        "Final stop".bold(),
        format_stop(summary.final_stop)
    );
}

pub fn print_config_written(path: &Path) {
    println!(
        "{} {}",
        "✓ Configuration written to".green().bold(),
        path.display().to_string().cyan()
    );
}

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

fn format_stop(outcome: Option<StopOutcome>) -> String {
    match outcome {
        Some(StopOutcome::Forced) => "forced".yellow().to_string(),
        Some(outcome) => outcome.to_string(),
        None => "no target running".dimmed().to_string(),
    }
}
