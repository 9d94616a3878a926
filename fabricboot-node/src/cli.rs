//! Command-line argument parsing.

use clap::Parser;

/// fabricboot Node - first-boot network fabric provisioner
#[derive(Parser, Debug)]
#[command(name = "fabricboot-node")]
#[command(about = "fabricboot Node - first-boot network fabric provisioner")]
#[command(version)]
pub struct Args {
    /// Path to the desired-state file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Restrict a matcherless sole vswitch to ten-gigabit drivers
    #[arg(long)]
    pub ten_gig_only: bool,

    /// Provision the physical fabric only, skipping CVM reconciliation
    #[arg(long)]
    pub skip_cvm: bool,

    /// Path of the marker file written on fatal failure
    #[arg(long)]
    pub failure_marker: Option<String>,
}
