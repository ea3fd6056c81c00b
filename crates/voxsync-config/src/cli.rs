//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// voxsync command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "voxsync", about = "Optimistic voxel replication client")]
pub struct CliArgs {
    /// Sweeps before an unacknowledged write is rolled back.
    #[arg(long)]
    pub grace_ticks: Option<u32>,

    /// Milliseconds between ledger sweeps.
    #[arg(long)]
    pub sweep_interval_ms: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of simulated frames the demo runs.
    #[arg(long, default_value_t = 120)]
    pub frames: u32,

    /// The simulated server drops every Nth local write (0 = ack everything).
    #[arg(long, default_value_t = 3)]
    pub drop_every: u32,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ticks) = args.grace_ticks {
            self.reconcile.grace_ticks = ticks;
        }
        if let Some(ms) = args.sweep_interval_ms {
            self.reconcile.sweep_interval_ms = ms;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
