//! CLI argument definitions for trapflow-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Trapflow SNMP trap ingestion daemon.
///
/// Tails the trap log files written by an external snmptrapd-compatible
/// daemon, parses each record, applies storm protection and filters,
/// stores the traps and optionally re-emits them downstream.
#[derive(Parser, Debug)]
#[command(name = "trapflow-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to trapflow.toml configuration file.
    #[arg(short, long, default_value = "/etc/trapflow/trapflow.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}
