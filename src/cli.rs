//! CLI definitions for jobkit.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// jobkit CLI.
#[derive(Parser)]
#[command(name = "jobkit")]
#[command(about = "Job execution middleware demo: retry policies, context propagation, job filters")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format (text, json); overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Directory for daily rolling log files; overrides the config file
    #[arg(long, global = true)]
    pub log_dir: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Submit the sample jobs and run the configured servers (default)
    Run {
        /// Number of emails to submit
        #[arg(long, default_value_t = 5)]
        emails: usize,

        /// Make every third handler call fail to exercise retries
        #[arg(long)]
        flaky: bool,

        /// Also schedule one email to be sent after a delay, in seconds
        #[arg(long)]
        delay_secs: Option<u64>,

        /// Stop the servers after this many seconds
        #[arg(long, default_value_t = 15)]
        duration_secs: u64,
    },

    /// List the resolved job policies
    Policies {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Validate the configuration file
    Validate,
}
