//! CLI definitions for mplp.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// mplp CLI.
#[derive(Parser)]
#[command(name = "mplp")]
#[command(about = "Multi-agent workflow orchestrator")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults to the user config dir, then built-in defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Load and validate the configuration, then print it
    Validate,

    /// Run a sample draft/review/publish workflow against in-process agents
    Demo {
        /// Topic passed to the workflow as a parameter
        #[arg(long, default_value = "workflow orchestration")]
        topic: String,

        /// Review score returned by the reviewer agent (publish needs > 0.8)
        #[arg(long, default_value_t = 0.9)]
        score: f64,

        /// Make the drafting agent fail on its first N attempts
        #[arg(long, default_value_t = 0)]
        flaky: u32,
    },
}
