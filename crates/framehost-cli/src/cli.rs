//! CLI argument definitions for framehost.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// framehost -- run a frame-driven WebAssembly guest.
#[derive(Parser)]
#[command(
    name = "framehost",
    version,
    about = "framehost -- run a frame-driven WebAssembly guest",
    long_about = "Loads a WebAssembly module, binds the host import table into it, runs its \
                  setup entry point once and then its frame entry point on every tick."
)]
pub struct Cli {
    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a module and drive it until it panics, traps, or is interrupted.
    Run(RunArgs),

    /// Compile a module and print its imports, exports and contract status.
    Inspect {
        /// Path or http(s) URL of the module.
        source: String,

        /// Configuration file.
        #[arg(long, short, default_value = "config/default.toml")]
        config: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Path or http(s) URL of the module.
    pub source: String,

    /// Configuration file.
    #[arg(long, short, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Stop after this many frames.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Frame rate override in Hz.
    #[arg(long)]
    pub fps: Option<u32>,

    /// Disable per-call fuel metering.
    #[arg(long)]
    pub no_fuel: bool,

    /// Surface width in pixels.
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Surface height in pixels.
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// Write the final surface contents to this PPM file.
    #[arg(long)]
    pub dump: Option<PathBuf>,

    /// Never block waiting for alerts to be dismissed.
    #[arg(long)]
    pub non_interactive: bool,
}
