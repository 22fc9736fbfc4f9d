//! CLI entry point for framehost.
//!
//! This binary provides the `framehost` command with subcommands for
//! running a guest module and for inspecting one without running it.

mod cli;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use framehost_bridge::{
    BridgeConfig, ConsoleAlert, DriverState, FrameDriver, ModuleLoader, ModuleReport,
    ModuleSource, SoftwareSurface,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, RunArgs};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Inspect {
            source,
            config,
            json,
        } => cmd_inspect(&source, &config, json).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(fps) = args.fps {
        config = config.with_frame_rate(fps);
    }
    if args.frames.is_some() {
        config = config.with_max_frames(args.frames);
    }
    if args.no_fuel {
        config = config.with_fuel_per_call(None);
    }

    let source: ModuleSource = args.source.parse().context("invalid module source")?;

    // The surface must exist before any guest code can issue a draw call.
    let surface = SoftwareSurface::new(args.width, args.height)
        .context("failed to create graphics surface")?;
    let alerts = ConsoleAlert::new(!args.non_interactive);

    let loader = ModuleLoader::new(config).context("invalid configuration")?;
    let session = loader
        .load(&source, Box::new(surface.clone()), Box::new(alerts))
        .await
        .with_context(|| format!("failed to load module from {source}"))?;

    let mut driver = FrameDriver::new(session, loader.config());
    let state = driver.run(shutdown_signal()).await.clone();
    info!(
        frames = driver.frames_run(),
        contained_faults = driver.session().contained_faults(),
        clears = surface.clear_count(),
        "session finished"
    );

    if let Some(path) = &args.dump {
        surface
            .write_ppm(path)
            .with_context(|| format!("failed to write surface dump to {}", path.display()))?;
        info!(path = %path.display(), "wrote surface dump");
    }

    match state {
        DriverState::Terminated(reason) if reason.is_failure() => {
            bail!("session ended: {reason}")
        }
        _ => Ok(()),
    }
}

/// Resolves on Ctrl-C.  If the handler cannot be installed the session
/// simply runs until it ends on its own.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("interrupt received, tearing down");
}

// ---------------------------------------------------------------------------
// Subcommand: inspect
// ---------------------------------------------------------------------------

async fn cmd_inspect(source: &str, config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let source: ModuleSource = source.parse().context("invalid module source")?;

    let loader = ModuleLoader::new(config).context("invalid configuration")?;
    let module = loader
        .load_module(&source)
        .await
        .with_context(|| format!("failed to load module from {source}"))?;
    let report = ModuleReport::from_module(&module, &loader.config().entry_points);

    if json {
        let text = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{text}");
    } else {
        print_report(&source, &report);
    }

    if !report.is_runnable() {
        bail!("module {source} cannot be run by this host");
    }
    Ok(())
}

fn print_report(source: &ModuleSource, report: &ModuleReport) {
    println!();
    println!("  Module: {source}");
    println!();
    println!("  Imports ({}):", report.imports.len());
    for item in &report.imports {
        println!("    {}::{} ({})", item.module, item.name, item.kind);
    }
    println!("  Exports ({}):", report.exports.len());
    for item in &report.exports {
        println!("    {} ({})", item.name, item.kind);
    }
    println!();

    if report.unresolved_imports.is_empty() {
        println!("  Imports:          OK");
    } else {
        println!(
            "  Imports:          UNRESOLVED ({})",
            report.unresolved_imports.join(", ")
        );
    }
    match &report.contract_error {
        None => println!("  Entry points:     OK"),
        Some(reason) => println!("  Entry points:     {reason}"),
    }
    println!();
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<BridgeConfig> {
    BridgeConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
