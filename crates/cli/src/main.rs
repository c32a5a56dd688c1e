use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use siteforge_cli::plugins::WritePlugin;
use siteforge_cli::scan;
use siteforge_core::{BuildContext, BuildOptions, Mode};
use siteforge_engine::{Engine, WatchConfig, WatchCoordinator};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "siteforge")]
#[command(about = "Incremental, plugin-driven asset builds", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log only warnings and errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// One-shot build; any file error fails the run
    Build(BuildArgs),
    /// Build, then watch the source tree and rebuild incrementally
    Dev(BuildArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Options file
    #[arg(long, default_value = "siteforge.toml")]
    config: PathBuf,

    /// Override the source glob
    #[arg(long)]
    src: Option<String>,

    /// Override the output directory
    #[arg(long)]
    dest: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    match cli.command {
        Commands::Build(args) => run(args, Mode::Build).await,
        Commands::Dev(args) => run(args, Mode::Dev).await,
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

async fn run(args: BuildArgs, mode: Mode) -> Result<()> {
    let mut options = if args.config.exists() {
        BuildOptions::from_file(&args.config)?
    } else {
        BuildOptions::default()
    };
    if let Some(src) = args.src {
        options.src = src;
    }
    if let Some(dest) = args.dest {
        options.dest = dest;
    }
    let resolved = options.resolve()?;

    let roots = scan::scan_roots(&resolved)?;
    let ctx = BuildContext::new(resolved, mode);
    let engine = Engine::new(ctx, vec![Arc::new(WritePlugin)]);

    engine.mount().await?;

    match mode {
        Mode::Build => {
            let summary = engine.rebuild(&roots).await?;
            info!(
                "build done: {} file(s), {} error(s)",
                summary.files, summary.errors
            );
        }
        Mode::Dev => {
            if let Err(err) = engine.rebuild(&roots).await {
                error!("initial build failed: {err}");
            }
            let coordinator = WatchCoordinator::start(engine.clone(), WatchConfig::default())?;
            info!("watching for changes, press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            coordinator.stop().await;
        }
    }
    Ok(())
}
