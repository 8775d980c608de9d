//! # omake CLI Entry Point
//!
//! Parses the command line with clap and hands builds to [`omake::engine`].
//! Running `omake` without a subcommand is the same as `omake build`.

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use omake::cache::TypedCache;
use omake::engine::{self, Engine, EngineOptions};
use omake::ui;

const DEFAULT_DESCRIPTION: &str = "omake.toml";
const DEFAULT_LOG: &str = "omake.log";

#[derive(Parser)]
#[command(name = "omake")]
#[command(about = "A make-style build engine", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    build: BuildArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Build targets for a platform
    Build(BuildArgs),
    /// Inspect or remove the build cache
    Cache {
        /// Build description the cache belongs to
        #[arg(short, long, default_value = DEFAULT_DESCRIPTION)]
        file: PathBuf,
        #[command(subcommand)]
        op: CacheOp,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheOp {
    /// List every cached value
    List,
    /// Print the cache file location
    Path,
    /// Delete the cache file
    Clean,
}

#[derive(Args, Clone)]
struct BuildArgs {
    /// Build description
    #[arg(short, long, default_value = DEFAULT_DESCRIPTION)]
    file: PathBuf,

    /// Platform (or platform alias) to build for
    #[arg(short, long, env = "OMAKE_PLATFORM")]
    platform: Option<String>,

    /// Targets to build, in order [default: all]
    targets: Vec<String>,

    /// Print statements instead of executing them
    #[arg(long)]
    dry_run: bool,

    /// Show internal diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Always parse the description, ignoring stored statements
    #[arg(long)]
    no_parse_cache: bool,

    /// Build log location [default: omake.log next to the description]
    #[arg(long, conflicts_with = "no_log")]
    log: Option<PathBuf>,

    /// Do not write a build log
    #[arg(long)]
    no_log: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("OMAKE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Build(args)) => build(args),
        Some(Commands::Cache { file, op }) => {
            init_tracing(false);
            match op {
                CacheOp::List => list_cache(&file),
                CacheOp::Path => {
                    println!("{}", engine::cache_path(&file).display());
                    Ok(())
                }
                CacheOp::Clean => clean_cache(&file),
            }
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
        None => build(cli.build),
    }
}

fn build(args: BuildArgs) -> Result<()> {
    init_tracing(args.verbose);

    let Some(platform) = args.platform else {
        println!(
            "{} No platform given. Use --platform or set OMAKE_PLATFORM.",
            "x".red()
        );
        std::process::exit(2);
    };

    let mut options = EngineOptions::new(&args.file, platform);
    options.targets = args.targets;
    options.dry_run = args.dry_run;
    options.reuse_snapshots = !args.no_parse_cache;
    options.log = match (args.no_log, args.log) {
        (true, _) => None,
        (false, Some(path)) => Some(path),
        (false, None) => Some(options.root().join(DEFAULT_LOG)),
    };

    let start = Instant::now();
    let summary = Engine::new().build(&options)?;

    let run = &summary.run;
    if summary.success() {
        if run.executed == 0 && run.up_to_date > 0 {
            println!("{} Up to date", "⚡".green());
        } else {
            println!(
                "{} Build finished in {:.2?} ({} executed, {} up to date, {} skipped)",
                "✓".green(),
                start.elapsed(),
                run.executed,
                run.up_to_date,
                run.skipped
            );
        }
        Ok(())
    } else {
        println!(
            "{} Build failed: {} error(s), {} warning(s)",
            "x".red(),
            summary.errors,
            summary.warnings
        );
        std::process::exit(1);
    }
}

fn list_cache(description: &Path) -> Result<()> {
    let path = engine::cache_path(description);
    if !path.exists() {
        println!("{} No cache at {}", "!".yellow(), path.display());
        return Ok(());
    }
    let cache = TypedCache::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;

    let mut table = ui::Table::new(&["Name", "Type", "Value"]);
    for (name, value) in cache.iter() {
        table.add_row(vec![
            name.to_string(),
            value.tag().name().to_string(),
            value.to_string(),
        ]);
    }
    if table.is_empty() {
        println!("{} Cache is empty", "!".yellow());
    } else {
        table.print();
        println!("  {} entries", cache.len());
    }
    Ok(())
}

fn clean_cache(description: &Path) -> Result<()> {
    let path = engine::cache_path(description);
    if path.exists() {
        fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        println!("{} Removed {}", "✓".green(), path.display());
    } else {
        println!("{} No cache at {}", "!".yellow(), path.display());
    }
    Ok(())
}
