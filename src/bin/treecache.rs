//! # treecache CLI - Incremental rebuilds from the command line
//!
//! Exposes the library's building blocks for shell use and scripting.
//!
//! ## Usage
//! ```bash
//! # Print the fingerprint digest of a directory
//! treecache fingerprint ./src --include '\.rs$'
//!
//! # Replay a cache directory into a destination
//! treecache materialize ./cache ./dist
//!
//! # Check whether hard links work here
//! treecache probe
//!
//! # Rerun a command whenever ./assets changes
//! treecache run --input ./assets --output ./dist --watch -- sh -c 'cp -r "$TREECACHE_INPUT"/. "$TREECACHE_CACHE"'
//! ```

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use treecache::{
    link, utils, CachingWriterBuilder, FilterConfig, LinkMode, Materializer, PatternSpec, Result,
    TreeCacheError, TreeFingerprinter, UpdateCache,
};

/// Environment variable holding the input directory for `run` commands
const INPUT_ENV: &str = "TREECACHE_INPUT";
/// Environment variable holding the cache directory for `run` commands
const CACHE_ENV: &str = "TREECACHE_CACHE";

/// treecache CLI - fingerprint, cache and replay directory transforms
#[derive(Parser)]
#[command(name = "treecache")]
#[command(version)]
#[command(about = "Rerun directory transforms only when their input changes")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fingerprint digest of a directory
    #[command(alias = "fp")]
    Fingerprint {
        /// Directory to fingerprint
        dir: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Also print every fingerprint token
        #[arg(long)]
        tokens: bool,
    },

    /// Replace a destination with the files of a cache directory
    Materialize {
        /// Cache directory to read
        cache: PathBuf,

        /// Destination directory to replace
        dest: PathBuf,

        /// Copy bytes instead of hard linking
        #[arg(long)]
        copy: bool,
    },

    /// Report whether hard links work in the temporary directory
    Probe,

    /// Run a command as a cached rebuild step
    Run {
        /// Input directory
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Keep polling the input and rebuild on change
        #[arg(short, long)]
        watch: bool,

        /// Polling interval for --watch (e.g. "500ms", "2s")
        #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
        interval: Duration,

        /// Copy bytes instead of hard linking
        #[arg(long)]
        copy: bool,

        /// Command and arguments to run as the rebuild step
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Only fingerprint paths matching this regular expression
    #[arg(long)]
    include: Vec<String>,

    /// Never fingerprint paths matching this regular expression
    #[arg(long)]
    exclude: Vec<String>,
}

impl FilterArgs {
    fn into_config(self) -> FilterConfig {
        FilterConfig {
            include: self.include.into_iter().map(PatternSpec::Regex).collect(),
            exclude: self.exclude.into_iter().map(PatternSpec::Regex).collect(),
        }
    }
}

/// Rebuild step that spawns an external command
#[derive(Debug)]
struct CommandHook {
    program: String,
    args: Vec<String>,
}

impl CommandHook {
    fn new(mut command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(TreeCacheError::configuration("No rebuild command given"));
        }
        let program = command.remove(0);
        Ok(Self { program, args: command })
    }
}

#[async_trait]
impl UpdateCache for CommandHook {
    async fn update_cache(&mut self, input_dir: &Path, cache_dir: &Path) -> Result<()> {
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env(INPUT_ENV, input_dir)
            .env(CACHE_ENV, cache_dir)
            .status()
            .await?;

        if !status.success() {
            return Err(TreeCacheError::rebuild(format!(
                "'{}' exited with {}",
                self.program, status
            )));
        }
        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Fingerprint { dir, filter, tokens } => cmd_fingerprint(dir, filter, tokens),
        Commands::Materialize { cache, dest, copy } => cmd_materialize(cache, dest, copy),
        Commands::Probe => cmd_probe(),
        Commands::Run { input, output, filter, watch, interval, copy, command } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(cmd_run(input, output, filter, watch, interval, copy, command))
        }
    }
}

/// Print the digest (and optionally tokens) of a directory
fn cmd_fingerprint(dir: PathBuf, filter: FilterArgs, show_tokens: bool) -> Result<()> {
    if !dir.is_dir() {
        return Err(TreeCacheError::input(format!("Not a directory: {}", dir.display())));
    }
    let filter = filter.into_config().build()?;

    let start = Instant::now();
    let fingerprint = TreeFingerprinter::new(&filter).fingerprint(&dir);
    let duration = start.elapsed();

    if show_tokens {
        for token in fingerprint.tokens() {
            println!("{}", token);
        }
        println!();
    }

    println!("{}", fingerprint.digest());
    eprintln!(
        "  {} files, {} directories, {} ignored in {}",
        fingerprint.files.to_string().cyan(),
        fingerprint.directories.to_string().cyan(),
        fingerprint.ignored.to_string().cyan(),
        format_duration(duration).to_string().cyan()
    );
    if fingerprint.anomalies > 0 {
        eprintln!(
            "  {} {} entries could not be read",
            "!".yellow().bold(),
            fingerprint.anomalies
        );
    }
    Ok(())
}

/// Materialize a cache directory into a destination
fn cmd_materialize(cache: PathBuf, dest: PathBuf, copy: bool) -> Result<()> {
    let mode = if copy { LinkMode::Copy } else { LinkMode::Auto };

    let start = Instant::now();
    let stats = Materializer::new(mode).materialize(&cache, &dest)?;
    let duration = start.elapsed();

    println!(
        "{} Materialized {} into {}",
        "✓".green().bold(),
        cache.display().to_string().cyan(),
        dest.display().to_string().cyan()
    );
    println!("  Linked: {}", stats.files_linked);
    println!(
        "  Copied: {} ({})",
        stats.files_copied,
        utils::format_bytes(stats.bytes_copied)
    );
    println!("  Time: {}", format_duration(duration).to_string().cyan());
    Ok(())
}

/// Report the process-wide link capability
fn cmd_probe() -> Result<()> {
    let dir = std::env::temp_dir();
    if link::can_link() {
        println!("{} Hard links supported in {}", "✓".green().bold(), dir.display());
    } else {
        println!("{} Hard links unavailable in {}, files will be copied", "✗".red().bold(), dir.display());
    }
    Ok(())
}

/// Run a command through a caching writer, once or on every change
async fn cmd_run(
    input: PathBuf,
    output: PathBuf,
    filter: FilterArgs,
    watch: bool,
    interval: Duration,
    copy: bool,
    command: Vec<String>,
) -> Result<()> {
    let hook = CommandHook::new(command)?;
    let mut writer = CachingWriterBuilder::new()
        .filter_config(filter.into_config())
        .link_mode(if copy { LinkMode::Copy } else { LinkMode::Auto })
        .build(hook)?;

    loop {
        match writer.write(input.as_path(), &output).await {
            Ok(outcome) if outcome.rebuilt => {
                println!(
                    "{} Rebuilt {} ({} files) in {}",
                    "✓".green().bold(),
                    output.display().to_string().cyan(),
                    outcome.materialized.files(),
                    format_duration(Duration::from_millis(outcome.duration_ms)).to_string().cyan()
                );
            }
            Ok(outcome) => {
                if !watch {
                    println!(
                        "{} {} is up to date ({} files)",
                        "✓".green().bold(),
                        output.display().to_string().cyan(),
                        outcome.materialized.files()
                    );
                }
            }
            Err(e) if watch => {
                eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            }
            Err(e) => return Err(e),
        }

        if !watch {
            return writer.cleanup();
        }
        tokio::time::sleep(interval).await;
    }
}
