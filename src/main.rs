//! clicache - A file-backed cache for command-line tools
//!
//! Wraps a command and serves its standard output from the cache while the
//! entry is fresh. Configuration comes from `CLICACHE_*` environment
//! variables, overridden by the flags below.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clicache::{CacheStore, Config, SweepStats};

#[derive(Debug, Parser)]
#[command(
    name = "clicache",
    version,
    about = "Cache the output of slow commands between invocations"
)]
struct Cli {
    /// Directory holding the cache blobs
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Namespace prefix of blob names
    #[arg(long, global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a command, serving its stdout from the cache while fresh
    Run {
        /// TTL in seconds for a freshly computed result
        #[arg(long, allow_negative_numbers = true)]
        ttl: Option<i64>,

        /// The command and its arguments; together they form the cache key
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Remove expired and unreadable entries
    Gc,
    /// Remove every entry
    Cleanup,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the command's output.
    // Defaults to "warn", can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clicache=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.dir {
        config.cache_dir = dir;
    }
    if let Some(prefix) = cli.prefix {
        config.prefix = prefix;
    }
    debug!(
        "Configuration loaded: cache_dir={}, prefix={}, default_ttl={}s",
        config.cache_dir.display(),
        config.prefix,
        config.default_ttl
    );

    let cache = CacheStore::open(&config)
        .with_context(|| format!("failed to open cache in {}", config.cache_dir.display()))?;

    match cli.command {
        Commands::Run { ttl, command } => {
            if let Some(ttl) = ttl {
                cache.set_ttl(ttl);
            }
            let output = cache.cache(&command, || run_command(&command))?;

            let mut stdout = io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            stdout.flush()?;
        }
        Commands::Gc => print_stats(&cache.gc())?,
        Commands::Cleanup => print_stats(&cache.cleanup())?,
    }

    Ok(())
}

/// Runs `command` with inherited stdin/stderr and returns its stdout.
///
/// Fails if the command cannot be spawned, exits unsuccessfully, or writes
/// non-UTF-8 output, in which case nothing gets cached.
fn run_command(command: &[String]) -> anyhow::Result<String> {
    let (program, args) = command.split_first().context("no command given")?;
    debug!(program = %program, "Cache miss, running command");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stderr(Stdio::inherit())
        .output()
        .with_context(|| format!("failed to run `{program}`"))?;

    if !output.status.success() {
        bail!("`{program}` {}", output.status);
    }

    String::from_utf8(output.stdout).with_context(|| format!("`{program}` wrote non-UTF-8 output"))
}

fn print_stats(stats: &SweepStats) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(stats)?);
    Ok(())
}
