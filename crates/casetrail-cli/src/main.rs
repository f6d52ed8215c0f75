//! casetrail CLI
//!
//! The `casetrail` command drives the correlation engine from recorded
//! callback streams and inspects the artifacts it writes.
//!
//! ## Commands
//!
//! - `replay`: Feed a JSON-lines callback stream through the engine and
//!   persist the resulting run
//! - `show`: Summarize a persisted run
//! - `verify`: Check a persisted run document against its digest

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use casetrail_core::{
    read_result, ArtifactHandle, Correlator, LifecycleCallback, Registry, RunLayout, RunResult,
    TestStatus, TrailConfig, TrailError,
};

#[derive(Parser)]
#[command(name = "casetrail")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Test lifecycle timeline recorder", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded callback stream (JSON lines) and persist the run
    Replay {
        /// Callback stream, one JSON object per line
        input: PathBuf,

        /// Registry root for the run directory (overrides config and env)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// TOML configuration file
        #[arg(long, env = "CASETRAIL_CONFIG")]
        config: Option<PathBuf>,

        /// Version label stamped on the run
        #[arg(long)]
        run_version: Option<String>,
    },

    /// Summarize a persisted run
    Show {
        /// Run directory (TestRun-*)
        run_dir: PathBuf,

        /// List every event under its case
        #[arg(short, long)]
        events: bool,
    },

    /// Verify a persisted run document against its digest
    Verify {
        /// Run directory (TestRun-*)
        run_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    casetrail_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Replay {
            input,
            registry,
            config,
            run_version,
        } => cmd_replay(&input, registry, config.as_deref(), run_version).await,
        Commands::Show { run_dir, events } => cmd_show(&run_dir, events),
        Commands::Verify { run_dir } => cmd_verify(&run_dir),
    }
}

/// Replay a callback stream into a fresh run directory.
async fn cmd_replay(
    input: &Path,
    registry: Option<PathBuf>,
    config: Option<&Path>,
    run_version: Option<String>,
) -> Result<()> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read callback stream: {:?}", input))?;
    let callbacks = parse_callbacks(&text)?;

    let mut trail_config = match config {
        Some(path) => TrailConfig::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        None => TrailConfig::default(),
    };
    trail_config = trail_config
        .with_overrides(|key| std::env::var(key).ok())
        .context("Invalid CASETRAIL_* environment")?;
    if let Some(root) = registry {
        trail_config.registry_root = Some(root);
    }
    if let Some(version) = run_version {
        trail_config.version = Some(version);
    }

    let count = callbacks.len();
    let handle = tokio::task::spawn_blocking(move || replay_callbacks(&trail_config, callbacks))
        .await
        .context("Replay task panicked")??;

    info!(callbacks = count, document = %handle.document.display(), "replay finished");
    println!("Replayed {} callbacks", count);
    println!("  Document:  {}", handle.document.display());
    println!("  Evidence:  {}", handle.evidence_dir.display());
    println!("  Digest:    {}", handle.digest);
    if handle.relocation.failed > 0 {
        println!(
            "  Warning:   {} screenshot(s) could not be relocated",
            handle.relocation.failed
        );
    }
    Ok(())
}

/// Parse JSON lines, skipping blank lines and `#` comments.
fn parse_callbacks(text: &str) -> Result<Vec<LifecycleCallback>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid callback on line {}", n + 1))
        })
        .collect()
}

fn replay_callbacks(
    config: &TrailConfig,
    callbacks: Vec<LifecycleCallback>,
) -> Result<ArtifactHandle> {
    let provider = config.location_provider();
    let registry = Registry::new(provider.as_ref(), config)
        .context("Failed to create test run directory")?;
    let correlator = Correlator::new(Arc::new(registry));

    let mut artifact = None;
    for callback in callbacks {
        if let Some(handle) = correlator.dispatch(callback)? {
            artifact = Some(handle);
        }
    }
    match artifact {
        Some(handle) => Ok(handle),
        None => {
            warn!("callback stream has no run_end; persisting what was recorded");
            Ok(correlator.on_run_end()?)
        }
    }
}

/// Print a summary of a persisted run.
fn cmd_show(run_dir: &Path, events: bool) -> Result<()> {
    let run = read_result(run_dir)
        .with_context(|| format!("Failed to read run: {:?}", run_dir))?;
    print!("{}", render_summary(&run, events));
    Ok(())
}

fn render_summary(run: &RunResult, events: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("Run {} (version {})\n", run.run_id, run.version));
    out.push_str(&format!(
        "{} cases: {} passed, {} failed, {} skipped\n",
        run.cases.len(),
        run.count_status(TestStatus::Passed),
        run.count_status(TestStatus::Failed),
        run.count_status(TestStatus::Skipped),
    ));
    for case in &run.cases {
        let kind = if case.is_configuration_phase {
            " (configuration)"
        } else {
            ""
        };
        out.push_str(&format!(
            "  [{}] {}{} - {} events, {} ms\n",
            case.status,
            case.name,
            kind,
            case.events.len(),
            case.duration_ms(),
        ));
        if events {
            for event in &case.events {
                out.push_str(&format!(
                    "      {:<7} {}: {}",
                    event.level, event.source, event.content
                ));
                if let Some(path) = event.evidence() {
                    out.push_str(&format!(" [{}]", path.display()));
                }
                out.push('\n');
            }
        }
    }
    out
}

/// Verify the result document's digest.
fn cmd_verify(run_dir: &Path) -> Result<()> {
    let layout = RunLayout::at(run_dir);
    let digest_path = layout.digest_path();
    if !digest_path.exists() {
        anyhow::bail!("Recorded digest not found: {:?}", digest_path);
    }

    let run = match read_result(run_dir) {
        Ok(run) => run,
        Err(TrailError::DigestMismatch { expected, actual }) => {
            anyhow::bail!(
                "Digest mismatch for {:?}: expected {}, got {}",
                layout.result_path(),
                expected,
                actual
            );
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read run: {:?}", run_dir));
        }
    };

    let digest = std::fs::read_to_string(&digest_path)
        .with_context(|| format!("Failed to read digest: {:?}", digest_path))?;
    println!(
        "Digest verified: {} ({} cases)",
        digest.trim(),
        run.cases.len()
    );
    Ok(())
}
