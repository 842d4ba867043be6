use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tripwire::trace::{BuildTrace, ReplayOutcome, replay};

/// Build file-access conflict analyzer
///
/// Tripwire replays recorded build traces against the build's declared
/// dependency graph and reports file-access violations: double writes,
/// read races, undeclared reads of produced outputs, writes into sealed
/// source trees, and the rest of the dynamic-dependency failure modes.
///
/// A trace is a JSON document pairing the graph declarations with one
/// access bundle per analyzed action; see the repository docs for the
/// schema.
///
///   tripwire analyze build-trace.json
///
/// Exit status is 0 for a clean replay, 2 when any error-severity
/// violation was found.
#[derive(Parser)]
#[command(name = "tripwire")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded build trace and report violations
    Analyze {
        /// Path to the trace JSON file
        trace: PathBuf,

        /// Emit the full outcome as JSON instead of a text report
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze { trace, json } => analyze(&trace, json),
    }
}

fn analyze(path: &Path, json: bool) -> Result<ExitCode> {
    let trace = BuildTrace::load(path)?;
    let outcome = replay(&trace)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_text_report(&outcome);
    }
    Ok(if outcome.error_count > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

fn print_text_report(outcome: &ReplayOutcome) {
    for analysis in &outcome.analyses {
        if analysis.violations.is_empty() {
            continue;
        }
        println!("{}:", analysis.action);
        for violation in &analysis.violations {
            let severity = if violation.is_error { "error" } else { "warning" };
            println!(
                "  {severity}: {} at {}: {}",
                violation.kind,
                violation.path.display(),
                violation.detail
            );
        }
        if !analysis.result.is_safe_to_cache {
            println!("  (not safe to cache)");
        }
    }
    println!(
        "{} analyses, {} errors, {} warnings",
        outcome.analyses.len(),
        outcome.error_count,
        outcome.warning_count
    );
}
