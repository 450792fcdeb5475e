use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use notescore_core::{NoteStatus, ScoringConfig, ScoringPhase};
use notescore_store::{history_store::read_parquet, read_history_file};
use tracing_subscriber::EnvFilter;

mod churn;
mod display;

#[derive(Parser)]
#[command(name = "notescore")]
#[command(about = "Inspect note status history and scoring configuration")]
#[command(version)]
struct Cli {
    /// Scoring configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true, env = "NOTESCORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective scoring configuration
    Config,

    /// Inspect a status history Parquet file
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Measure churn between two committed history files
    Churn {
        /// Earlier history file
        before: PathBuf,
        /// Later history file
        after: PathBuf,
        /// Which phase's rescoring rules to apply
        #[arg(long, value_enum, default_value = "final")]
        phase: Phase,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print history rows as a table
    Show {
        path: PathBuf,
        /// Maximum rows to print
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Status counts, locks, and the last scoring time
    Summary { path: PathBuf },

    /// Print one note's history as a card
    Note { path: PathBuf, note_id: i64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum Phase {
    Prescoring,
    Final,
}

impl From<Phase> for ScoringPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Prescoring => ScoringPhase::Prescoring,
            Phase::Final => ScoringPhase::Final,
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ScoringConfig> {
    match path {
        Some(path) => ScoringConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(ScoringConfig::default()),
    }
}

fn show_history(path: &Path, limit: usize) -> anyhow::Result<()> {
    let batches = read_parquet(path).with_context(|| format!("reading {}", path.display()))?;
    let total: usize = batches.iter().map(|b| b.num_rows()).sum();

    let mut remaining = limit;
    let mut shown = Vec::new();
    for batch in &batches {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.num_rows());
        shown.push(batch.slice(0, take));
        remaining -= take;
    }
    println!("{}", arrow::util::pretty::pretty_format_batches(&shown)?);
    println!("{} of {total} rows", total.min(limit));
    Ok(())
}

fn summarize_history(path: &Path) -> anyhow::Result<()> {
    let records = read_history_file(path).with_context(|| format!("reading {}", path.display()))?;

    let mut by_status: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &records {
        let label = record.current_status.as_ref().map_or("UNRATED", NoteStatus::as_str);
        *by_status.entry(label).or_insert(0) += 1;
    }
    let locked = records.iter().filter(|r| r.is_locked()).count();
    let retro_locked = records.iter().filter(|r| r.retro_lock_supersedes()).count();
    let last_scored = records
        .iter()
        .filter_map(|r| r.timestamp_millis_of_current_status)
        .max();

    println!("{} notes", records.len());
    for (status, count) in &by_status {
        println!("  {status:<30} {count}");
    }
    println!("  {:<30} {locked}", "locked");
    println!("  {:<30} {retro_locked}", "retro-locked");
    match last_scored {
        Some(millis) => println!("last scored {}", display::format_millis(millis)),
        None => println!("never scored"),
    }
    Ok(())
}

fn show_note(path: &Path, note_id: i64) -> anyhow::Result<()> {
    let batches = read_parquet(path).with_context(|| format!("reading {}", path.display()))?;
    let Some((batch, row)) = display::find_note_row(&batches, note_id) else {
        bail!("note {note_id} not found in {}", path.display());
    };
    display::print_history_card(batch, row)
}

fn check_churn(
    before: &Path,
    after: &Path,
    phase: ScoringPhase,
    config: &ScoringConfig,
) -> anyhow::Result<()> {
    let check = churn::check_history_files(before, after, phase, config)?;
    println!(
        "{:<40} {:>7} {:>6} {:>9} {:>9}",
        "rule", "notes", "flips", "rate", "max"
    );
    for subset in &check.report.subsets {
        println!(
            "{:<40} {:>7} {:>6} {:>9.4} {:>9.4}{}",
            subset.rule.as_str(),
            subset.notes,
            subset.flips,
            subset.churn_rate,
            subset.max_churn_rate,
            if subset.enforced { "" } else { "  (not enforced)" }
        );
    }
    println!(
        "{} new notes, {} notes dropped",
        check.new_notes, check.dropped_notes
    );

    let violations = check.report.violations();
    if !violations.is_empty() {
        for violation in &violations {
            eprintln!("  {violation}");
        }
        bail!("{} rescoring subsets exceed their churn limit", violations.len());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    tracing::debug!("notescore v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Commands::History { action } => match action {
            HistoryAction::Show { path, limit } => show_history(&path, limit),
            HistoryAction::Summary { path } => summarize_history(&path),
            HistoryAction::Note { path, note_id } => show_note(&path, note_id),
        },
        Commands::Churn {
            before,
            after,
            phase,
        } => check_churn(&before, &after, phase.into(), &config),
    }
}
