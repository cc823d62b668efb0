//! Rename command - compute and apply target names for a directory of invoices.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use glob::{glob_with, MatchOptions};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use invren_core::oracle::{Oracle, SidecarOracle};
use invren_core::{CallGovernor, GovernorError, MatchConfidence, PlannedName, Renamer};

use super::{load_config, open_governor, open_resolver};

/// Arguments for the rename command.
#[derive(Args)]
pub struct RenameArgs {
    /// Directory containing the scanned invoices
    #[arg(required = true)]
    dir: PathBuf,

    /// Show the computed names without renaming anything
    #[arg(long)]
    dry_run: bool,

    /// Write a CSV report of every document
    #[arg(long)]
    report: Option<PathBuf>,

    /// Directory holding extraction payloads (default: beside each document)
    #[arg(long)]
    payload_dir: Option<PathBuf>,

    /// Skip a document instead of waiting longer than this for a call slot (seconds)
    #[arg(long)]
    max_wait: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Renamed,
    Planned,
    Skipped,
    Failed,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Status::Renamed => "renamed",
            Status::Planned => "planned",
            Status::Skipped => "skipped",
            Status::Failed => "failed",
        }
    }
}

/// Outcome for one document.
struct RenameResult {
    path: PathBuf,
    new_name: Option<String>,
    status: Status,
    reason: Option<String>,
    confidence: Option<MatchConfidence>,
}

impl RenameResult {
    fn failed(path: &Path, reason: impl ToString) -> Self {
        Self {
            path: path.to_path_buf(),
            new_name: None,
            status: Status::Failed,
            reason: Some(reason.to_string()),
            confidence: None,
        }
    }

    fn skipped(path: &Path, reason: impl ToString) -> Self {
        Self {
            status: Status::Skipped,
            ..Self::failed(path, reason)
        }
    }
}

pub async fn run(args: RenameArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    let resolver = open_resolver(&config)?;
    let renamer = Renamer::new(resolver).with_naming(config.naming.clone());
    let governor = Arc::new(open_governor(&config)?);

    let mut oracle = SidecarOracle::new();
    if let Some(dir) = &args.payload_dir {
        oracle = oracle.with_payload_dir(dir);
    }

    if !args.dir.is_dir() {
        anyhow::bail!("Not a directory: {}", args.dir.display());
    }
    let files = list_documents(&args.dir)?;
    if files.is_empty() {
        println!(
            "{} No PDF files found in {}",
            style("ℹ").blue(),
            args.dir.display()
        );
        return Ok(());
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    let remaining = governor.remaining_today()?;
    if files.len() > remaining as usize {
        println!(
            "{} Only {} oracle calls left today; {} files will be skipped",
            style("⚠").yellow(),
            remaining,
            files.len() - remaining as usize
        );
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let deadline = args.max_wait.map(Duration::from_secs);
    let mut results = Vec::with_capacity(files.len());
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for (idx, path) in files.iter().enumerate() {
        match admit(&governor, deadline).await? {
            Admit::Granted => {}
            Admit::Timeout(reason) => {
                warn!("Skipping {}: {}", path.display(), reason);
                results.push(RenameResult::skipped(path, reason));
                pb.inc(1);
                continue;
            }
            Admit::DailyLimit(reason) => {
                warn!("{}; stopping batch", reason);
                for rest in &files[idx..] {
                    results.push(RenameResult::skipped(rest, &reason));
                }
                break;
            }
        }

        let result = match oracle.extract(path) {
            Ok(extraction) => match renamer.plan(&extraction) {
                Ok(planned) => apply(path, planned, args.dry_run, &mut claimed),
                Err(e) => RenameResult::failed(path, e),
            },
            Err(e) => RenameResult::failed(path, e),
        };

        if result.status == Status::Failed {
            warn!(
                "Failed to rename {}: {}",
                path.display(),
                result.reason.as_deref().unwrap_or("unknown error")
            );
        }
        results.push(result);
        pb.inc(1);
    }

    pb.finish_and_clear();

    if let Some(report) = &args.report {
        write_report(report, &results)?;
        println!(
            "{} Report written to {}",
            style("✓").green(),
            report.display()
        );
    }

    print_summary(&results, args.dry_run, start.elapsed());

    Ok(())
}

enum Admit {
    Granted,
    Timeout(String),
    DailyLimit(String),
}

/// Wait for an oracle call slot without blocking the runtime.
async fn admit(governor: &Arc<CallGovernor>, deadline: Option<Duration>) -> anyhow::Result<Admit> {
    let governor = Arc::clone(governor);
    let outcome = tokio::task::spawn_blocking(move || governor.admit_within(deadline)).await?;

    match outcome {
        Ok(admission) => {
            debug!(
                "Oracle call {} of the day ({} this minute)",
                admission.daily_count, admission.window_count
            );
            Ok(Admit::Granted)
        }
        Err(e @ GovernorError::WaitTimeout { .. }) => Ok(Admit::Timeout(e.to_string())),
        Err(e @ GovernorError::DailyLimitExceeded { .. }) => Ok(Admit::DailyLimit(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// `*.pdf` files in `dir`, any case, sorted.
fn list_documents(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = dir.join("*.pdf");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Directory path is not valid UTF-8: {}", dir.display()))?;

    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };
    let mut files: Vec<PathBuf> = glob_with(pattern, options)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Check for collisions, then rename (or just record the plan).
fn apply(
    path: &Path,
    planned: PlannedName,
    dry_run: bool,
    claimed: &mut HashSet<PathBuf>,
) -> RenameResult {
    let target = path.with_file_name(&planned.filename);
    let mut result = RenameResult {
        path: path.to_path_buf(),
        new_name: Some(planned.filename.clone()),
        status: Status::Planned,
        reason: None,
        confidence: Some(planned.confidence),
    };

    if target == path {
        result.status = Status::Skipped;
        result.reason = Some("already named".to_string());
        return result;
    }
    if target.exists() || claimed.contains(&target) {
        result.status = Status::Failed;
        result.reason = Some(format!("target {} already exists", planned.filename));
        return result;
    }
    claimed.insert(target.clone());

    if dry_run {
        return result;
    }

    match fs::rename(path, &target) {
        Ok(()) => {
            info!("Renamed {} -> {}", path.display(), planned.filename);
            result.status = Status::Renamed;
        }
        Err(e) => {
            result.status = Status::Failed;
            result.reason = Some(format!("rename failed: {e}"));
        }
    }
    result
}

fn print_summary(results: &[RenameResult], dry_run: bool, elapsed: Duration) {
    let count = |status: Status| results.iter().filter(|r| r.status == status).count();
    let done = if dry_run {
        count(Status::Planned)
    } else {
        count(Status::Renamed)
    };

    println!();
    for result in results {
        let original = file_name(&result.path);
        if let (Status::Renamed | Status::Planned, Some(new_name)) =
            (result.status, &result.new_name)
        {
            let arrow = if dry_run { "would become" } else { "->" };
            let mut line = format!("  {} {} {}", original, arrow, style(new_name).green());
            if result.confidence == Some(MatchConfidence::Unvalidated) {
                line.push_str(&format!(" {}", style("(unvalidated site match)").yellow()));
            }
            println!("{line}");
        }
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        elapsed
    );
    println!(
        "   {} {}, {} failed, {} skipped",
        style(done).green(),
        if dry_run { "planned" } else { "renamed" },
        style(count(Status::Failed)).red(),
        style(count(Status::Skipped)).yellow()
    );

    let failed: Vec<_> = results
        .iter()
        .filter(|r| r.status == Status::Failed)
        .collect();
    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in failed {
            println!(
                "  - {}: {}",
                file_name(&result.path),
                result.reason.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

fn write_report(path: &Path, results: &[RenameResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(["original", "new_name", "status", "confidence", "reason"])?;
    for result in results {
        let confidence = result.confidence.map(|c| c.to_string()).unwrap_or_default();
        wtr.write_record([
            file_name(&result.path),
            result.new_name.as_deref().unwrap_or(""),
            result.status.as_str(),
            confidence.as_str(),
            result.reason.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|s| s.to_str()).unwrap_or("")
}
