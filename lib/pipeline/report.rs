use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::types::{PhaseSummary, RunOutcome, RunSummary};

/// Files a run writes next to its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub with_info: PathBuf,
    pub errors: PathBuf,
}

/// What the cleanup pass decided for each output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub with_info_kept: bool,
    pub errors_kept: bool,
}

pub fn log_run_summary(
    summary: &RunSummary,
    input: &Path,
    outputs: &OutputPaths,
    with_info_requested: bool,
) {
    let source = fs::canonicalize(input).unwrap_or_else(|_| input.to_path_buf());
    let (redo_total, redo_succeeded) = summary
        .redo
        .as_ref()
        .map_or((0, 0), |redo: &PhaseSummary| {
            (redo.counters.submitted, redo.counters.succeeded)
        });
    let with_info = if with_info_requested {
        outputs.with_info.display().to_string()
    } else {
        "Not requested".to_string()
    };

    info!(
        event = "run_summary",
        outcome = ?summary.outcome,
        source_file = %source.display(),
        load_total = summary.load.counters.submitted,
        load_succeeded = summary.load.counters.succeeded,
        redo_total,
        redo_succeeded,
        record_errors = summary.record_errors(),
        fatal_errors = summary.fatal_errors,
        elapsed_mins = summary.elapsed.as_secs_f64() / 60.0,
        "Source: {}; load {} ok of {}; redo {} ok of {}; {:.1} mins; with info: {}",
        source.display(),
        summary.load.counters.succeeded,
        summary.load.counters.submitted,
        redo_succeeded,
        redo_total,
        summary.elapsed.as_secs_f64() / 60.0,
        with_info
    );

    if summary.had_errors() {
        warn!(
            event = "run_errors",
            record_errors = summary.record_errors(),
            fatal_errors = summary.fatal_errors,
            error_log = %outputs.errors.display(),
            "Errors: {} record error(s), {} fatal; see {}",
            summary.record_errors(),
            summary.fatal_errors,
            outputs.errors.display()
        );
    }

    match summary.outcome {
        RunOutcome::Completed => {}
        RunOutcome::LoadInterrupted => warn!(
            event = "run_incomplete",
            "Processing was interrupted during load; the input was not fully loaded"
        ),
        RunOutcome::RedoInterrupted => warn!(
            event = "run_incomplete",
            "Processing was interrupted during redo; loading completed"
        ),
    }
}

/// Removes output files the run has no reason to keep.
///
/// The with-info file survives when capture was requested or anything failed; the error log
/// survives when any record or fatal error occurred.
pub fn apply_cleanup(
    summary: &RunSummary,
    outputs: &OutputPaths,
    with_info_requested: bool,
) -> io::Result<CleanupReport> {
    let report = CleanupReport {
        with_info_kept: with_info_requested || summary.had_errors(),
        errors_kept: summary.had_errors(),
    };

    if !report.with_info_kept {
        remove_if_present(&outputs.with_info)?;
    }
    if !report.errors_kept {
        remove_if_present(&outputs.errors)?;
    }
    Ok(report)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
