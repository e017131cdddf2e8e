use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::LoaderConfig;
use crate::engine::RecordEngine;
use crate::pipeline::{
    apply_cleanup, log_run_summary, BackpressureGate, FileSource, LoaderPipeline, PipelineConfig,
    QuotaGovernor, ResultSink, RunOutcome, RunSummary, ShutdownToken, StallPolicy, StatsPolicy,
};
use crate::startup::{gather_startup_info, log_startup_info, StartupError};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_LOAD_INTERRUPTED: i32 = 3;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to open input file {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create output file {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to clean up output files: {0}")]
    Cleanup(#[source] io::Error),
}

/// Process exit status for a finished run. Interruption during redo still exits cleanly
/// because every input record was loaded.
pub fn exit_code(summary: &RunSummary) -> i32 {
    match summary.outcome {
        RunOutcome::Completed | RunOutcome::RedoInterrupted => EXIT_SUCCESS,
        RunOutcome::LoadInterrupted => EXIT_LOAD_INTERRUPTED,
    }
}

/// Introspects the engine, loads the input file, drains redo, then reports and cleans up.
pub async fn run_loader(
    config: &LoaderConfig,
    engine: Arc<dyn RecordEngine>,
    shutdown: ShutdownToken,
) -> Result<RunSummary, LoaderError> {
    let startup = gather_startup_info(Arc::clone(&engine)).await?;
    log_startup_info(&startup);

    let gate = if startup.requires_governor() {
        info!(
            event = "backpressure_enabled",
            governor_rate = config.governor_rate.get(),
            "Database backend needs backpressure; governing at {} records per second",
            config.governor_rate
        );
        BackpressureGate::enabled(Arc::new(QuotaGovernor::per_second(config.governor_rate)))
    } else {
        BackpressureGate::disabled()
    };

    let workers = config.workers();
    if config.requested_workers == 0 {
        info!(event = "workers_resolved", workers, "Using {workers} threads (auto)");
    }

    let mut source = FileSource::open(&config.input)
        .await
        .map_err(|source| LoaderError::Input {
            path: config.input.clone(),
            source,
        })?;
    let output = create_output(&config.outputs.with_info)?;

    let pipeline = LoaderPipeline::new(
        Arc::clone(&engine),
        PipelineConfig {
            workers,
            with_info: config.with_info,
            stall: StallPolicy::default(),
        },
        shutdown.clone(),
        gate,
    );
    let mut sink = ResultSink::new(engine, shutdown, output, StatsPolicy::default());

    let summary = pipeline.run(&mut source, &mut sink).await;

    let mut output = sink.into_output();
    if let Err(err) = output.flush() {
        warn!(event = "output_flush_failed", error = %err, "failed to flush with-info output");
    }
    drop(output);

    log_run_summary(&summary, &config.input, &config.outputs, config.with_info);
    apply_cleanup(&summary, &config.outputs, config.with_info).map_err(LoaderError::Cleanup)?;
    Ok(summary)
}

fn create_output(path: &Path) -> Result<BufWriter<File>, LoaderError> {
    let to_output_error = |source: io::Error| LoaderError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(to_output_error)?;
    }
    File::create(path).map(BufWriter::new).map_err(to_output_error)
}
