use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::backpressure::BackpressureGate;
use super::executor::{BoundedExecutor, ExecutorReport};
use super::operations::{load_operation, redo_operation};
use super::shutdown::ShutdownToken;
use super::sink::ResultSink;
use super::source::{RedoSource, WorkSource};
use super::stall::StallPolicy;
use super::types::{Phase, PhaseStatus, PhaseSummary, RunOutcome, RunState, RunSummary};
use crate::engine::RecordEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    pub with_info: bool,
    pub stall: StallPolicy,
}

/// Sequences the load pass and the redo drain over one [`BoundedExecutor`].
pub struct LoaderPipeline {
    engine: Arc<dyn RecordEngine>,
    config: PipelineConfig,
    shutdown: ShutdownToken,
    executor: BoundedExecutor,
}

impl LoaderPipeline {
    pub fn new(
        engine: Arc<dyn RecordEngine>,
        config: PipelineConfig,
        shutdown: ShutdownToken,
        gate: BackpressureGate,
    ) -> Self {
        let executor = BoundedExecutor::new(config.workers, shutdown.clone(), gate, config.stall);
        Self {
            engine,
            config,
            shutdown,
            executor,
        }
    }

    pub async fn run<S, W>(&self, load_source: &mut S, sink: &mut ResultSink<W>) -> RunSummary
    where
        S: WorkSource + ?Sized,
        W: Write,
    {
        let started = Instant::now();
        let mut states = vec![RunState::Loading];

        let load = self.run_phase(Phase::Load, load_source, sink).await;
        if load.status == PhaseStatus::Interrupted {
            warn!(
                event = "load_interrupted",
                submitted = load.counters.submitted,
                "Loading was interrupted; redo records will not be processed"
            );
            states.extend([RunState::LoadInterrupted, RunState::Finished]);
            return self.summary(RunOutcome::LoadInterrupted, load, None, states, sink, started);
        }
        states.extend([RunState::LoadComplete, RunState::CheckingRedo]);

        let redo_count = match self.count_redo_records().await {
            Ok(count) => count,
            Err(message) => {
                sink.record_fatal(format!("{message} - Operation: countRedoRecords"));
                let redo = PhaseSummary {
                    phase: Phase::Redo,
                    workers: self.executor.workers(),
                    counters: Default::default(),
                    status: PhaseStatus::Interrupted,
                    elapsed: Default::default(),
                    stall_warnings: 0,
                };
                states.extend([RunState::RedoInterrupted, RunState::Finished]);
                return self.summary(
                    RunOutcome::RedoInterrupted,
                    load,
                    Some(redo),
                    states,
                    sink,
                    started,
                );
            }
        };

        if redo_count <= 0 {
            info!(event = "redo_skipped", "No redo records to process");
            states.extend([RunState::NoRedo, RunState::Finished]);
            return self.summary(RunOutcome::Completed, load, None, states, sink, started);
        }

        info!(event = "redo_started", redo_count, "Processing {redo_count} redo records");
        states.push(RunState::RedoRunning);
        let mut redo_source = RedoSource::new(Arc::clone(&self.engine));
        let redo = self.run_phase(Phase::Redo, &mut redo_source, sink).await;

        let outcome = match redo.status {
            PhaseStatus::Completed => {
                states.push(RunState::RedoComplete);
                RunOutcome::Completed
            }
            PhaseStatus::Interrupted => {
                warn!(
                    event = "redo_interrupted",
                    fetched = redo_source.fetched(),
                    "Redo processing was interrupted; unprocessed redo records stay queued"
                );
                states.push(RunState::RedoInterrupted);
                RunOutcome::RedoInterrupted
            }
        };
        states.push(RunState::Finished);
        self.summary(outcome, load, Some(redo), states, sink, started)
    }

    async fn run_phase<S, W>(
        &self,
        phase: Phase,
        source: &mut S,
        sink: &mut ResultSink<W>,
    ) -> PhaseSummary
    where
        S: WorkSource + ?Sized,
        W: Write,
    {
        let operation = match phase {
            Phase::Load => load_operation(Arc::clone(&self.engine), self.config.with_info),
            Phase::Redo => redo_operation(Arc::clone(&self.engine), self.config.with_info),
        };

        info!(
            event = "phase_started",
            phase = phase.as_str(),
            workers = self.executor.workers(),
            "Starting {} with {} threads",
            phase.as_str(),
            self.executor.workers()
        );
        sink.begin_phase(phase);
        let started = Instant::now();
        let report: ExecutorReport = self.executor.run(source, operation, sink).await;
        let counters = sink.finish_phase();
        let elapsed = started.elapsed();

        let status = if report.interrupted || self.shutdown.is_shutting_down() {
            PhaseStatus::Interrupted
        } else {
            PhaseStatus::Completed
        };

        info!(
            event = "phase_finished",
            phase = phase.as_str(),
            submitted = counters.submitted,
            succeeded = counters.succeeded,
            failed = counters.failed,
            interrupted = status == PhaseStatus::Interrupted,
            elapsed_secs = elapsed.as_secs_f64(),
            "Processed {} {} in {:.2} seconds with {} error(s)",
            counters.succeeded,
            phase.operation_label(),
            elapsed.as_secs_f64(),
            counters.failed
        );

        PhaseSummary {
            phase,
            workers: self.executor.workers(),
            counters,
            status,
            elapsed,
            stall_warnings: report.stall_warnings,
        }
    }

    async fn count_redo_records(&self) -> Result<i64, String> {
        let engine = Arc::clone(&self.engine);
        match tokio::task::spawn_blocking(move || engine.count_redo_records()).await {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(err)) => Err(err.to_string()),
            Err(err) => Err(format!("redo count task failed: {err}")),
        }
    }

    fn summary<W: Write>(
        &self,
        outcome: RunOutcome,
        load: PhaseSummary,
        redo: Option<PhaseSummary>,
        states: Vec<RunState>,
        sink: &ResultSink<W>,
        started: Instant,
    ) -> RunSummary {
        RunSummary {
            outcome,
            load,
            redo,
            states,
            fatal_errors: sink.fatal_errors(),
            elapsed: started.elapsed(),
        }
    }
}
