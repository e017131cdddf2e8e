use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{error, info};

use super::executor::CompletionHandler;
use super::shutdown::ShutdownToken;
use super::source::SourceError;
use super::types::{CompletionOutcome, Phase, PhaseCounters, WorkItem};
use crate::engine::RecordEngine;

/// How often the sink reports progress, in successful records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsPolicy {
    pub throughput_every: u64,
    pub workload_every: u64,
}

impl Default for StatsPolicy {
    fn default() -> Self {
        Self {
            throughput_every: 1_000,
            workload_every: 10_000,
        }
    }
}

/// Consumes every completion on the coordinating task.
///
/// Owns the per-phase counters and the with-info output stream. Record errors are logged at
/// `ERROR`, which the logging setup also routes to the run's error log.
pub struct ResultSink<W: Write> {
    engine: Arc<dyn RecordEngine>,
    shutdown: ShutdownToken,
    output: W,
    policy: StatsPolicy,
    phase: Phase,
    counters: PhaseCounters,
    last_snapshot: Instant,
    fatal_errors: u64,
    payloads_written: u64,
}

impl<W: Write> ResultSink<W> {
    pub fn new(
        engine: Arc<dyn RecordEngine>,
        shutdown: ShutdownToken,
        output: W,
        policy: StatsPolicy,
    ) -> Self {
        Self {
            engine,
            shutdown,
            output,
            policy,
            phase: Phase::Load,
            counters: PhaseCounters::default(),
            last_snapshot: Instant::now(),
            fatal_errors: 0,
            payloads_written: 0,
        }
    }

    /// Resets counters for a new phase.
    pub fn begin_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.counters = PhaseCounters::default();
        self.last_snapshot = Instant::now();
    }

    /// Flushes the output stream and returns the phase totals.
    pub fn finish_phase(&mut self) -> PhaseCounters {
        if let Err(err) = self.output.flush() {
            self.fatal(format!("failed to flush with-info output: {err}"));
        }
        self.counters
    }

    pub fn counters(&self) -> PhaseCounters {
        self.counters
    }

    /// Fatal failures observed across all phases.
    pub fn fatal_errors(&self) -> u64 {
        self.fatal_errors
    }

    pub fn payloads_written(&self) -> u64 {
        self.payloads_written
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Records a failure that ends the run early and signals shutdown.
    pub fn record_fatal(&mut self, message: impl Into<String>) {
        self.fatal(message.into());
    }

    fn fatal(&mut self, message: String) {
        self.fatal_errors += 1;
        error!(
            event = "fatal_error",
            severity = "critical",
            phase = self.phase.as_str(),
            "CRITICAL: {message}"
        );
        self.shutdown.signal_shutdown();
    }

    fn record_success(&mut self, payload: Option<String>) {
        self.counters.succeeded += 1;

        if let Some(payload) = payload {
            let written = self
                .output
                .write_all(payload.as_bytes())
                .and_then(|()| self.output.write_all(b"\n"));
            match written {
                Ok(()) => self.payloads_written += 1,
                Err(err) => self.fatal(format!("failed to write with-info payload: {err}")),
            }
        }

        if self.policy.throughput_every > 0
            && self.counters.succeeded % self.policy.throughput_every == 0
        {
            self.log_throughput();
        }
        if self.policy.workload_every > 0
            && self.counters.succeeded % self.policy.workload_every == 0
        {
            self.log_workload_stats();
        }
    }

    fn log_throughput(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_snapshot).as_secs_f64();
        let per_second = if elapsed > 0.0 {
            (self.policy.throughput_every as f64 / elapsed) as u64
        } else {
            self.policy.throughput_every
        };
        self.last_snapshot = now;

        info!(
            event = "throughput_snapshot",
            phase = self.phase.as_str(),
            succeeded = self.counters.succeeded,
            failed = self.counters.failed,
            records_per_second = per_second,
            "Processed {} {}, {} records per second, {} errors",
            self.counters.succeeded,
            self.phase.operation_label(),
            per_second,
            self.counters.failed
        );
    }

    fn log_workload_stats(&mut self) {
        match blocking_engine_call(|| self.engine.stats()) {
            Ok(stats) => info!(event = "workload_stats", phase = self.phase.as_str(), "{stats}"),
            Err(err) => self.fatal(format!("{err} - Operation: stats")),
        }
    }
}

/// Runs a blocking engine call from the coordinating task without stalling other tasks on a
/// multi-threaded runtime.
fn blocking_engine_call<T>(call: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(call),
        _ => call(),
    }
}

impl<W: Write> CompletionHandler for ResultSink<W> {
    fn on_submitted(&mut self, _item: &WorkItem) {
        self.counters.submitted += 1;
    }

    fn on_completion(&mut self, item: &WorkItem, outcome: CompletionOutcome) {
        match outcome {
            CompletionOutcome::Success(payload) => self.record_success(payload),
            CompletionOutcome::RecordError(cause) => {
                self.counters.failed += 1;
                error!(
                    event = "record_failed",
                    phase = self.phase.as_str(),
                    record = %item.identity(),
                    line_number = ?item.line_number(),
                    "Exception: {} - Operation: {} - Record: {}",
                    cause,
                    self.phase.engine_operation(),
                    item.payload()
                );
            }
            CompletionOutcome::FatalError(cause) => {
                self.fatal(format!(
                    "{cause} - Operation: {} - Record: {}",
                    self.phase.engine_operation(),
                    item.payload()
                ));
            }
        }
    }

    fn on_source_error(&mut self, error: &SourceError) {
        self.fatal(format!("{error} - Phase: {}", self.phase.as_str()));
    }
}
