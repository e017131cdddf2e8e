//! Two-phase bulk ingestion: a bounded executor driven first by the input file, then by the
//! engine's redo queue.

pub mod backpressure;
pub mod classify;
pub mod executor;
pub mod operations;
pub mod orchestrator;
pub mod report;
pub mod shutdown;
pub mod sink;
pub mod source;
pub mod stall;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use backpressure::{BackpressureGate, Governor, QuotaGovernor};
pub use executor::{BoundedExecutor, CompletionHandler, ExecutorReport};
pub use orchestrator::{LoaderPipeline, PipelineConfig};
pub use report::{apply_cleanup, log_run_summary, CleanupReport, OutputPaths};
pub use shutdown::{listen_for_shutdown_signals, ShutdownToken};
pub use sink::{ResultSink, StatsPolicy};
pub use source::{FileSource, RedoSource, SourceError, WorkSource};
pub use stall::{StallPolicy, LONG_RUNNING_THRESHOLD};
pub use types::{
    CompletionOutcome, Phase, PhaseCounters, PhaseStatus, PhaseSummary, RunOutcome, RunState,
    RunSummary, WorkItem,
};
