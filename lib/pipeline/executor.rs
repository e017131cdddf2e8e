use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::backpressure::BackpressureGate;
use super::operations::Operation;
use super::shutdown::ShutdownToken;
use super::source::{SourceError, WorkSource};
use super::stall::{StallMonitor, StallPolicy};
use super::types::{CompletionOutcome, WorkItem};

/// Receives submissions and completions on the coordinating task, in the order they are
/// observed.
pub trait CompletionHandler {
    fn on_submitted(&mut self, item: &WorkItem);

    fn on_completion(&mut self, item: &WorkItem, outcome: CompletionOutcome);

    /// A work source failed to produce the next item. Shutdown is already signalled.
    fn on_source_error(&mut self, error: &SourceError);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorReport {
    pub submitted: u64,
    pub completed: u64,
    pub max_in_flight: usize,
    pub stall_warnings: u64,
    pub source_exhausted: bool,
    pub interrupted: bool,
}

struct InFlightEntry {
    item: Arc<WorkItem>,
    submitted_at: Instant,
}

type PendingOperation = BoxFuture<'static, (u64, Result<CompletionOutcome, JoinError>)>;

/// In-flight entries indexed by submission sequence number, plus the futures that resolve to
/// those sequence numbers in readiness order.
#[derive(Default)]
struct InFlightWindow {
    entries: HashMap<u64, InFlightEntry>,
    pending: FuturesUnordered<PendingOperation>,
    next_seq: u64,
}

impl InFlightWindow {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, item: Arc<WorkItem>, operation: &Operation) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let op = Arc::clone(operation);
        let work = Arc::clone(&item);
        let handle = tokio::task::spawn_blocking(move || op(&work));
        self.pending.push(handle.map(move |joined| (seq, joined)).boxed());
        self.entries.insert(
            seq,
            InFlightEntry {
                item,
                submitted_at: Instant::now(),
            },
        );
    }
}

/// Keeps up to `workers` engine calls outstanding and replaces each one as it completes.
///
/// Engine calls run on the blocking pool; everything else, including the handler, runs on the
/// task that called [`BoundedExecutor::run`].
pub struct BoundedExecutor {
    workers: usize,
    shutdown: ShutdownToken,
    gate: BackpressureGate,
    stall_policy: StallPolicy,
}

impl BoundedExecutor {
    pub fn new(
        workers: usize,
        shutdown: ShutdownToken,
        gate: BackpressureGate,
        stall_policy: StallPolicy,
    ) -> Self {
        Self {
            workers: workers.max(1),
            shutdown,
            gate,
            stall_policy,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `operation` over `source` until the source is exhausted or shutdown is signalled,
    /// then drains whatever is still in flight.
    pub async fn run<S, H>(
        &self,
        source: &mut S,
        operation: Operation,
        handler: &mut H,
    ) -> ExecutorReport
    where
        S: WorkSource + ?Sized,
        H: CompletionHandler + ?Sized,
    {
        let phase = source.phase();
        let mut report = ExecutorReport::default();
        let mut window = InFlightWindow::default();
        let mut monitor = StallMonitor::new(self.stall_policy, self.workers, Instant::now());
        let mut ticker =
            tokio::time::interval(monitor.check_interval().max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while window.len() < self.workers {
            if !self.submit_next(source, &operation, handler, &mut window, &mut report).await {
                break;
            }
        }
        debug!(
            phase = phase.as_str(),
            primed = window.len(),
            workers = self.workers,
            "executor primed"
        );

        while !window.is_empty() {
            tokio::select! {
                biased;
                completed = window.pending.next() => {
                    let Some((seq, joined)) = completed else {
                        break;
                    };
                    self.gate.check().await;

                    let Some(entry) = window.entries.remove(&seq) else {
                        warn!(phase = phase.as_str(), seq, "completion for unknown operation");
                        continue;
                    };
                    report.completed += 1;

                    let outcome = joined.unwrap_or_else(|err| {
                        CompletionOutcome::FatalError(format!("engine call panicked: {err}"))
                    });
                    let fatal = outcome.is_fatal();
                    handler.on_completion(&entry.item, outcome);
                    if fatal {
                        self.shutdown.signal_shutdown();
                    }

                    if !report.source_exhausted && !self.shutdown.is_shutting_down() {
                        self.submit_next(source, &operation, handler, &mut window, &mut report)
                            .await;
                    }
                }
                _ = ticker.tick() => {}
            }

            let entries = window
                .entries
                .values()
                .map(|entry| (entry.item.as_ref(), entry.submitted_at));
            if let Some(stalls) = monitor.check(entries, Instant::now()) {
                report.stall_warnings += stalls.stalled.len() as u64;
            }
        }

        report.interrupted = self.shutdown.is_shutting_down();
        debug!(
            phase = phase.as_str(),
            submitted = report.submitted,
            completed = report.completed,
            interrupted = report.interrupted,
            "executor drained"
        );
        report
    }

    /// Pulls one item and submits it. Returns `false` when nothing was submitted.
    async fn submit_next<S, H>(
        &self,
        source: &mut S,
        operation: &Operation,
        handler: &mut H,
        window: &mut InFlightWindow,
        report: &mut ExecutorReport,
    ) -> bool
    where
        S: WorkSource + ?Sized,
        H: CompletionHandler + ?Sized,
    {
        if self.shutdown.is_shutting_down() {
            return false;
        }

        let item = match source.next_item().await {
            Ok(Some(item)) => item,
            Ok(None) => {
                report.source_exhausted = true;
                return false;
            }
            Err(err) => {
                self.shutdown.signal_shutdown();
                handler.on_source_error(&err);
                return false;
            }
        };

        if self.shutdown.is_shutting_down() {
            warn!(
                phase = item.phase().as_str(),
                record = %item.identity(),
                "shutdown requested while reading; item not submitted"
            );
            return false;
        }

        let item = Arc::new(item);
        handler.on_submitted(&item);
        window.insert(item, operation);

        report.submitted += 1;
        report.max_in_flight = report.max_in_flight.max(window.len());
        true
    }
}
