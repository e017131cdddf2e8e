use std::time::{Duration, Instant};

use tracing::warn;

use super::types::WorkItem;

/// An operation running longer than this is reported as stuck.
pub const LONG_RUNNING_THRESHOLD: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallPolicy {
    pub threshold: Duration,
    /// Minimum spacing between two inspections of the in-flight set.
    pub check_interval: Duration,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            threshold: LONG_RUNNING_THRESHOLD,
            check_interval: LONG_RUNNING_THRESHOLD / 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledEntry {
    pub label: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StallReport {
    pub stalled: Vec<StalledEntry>,
    pub all_workers_stuck: bool,
}

/// Observes the in-flight set and warns about operations that are not finishing.
///
/// Purely observational: the engine offers no way to cancel a call.
#[derive(Debug)]
pub struct StallMonitor {
    policy: StallPolicy,
    workers: usize,
    last_check: Instant,
}

impl StallMonitor {
    pub fn new(policy: StallPolicy, workers: usize, started: Instant) -> Self {
        Self {
            policy,
            workers: workers.max(1),
            last_check: started,
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.policy.check_interval
    }

    /// Inspects `entries` if a check interval has passed since the last inspection.
    ///
    /// Returns `None` when it is not yet time to look. Each over-threshold entry is warned
    /// about once per inspection.
    pub fn check<'a, I>(&mut self, entries: I, now: Instant) -> Option<StallReport>
    where
        I: IntoIterator<Item = (&'a WorkItem, Instant)>,
    {
        if now.saturating_duration_since(self.last_check) < self.policy.check_interval {
            return None;
        }
        self.last_check = now;

        let mut report = StallReport::default();
        for (item, submitted_at) in entries {
            let elapsed = now.saturating_duration_since(submitted_at);
            if elapsed <= self.policy.threshold {
                continue;
            }

            let label = item.identity().to_string();
            warn!(
                event = "long_running_record",
                phase = item.phase().as_str(),
                record = %label,
                line_number = ?item.line_number(),
                elapsed_mins = elapsed.as_secs_f64() / 60.0,
                "Long running record ({:.3} mins): {}",
                elapsed.as_secs_f64() / 60.0,
                label
            );
            report.stalled.push(StalledEntry { label, elapsed });
        }

        if report.stalled.len() >= self.workers {
            report.all_workers_stuck = true;
            warn!(
                event = "all_workers_stuck",
                workers = self.workers,
                "All {} threads are stuck processing long running records",
                self.workers
            );
        }

        Some(report)
    }
}
