use std::fmt;
use std::time::Duration;

use serde_json::Value;

/// The two passes a run makes over the bounded executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Load,
    Redo,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Redo => "redo",
        }
    }

    /// Label used in throughput log lines.
    pub fn operation_label(self) -> &'static str {
        match self {
            Self::Load => "adds",
            Self::Redo => "redo",
        }
    }

    pub fn engine_operation(self) -> &'static str {
        match self {
            Self::Load => "addRecord",
            Self::Redo => "processRedoRecord",
        }
    }
}

/// One unit of work: a serialized input record or redo record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    phase: Phase,
    payload: String,
    line_number: Option<u64>,
    decode_error: Option<String>,
}

impl WorkItem {
    /// An input record read from line `line_number` (1-based) of the load file.
    pub fn record(payload: impl Into<String>, line_number: u64) -> Self {
        Self {
            phase: Phase::Load,
            payload: payload.into(),
            line_number: Some(line_number),
            decode_error: None,
        }
    }

    /// An input line that could not be decoded as UTF-8. It still flows through the pipeline
    /// and fails as a record error when processed.
    pub fn undecodable(lossy_payload: impl Into<String>, line_number: u64, reason: String) -> Self {
        Self {
            phase: Phase::Load,
            payload: lossy_payload.into(),
            line_number: Some(line_number),
            decode_error: Some(reason),
        }
    }

    pub fn redo(payload: impl Into<String>) -> Self {
        Self {
            phase: Phase::Redo,
            payload: payload.into(),
            line_number: None,
            decode_error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn line_number(&self) -> Option<u64> {
        self.line_number
    }

    pub fn decode_error(&self) -> Option<&str> {
        self.decode_error.as_deref()
    }

    /// Best-effort `DATA_SOURCE` / `RECORD_ID` for reporting. Never fails; a payload that does
    /// not parse yields an empty identity.
    pub fn identity(&self) -> RecordIdentity {
        if self.decode_error.is_some() {
            return RecordIdentity::default();
        }
        match serde_json::from_str::<Value>(&self.payload) {
            Ok(value) => RecordIdentity {
                data_source: json_field_as_string(&value, "DATA_SOURCE"),
                record_id: json_field_as_string(&value, "RECORD_ID"),
            },
            Err(_) => RecordIdentity::default(),
        }
    }
}

/// Reads a string or numeric JSON field as text.
pub(crate) fn json_field_as_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordIdentity {
    pub data_source: Option<String>,
    pub record_id: Option<String>,
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.data_source.as_deref().unwrap_or("?"),
            self.record_id.as_deref().unwrap_or("?")
        )
    }
}

/// Result of one engine call, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Processed; carries the with-info payload when one was requested.
    Success(Option<String>),
    /// This item failed; the pipeline keeps going.
    RecordError(String),
    /// The engine (or a source) cannot continue; shutdown is requested.
    FatalError(String),
}

impl CompletionOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalError(_))
    }
}

/// Running totals for one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseCounters {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub workers: usize,
    pub counters: PhaseCounters,
    pub status: PhaseStatus,
    pub elapsed: Duration,
    pub stall_warnings: u64,
}

/// Orchestrator states. `LoadInterrupted`, `NoRedo`, `RedoComplete` and `RedoInterrupted`
/// all lead straight to `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Loading,
    LoadInterrupted,
    LoadComplete,
    CheckingRedo,
    NoRedo,
    RedoRunning,
    RedoComplete,
    RedoInterrupted,
    Finished,
}

/// How a run ended, from the operator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    LoadInterrupted,
    RedoInterrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub load: PhaseSummary,
    pub redo: Option<PhaseSummary>,
    /// Every state visited, in order, ending with `Finished`.
    pub states: Vec<RunState>,
    pub fatal_errors: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn record_errors(&self) -> u64 {
        self.load.counters.failed + self.redo.as_ref().map_or(0, |redo| redo.counters.failed)
    }

    pub fn had_errors(&self) -> bool {
        self.record_errors() > 0 || self.fatal_errors > 0
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordIdentity, WorkItem};

    #[test]
    fn identity_reads_string_and_numeric_ids() {
        let item = WorkItem::record(r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":1001}"#, 1);
        assert_eq!(
            item.identity(),
            RecordIdentity {
                data_source: Some("CUSTOMERS".to_string()),
                record_id: Some("1001".to_string()),
            }
        );
        assert_eq!(item.identity().to_string(), "CUSTOMERS - 1001");
    }

    #[test]
    fn identity_of_malformed_payload_is_empty() {
        let item = WorkItem::record("{not json", 7);
        assert_eq!(item.identity(), RecordIdentity::default());
        assert_eq!(item.identity().to_string(), "? - ?");
        assert_eq!(item.line_number(), Some(7));
    }
}
