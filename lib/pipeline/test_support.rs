use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::backpressure::Governor;
use super::executor::CompletionHandler;
use super::shutdown::ShutdownToken;
use super::source::SourceError;
use super::types::{json_field_as_string, CompletionOutcome, WorkItem};
use crate::engine::{EngineError, RecordEngine};

pub(crate) fn record_line(record_id: &str) -> String {
    json!({ "DATA_SOURCE": "TEST", "RECORD_ID": record_id }).to_string()
}

/// Scripted behavior for one `RECORD_ID`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RecordScript {
    Ok,
    BadInput,
    Retryable,
    Unrecoverable,
    Sleep(Duration),
}

pub(crate) struct MockEngine {
    scripts: HashMap<String, RecordScript>,
    redo: Mutex<VecDeque<String>>,
    redo_count: Option<i64>,
    fail_fetch_at: Option<u64>,
    fail_count: bool,
    fail_stats: bool,
    database_type: String,
    add_calls: AtomicU64,
    redo_process_calls: AtomicU64,
    redo_fetch_calls: AtomicU64,
    count_redo_calls: AtomicU64,
    stats_calls: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    processed: Mutex<Vec<String>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            scripts: HashMap::new(),
            redo: Mutex::new(VecDeque::new()),
            redo_count: None,
            fail_fetch_at: None,
            fail_count: false,
            fail_stats: false,
            database_type: "sqlite3".to_string(),
            add_calls: AtomicU64::new(0),
            redo_process_calls: AtomicU64::new(0),
            redo_fetch_calls: AtomicU64::new(0),
            count_redo_calls: AtomicU64::new(0),
            stats_calls: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            processed: Mutex::new(Vec::new()),
        }
    }
}

impl MockEngine {
    pub(crate) fn with_redo(records: Vec<String>) -> Self {
        Self {
            redo: Mutex::new(records.into_iter().collect()),
            ..Self::default()
        }
    }

    pub(crate) fn script(mut self, record_id: &str, script: RecordScript) -> Self {
        self.scripts.insert(record_id.to_string(), script);
        self
    }

    /// Fails the `call`-th (1-based) `get_redo_record` call with an unrecoverable error.
    pub(crate) fn fail_fetch_at(mut self, call: u64) -> Self {
        self.fail_fetch_at = Some(call);
        self
    }

    /// Reports `count` from `count_redo_records` regardless of the queue.
    pub(crate) fn redo_count(mut self, count: i64) -> Self {
        self.redo_count = Some(count);
        self
    }

    pub(crate) fn failing_count(mut self) -> Self {
        self.fail_count = true;
        self
    }

    pub(crate) fn failing_stats(mut self) -> Self {
        self.fail_stats = true;
        self
    }

    pub(crate) fn database_type(mut self, database_type: &str) -> Self {
        self.database_type = database_type.to_string();
        self
    }

    pub(crate) fn add_calls(&self) -> u64 {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn redo_process_calls(&self) -> u64 {
        self.redo_process_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn redo_fetch_calls(&self) -> u64 {
        self.redo_fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn count_redo_calls(&self) -> u64 {
        self.count_redo_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stats_calls(&self) -> u64 {
        self.stats_calls.load(Ordering::SeqCst)
    }

    /// Highest number of engine calls observed running at the same time.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// `RECORD_ID`s passed to `add_record*`, in call order.
    pub(crate) fn processed(&self) -> Vec<String> {
        self.processed.lock().expect("processed mutex poisoned").clone()
    }

    fn run_scripted(&self, record_id: &str) -> Result<(), EngineError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.processed
            .lock()
            .expect("processed mutex poisoned")
            .push(record_id.to_string());

        let result = match self.scripts.get(record_id).copied().unwrap_or(RecordScript::Ok) {
            RecordScript::Ok => Ok(()),
            RecordScript::BadInput => {
                Err(EngineError::bad_input(format!("bad record {record_id}")))
            }
            RecordScript::Retryable => {
                Err(EngineError::retryable(format!("record {record_id} is busy")))
            }
            RecordScript::Unrecoverable => Err(EngineError::unrecoverable("engine went away")),
            RecordScript::Sleep(duration) => {
                std::thread::sleep(duration);
                Ok(())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn redo_record_id(redo_record: &str) -> String {
        serde_json::from_str::<Value>(redo_record)
            .ok()
            .and_then(|value| json_field_as_string(&value, "RECORD_ID"))
            .unwrap_or_default()
    }
}

impl RecordEngine for MockEngine {
    fn add_record(
        &self,
        _data_source: &str,
        record_id: &str,
        _record: &str,
    ) -> Result<(), EngineError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.run_scripted(record_id)
    }

    fn add_record_with_info(
        &self,
        data_source: &str,
        record_id: &str,
        _record: &str,
    ) -> Result<String, EngineError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.run_scripted(record_id)?;
        Ok(json!({
            "DATA_SOURCE": data_source,
            "RECORD_ID": record_id,
            "AFFECTED_ENTITIES": [],
        })
        .to_string())
    }

    fn process_redo(&self, redo_record: &str) -> Result<(), EngineError> {
        self.redo_process_calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(&Self::redo_record_id(redo_record)) {
            Some(RecordScript::Unrecoverable) => Err(EngineError::unrecoverable("redo failed")),
            _ => Ok(()),
        }
    }

    fn process_redo_with_info(&self, redo_record: &str) -> Result<String, EngineError> {
        self.process_redo(redo_record)?;
        Ok(json!({ "REDO_RECORD": redo_record }).to_string())
    }

    fn count_redo_records(&self) -> Result<i64, EngineError> {
        self.count_redo_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_count {
            return Err(EngineError::unrecoverable("redo queue unavailable"));
        }
        match self.redo_count {
            Some(count) => Ok(count),
            None => Ok(self.redo.lock().expect("redo mutex poisoned").len() as i64),
        }
    }

    fn get_redo_record(&self) -> Result<Option<String>, EngineError> {
        let call = self.redo_fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_fetch_at == Some(call) {
            return Err(EngineError::unrecoverable("redo fetch failed"));
        }
        Ok(self.redo.lock().expect("redo mutex poisoned").pop_front())
    }

    fn stats(&self) -> Result<String, EngineError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stats {
            return Err(EngineError::unrecoverable("stats unavailable"));
        }
        Ok(json!({ "workload": { "addedRecords": self.add_calls() } }).to_string())
    }

    fn license(&self) -> Result<String, EngineError> {
        Ok(json!({
            "customer": "Test Customer",
            "licenseType": "EVAL",
            "recordLimit": 0,
            "expireDate": "2099-12-31",
            "contract": "test",
        })
        .to_string())
    }

    fn version(&self) -> Result<String, EngineError> {
        Ok(json!({ "VERSION": "0.0.0-test", "BUILD_DATE": "2026-01-01" }).to_string())
    }

    fn config_list(&self) -> Result<String, EngineError> {
        Ok(json!({
            "CONFIGS": [
                { "CONFIG_ID": 1, "CONFIG_COMMENTS": "test config", "SYS_CREATE_DT": "2026-01-01" }
            ]
        })
        .to_string())
    }

    fn active_config_id(&self) -> Result<i64, EngineError> {
        Ok(1)
    }

    fn database_info(&self) -> Result<String, EngineError> {
        Ok(json!({
            "Hybrid Mode": false,
            "Database Details": [ { "Type": self.database_type, "Name": "test" } ]
        })
        .to_string())
    }
}

/// Returns the scripted pauses in order, then zero.
pub(crate) struct ScriptedGovernor {
    pauses: Mutex<VecDeque<Duration>>,
    calls: AtomicU64,
}

impl ScriptedGovernor {
    pub(crate) fn new(pauses: Vec<Duration>) -> Self {
        Self {
            pauses: Mutex::new(pauses.into_iter().collect()),
            calls: AtomicU64::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Governor for ScriptedGovernor {
    fn govern(&self) -> Duration {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pauses
            .lock()
            .expect("pauses mutex poisoned")
            .pop_front()
            .unwrap_or(Duration::ZERO)
    }
}

/// Collects everything the executor hands to its handler.
#[derive(Default)]
pub(crate) struct RecordingHandler {
    pub(crate) submitted: Vec<String>,
    pub(crate) submitted_at: Vec<Instant>,
    pub(crate) completed: Vec<(String, CompletionOutcome)>,
    pub(crate) source_errors: u64,
    shutdown_after: Option<(usize, ShutdownToken)>,
}

impl RecordingHandler {
    /// Signals `shutdown` once `completions` outcomes have been observed.
    pub(crate) fn shutdown_after(completions: usize, shutdown: ShutdownToken) -> Self {
        Self {
            shutdown_after: Some((completions, shutdown)),
            ..Self::default()
        }
    }
}

impl CompletionHandler for RecordingHandler {
    fn on_submitted(&mut self, item: &WorkItem) {
        self.submitted.push(item.payload().to_string());
        self.submitted_at.push(Instant::now());
    }

    fn on_completion(&mut self, item: &WorkItem, outcome: CompletionOutcome) {
        self.completed.push((item.payload().to_string(), outcome));
        if let Some((after, shutdown)) = &self.shutdown_after {
            if self.completed.len() >= *after {
                shutdown.signal_shutdown();
            }
        }
    }

    fn on_source_error(&mut self, _error: &SourceError) {
        self.source_errors += 1;
    }
}
