//! Per-item engine calls for each phase. These run on blocking worker threads.

use std::sync::Arc;

use serde_json::Value;

use super::classify::outcome_from_engine_result;
use super::types::{json_field_as_string, CompletionOutcome, WorkItem};
use crate::engine::RecordEngine;

/// Blocking unit of work executed for each submitted item.
pub type Operation = Arc<dyn Fn(&WorkItem) -> CompletionOutcome + Send + Sync>;

pub fn load_operation(engine: Arc<dyn RecordEngine>, with_info: bool) -> Operation {
    Arc::new(move |item: &WorkItem| add_record(engine.as_ref(), item, with_info))
}

pub fn redo_operation(engine: Arc<dyn RecordEngine>, with_info: bool) -> Operation {
    Arc::new(move |item: &WorkItem| process_redo_record(engine.as_ref(), item, with_info))
}

fn add_record(engine: &dyn RecordEngine, item: &WorkItem, with_info: bool) -> CompletionOutcome {
    if let Some(reason) = item.decode_error() {
        return CompletionOutcome::RecordError(reason.to_string());
    }

    let record: Value = match serde_json::from_str(item.payload()) {
        Ok(record) => record,
        Err(err) => return CompletionOutcome::RecordError(format!("invalid JSON record: {err}")),
    };
    // Missing keys are passed through empty so the engine decides how to reject them.
    let data_source = json_field_as_string(&record, "DATA_SOURCE").unwrap_or_default();
    let record_id = json_field_as_string(&record, "RECORD_ID").unwrap_or_default();

    let result = if with_info {
        engine
            .add_record_with_info(&data_source, &record_id, item.payload())
            .map(Some)
    } else {
        engine
            .add_record(&data_source, &record_id, item.payload())
            .map(|()| None)
    };
    outcome_from_engine_result(result)
}

fn process_redo_record(
    engine: &dyn RecordEngine,
    item: &WorkItem,
    with_info: bool,
) -> CompletionOutcome {
    let result = if with_info {
        engine.process_redo_with_info(item.payload()).map(Some)
    } else {
        engine.process_redo(item.payload()).map(|()| None)
    };
    outcome_from_engine_result(result)
}
