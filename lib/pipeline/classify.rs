use crate::engine::{EngineError, EngineErrorKind};

use super::types::CompletionOutcome;

/// The pipeline's only two failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Counted against the phase and logged; the pipeline continues.
    Record,
    /// Requests shutdown; in-flight work drains and the phase reports interruption.
    Fatal,
}

/// Maps an engine failure onto the pipeline taxonomy.
///
/// Bad input and transient rejections affect only the record at hand. Neither is retried.
pub fn classify_engine_error(error: &EngineError) -> FailureClass {
    match error.kind {
        EngineErrorKind::BadInput | EngineErrorKind::Retryable => FailureClass::Record,
        EngineErrorKind::Unrecoverable
        | EngineErrorKind::Configuration
        | EngineErrorKind::Other => FailureClass::Fatal,
    }
}

/// Converts a raw engine result into a completion outcome.
pub fn outcome_from_engine_result(
    result: Result<Option<String>, EngineError>,
) -> CompletionOutcome {
    match result {
        Ok(payload) => CompletionOutcome::Success(payload),
        Err(error) => match classify_engine_error(&error) {
            FailureClass::Record => CompletionOutcome::RecordError(error.to_string()),
            FailureClass::Fatal => CompletionOutcome::FatalError(error.to_string()),
        },
    }
}
