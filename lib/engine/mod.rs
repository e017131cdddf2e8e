//! Boundary to the record-processing engine.
//!
//! The engine is a synchronous, blocking collaborator. Every call may be made concurrently
//! from several worker threads; implementations serialize internally if they need to.
//! Introspection calls return the engine's own JSON documents, which `startup` decodes.

mod memory;

pub use memory::MemoryEngine;

use thiserror::Error;

/// Failure families reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The record or redo payload was rejected as invalid.
    BadInput,
    /// A transient rejection of a single record.
    Retryable,
    /// The engine cannot continue.
    Unrecoverable,
    /// The engine configuration is missing or unusable.
    Configuration,
    /// Any other engine failure.
    Other,
}

impl EngineErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadInput => "bad_input",
            Self::Retryable => "retryable",
            Self::Unrecoverable => "unrecoverable",
            Self::Configuration => "configuration",
            Self::Other => "other",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} engine error: {message}", .kind.as_str())]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::BadInput, message)
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Retryable, message)
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Unrecoverable, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Configuration, message)
    }
}

/// Operations the loader consumes from the record-processing engine.
pub trait RecordEngine: Send + Sync {
    fn add_record(&self, data_source: &str, record_id: &str, record: &str)
        -> Result<(), EngineError>;

    /// Adds a record and returns the engine's description of what changed.
    fn add_record_with_info(
        &self,
        data_source: &str,
        record_id: &str,
        record: &str,
    ) -> Result<String, EngineError>;

    fn process_redo(&self, redo_record: &str) -> Result<(), EngineError>;

    fn process_redo_with_info(&self, redo_record: &str) -> Result<String, EngineError>;

    /// Number of redo records currently queued engine-side.
    fn count_redo_records(&self) -> Result<i64, EngineError>;

    /// Pops one redo record; `None` once the queue is drained.
    fn get_redo_record(&self) -> Result<Option<String>, EngineError>;

    /// Workload statistics, reported verbatim.
    fn stats(&self) -> Result<String, EngineError>;

    fn license(&self) -> Result<String, EngineError>;

    fn version(&self) -> Result<String, EngineError>;

    fn config_list(&self) -> Result<String, EngineError>;

    fn active_config_id(&self) -> Result<i64, EngineError>;

    fn database_info(&self) -> Result<String, EngineError>;
}
