use std::io;
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinError;

use super::types::{Phase, WorkItem};
use crate::engine::{EngineError, RecordEngine};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read input after line {line}: {source}")]
    Read {
        line: u64,
        #[source]
        source: io::Error,
    },

    #[error("getRedoRecord failed: {0}")]
    RedoFetch(#[from] EngineError),

    #[error("redo fetch task failed: {0}")]
    FetchTask(#[from] JoinError),
}

/// Ordered, lazy supplier of work items for one phase.
///
/// `Ok(None)` means the source is exhausted. Sources are forward-only; an error ends the
/// phase's admissions.
pub trait WorkSource: Send {
    fn phase(&self) -> Phase;

    fn next_item(&mut self) -> BoxFuture<'_, Result<Option<WorkItem>, SourceError>>;
}

/// Load-phase source: one JSON record per line.
///
/// Lines are handed on untouched apart from trimming; whitespace-only lines are skipped.
/// Parsing happens later on a worker so that a malformed line fails as a record error.
pub struct FileSource<R> {
    reader: R,
    line_number: u64,
    buffer: Vec<u8>,
}

impl FileSource<BufReader<File>> {
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R> FileSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buffer: Vec::new(),
        }
    }

    /// Number of lines consumed so far, including skipped blank lines.
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }

    async fn read_next(&mut self) -> Result<Option<WorkItem>, SourceError> {
        loop {
            self.buffer.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buffer)
                .await
                .map_err(|source| SourceError::Read {
                    line: self.line_number,
                    source,
                })?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let item = match std::str::from_utf8(&self.buffer) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    WorkItem::record(line, self.line_number)
                }
                Err(err) => {
                    let lossy = String::from_utf8_lossy(&self.buffer);
                    WorkItem::undecodable(
                        lossy.trim(),
                        self.line_number,
                        format!("line is not valid UTF-8: {err}"),
                    )
                }
            };
            return Ok(Some(item));
        }
    }
}

impl<R> WorkSource for FileSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn phase(&self) -> Phase {
        Phase::Load
    }

    fn next_item(&mut self) -> BoxFuture<'_, Result<Option<WorkItem>, SourceError>> {
        Box::pin(self.read_next())
    }
}

/// Redo-phase source: one `get_redo_record` call per item.
///
/// The engine call blocks, so it runs on the blocking pool. An empty fetch is exhaustion;
/// any fetch failure is surfaced as an error and ends the phase.
pub struct RedoSource {
    engine: Arc<dyn RecordEngine>,
    fetched: u64,
}

impl RedoSource {
    pub fn new(engine: Arc<dyn RecordEngine>) -> Self {
        Self { engine, fetched: 0 }
    }

    /// Number of redo records fetched so far.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    async fn fetch_one(&mut self) -> Result<Option<WorkItem>, SourceError> {
        let engine = Arc::clone(&self.engine);
        let fetched = tokio::task::spawn_blocking(move || engine.get_redo_record()).await??;
        Ok(fetched.map(|payload| {
            self.fetched += 1;
            WorkItem::redo(payload)
        }))
    }
}

impl WorkSource for RedoSource {
    fn phase(&self) -> Phase {
        Phase::Redo
    }

    fn next_item(&mut self) -> BoxFuture<'_, Result<Option<WorkItem>, SourceError>> {
        Box::pin(self.fetch_one())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{FileSource, RedoSource, SourceError, WorkSource};
    use crate::engine::EngineErrorKind;
    use crate::pipeline::test_support::MockEngine;

    #[tokio::test]
    async fn file_source_trims_and_skips_blank_lines() {
        let input: &[u8] = b"{\"RECORD_ID\":\"1\"}\r\n\n   \n{\"RECORD_ID\":\"2\"}";
        let mut source = FileSource::new(input);

        let first = source.next_item().await.unwrap().expect("first record");
        assert_eq!(first.payload(), r#"{"RECORD_ID":"1"}"#);
        assert_eq!(first.line_number(), Some(1));

        let second = source.next_item().await.unwrap().expect("second record");
        assert_eq!(second.payload(), r#"{"RECORD_ID":"2"}"#);
        assert_eq!(second.line_number(), Some(4));

        assert!(source.next_item().await.unwrap().is_none());
        assert!(source.next_item().await.unwrap().is_none());
        assert_eq!(source.lines_read(), 4);
    }

    #[tokio::test]
    async fn invalid_utf8_line_becomes_undecodable_item() {
        let input: &[u8] = b"\xff\xfe{}\n";
        let mut source = FileSource::new(input);

        let item = source.next_item().await.unwrap().expect("item");
        assert!(item.decode_error().is_some());
    }

    #[tokio::test]
    async fn redo_source_stops_at_empty_queue() {
        let engine = Arc::new(MockEngine::with_redo(vec!["{}".to_string()]));
        let mut source = RedoSource::new(engine.clone());

        assert!(source.next_item().await.unwrap().is_some());
        assert!(source.next_item().await.unwrap().is_none());
        assert_eq!(source.fetched(), 1);
        assert_eq!(engine.redo_fetch_calls(), 2);
    }

    #[tokio::test]
    async fn redo_fetch_failure_is_surfaced() {
        let engine = Arc::new(MockEngine::with_redo(vec!["{}".to_string(); 3]).fail_fetch_at(2));
        let mut source = RedoSource::new(engine);

        assert!(source.next_item().await.unwrap().is_some());
        let err = source.next_item().await.expect_err("second fetch fails");
        match err {
            SourceError::RedoFetch(err) => assert_eq!(err.kind, EngineErrorKind::Unrecoverable),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
