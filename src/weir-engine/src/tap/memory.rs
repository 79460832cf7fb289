use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common_error::WeirResult;
use futures::stream;
use weir_core::{Fields, Tuple};

use super::{SinkTap, SourceTap, TupleStream, TupleWriter};

/// In-memory tap, usable as a source, a sink or a trap.
///
/// As a sink, rows become visible only when the writer closes.
#[derive(Debug, Clone, Default)]
pub struct MemoryTap {
    rows: Arc<Mutex<Vec<Tuple>>>,
    fields: Arc<Mutex<Option<Fields>>>,
}

impl MemoryTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Tuple>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            fields: Arc::default(),
        }
    }

    /// Snapshot of the published rows.
    pub fn rows(&self) -> Vec<Tuple> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fields of the last writer opened.
    pub fn fields(&self) -> Option<Fields> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl SourceTap for MemoryTap {
    async fn open(&self) -> WeirResult<TupleStream> {
        let rows = self.rows();
        Ok(Box::pin(stream::iter(rows.into_iter().map(Ok))))
    }
}

#[async_trait]
impl SinkTap for MemoryTap {
    async fn open_writer(&self, fields: &Fields) -> WeirResult<Box<dyn TupleWriter>> {
        *self.fields.lock().unwrap_or_else(PoisonError::into_inner) = Some(fields.clone());
        Ok(Box::new(MemoryWriter {
            target: Arc::clone(&self.rows),
            staged: Vec::new(),
        }))
    }
}

struct MemoryWriter {
    target: Arc<Mutex<Vec<Tuple>>>,
    staged: Vec<Tuple>,
}

#[async_trait]
impl TupleWriter for MemoryWriter {
    async fn write(&mut self, tuple: Tuple) -> WeirResult<()> {
        self.staged.push(tuple);
        Ok(())
    }

    async fn close(self: Box<Self>) -> WeirResult<()> {
        let MemoryWriter { target, staged } = *self;
        target.lock().unwrap_or_else(PoisonError::into_inner).extend(staged);
        Ok(())
    }

    async fn abort(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use weir_core::tuple;

    use super::*;

    #[tokio::test]
    async fn test_source_replays_rows() {
        let tap = MemoryTap::with_rows(vec![tuple![1], tuple![2]]);
        let first: Vec<Tuple> = tap.open().await.unwrap().try_collect().await.unwrap();
        let second: Vec<Tuple> = tap.open().await.unwrap().try_collect().await.unwrap();
        assert_eq!(first, vec![tuple![1], tuple![2]]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sink_publishes_on_close_only() {
        let tap = MemoryTap::new();
        let mut writer = tap.open_writer(&Fields::from(["k"])).await.unwrap();
        writer.write(tuple![1]).await.unwrap();
        assert!(tap.is_empty());
        writer.close().await.unwrap();
        assert_eq!(tap.rows(), vec![tuple![1]]);
        assert_eq!(tap.fields(), Some(Fields::from(["k"])));

        let mut aborted = tap.open_writer(&Fields::from(["k"])).await.unwrap();
        aborted.write(tuple![2]).await.unwrap();
        aborted.abort().await;
        assert_eq!(tap.len(), 1);
    }
}
