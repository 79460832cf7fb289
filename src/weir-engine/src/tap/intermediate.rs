use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common_error::{WeirError, WeirResult};
use weir_core::{Fields, Tuple};

use super::{SinkTap, SourceTap, TupleStream, TupleWriter};
use crate::spill::{stream_list, SpillConfig, SpillableList};

/// Rows decoded ahead of a reader of a spilled boundary.
const READ_AHEAD: usize = 256;

/// Materialized output of a `Boundary` element, written by one node and
/// read by the nodes downstream of it.
#[derive(Debug, Clone)]
pub struct IntermediateTap {
    name: String,
    config: SpillConfig,
    data: Arc<Mutex<Option<Arc<SpillableList<Tuple>>>>>,
}

impl IntermediateTap {
    pub fn new(name: impl Into<String>, config: SpillConfig) -> Self {
        Self {
            name: name.into(),
            config,
            data: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rows written, once a writer has closed.
    pub fn len(&self) -> Option<usize> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|list| list.len())
    }

    pub fn is_written(&self) -> bool {
        self.len().is_some()
    }
}

#[async_trait]
impl SourceTap for IntermediateTap {
    async fn open(&self) -> WeirResult<TupleStream> {
        let list = self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| WeirError::tap(format!("boundary '{}' has not been written", self.name)))?;
        Ok(stream_list(list, READ_AHEAD))
    }
}

#[async_trait]
impl SinkTap for IntermediateTap {
    async fn open_writer(&self, _fields: &Fields) -> WeirResult<Box<dyn TupleWriter>> {
        Ok(Box::new(IntermediateWriter {
            list: SpillableList::new(self.config.clone()),
            target: Arc::clone(&self.data),
        }))
    }
}

struct IntermediateWriter {
    list: SpillableList<Tuple>,
    target: Arc<Mutex<Option<Arc<SpillableList<Tuple>>>>>,
}

#[async_trait]
impl TupleWriter for IntermediateWriter {
    async fn write(&mut self, tuple: Tuple) -> WeirResult<()> {
        self.list.push_async(tuple).await
    }

    async fn close(self: Box<Self>) -> WeirResult<()> {
        let IntermediateWriter { list, target } = *self;
        *target.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(list));
        Ok(())
    }

    async fn abort(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, TryStreamExt};
    use weir_core::tuple;

    use super::*;

    #[tokio::test]
    async fn test_written_then_read_twice() {
        let tap = IntermediateTap::new("checkpoint", SpillConfig::default().with_threshold(2));
        assert!(tap.open().await.is_err());

        let mut writer = tap.open_writer(&Fields::from(["k"])).await.unwrap();
        for i in 0..5 {
            writer.write(tuple![i]).await.unwrap();
        }
        writer.close().await.unwrap();
        assert_eq!(tap.len(), Some(5));

        let first: Vec<Tuple> = tap.open().await.unwrap().try_collect().await.unwrap();
        let second: Vec<Tuple> = tap.open().await.unwrap().try_collect().await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_spilled_reader_dropped_early() {
        let tap = IntermediateTap::new("checkpoint", SpillConfig::default().with_threshold(4));
        let mut writer = tap.open_writer(&Fields::from(["k"])).await.unwrap();
        for i in 0..40 {
            writer.write(tuple![i]).await.unwrap();
        }
        writer.close().await.unwrap();

        let head: Vec<Tuple> = tap.open().await.unwrap().take(3).try_collect().await.unwrap();
        assert_eq!(head, vec![tuple![0], tuple![1], tuple![2]]);
        let all: Vec<Tuple> = tap.open().await.unwrap().try_collect().await.unwrap();
        assert_eq!(all.len(), 40);
        assert_eq!(all.last(), Some(&tuple![39]));
    }
}
