//! Taps: where records enter and leave a flow.
//!
//! A [`SourceTap`] opens a stream of tuples for a `Source` element. A
//! [`SinkTap`] opens a [`TupleWriter`] for a `Sink` element or a trap.
//! Writers buffer or stage their output until [`TupleWriter::close`]; an
//! aborted writer leaves nothing visible.

mod batch;
mod intermediate;
mod memory;

use std::collections::HashMap;
use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use common_error::WeirResult;
use futures::Stream;
use weir_core::{Fields, Tuple};

pub use batch::{record_batch_to_tuples, tuples_to_record_batch, RecordBatchTap};
pub use intermediate::IntermediateTap;
pub use memory::MemoryTap;

/// Tuples produced by a source tap.
pub type TupleStream = Pin<Box<dyn Stream<Item = WeirResult<Tuple>> + Send>>;

/// Reads records for a `Source` element.
#[async_trait]
pub trait SourceTap: Send + Sync + Debug {
    /// Open a fresh stream over the tap's records.
    async fn open(&self) -> WeirResult<TupleStream>;
}

/// Accepts records for a `Sink` element or a trap.
#[async_trait]
pub trait SinkTap: Send + Sync + Debug {
    /// Open a writer for tuples tagged with `fields`.
    async fn open_writer(&self, fields: &Fields) -> WeirResult<Box<dyn TupleWriter>>;
}

/// An open sink.
#[async_trait]
pub trait TupleWriter: Send {
    async fn write(&mut self, tuple: Tuple) -> WeirResult<()>;

    /// Publish everything written.
    async fn close(self: Box<Self>) -> WeirResult<()>;

    /// Discard everything written.
    async fn abort(self: Box<Self>);
}

/// Taps bound to a plan, by element name (sources, sinks) or trap name.
#[derive(Debug, Clone, Default)]
pub struct TapBindings {
    sources: HashMap<String, Arc<dyn SourceTap>>,
    sinks: HashMap<String, Arc<dyn SinkTap>>,
    traps: HashMap<String, Arc<dyn SinkTap>>,
}

impl TapBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, element: impl Into<String>, tap: Arc<dyn SourceTap>) -> Self {
        self.sources.insert(element.into(), tap);
        self
    }

    pub fn sink(mut self, element: impl Into<String>, tap: Arc<dyn SinkTap>) -> Self {
        self.sinks.insert(element.into(), tap);
        self
    }

    pub fn trap(mut self, name: impl Into<String>, tap: Arc<dyn SinkTap>) -> Self {
        self.traps.insert(name.into(), tap);
        self
    }

    pub fn source_for(&self, element: &str) -> Option<&Arc<dyn SourceTap>> {
        self.sources.get(element)
    }

    pub fn sink_for(&self, element: &str) -> Option<&Arc<dyn SinkTap>> {
        self.sinks.get(element)
    }

    pub fn trap_for(&self, name: &str) -> Option<&Arc<dyn SinkTap>> {
        self.traps.get(name)
    }
}
