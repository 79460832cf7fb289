//! Spillable collections.
//!
//! [`SpillableList`] and [`SpillableMap`] keep at most `threshold` elements
//! (and optionally `max_bytes` estimated bytes) in memory. Past that, the
//! in-memory segment is written to a temporary file and a fresh segment
//! starts. Reads merge the segments back in arrival order, so callers never
//! see where a spill happened.
//!
//! Segments are JSON lines, optionally wrapped in the Snappy frame format.

mod blocking;
mod codec;
mod list;
mod map;

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common_config::{CompressionCodec, SpillSettings};
use serde::de::DeserializeOwned;
use serde::Serialize;
use weir_core::Tuple;

use crate::memory::MemoryPool;

pub use blocking::{run_blocking, run_spilled, stream_list};
pub use list::{SharedIter, SpillIter, SpillableList};
pub use map::SpillableMap;
pub(crate) use map::KeyIndex;

/// An element a spillable collection can hold.
pub trait SpillItem: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Rough in-memory footprint, used for byte thresholds and reservations.
    fn estimated_size(&self) -> usize;
}

impl SpillItem for Tuple {
    fn estimated_size(&self) -> usize {
        Tuple::estimated_size(self)
    }
}

impl SpillItem for String {
    fn estimated_size(&self) -> usize {
        std::mem::size_of::<String>() + self.len()
    }
}

impl<A: SpillItem, B: SpillItem> SpillItem for (A, B) {
    fn estimated_size(&self) -> usize {
        self.0.estimated_size() + self.1.estimated_size()
    }
}

/// What happened to one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillEvent {
    /// Index of the segment within its collection.
    pub segment: usize,
    pub elements: usize,
    /// Bytes on disk.
    pub bytes: u64,
}

/// Observes spills. Called synchronously by the collection.
pub trait SpillListener: Send + Sync + fmt::Debug {
    fn on_spill(&self, event: &SpillEvent);

    /// A spilled segment is being read back.
    fn on_read(&self, _event: &SpillEvent) {}
}

#[derive(Debug, Default)]
pub struct NoopSpillListener;

impl SpillListener for NoopSpillListener {
    fn on_spill(&self, _event: &SpillEvent) {}
}

/// Counts spills and read-backs.
#[derive(Debug, Default)]
pub struct CountingSpillListener {
    spills: AtomicU64,
    reads: AtomicU64,
    elements: AtomicU64,
    bytes: AtomicU64,
}

impl CountingSpillListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spills(&self) -> u64 {
        self.spills.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Elements written across all spills.
    pub fn elements(&self) -> u64 {
        self.elements.load(Ordering::SeqCst)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }
}

impl SpillListener for CountingSpillListener {
    fn on_spill(&self, event: &SpillEvent) {
        self.spills.fetch_add(1, Ordering::SeqCst);
        self.elements.fetch_add(event.elements as u64, Ordering::SeqCst);
        self.bytes.fetch_add(event.bytes, Ordering::SeqCst);
    }

    fn on_read(&self, _event: &SpillEvent) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Settings shared by every collection a node creates.
#[derive(Clone)]
pub struct SpillConfig {
    /// Maximum elements held in memory, at least 1.
    pub threshold: usize,
    pub max_bytes: Option<usize>,
    pub codec: CompressionCodec,
    /// Directory for segment files; the system temp dir when unset.
    pub dir: Option<PathBuf>,
    pub listener: Arc<dyn SpillListener>,
    pub memory: Option<Arc<MemoryPool>>,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self::from_settings(&SpillSettings::default())
    }
}

impl fmt::Debug for SpillConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpillConfig")
            .field("threshold", &self.threshold)
            .field("max_bytes", &self.max_bytes)
            .field("codec", &self.codec)
            .field("dir", &self.dir)
            .field("memory", &self.memory.is_some())
            .finish_non_exhaustive()
    }
}

impl SpillConfig {
    pub fn from_settings(settings: &SpillSettings) -> Self {
        Self {
            threshold: settings.threshold.max(1),
            max_bytes: settings.max_bytes,
            codec: settings.codec,
            dir: settings.spill_dir.clone(),
            listener: Arc::new(NoopSpillListener),
            memory: None,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn SpillListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_memory(mut self, memory: Arc<MemoryPool>) -> Self {
        self.memory = Some(memory);
        self
    }
}
