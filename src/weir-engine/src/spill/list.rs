use std::cmp::Ordering;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use common_config::CompressionCodec;
use common_error::WeirResult;
use log::debug;
use tempfile::NamedTempFile;

use super::blocking::run_blocking;
use super::codec::{copy_segment, write_segment, SegmentReader};
use super::{SpillConfig, SpillEvent, SpillItem};
use crate::memory::MemoryReservation;

#[derive(Debug)]
struct Segment {
    file: NamedTempFile,
    codec: CompressionCodec,
    elements: usize,
    bytes: u64,
}

impl Segment {
    fn event(&self, index: usize) -> SpillEvent {
        SpillEvent {
            segment: index,
            elements: self.elements,
            bytes: self.bytes,
        }
    }
}

/// Append-only list that overflows to disk.
///
/// Iteration is repeatable and yields elements in the order they were
/// pushed, whether or not any of them were spilled.
#[derive(Debug)]
pub struct SpillableList<T: SpillItem> {
    config: SpillConfig,
    spilled: Vec<Segment>,
    memory: Vec<T>,
    memory_bytes: usize,
    len: usize,
    reservation: Option<MemoryReservation>,
}

impl<T: SpillItem> SpillableList<T> {
    pub fn new(config: SpillConfig) -> Self {
        let reservation = config.memory.clone().map(MemoryReservation::new);
        Self {
            config,
            spilled: Vec::new(),
            memory: Vec::new(),
            memory_bytes: 0,
            len: 0,
            reservation,
        }
    }

    /// A list holding `items`, spilling as they are pushed.
    pub fn from_items(config: SpillConfig, items: impl IntoIterator<Item = T>) -> WeirResult<Self> {
        let mut list = Self::new(config);
        list.extend(items)?;
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of segments written to disk.
    pub fn spill_count(&self) -> usize {
        self.spilled.len()
    }

    pub fn in_memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn spill_paths(&self) -> Vec<&Path> {
        self.spilled.iter().map(|s| s.file.path()).collect()
    }

    pub fn config(&self) -> &SpillConfig {
        &self.config
    }

    pub fn push(&mut self, item: T) -> WeirResult<()> {
        let size = item.estimated_size();
        if self.over_threshold(size) {
            self.spill()?;
        }
        if !self.reserve(size) && !self.memory.is_empty() {
            debug!("memory reservation refused, spilling {} elements early", self.memory.len());
            self.spill()?;
            // A single element is always kept, reserved or not.
            self.reserve(size);
        }
        self.store(item, size);
        Ok(())
    }

    /// [`push`](Self::push) for async callers: a segment that has to be
    /// written goes to the blocking pool instead of the calling worker.
    pub async fn push_async(&mut self, item: T) -> WeirResult<()> {
        let size = item.estimated_size();
        if self.over_threshold(size) {
            self.spill_async().await?;
        }
        if !self.reserve(size) && !self.memory.is_empty() {
            debug!("memory reservation refused, spilling {} elements early", self.memory.len());
            self.spill_async().await?;
            self.reserve(size);
        }
        self.store(item, size);
        Ok(())
    }

    fn store(&mut self, item: T, size: usize) {
        self.memory.push(item);
        self.memory_bytes += size;
        self.len += 1;
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) -> WeirResult<()> {
        for item in items {
            self.push(item)?;
        }
        Ok(())
    }

    fn over_threshold(&self, incoming: usize) -> bool {
        if self.memory.len() >= self.config.threshold {
            return true;
        }
        match self.config.max_bytes {
            Some(max) => !self.memory.is_empty() && self.memory_bytes + incoming > max,
            None => false,
        }
    }

    fn reserve(&mut self, size: usize) -> bool {
        match &mut self.reservation {
            Some(reservation) => reservation.try_grow(size),
            None => true,
        }
    }

    /// Write the in-memory segment to disk. No-op when it is empty.
    pub fn spill(&mut self) -> WeirResult<()> {
        if self.memory.is_empty() {
            return Ok(());
        }
        let (file, bytes) = write_segment(self.config.dir.as_deref(), self.config.codec, &self.memory)?;
        let elements = self.memory.len();
        self.memory.clear();
        self.finish_spill(file, elements, bytes);
        Ok(())
    }

    /// [`spill`](Self::spill) with the write on the blocking pool.
    pub async fn spill_async(&mut self) -> WeirResult<()> {
        if self.memory.is_empty() {
            return Ok(());
        }
        let items = mem::take(&mut self.memory);
        let dir = self.config.dir.clone();
        let codec = self.config.codec;
        let (file, bytes, elements) = run_blocking(move || {
            let (file, bytes) = write_segment(dir.as_deref(), codec, &items)?;
            Ok((file, bytes, items.len()))
        })
        .await?;
        self.finish_spill(file, elements, bytes);
        Ok(())
    }

    fn finish_spill(&mut self, file: NamedTempFile, elements: usize, bytes: u64) {
        let segment = Segment {
            file,
            codec: self.config.codec,
            elements,
            bytes,
        };
        let event = segment.event(self.spilled.len());
        debug!(
            "spilled segment {} ({} elements, {} bytes) to {}",
            event.segment,
            event.elements,
            event.bytes,
            segment.file.path().display()
        );
        self.config.listener.on_spill(&event);
        self.spilled.push(segment);
        self.memory_bytes = 0;
        if let Some(reservation) = &mut self.reservation {
            reservation.free();
        }
    }

    pub fn iter(&self) -> SpillIter<'_, T> {
        SpillIter {
            list: self,
            cursor: Cursor::default(),
        }
    }

    /// Read everything into memory.
    pub fn to_vec(&self) -> WeirResult<Vec<T>> {
        self.iter().collect()
    }

    /// An independent copy. Spilled segments are copied to new files, so
    /// either list can be pushed to or dropped without touching the other.
    pub fn duplicate(&self) -> WeirResult<Self> {
        let mut spilled = Vec::with_capacity(self.spilled.len());
        for segment in &self.spilled {
            spilled.push(Segment {
                file: copy_segment(self.config.dir.as_deref(), segment.file.path())?,
                codec: segment.codec,
                elements: segment.elements,
                bytes: segment.bytes,
            });
        }
        let mut reservation = self.config.memory.clone().map(MemoryReservation::new);
        if let Some(reservation) = &mut reservation {
            // Over the limit the copy simply stays unreserved.
            reservation.try_grow(self.memory_bytes);
        }
        Ok(Self {
            config: self.config.clone(),
            spilled,
            memory: self.memory.clone(),
            memory_bytes: self.memory_bytes,
            len: self.len,
            reservation,
        })
    }

    /// Stable sort by `compare`.
    ///
    /// A list that never spilled is sorted in place. Otherwise each spilled
    /// segment is sorted into a run on disk and the runs are merged into a
    /// fresh list, so memory holds one segment at a time plus one head per run.
    pub fn into_sorted_by<F>(mut self, compare: F) -> WeirResult<Self>
    where
        F: Fn(&T, &T) -> Ordering,
    {
        self.memory.sort_by(&compare);
        if self.spilled.is_empty() {
            return Ok(self);
        }

        let config = self.config.clone();
        let segments = mem::take(&mut self.spilled);
        let mut runs = Vec::with_capacity(segments.len());
        for (index, segment) in segments.into_iter().enumerate() {
            config.listener.on_read(&segment.event(index));
            let mut items = SegmentReader::<T>::open(segment.file.path(), segment.codec)?
                .collect::<WeirResult<Vec<_>>>()?;
            drop(segment);
            items.sort_by(&compare);
            let (file, bytes) = write_segment(config.dir.as_deref(), config.codec, &items)?;
            let run = Segment {
                file,
                codec: config.codec,
                elements: items.len(),
                bytes,
            };
            config.listener.on_spill(&run.event(index));
            runs.push(run);
        }
        let tail = mem::take(&mut self.memory);
        drop(self);

        let mut sources: Vec<Box<dyn Iterator<Item = WeirResult<T>>>> = Vec::with_capacity(runs.len() + 1);
        for run in &runs {
            sources.push(Box::new(SegmentReader::<T>::open(run.file.path(), run.codec)?));
        }
        sources.push(Box::new(tail.into_iter().map(Ok)));
        let mut heads = sources
            .iter_mut()
            .map(|source| source.next().transpose())
            .collect::<WeirResult<Vec<_>>>()?;

        debug!("merging {} sorted runs", runs.len() + 1);
        let mut sorted = Self::new(config);
        loop {
            // the earliest run wins ties, keeping the sort stable
            let mut best: Option<usize> = None;
            for (i, head) in heads.iter().enumerate() {
                let Some(item) = head else { continue };
                let better = match best.and_then(|b| heads[b].as_ref()) {
                    Some(current) => compare(item, current) == Ordering::Less,
                    None => true,
                };
                if better {
                    best = Some(i);
                }
            }
            let Some(i) = best else { break };
            let next = sources[i].next().transpose()?;
            if let Some(item) = mem::replace(&mut heads[i], next) {
                sorted.push(item)?;
            }
        }
        Ok(sorted)
    }
}

/// Position within a list: a spilled segment being read, then the
/// in-memory segment.
struct Cursor<T> {
    segment: usize,
    reader: Option<SegmentReader<T>>,
    offset: usize,
    failed: bool,
}

impl<T> Default for Cursor<T> {
    fn default() -> Self {
        Self {
            segment: 0,
            reader: None,
            offset: 0,
            failed: false,
        }
    }
}

impl<T: SpillItem> Cursor<T> {
    fn next(&mut self, list: &SpillableList<T>) -> Option<WeirResult<T>> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(reader) = &mut self.reader {
                match reader.next() {
                    Some(Ok(item)) => return Some(Ok(item)),
                    Some(Err(e)) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                    None => {
                        self.reader = None;
                        self.segment += 1;
                        continue;
                    }
                }
            }
            if let Some(segment) = list.spilled.get(self.segment) {
                list.config.listener.on_read(&segment.event(self.segment));
                match SegmentReader::open(segment.file.path(), segment.codec) {
                    Ok(reader) => self.reader = Some(reader),
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
                continue;
            }
            let item = list.memory.get(self.offset)?.clone();
            self.offset += 1;
            return Some(Ok(item));
        }
    }
}

/// Borrowing iterator over a [`SpillableList`].
pub struct SpillIter<'a, T: SpillItem> {
    list: &'a SpillableList<T>,
    cursor: Cursor<T>,
}

impl<T: SpillItem> Iterator for SpillIter<'_, T> {
    type Item = WeirResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next(self.list)
    }
}

/// Iterator that keeps a shared list alive, for readers that outlive the
/// borrow (such as a tap stream).
pub struct SharedIter<T: SpillItem> {
    list: Arc<SpillableList<T>>,
    cursor: Cursor<T>,
}

impl<T: SpillItem> SharedIter<T> {
    pub fn new(list: Arc<SpillableList<T>>) -> Self {
        Self {
            list,
            cursor: Cursor::default(),
        }
    }
}

impl<T: SpillItem> Iterator for SharedIter<T> {
    type Item = WeirResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next(&self.list)
    }
}
