//! Keeps spill file I/O off the async workers.
//!
//! Segment reads and writes are plain `std::fs` calls. Async callers hand
//! them to tokio's blocking pool; collections that never spilled are read
//! in place.

use std::sync::Arc;

use common_error::{WeirError, WeirResult};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::mpsc;

use super::list::SharedIter;
use super::{SpillItem, SpillableList};

/// Run `work` on the blocking pool.
pub async fn run_blocking<F, R>(work: F) -> WeirResult<R>
where
    F: FnOnce() -> WeirResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| WeirError::spill(format!("blocking spill task failed: {e}")))?
}

/// Run `work` inline when `in_memory`, else on the blocking pool.
pub async fn run_spilled<F, R>(in_memory: bool, work: F) -> WeirResult<R>
where
    F: FnOnce() -> WeirResult<R> + Send + 'static,
    R: Send + 'static,
{
    if in_memory {
        work()
    } else {
        run_blocking(work).await
    }
}

/// Stream the elements of `list` in order.
///
/// Spilled segments are decoded on a blocking thread and handed over
/// through a channel of `capacity` elements. Dropping the stream stops the
/// reader at its next element.
pub fn stream_list<T: SpillItem>(list: Arc<SpillableList<T>>, capacity: usize) -> BoxStream<'static, WeirResult<T>> {
    if list.spill_count() == 0 {
        return stream::iter(SharedIter::new(list)).boxed();
    }
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::task::spawn_blocking(move || {
        for item in SharedIter::new(list) {
            if tx.blocking_send(item).is_err() {
                break;
            }
        }
    });
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

#[cfg(test)]
mod tests {
    use weir_core::{tuple, Tuple};

    use super::*;
    use crate::spill::SpillConfig;

    fn rows(n: i64) -> Vec<Tuple> {
        (0..n).map(|i| tuple![i]).collect()
    }

    #[tokio::test]
    async fn test_push_async_spills_on_blocking_pool() {
        let mut list = SpillableList::new(SpillConfig::default().with_threshold(2));
        for row in rows(5) {
            list.push_async(row).await.unwrap();
        }
        assert_eq!(list.spill_count(), 2);
        assert_eq!(list.in_memory_len(), 1);
        assert_eq!(list.to_vec().unwrap(), rows(5));
    }

    #[tokio::test]
    async fn test_stream_spilled_list() {
        let list = SpillableList::from_items(SpillConfig::default().with_threshold(3), rows(10)).unwrap();
        assert!(list.spill_count() > 0);
        let streamed: Vec<Tuple> = stream_list(Arc::new(list), 2)
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(streamed, rows(10));
    }

    #[tokio::test]
    async fn test_dropped_stream_stops_reader() {
        let list = SpillableList::from_items(SpillConfig::default().with_threshold(3), rows(50)).unwrap();
        let mut stream = stream_list(Arc::new(list), 1);
        assert_eq!(stream.next().await.unwrap().unwrap(), tuple![0]);
        drop(stream);
    }

    #[tokio::test]
    async fn test_run_blocking_propagates_errors() {
        let err = run_blocking(|| -> WeirResult<()> { Err(WeirError::spill("disk full")) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(run_spilled(true, || Ok(7)).await.unwrap(), 7);
    }
}
