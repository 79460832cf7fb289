//! Async runtime utilities for Weir.
//!
//! The stream engine runs one task per source branch and one per gate; this
//! crate wraps the tokio pieces those tasks are spawned and joined with.

use std::future::Future;

use common_error::{WeirError, WeirResult};
use tokio::runtime::Runtime;

/// Create a multi-threaded Tokio runtime for blocking callers.
pub fn get_runtime() -> WeirResult<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| WeirError::InternalError(format!("Failed to create runtime: {e}")))
}

/// Block on a future using a fresh runtime.
pub fn block_on<F: Future>(future: F) -> WeirResult<F::Output> {
    let runtime = get_runtime()?;
    Ok(runtime.block_on(future))
}

/// Convert a task join failure into a `WeirError`.
pub fn join_error(err: tokio::task::JoinError) -> WeirError {
    if err.is_cancelled() {
        WeirError::cancelled("task aborted")
    } else {
        WeirError::internal(format!("task panicked: {err}"))
    }
}

/// A set of spawned tasks that each produce a `WeirResult`.
pub struct JoinSet<T> {
    inner: tokio::task::JoinSet<WeirResult<T>>,
}

impl<T: Send + 'static> JoinSet<T> {
    /// Create a new join set.
    pub fn new() -> Self {
        Self {
            inner: tokio::task::JoinSet::new(),
        }
    }

    /// Spawn a task into the set.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = WeirResult<T>> + Send + 'static,
    {
        self.inner.spawn(future);
    }

    /// Wait for the next task to complete.
    ///
    /// Panics and aborts inside the task are folded into the error.
    pub async fn join_next(&mut self) -> Option<WeirResult<T>> {
        self.inner
            .join_next()
            .await
            .map(|joined| joined.map_err(join_error).and_then(|r| r))
    }

    /// Abort every task still running.
    pub fn abort_all(&mut self) {
        self.inner.abort_all();
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the number of tasks in the set.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T: Send + 'static> Default for JoinSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on() {
        let value = block_on(async { 40 + 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_join_set_collects_results() {
        let mut set = JoinSet::new();
        set.spawn(async { Ok(1) });
        set.spawn(async { Err(WeirError::execution("boom")) });
        assert_eq!(set.len(), 2);

        let mut ok = 0;
        let mut failed = 0;
        while let Some(result) = set.join_next().await {
            match result {
                Ok(_) => ok += 1,
                Err(_) => failed += 1,
            }
        }
        assert_eq!((ok, failed), (1, 1));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_join_set_abort() {
        let mut set: JoinSet<()> = JoinSet::new();
        set.spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(())
        });
        set.abort_all();
        let result = set.join_next().await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }
}
