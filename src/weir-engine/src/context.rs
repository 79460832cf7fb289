//! Execution context shared by every duct of a node.

use std::sync::Arc;

use common_config::{ExecutionSettings, WeirConfig};
use common_error::{WeirError, WeirResult};
use tokio::sync::watch;

use crate::memory::MemoryPool;
use crate::metrics::MetricsSink;
use crate::spill::SpillConfig;

// ============================================================================
// Runtime Configuration
// ============================================================================

/// Runtime configuration for execution.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Capacity of each gate's input channel.
    pub channel_capacity: usize,
    /// Memory limit in bytes (0 = unlimited).
    pub memory_limit: usize,
    /// Enable metrics collection.
    pub collect_metrics: bool,
    pub spill: SpillConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_settings(&WeirConfig::default())
    }
}

impl RuntimeConfig {
    pub fn from_settings(config: &WeirConfig) -> Self {
        let execution: &ExecutionSettings = &config.execution;
        Self {
            channel_capacity: execution.channel_capacity.max(1),
            memory_limit: execution.memory_limit,
            collect_metrics: execution.collect_metrics,
            spill: SpillConfig::from_settings(&config.spill),
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.collect_metrics = enabled;
        self
    }

    pub fn with_spill(mut self, spill: SpillConfig) -> Self {
        self.spill = spill;
        self
    }

    /// A fresh pool for one execution's collections.
    pub(crate) fn memory_pool(&self) -> Arc<MemoryPool> {
        if self.memory_limit > 0 {
            Arc::new(MemoryPool::bounded(self.memory_limit))
        } else {
            Arc::new(MemoryPool::unbounded())
        }
    }
}

// ============================================================================
// Cancellation Handle
// ============================================================================

/// Handle for cancelling execution from outside the engine.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            cancel_tx: Arc::new(tx),
        }
    }

    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Stop Signal
// ============================================================================

/// Node-level stop: external cancellation or an internal failure.
///
/// Branches check it between records; gates wait on it alongside their
/// input channel.
#[derive(Debug, Clone)]
pub struct StopSignal {
    internal: Arc<watch::Sender<bool>>,
    internal_rx: watch::Receiver<bool>,
    external: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new(external: watch::Receiver<bool>) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            internal: Arc::new(tx),
            internal_rx: rx,
            external,
        }
    }

    /// Stop every branch and gate of the node.
    pub fn stop(&self) {
        self.internal.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.internal_rx.borrow() || self.is_cancelled()
    }

    /// Whether the stop came from outside.
    pub fn is_cancelled(&self) -> bool {
        *self.external.borrow()
    }

    /// Err with `Cancelled` once stopped.
    pub fn check(&self) -> WeirResult<()> {
        if self.is_stopped() {
            Err(WeirError::cancelled("node stopped"))
        } else {
            Ok(())
        }
    }

    /// Resolves once stopped.
    pub async fn stopped(&self) {
        let mut internal = self.internal_rx.clone();
        let mut external = self.external.clone();
        tokio::select! {
            _ = wait_true(&mut internal) => {}
            _ = wait_true(&mut external) => {}
        }
    }
}

/// A dropped sender can never signal, so it waits forever.
async fn wait_true(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Execution Context
// ============================================================================

/// Resources a node's ducts share. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionContext {
    pub config: RuntimeConfig,
    /// Spill settings with this execution's memory pool attached.
    pub spill: SpillConfig,
    pub memory: Arc<MemoryPool>,
    pub metrics: Option<MetricsSink>,
    pub stop: StopSignal,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("config", &self.config)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    pub fn new(config: RuntimeConfig, stop: StopSignal) -> Self {
        let memory = config.memory_pool();
        Self::with_memory(config, memory, stop)
    }

    /// Context reserving against an existing pool.
    pub fn with_memory(config: RuntimeConfig, memory: Arc<MemoryPool>, stop: StopSignal) -> Self {
        let spill = config.spill.clone().with_memory(Arc::clone(&memory));
        let metrics = config.collect_metrics.then(MetricsSink::new);
        Self {
            config,
            spill,
            memory,
            metrics,
            stop,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn update_metrics<F>(&self, duct: &str, f: F)
    where
        F: FnOnce(&mut crate::metrics::DuctMetrics),
    {
        if let Some(sink) = &self.metrics {
            sink.update(duct, f);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_runtime_config() {
        let config = RuntimeConfig::default()
            .with_channel_capacity(0)
            .with_memory_limit(1024);
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.memory_limit, 1024);
        assert_eq!(config.memory_pool().limit(), Some(1024));
        assert_eq!(RuntimeConfig::default().memory_pool().limit(), None);
        assert_eq!(RuntimeConfig::default().channel_capacity, 1024);
    }

    #[test]
    fn test_context_without_metrics() {
        let config = RuntimeConfig::default().with_metrics(false);
        let ctx = ExecutionContext::new(config, StopSignal::new(CancellationHandle::new().subscribe()));
        assert!(ctx.metrics.is_none());
        assert!(ctx.spill.memory.is_some());
    }

    #[tokio::test]
    async fn test_external_cancel_stops() {
        let handle = CancellationHandle::new();
        let stop = StopSignal::new(handle.subscribe());
        assert!(stop.check().is_ok());

        let waiter = tokio::spawn({
            let stop = stop.clone();
            async move { stop.stopped().await }
        });
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(stop.is_cancelled());
        assert!(stop.check().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_internal_stop_is_not_cancellation() {
        let handle = CancellationHandle::new();
        let stop = StopSignal::new(handle.subscribe());
        stop.stop();
        stop.stopped().await;
        assert!(stop.is_stopped());
        assert!(!stop.is_cancelled());
    }
}
