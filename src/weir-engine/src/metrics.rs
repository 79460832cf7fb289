//! Per-duct execution metrics.

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Counters for one duct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuctMetrics {
    /// Records received.
    pub records_in: u64,
    /// Records emitted downstream (or written, for sinks).
    pub records_out: u64,
    /// Records diverted to a trap.
    pub trapped: u64,
    /// Groups flushed by a gate.
    pub groups: u64,
    /// Time spent in flushes and writer calls.
    pub exec_time: Duration,
}

impl DuctMetrics {
    pub fn add_in(&mut self, count: usize) {
        self.records_in += count as u64;
    }

    pub fn add_out(&mut self, count: usize) {
        self.records_out += count as u64;
    }

    pub fn add_trapped(&mut self) {
        self.trapped += 1;
    }

    pub fn add_time(&mut self, duration: Duration) {
        self.exec_time += duration;
    }

    /// `records_out / records_in`.
    pub fn selectivity(&self) -> f64 {
        if self.records_in == 0 {
            1.0
        } else {
            self.records_out as f64 / self.records_in as f64
        }
    }
}

impl fmt::Display for DuctMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in={}, out={}, trapped={}, groups={}, time={:?}",
            self.records_in, self.records_out, self.trapped, self.groups, self.exec_time
        )
    }
}

/// Shared metrics keyed by duct name.
#[derive(Debug, Clone, Default)]
pub struct MetricsSink {
    metrics: Arc<RwLock<BTreeMap<String, DuctMetrics>>>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<F>(&self, duct: &str, f: F)
    where
        F: FnOnce(&mut DuctMetrics),
    {
        let mut guard = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        f(guard.entry(duct.to_string()).or_default());
    }

    pub fn get(&self, duct: &str) -> Option<DuctMetrics> {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(duct)
            .cloned()
    }

    pub fn all(&self) -> BTreeMap<String, DuctMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn total_trapped(&self) -> u64 {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|m| m.trapped)
            .sum()
    }

    /// One line per duct, in name order.
    pub fn format(&self) -> String {
        let metrics = self.metrics.read().unwrap_or_else(PoisonError::into_inner);
        if metrics.is_empty() {
            return "No metrics collected.\n".to_string();
        }
        let mut output = String::new();
        for (duct, m) in metrics.iter() {
            let _ = writeln!(output, "{duct}: {m}");
        }
        output
    }
}

/// Wall clock timer for flushes and writes.
#[derive(Debug)]
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn stop(self) -> Duration {
        self.start.elapsed()
    }
}
