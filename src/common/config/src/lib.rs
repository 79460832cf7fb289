//! Configuration management for Weir.
//!
//! Provides the serializable settings for planning, execution, and spilling.
//! Crate-local configuration types (`PlannerConfig`, `RuntimeConfig`,
//! `SpillConfig`) are built from these sections.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Global Weir configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeirConfig {
    /// Planner configuration.
    pub planner: PlannerSettings,
    /// Execution configuration.
    pub execution: ExecutionSettings,
    /// Spill configuration.
    pub spill: SpillSettings,
}

/// Order in which the pattern matcher visits graph elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchOrder {
    /// Upstream elements first.
    #[default]
    Topological,
    /// Downstream elements first.
    ReverseTopological,
    /// Depth-first from each head element, in head order.
    DepthFirst,
}

/// Planner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Bound on fixed-point iterations for a single iterative rule.
    pub max_iterations: usize,
    /// Record a graph dump after every rule that changes the graph.
    pub trace: bool,
    /// Directory where trace dumps are written, if any.
    pub trace_dir: Option<PathBuf>,
    /// Element visitation order used when matching.
    pub search_order: SearchOrder,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            trace: false,
            trace_dir: None,
            search_order: SearchOrder::Topological,
        }
    }
}

/// Execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Capacity of the channel feeding each gate.
    pub channel_capacity: usize,
    /// Memory limit in bytes (0 = unlimited).
    pub memory_limit: usize,
    /// Collect per-duct metrics.
    pub collect_metrics: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            memory_limit: 0,
            collect_metrics: true,
        }
    }
}

/// Codec applied to spill segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionCodec {
    /// Plain JSON lines.
    None,
    /// Snappy frame format.
    #[default]
    Snappy,
}

/// Spillable collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpillSettings {
    /// Maximum number of elements held in memory per collection.
    pub threshold: usize,
    /// Optional maximum estimated bytes held in memory per collection.
    pub max_bytes: Option<usize>,
    /// Codec for spill segments.
    pub codec: CompressionCodec,
    /// Directory for spill files (system temp dir when unset).
    pub spill_dir: Option<PathBuf>,
}

impl Default for SpillSettings {
    fn default() -> Self {
        Self {
            threshold: 10_000,
            max_bytes: None,
            codec: CompressionCodec::Snappy,
            spill_dir: None,
        }
    }
}
