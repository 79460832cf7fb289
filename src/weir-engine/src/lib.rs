//! Streaming execution engine for Weir.
//!
//! This crate runs the [`FlowPlan`](weir_planner::FlowPlan)s produced by
//! `weir-planner` on the local tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │  ElementGraph   │ ──▶ │     Planner      │ ──▶ │   FlowExecutor   │
//! │ (weir-logical)  │     │  (weir-planner)  │     │                  │
//! └─────────────────┘     └──────────────────┘     └──────────────────┘
//!                                 │                         │
//!                                 ▼                         ▼
//!                        FlowPlan: steps/nodes     StreamGraph per node
//! ```
//!
//! # Key Components
//!
//! - [`FlowExecutor`]: runs steps in order, one [`StreamGraph`] per node
//! - [`stream`]: per-record ducts and multi-input gates; `Every` chains are
//!   folded into the grouping they follow
//! - [`spill`]: [`SpillableList`] and [`SpillableMap`] bounded by element
//!   count, estimated bytes and the execution's [`MemoryPool`]
//! - [`closure`]: the joiner's view over the co-grouped sides of one key
//! - [`tap`]: sources, sinks and traps, with in-memory, Arrow and
//!   intermediate implementations
//!
//! # Failure Model
//!
//! The first failure in a node stops every task of that node. Sink and trap
//! writers are published only when the node completes; a failed or cancelled
//! node aborts them. Operation failures on an element bound to a trap divert
//! the offending record instead of failing the node.

pub mod closure;
pub mod context;
pub mod executor;
pub mod memory;
pub mod metrics;
pub mod spill;
pub mod stream;
pub mod tap;

pub use closure::{Closure, ClosureSide, GroupView};
pub use context::{CancellationHandle, ExecutionContext, RuntimeConfig, StopSignal};
pub use executor::{FlowExecutor, FlowResult};
pub use memory::{MemoryPool, MemoryReservation};
pub use metrics::{DuctMetrics, ExecutionTimer, MetricsSink};
pub use spill::{
    CountingSpillListener, NoopSpillListener, SpillConfig, SpillEvent, SpillItem, SpillListener,
    SpillableList, SpillableMap,
};
pub use stream::{BoundaryTaps, NodeOutcome, StreamGraph};
pub use tap::{
    IntermediateTap, MemoryTap, RecordBatchTap, SinkTap, SourceTap, TapBindings, TupleStream,
    TupleWriter,
};
