//! Element graphs for Weir pipelines.
//!
//! `weir-logical` holds the planner's input and working representation: a
//! directed acyclic graph of typed elements connected by scopes.
//!
//! # Overview
//!
//! - **Elements**: `Source`, `Sink`, `Each`, `Filter`, `Every`, `GroupBy`,
//!   `CoGroup`, `HashJoin`, `Merge` and `Boundary`, each with a capability set
//!   checked as edges are added
//! - **Graph**: deterministic ids, topological order and the mutations rules
//!   use (insert between, splice out, remove branch, replace, subgraph)
//! - **Building**: [`PipelineBuilder`] assembles a graph from pipes
//! - **Resolution**: [`resolve_fields`] fixes the fields on every edge
//! - **Validation**: structural checks before planning, semantic checks after
//!   resolution
//! - **Diagnostics**: [`ElementGraph::to_dot`] and [`GraphDump`]

mod builder;
mod dot;
mod element;
mod graph;
mod resolve;
pub mod validation;

pub use builder::{Pipe, PipelineBuilder};
pub use dot::GraphDump;
pub use element::{
    Capabilities, EachSpec, Element, ElementId, ElementKind, ElementType, EverySpec, FilterSpec,
    GroupBySpec, JoinSpec, OutputSelector, SourceSpec, ACCUMULATED, STREAMED, STREAM_MODE,
};
pub use graph::{Edge, EdgeId, ElementGraph, Scope};
pub use resolve::{group_context, resolve_fields};
