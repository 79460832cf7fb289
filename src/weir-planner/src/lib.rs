//! Rule-based planner for Weir.
//!
//! `weir-planner` compiles an [`ElementGraph`](weir_logical::ElementGraph)
//! into a [`FlowPlan`] of steps and nodes by running a [`RuleRegistry`].
//!
//! # Overview
//!
//! - **Patterns**: [`ExpressionGraph`]s of element and scope predicates,
//!   matched by a backtracking [`Matcher`] in a configurable search order
//! - **Rules**: assert, transform and partition rules grouped into ordered
//!   [`PlanPhase`]s
//! - **Planner**: validates, resolves fields, applies rules (iterative rules
//!   to a fixed point) and cuts the graph into steps and nodes
//! - **Diagnostics**: per-phase graph dumps and structured [`PlannerError`]s
//!
//! ```rust
//! use std::sync::Arc;
//! use weir_core::operation::Sum;
//! use weir_logical::{GroupBySpec, PipelineBuilder};
//! use weir_planner::{Planner, RuleRegistry};
//!
//! let mut b = PipelineBuilder::new();
//! let src = b.source("in", ["k", "v"]);
//! let grouped = b.group_by("by-k", &[src], GroupBySpec::new(["k"]));
//! let summed = b.every("sum", grouped, Some(["v"].into()), Arc::new(Sum::new("sum")));
//! b.sink("out", summed);
//!
//! let plan = Planner::new(RuleRegistry::local()).plan(b.build().unwrap()).unwrap();
//! assert_eq!(plan.steps.len(), 1);
//! ```

mod error;
mod partition;
pub mod pattern;
mod phase;
mod plan;
mod planner;
mod registry;
pub mod rules;
mod trace;

pub use error::{PlannerError, PlannerErrorKind};
pub use partition::{partition, Partition};
pub use pattern::{
    CaptureRole, ElementExpression, ExpressionGraph, Match, Matcher, ScopeExpression, Topology,
};
pub use phase::{PlanLevel, PlanPhase};
pub use plan::{FlowNode, FlowPlan, FlowStep, RuleTrace};
pub use planner::{Planner, PlannerConfig};
pub use registry::{RuleRegistry, RuleRegistryBuilder};
pub use rules::{AssertRule, GraphTransformer, PartitionRule, Rule, TransformRule, Transformed};
pub use trace::write_dumps;
