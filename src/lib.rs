//! Weir - rule-based pipeline planner and spill-to-disk streaming engine
//!
//! Pipelines are assembled as element graphs, compiled by a rule registry
//! into steps and nodes, and executed node by node with bounded memory.
//!
//! ```rust
//! use std::sync::Arc;
//! use weir::core::operation::Sum;
//! use weir::engine::{FlowExecutor, MemoryTap, TapBindings};
//! use weir::logical::{GroupBySpec, PipelineBuilder};
//! use weir::planner::{Planner, RuleRegistry};
//!
//! let mut b = PipelineBuilder::new();
//! let src = b.source("in", ["k", "v"]);
//! let grouped = b.group_by("by-k", &[src], GroupBySpec::new(["k"]));
//! let summed = b.every("sum", grouped, Some(["v"].into()), Arc::new(Sum::new("total")));
//! b.sink("out", summed);
//! let plan = Planner::new(RuleRegistry::local()).plan(b.build().unwrap()).unwrap();
//!
//! let rows = weir::core::testing::int_rows(&[&[1, 3], &[1, 4], &[2, 5]]);
//! let output = Arc::new(MemoryTap::new());
//! let bindings = TapBindings::new()
//!     .source("in", Arc::new(MemoryTap::with_rows(rows)))
//!     .sink("out", output.clone());
//! FlowExecutor::new().execute_sync(&plan, &bindings).unwrap();
//! assert_eq!(output.len(), 2);
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use weir_core as core;
pub use weir_engine as engine;
pub use weir_logical as logical;
pub use weir_planner as planner;

/// Weir version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
