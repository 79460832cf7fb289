//! Fluent construction of element graphs.

use std::sync::Arc;

use common_error::{WeirError, WeirResult};
use weir_core::{Fields, Filter, Function, GroupFunction};

use crate::element::{
    EachSpec, ElementId, ElementKind, EverySpec, FilterSpec, GroupBySpec, JoinSpec,
    OutputSelector, SourceSpec,
};
use crate::graph::ElementGraph;
use crate::validation::check_structure;

/// Handle to the tail of a pipe under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pipe(ElementId);

impl Pipe {
    pub fn id(&self) -> ElementId {
        self.0
    }
}

/// Builds an [`ElementGraph`] from a declarative pipeline description.
///
/// Wiring errors are collected and reported by [`PipelineBuilder::build`], so
/// calls chain without intermediate `Result`s.
///
/// ```rust
/// use std::sync::Arc;
/// use weir_core::operation::Sum;
/// use weir_logical::{GroupBySpec, PipelineBuilder};
///
/// let mut b = PipelineBuilder::new();
/// let lines = b.source("lines", ["k", "v"]);
/// let grouped = b.group_by("by-key", &[lines], GroupBySpec::new(["k"]));
/// let summed = b.every("sum", grouped, Some(["v"].into()), Arc::new(Sum::new("sum")));
/// b.sink("totals", summed);
/// let graph = b.build().unwrap();
/// assert_eq!(graph.len(), 4);
/// ```
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    graph: ElementGraph,
    errors: Vec<WeirError>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, name: &str, kind: ElementKind, inputs: &[Pipe]) -> Pipe {
        let id = self.graph.add_element(name, kind);
        for (ordinal, pipe) in inputs.iter().enumerate() {
            if let Err(e) = self.graph.add_edge(pipe.0, id, ordinal) {
                self.errors.push(e);
            }
        }
        Pipe(id)
    }

    pub fn source(&mut self, name: &str, fields: impl Into<Fields>) -> Pipe {
        let kind = ElementKind::Source(SourceSpec {
            fields: fields.into(),
        });
        self.add(name, kind, &[])
    }

    pub fn sink(&mut self, name: &str, input: Pipe) -> Pipe {
        self.add(name, ElementKind::Sink, &[input])
    }

    pub fn each(
        &mut self,
        name: &str,
        input: Pipe,
        argument: Option<Fields>,
        function: Arc<dyn Function>,
        output: OutputSelector,
    ) -> Pipe {
        let kind = ElementKind::Each(EachSpec {
            argument,
            function,
            output,
        });
        self.add(name, kind, &[input])
    }

    pub fn filter(
        &mut self,
        name: &str,
        input: Pipe,
        argument: Option<Fields>,
        filter: Arc<dyn Filter>,
    ) -> Pipe {
        self.add(name, ElementKind::Filter(FilterSpec { argument, filter }), &[input])
    }

    pub fn every(
        &mut self,
        name: &str,
        input: Pipe,
        argument: Option<Fields>,
        function: Arc<dyn GroupFunction>,
    ) -> Pipe {
        self.add(name, ElementKind::Every(EverySpec { argument, function }), &[input])
    }

    pub fn group_by(&mut self, name: &str, inputs: &[Pipe], spec: GroupBySpec) -> Pipe {
        self.add(name, ElementKind::GroupBy(spec), inputs)
    }

    pub fn co_group(&mut self, name: &str, inputs: &[Pipe], spec: JoinSpec) -> Pipe {
        self.add(name, ElementKind::CoGroup(spec), inputs)
    }

    pub fn hash_join(&mut self, name: &str, inputs: &[Pipe], spec: JoinSpec) -> Pipe {
        self.add(name, ElementKind::HashJoin(spec), inputs)
    }

    pub fn merge(&mut self, name: &str, inputs: &[Pipe]) -> Pipe {
        self.add(name, ElementKind::Merge, inputs)
    }

    /// Force a partition point, materializing the pipe between steps.
    pub fn boundary(&mut self, name: &str, input: Pipe) -> Pipe {
        self.add(name, ElementKind::Boundary, &[input])
    }

    /// Divert records failing at `pipe`'s element to the trap named `trap`.
    pub fn trap(&mut self, pipe: Pipe, trap: &str) -> &mut Self {
        if let Err(e) = self.graph.set_trap(pipe.0, trap) {
            self.errors.push(e);
        }
        self
    }

    /// Finish construction and validate the graph's structure.
    pub fn build(self) -> WeirResult<ElementGraph> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        check_structure(&self.graph)?;
        Ok(self.graph)
    }
}
