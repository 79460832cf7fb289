//! Built-in graph transformers.

use std::fmt;
use std::sync::Arc;

use common_error::WeirResult;
use log::debug;
use weir_logical::{
    EdgeId, ElementGraph, ElementKind, ElementType, ACCUMULATED, STREAMED, STREAM_MODE,
};

use super::{GraphTransformer, Transformed};
use crate::pattern::{CaptureRole, Match};

/// Which side of the captured element receives the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// On every outgoing edge.
    After,
    /// On every incoming edge.
    Before,
}

/// Inserts a `Boundary` next to each captured element, skipping edges that
/// already touch one.
#[derive(Debug, Clone, Copy)]
pub struct InsertBoundary {
    pub placement: Placement,
    pub role: CaptureRole,
}

impl InsertBoundary {
    pub fn after() -> Self {
        Self {
            placement: Placement::After,
            role: CaptureRole::Primary,
        }
    }

    pub fn before() -> Self {
        Self {
            placement: Placement::Before,
            role: CaptureRole::Primary,
        }
    }

    pub fn on(mut self, role: CaptureRole) -> Self {
        self.role = role;
        self
    }
}

impl GraphTransformer for InsertBoundary {
    fn name(&self) -> &str {
        "InsertBoundary"
    }

    fn rewrite(&self, mut graph: ElementGraph, found: &Match) -> WeirResult<Transformed> {
        let mut changed = false;
        for id in found.captured(self.role) {
            let element = graph.require(id)?;
            let name = element.name.clone();
            let is_boundary = |graph: &ElementGraph, other| {
                graph
                    .element(other)
                    .is_some_and(|e| e.element_type() == ElementType::Boundary)
            };
            let edges: Vec<EdgeId> = match self.placement {
                Placement::After => graph
                    .outgoing(id)
                    .into_iter()
                    .filter(|e| !is_boundary(&graph, e.target))
                    .map(|e| e.id)
                    .collect(),
                Placement::Before => graph
                    .incoming(id)
                    .into_iter()
                    .filter(|e| {
                        !is_boundary(&graph, e.source)
                            && graph
                                .element(e.source)
                                .is_some_and(|s| s.element_type() != ElementType::Source)
                    })
                    .map(|e| e.id)
                    .collect(),
            };
            for edge in edges {
                let inserted =
                    graph.insert_between(edge, format!("{name}-boundary-{edge}"), ElementKind::Boundary)?;
                debug!("inserted boundary {inserted} at edge {edge} of '{name}'");
                changed = true;
            }
        }
        Ok(Transformed { graph, changed })
    }
}

/// Removes captured pass-through elements, reconnecting their input to
/// each of their outputs.
#[derive(Debug, Clone, Copy)]
pub struct SpliceOut {
    pub role: CaptureRole,
}

impl Default for SpliceOut {
    fn default() -> Self {
        Self {
            role: CaptureRole::Primary,
        }
    }
}

impl GraphTransformer for SpliceOut {
    fn name(&self) -> &str {
        "SpliceOut"
    }

    fn rewrite(&self, mut graph: ElementGraph, found: &Match) -> WeirResult<Transformed> {
        let mut changed = false;
        for id in found.captured(self.role) {
            if graph.contains(id) {
                graph.splice_out(id)?;
                changed = true;
            }
        }
        Ok(Transformed { graph, changed })
    }
}

/// Removes captured elements and the upstream branch left dangling.
#[derive(Debug, Clone, Copy)]
pub struct RemoveBranch {
    pub role: CaptureRole,
}

impl Default for RemoveBranch {
    fn default() -> Self {
        Self {
            role: CaptureRole::Primary,
        }
    }
}

impl GraphTransformer for RemoveBranch {
    fn name(&self) -> &str {
        "RemoveBranch"
    }

    fn rewrite(&self, mut graph: ElementGraph, found: &Match) -> WeirResult<Transformed> {
        let mut changed = false;
        for id in found.captured(self.role) {
            if graph.contains(id) {
                let removed = graph.remove_branch(id)?;
                debug!("removed branch {removed:?}");
                changed |= !removed.is_empty();
            }
        }
        Ok(Transformed { graph, changed })
    }
}

/// Attaches `key = value` to captured elements.
#[derive(Debug, Clone)]
pub struct Annotate {
    pub key: String,
    pub value: String,
    pub role: CaptureRole,
}

impl Annotate {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            role: CaptureRole::Primary,
        }
    }

    pub fn on(mut self, role: CaptureRole) -> Self {
        self.role = role;
        self
    }
}

impl GraphTransformer for Annotate {
    fn name(&self) -> &str {
        "Annotate"
    }

    fn rewrite(&self, mut graph: ElementGraph, found: &Match) -> WeirResult<Transformed> {
        let mut changed = false;
        for id in found.captured(self.role) {
            if !graph.require(id)?.has_annotation(&self.key, &self.value) {
                graph.annotate(id, &self.key, &self.value)?;
                changed = true;
            }
        }
        Ok(Transformed { graph, changed })
    }
}

/// Marks the edge feeding ordinal 0 of each captured hash join as streamed
/// and the edges feeding the other ordinals as accumulated. The mark sits on
/// the edge, so one element may feed several joins in different roles.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotateHashJoinLegs;

impl GraphTransformer for AnnotateHashJoinLegs {
    fn name(&self) -> &str {
        "AnnotateHashJoinLegs"
    }

    fn rewrite(&self, mut graph: ElementGraph, found: &Match) -> WeirResult<Transformed> {
        let mut changed = false;
        for id in found.primary() {
            let legs: Vec<(EdgeId, &'static str)> = graph
                .incoming(id)
                .into_iter()
                .filter_map(|e| {
                    let mode = if e.scope.ordinal == 0 { STREAMED } else { ACCUMULATED };
                    (!e.scope.has_annotation(STREAM_MODE, mode)).then_some((e.id, mode))
                })
                .collect();
            for (edge, mode) in legs {
                graph.annotate_edge(edge, STREAM_MODE, mode)?;
                changed = true;
            }
        }
        Ok(Transformed { graph, changed })
    }
}

type RewriteFn = dyn Fn(ElementGraph, &Match) -> WeirResult<Transformed> + Send + Sync;

/// A transformer backed by a closure.
#[derive(Clone)]
pub struct FnTransformer {
    name: String,
    rewrite: Arc<RewriteFn>,
}

impl FnTransformer {
    pub fn new<F>(name: impl Into<String>, rewrite: F) -> Self
    where
        F: Fn(ElementGraph, &Match) -> WeirResult<Transformed> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            rewrite: Arc::new(rewrite),
        }
    }
}

impl fmt::Debug for FnTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformer").field("name", &self.name).finish()
    }
}

impl GraphTransformer for FnTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn rewrite(&self, graph: ElementGraph, found: &Match) -> WeirResult<Transformed> {
        (self.rewrite)(graph, found)
    }
}

#[cfg(test)]
mod tests {
    use weir_core::operation::InnerJoin;
    use weir_logical::{ElementId, JoinSpec, SourceSpec};

    use super::*;
    use crate::pattern::{ExpressionGraph, Matcher};

    fn source(g: &mut ElementGraph, name: &str) -> ElementId {
        g.add_element(name, ElementKind::Source(SourceSpec { fields: ["k"].into() }))
    }

    fn first(g: &ElementGraph, ty: ElementType) -> Match {
        Matcher::default()
            .find_first(g, &ExpressionGraph::of_kinds([ty]))
            .unwrap()
    }

    #[test]
    fn test_insert_boundary_after_is_idempotent() {
        let mut g = ElementGraph::new();
        let s = source(&mut g, "in");
        let a = g.add_element("a", ElementKind::Sink);
        let b = g.add_element("b", ElementKind::Sink);
        g.add_edge(s, a, 0).unwrap();
        g.add_edge(s, b, 0).unwrap();

        let found = first(&g, ElementType::Source);
        let once = InsertBoundary::after().rewrite(g, &found).unwrap();
        assert!(once.changed);
        assert_eq!(once.graph.elements_of(ElementType::Boundary).count(), 2);

        let twice = InsertBoundary::after().rewrite(once.graph, &found).unwrap();
        assert!(!twice.changed);
        assert_eq!(twice.graph.len(), 5);
    }

    #[test]
    fn test_splice_out_and_remove_branch() {
        let mut g = ElementGraph::new();
        let s = source(&mut g, "in");
        let mid = g.add_element("mid", ElementKind::Boundary);
        let out = g.add_element("out", ElementKind::Sink);
        g.add_edge(s, mid, 0).unwrap();
        g.add_edge(mid, out, 0).unwrap();

        let boundary = first(&g, ElementType::Boundary);
        let spliced = SpliceOut::default().rewrite(g, &boundary).unwrap();
        assert!(spliced.changed);
        assert_eq!(spliced.graph.successors(s), vec![out]);

        let sink = first(&spliced.graph, ElementType::Sink);
        let removed = RemoveBranch::default().rewrite(spliced.graph, &sink).unwrap();
        assert!(removed.changed);
        assert!(removed.graph.is_empty());
    }

    fn leg(g: &ElementGraph, from: ElementId, to: ElementId, mode: &str) -> bool {
        g.incoming(to)
            .iter()
            .any(|e| e.source == from && e.scope.has_annotation(STREAM_MODE, mode))
    }

    #[test]
    fn test_annotate_hash_join_legs() {
        let join_spec = || JoinSpec::new(vec![["k"].into(), ["k"].into()], Arc::new(InnerJoin));
        let mut g = ElementGraph::new();
        let l = source(&mut g, "l");
        let r = source(&mut g, "r");
        let first_join = g.add_element("join", ElementKind::HashJoin(join_spec()));
        let second_join = g.add_element("join2", ElementKind::HashJoin(join_spec()));
        g.add_edge(l, first_join, 0).unwrap();
        g.add_edge(r, first_join, 1).unwrap();
        // l plays the opposite role in the second join
        g.add_edge(r, second_join, 0).unwrap();
        g.add_edge(l, second_join, 1).unwrap();

        let pattern = ExpressionGraph::of_kinds([ElementType::HashJoin]);
        let mut graph = g;
        for found in Matcher::default().find_all(&graph, &pattern) {
            let result = AnnotateHashJoinLegs.rewrite(graph, &found).unwrap();
            assert!(result.changed);
            graph = result.graph;
        }
        assert!(leg(&graph, l, first_join, STREAMED));
        assert!(leg(&graph, r, first_join, ACCUMULATED));
        assert!(leg(&graph, r, second_join, STREAMED));
        assert!(leg(&graph, l, second_join, ACCUMULATED));
        assert!(graph.require(l).unwrap().annotations.is_empty());

        let found = first(&graph, ElementType::HashJoin);
        let again = AnnotateHashJoinLegs.rewrite(graph, &found).unwrap();
        assert!(!again.changed);
    }

    #[test]
    fn test_fn_transformer() {
        let mut g = ElementGraph::new();
        source(&mut g, "in");
        let rename = FnTransformer::new("mark", |mut graph: ElementGraph, found: &Match| {
            for id in found.primary() {
                graph.set_trap(id, "bad")?;
            }
            Ok(Transformed::yes(graph))
        });
        let found = first(&g, ElementType::Source);
        let out = rename.rewrite(g, &found).unwrap();
        assert_eq!(rename.name(), "mark");
        assert_eq!(out.graph.find_by_name("in").unwrap().trap.as_deref(), Some("bad"));
    }
}
