//! Planner rules.
//!
//! A rule pairs an [`ExpressionGraph`] with an action:
//!
//! - **Assert**: any match aborts planning with a rendered message
//! - **Transform**: each match is handed to a [`GraphTransformer`]
//! - **Partition**: primary captures become cut points for steps or nodes
//!
//! Rules are plain data. Transformers are pure functions of
//! `(graph, match) -> graph`, so they can be tested without a planner.

mod transformers;

pub use transformers::{
    Annotate, AnnotateHashJoinLegs, FnTransformer, InsertBoundary, Placement, RemoveBranch,
    SpliceOut,
};

use std::fmt;
use std::sync::Arc;

use common_error::WeirResult;
use weir_logical::ElementGraph;

use crate::pattern::{CaptureRole, ExpressionGraph, Match};

/// Rewrites the graph for one match.
pub trait GraphTransformer: Send + Sync {
    fn name(&self) -> &str;

    /// Apply the rewrite. Returns the graph unchanged when the match calls
    /// for no work.
    fn rewrite(&self, graph: ElementGraph, found: &Match) -> WeirResult<Transformed>;
}

/// The result of applying a transformer.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub graph: ElementGraph,
    pub changed: bool,
}

impl Transformed {
    pub fn yes(graph: ElementGraph) -> Self {
        Self {
            graph,
            changed: true,
        }
    }

    pub fn no(graph: ElementGraph) -> Self {
        Self {
            graph,
            changed: false,
        }
    }
}

impl From<ElementGraph> for Transformed {
    fn from(graph: ElementGraph) -> Self {
        Self::no(graph)
    }
}

/// Rejects any graph the expression matches.
#[derive(Clone)]
pub struct AssertRule {
    pub name: String,
    pub expression: ExpressionGraph,
    /// Message template. `{Primary}`, `{Secondary}` and `{Include}` are
    /// replaced by the captured elements.
    pub message: String,
}

impl AssertRule {
    pub fn new(name: impl Into<String>, expression: ExpressionGraph, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression,
            message: message.into(),
        }
    }

    pub fn render(&self, graph: &ElementGraph, found: &Match) -> String {
        let describe = |role: CaptureRole| {
            found
                .captured(role)
                .into_iter()
                .map(|id| match graph.element(id) {
                    Some(element) => element.to_string(),
                    None => id.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.message
            .replace("{Primary}", &describe(CaptureRole::Primary))
            .replace("{Secondary}", &describe(CaptureRole::Secondary))
            .replace("{Include}", &describe(CaptureRole::Include))
    }
}

/// Rewrites each match with a transformer.
#[derive(Clone)]
pub struct TransformRule {
    pub name: String,
    pub expression: ExpressionGraph,
    pub transformer: Arc<dyn GraphTransformer>,
    /// Re-match and re-apply until the graph stops changing.
    pub iterative: bool,
}

impl TransformRule {
    pub fn new(
        name: impl Into<String>,
        expression: ExpressionGraph,
        transformer: impl GraphTransformer + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            expression,
            transformer: Arc::new(transformer),
            iterative: false,
        }
    }

    pub fn iterative(mut self) -> Self {
        self.iterative = true;
        self
    }
}

/// Cuts the graph at the primary captures of every match.
#[derive(Debug, Clone)]
pub struct PartitionRule {
    pub name: String,
    pub expression: ExpressionGraph,
}

impl PartitionRule {
    pub fn new(name: impl Into<String>, expression: ExpressionGraph) -> Self {
        Self {
            name: name.into(),
            expression,
        }
    }
}

#[derive(Clone)]
pub enum Rule {
    Assert(AssertRule),
    Transform(TransformRule),
    Partition(PartitionRule),
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Self::Assert(r) => &r.name,
            Self::Transform(r) => &r.name,
            Self::Partition(r) => &r.name,
        }
    }

    pub fn expression(&self) -> &ExpressionGraph {
        match self {
            Self::Assert(r) => &r.expression,
            Self::Transform(r) => &r.expression,
            Self::Partition(r) => &r.expression,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Assert(_) => "assert",
            Self::Transform(_) => "transform",
            Self::Partition(_) => "partition",
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("kind", &self.kind_name())
            .field("name", &self.name())
            .field("expression", &self.expression().to_string())
            .finish()
    }
}

impl From<AssertRule> for Rule {
    fn from(rule: AssertRule) -> Self {
        Self::Assert(rule)
    }
}

impl From<TransformRule> for Rule {
    fn from(rule: TransformRule) -> Self {
        Self::Transform(rule)
    }
}

impl From<PartitionRule> for Rule {
    fn from(rule: PartitionRule) -> Self {
        Self::Partition(rule)
    }
}

#[cfg(test)]
mod tests {
    use weir_core::operation::InnerJoin;
    use weir_logical::{ElementKind, ElementType, JoinSpec, SourceSpec};

    use super::*;
    use crate::pattern::Matcher;

    #[test]
    fn test_assert_message_rendering() {
        let mut g = ElementGraph::new();
        let l = g.add_element("l", ElementKind::Source(SourceSpec { fields: ["a"].into() }));
        let r = g.add_element("r", ElementKind::Source(SourceSpec { fields: ["b"].into() }));
        let join = g.add_element(
            "join",
            ElementKind::HashJoin(JoinSpec::new(vec![["a"].into(), ["b"].into()], Arc::new(InnerJoin))),
        );
        g.add_edge(l, join, 0).unwrap();
        g.add_edge(r, join, 1).unwrap();

        let rule = AssertRule::new(
            "no-hash-join",
            ExpressionGraph::of_kinds([ElementType::HashJoin]),
            "hash joins are not supported: {Primary}",
        );
        let found = Matcher::default().find_first(&g, &rule.expression).unwrap();
        assert_eq!(
            rule.render(&g, &found),
            "hash joins are not supported: HashJoin[e2] 'join'"
        );
    }

    #[test]
    fn test_rule_accessors() {
        let rule: Rule = PartitionRule::new(
            "steps",
            ExpressionGraph::of_kinds([ElementType::Boundary]),
        )
        .into();
        assert_eq!(rule.name(), "steps");
        assert_eq!(rule.kind_name(), "partition");
        assert!(format!("{rule:?}").contains("Boundary"));
    }
}
