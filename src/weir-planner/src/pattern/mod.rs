//! Expression graphs: small pattern graphs matched against element graphs.
//!
//! Pattern nodes are [`ElementExpression`]s tagged with a [`CaptureRole`];
//! arcs are [`ScopeExpression`]s that must hold on a direct edge or on the
//! last edge of a path between the captured elements.

mod expression;
mod matcher;

pub use expression::{ElementExpression, ScopeExpression, Topology};
pub use matcher::{Match, Matcher};

use std::collections::HashSet;
use std::fmt;

use weir_logical::{ElementGraph, ElementId, ElementType};

/// How a matched element participates in a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CaptureRole {
    /// The element the rule acts on.
    Primary,
    /// Context the rule may also touch.
    Secondary,
    /// Matched context only.
    Include,
    /// Negative condition: a match is rejected when this node can be bound.
    Exclude,
}

impl fmt::Display for CaptureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primary => "Primary",
            Self::Secondary => "Secondary",
            Self::Include => "Include",
            Self::Exclude => "Exclude",
        };
        f.write_str(name)
    }
}

/// Whether an arc spans one edge or a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcKind {
    Direct,
    /// A path of one or more edges. The arc's scope expression applies to
    /// the edge entering the target.
    Transitive,
    /// A transitive path none of whose inner elements match the arc's
    /// `avoiding` expression.
    Avoiding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternNode {
    pub expression: ElementExpression,
    pub role: CaptureRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternArc {
    pub from: usize,
    pub to: usize,
    pub kind: ArcKind,
    pub scope: ScopeExpression,
    /// Elements an [`ArcKind::Avoiding`] path may not pass through.
    pub avoiding: Option<ElementExpression>,
}

impl PatternArc {
    /// Whether the arc holds between two graph elements.
    pub fn holds(&self, graph: &ElementGraph, from: ElementId, to: ElementId) -> bool {
        graph.incoming(to).into_iter().any(|edge| {
            self.scope.matches(edge)
                && match self.kind {
                    ArcKind::Direct => edge.source == from,
                    ArcKind::Transitive => edge.source == from || graph.reaches(from, edge.source),
                    ArcKind::Avoiding => {
                        edge.source == from
                            || self.avoiding.as_ref().map_or(true, |avoid| {
                                !avoid.matches(graph, edge.source)
                                    && reaches_avoiding(graph, from, edge.source, avoid)
                            })
                    }
                }
        })
    }
}

/// Whether `to` is reachable from `from` without passing through an element
/// matching `avoid`.
fn reaches_avoiding(
    graph: &ElementGraph,
    from: ElementId,
    to: ElementId,
    avoid: &ElementExpression,
) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
        for next in graph.successors(id) {
            if next == to {
                return true;
            }
            if !avoid.matches(graph, next) && seen.insert(next) {
                stack.push(next);
            }
        }
    }
    false
}

/// A pattern over an element graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionGraph {
    nodes: Vec<PatternNode>,
    arcs: Vec<PatternArc>,
}

impl ExpressionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pattern of one primary node.
    pub fn single(expression: ElementExpression) -> Self {
        let mut graph = Self::new();
        graph.add(expression, CaptureRole::Primary);
        graph
    }

    /// A single primary node matching any of `types`.
    pub fn of_kinds(types: impl IntoIterator<Item = ElementType>) -> Self {
        Self::single(ElementExpression::kinds(types))
    }

    /// Add a node, returning its index.
    pub fn add(&mut self, expression: ElementExpression, role: CaptureRole) -> usize {
        self.nodes.push(PatternNode { expression, role });
        self.nodes.len() - 1
    }

    pub fn connect(&mut self, from: usize, to: usize, scope: ScopeExpression) -> &mut Self {
        self.arcs.push(PatternArc {
            from,
            to,
            kind: ArcKind::Direct,
            scope,
            avoiding: None,
        });
        self
    }

    pub fn connect_transitive(&mut self, from: usize, to: usize) -> &mut Self {
        self.arcs.push(PatternArc {
            from,
            to,
            kind: ArcKind::Transitive,
            scope: ScopeExpression::Any,
            avoiding: None,
        });
        self
    }

    /// A path from `from` to `to` that never passes through an element
    /// matching `avoid`. Unlike an excluded node, this is decided per path:
    /// one guarded path does not hide another unguarded one.
    pub fn connect_avoiding(&mut self, from: usize, to: usize, avoid: ElementExpression) -> &mut Self {
        self.arcs.push(PatternArc {
            from,
            to,
            kind: ArcKind::Avoiding,
            scope: ScopeExpression::Any,
            avoiding: Some(avoid),
        });
        self
    }

    pub fn nodes(&self) -> &[PatternNode] {
        &self.nodes
    }

    pub fn arcs(&self) -> &[PatternArc] {
        &self.arcs
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a previously found match still holds on `graph`.
    pub fn verify(&self, graph: &ElementGraph, found: &Match) -> bool {
        let bound = |node: usize| found.binding(node);
        let nodes_hold = found.bindings().iter().all(|(node, id)| {
            self.nodes
                .get(*node)
                .is_some_and(|n| n.expression.matches(graph, *id))
        });
        nodes_hold
            && self.arcs.iter().all(|arc| match (bound(arc.from), bound(arc.to)) {
                (Some(from), Some(to)) => arc.holds(graph, from, to),
                _ => true,
            })
    }
}

impl fmt::Display for ExpressionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes: Vec<String> = self
            .nodes
            .iter()
            .map(|n| format!("{}:{}", n.role, n.expression))
            .collect();
        write!(f, "{{{}}}", nodes.join(", "))?;
        for arc in &self.arcs {
            let arrow = match arc.kind {
                ArcKind::Direct => "->",
                ArcKind::Transitive | ArcKind::Avoiding => "->*",
            };
            write!(f, " {}{arrow}{}", arc.from, arc.to)?;
            if let Some(avoid) = &arc.avoiding {
                write!(f, "!{avoid}")?;
            }
        }
        Ok(())
    }
}
