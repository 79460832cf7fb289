//! Predicates over elements and edges.

use std::collections::BTreeSet;
use std::fmt;

use weir_logical::{Edge, ElementGraph, ElementId, ElementType};

/// Topological role an element plays in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// More than one outgoing edge.
    Split,
    /// More than one incoming edge.
    Merge,
    /// Both a split and a merge.
    Splice,
    /// No incoming edges.
    Head,
    /// No outgoing edges.
    Tail,
}

impl Topology {
    pub fn holds(&self, graph: &ElementGraph, id: ElementId) -> bool {
        let ins = graph.in_degree(id);
        let outs = graph.out_degree(id);
        match self {
            Self::Split => outs > 1,
            Self::Merge => ins > 1,
            Self::Splice => ins > 1 && outs > 1,
            Self::Head => ins == 0,
            Self::Tail => outs == 0,
        }
    }
}

/// Boolean predicate over a single element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementExpression {
    /// Matches every element.
    Any,
    /// Element kind is one of `types`, optionally with a topological role.
    Kind {
        types: BTreeSet<ElementType>,
        topology: Option<Topology>,
    },
    /// Element carries the annotation `key = value`.
    Annotated { key: String, value: String },
    And(Vec<ElementExpression>),
    Or(Vec<ElementExpression>),
    Not(Box<ElementExpression>),
}

impl ElementExpression {
    pub fn kind(ty: ElementType) -> Self {
        Self::kinds([ty])
    }

    pub fn kinds(types: impl IntoIterator<Item = ElementType>) -> Self {
        Self::Kind {
            types: types.into_iter().collect(),
            topology: None,
        }
    }

    /// Any kind, constrained by topology.
    pub fn topology(topology: Topology) -> Self {
        Self::Kind {
            types: ElementType::ALL.into_iter().collect(),
            topology: Some(topology),
        }
    }

    pub fn annotated(key: &str, value: &str) -> Self {
        Self::Annotated {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Constrain a kind leaf by topology. Other expressions are wrapped in an AND.
    pub fn with_topology(self, topology: Topology) -> Self {
        match self {
            Self::Kind { types, .. } => Self::Kind {
                types,
                topology: Some(topology),
            },
            other => Self::And(vec![other, Self::topology(topology)]),
        }
    }

    pub fn and(self, other: ElementExpression) -> Self {
        Self::And(vec![self, other])
    }

    pub fn or(self, other: ElementExpression) -> Self {
        Self::Or(vec![self, other])
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn matches(&self, graph: &ElementGraph, id: ElementId) -> bool {
        let Some(element) = graph.element(id) else {
            return false;
        };
        match self {
            Self::Any => true,
            Self::Kind { types, topology } => {
                types.contains(&element.element_type())
                    && topology.map_or(true, |t| t.holds(graph, id))
            }
            Self::Annotated { key, value } => element.has_annotation(key, value),
            Self::And(exprs) => exprs.iter().all(|e| e.matches(graph, id)),
            Self::Or(exprs) => exprs.iter().any(|e| e.matches(graph, id)),
            Self::Not(expr) => !expr.matches(graph, id),
        }
    }
}

impl fmt::Display for ElementExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Kind { types, topology } => {
                let names: Vec<&str> = types.iter().map(ElementType::name).collect();
                write!(f, "{}", names.join("|"))?;
                if let Some(t) = topology {
                    write!(f, "@{t:?}")?;
                }
                Ok(())
            }
            Self::Annotated { key, value } => write!(f, "[{key}={value}]"),
            Self::And(exprs) => join(f, exprs, " & "),
            Self::Or(exprs) => join(f, exprs, " | "),
            Self::Not(expr) => write!(f, "!{expr}"),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, exprs: &[ElementExpression], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{e}")?;
    }
    write!(f, ")")
}

/// Boolean predicate over an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScopeExpression {
    #[default]
    Any,
    /// Edge feeds this input ordinal.
    Ordinal(usize),
    /// Edge carries grouping key fields.
    Keyed,
    /// Edge carries the annotation `key = value`.
    Annotated { key: String, value: String },
    And(Vec<ScopeExpression>),
    Or(Vec<ScopeExpression>),
    Not(Box<ScopeExpression>),
}

impl ScopeExpression {
    pub fn matches(&self, edge: &Edge) -> bool {
        match self {
            Self::Any => true,
            Self::Ordinal(n) => edge.scope.ordinal == *n,
            Self::Keyed => edge.scope.is_keyed(),
            Self::Annotated { key, value } => edge.scope.has_annotation(key, value),
            Self::And(exprs) => exprs.iter().all(|e| e.matches(edge)),
            Self::Or(exprs) => exprs.iter().any(|e| e.matches(edge)),
            Self::Not(expr) => !expr.matches(edge),
        }
    }
}

#[cfg(test)]
mod tests {
    use weir_logical::{ElementKind, Scope, SourceSpec};

    use super::*;

    fn fan_out() -> (ElementGraph, ElementId, ElementId, ElementId) {
        let mut g = ElementGraph::new();
        let s = g.add_element(
            "in",
            ElementKind::Source(SourceSpec {
                fields: ["k"].into(),
            }),
        );
        let a = g.add_element("a", ElementKind::Sink);
        let b = g.add_element("b", ElementKind::Sink);
        g.add_edge(s, a, 0).unwrap();
        g.add_edge(s, b, 0).unwrap();
        (g, s, a, b)
    }

    #[test]
    fn test_kind_and_topology() {
        let (g, s, a, _) = fan_out();
        let split_source = ElementExpression::kind(ElementType::Source).with_topology(Topology::Split);
        assert!(split_source.matches(&g, s));
        assert!(!split_source.matches(&g, a));
        assert!(ElementExpression::topology(Topology::Tail).matches(&g, a));
        assert!(ElementExpression::topology(Topology::Head).matches(&g, s));
        assert!(!ElementExpression::topology(Topology::Merge).matches(&g, a));
    }

    #[test]
    fn test_combinators() {
        let (mut g, s, a, b) = fan_out();
        g.annotate(a, "stream-mode", "streamed").unwrap();
        let expr = ElementExpression::kind(ElementType::Sink)
            .and(ElementExpression::annotated("stream-mode", "streamed").not());
        assert!(!expr.matches(&g, a));
        assert!(expr.matches(&g, b));
        assert!(!expr.matches(&g, s));
        assert!(ElementExpression::Any
            .or(ElementExpression::kind(ElementType::Merge))
            .matches(&g, s));
        assert_eq!(expr.to_string(), "(Sink & ![stream-mode=streamed])");
    }

    #[test]
    fn test_scope_expression() {
        let mut edge = weir_logical::Edge {
            id: weir_logical::EdgeId(0),
            source: ElementId(0),
            target: ElementId(1),
            scope: Scope::new(1),
        };
        edge.scope.annotations.insert("stream-mode".into(), "streamed".into());
        let streamed = ScopeExpression::Annotated {
            key: "stream-mode".into(),
            value: "streamed".into(),
        };
        assert!(streamed.matches(&edge));
        assert!(ScopeExpression::Ordinal(1).matches(&edge));
        assert!(!ScopeExpression::Keyed.matches(&edge));
        assert!(ScopeExpression::Not(Box::new(ScopeExpression::Keyed)).matches(&edge));
        assert!(ScopeExpression::And(vec![ScopeExpression::Any, ScopeExpression::Ordinal(1)])
            .matches(&edge));
    }
}
