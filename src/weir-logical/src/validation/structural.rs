//! Structural validation for element graphs.

use std::collections::{BTreeSet, HashSet};

use crate::element::{ElementKind, ElementType};
use crate::graph::ElementGraph;

/// A structural validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralValidationError {
    /// The graph has no elements.
    EmptyGraph,

    /// The graph contains a cycle.
    CycleDetected {
        /// Description of the elements on the cycle.
        location: String,
    },

    /// An element has the wrong number of inputs.
    InvalidArity {
        element: String,
        expected: String,
        actual: usize,
    },

    /// Input ordinals are not `0..n`.
    NonDenseOrdinals { element: String, ordinals: Vec<usize> },

    /// A sink feeds another element.
    SinkHasOutputs { element: String },

    /// An element appears where its kind is not allowed.
    InvalidSequence { message: String },

    /// Two sources or two sinks share a name, so taps cannot be bound.
    DuplicateName { name: String },
}

impl std::fmt::Display for StructuralValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyGraph => write!(f, "Graph is empty"),
            Self::CycleDetected { location } => write!(f, "Cycle detected: {location}"),
            Self::InvalidArity {
                element,
                expected,
                actual,
            } => write!(
                f,
                "Invalid arity for {element}: expected {expected} inputs, got {actual}"
            ),
            Self::NonDenseOrdinals { element, ordinals } => {
                write!(f, "Input ordinals of {element} are not dense: {ordinals:?}")
            }
            Self::SinkHasOutputs { element } => write!(f, "{element} is a sink with outputs"),
            Self::InvalidSequence { message } => write!(f, "Invalid element sequence: {message}"),
            Self::DuplicateName { name } => write!(f, "Duplicate source or sink name '{name}'"),
        }
    }
}

impl std::error::Error for StructuralValidationError {}

/// Structural validator for element graphs.
pub struct StructuralValidator;

impl StructuralValidator {
    /// Validate the structural integrity of a graph.
    pub fn validate(graph: &ElementGraph) -> Result<(), Vec<StructuralValidationError>> {
        if graph.is_empty() {
            return Err(vec![StructuralValidationError::EmptyGraph]);
        }

        let mut errors = Vec::new();
        if let Err(e) = graph.topological_order() {
            errors.push(StructuralValidationError::CycleDetected {
                location: e.to_string(),
            });
        }

        let mut endpoint_names = HashSet::new();
        for element in graph.elements() {
            let incoming = graph.incoming(element.id);
            let actual = incoming.len();
            let ty = element.element_type();

            let expected = match ty {
                ElementType::Source => (actual != 0).then_some("0"),
                ElementType::Each
                | ElementType::Filter
                | ElementType::Every
                | ElementType::Boundary
                | ElementType::Sink => (actual != 1).then_some("exactly 1"),
                _ => (actual == 0).then_some("at least 1"),
            };
            if let Some(expected) = expected {
                errors.push(StructuralValidationError::InvalidArity {
                    element: element.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }

            let ordinals: Vec<usize> = incoming.iter().map(|e| e.scope.ordinal).collect();
            let dense: BTreeSet<usize> = ordinals.iter().copied().collect();
            if dense.len() != ordinals.len() || ordinals.iter().enumerate().any(|(i, o)| i != *o) {
                errors.push(StructuralValidationError::NonDenseOrdinals {
                    element: element.to_string(),
                    ordinals,
                });
            }

            if ty == ElementType::Sink && graph.out_degree(element.id) > 0 {
                errors.push(StructuralValidationError::SinkHasOutputs {
                    element: element.to_string(),
                });
            }

            if matches!(ty, ElementType::Source | ElementType::Sink)
                && !endpoint_names.insert((ty, element.name.clone()))
            {
                errors.push(StructuralValidationError::DuplicateName {
                    name: element.name.clone(),
                });
            }

            if let ElementKind::Every(_) = element.kind {
                let upstream_ok = incoming
                    .first()
                    .and_then(|e| graph.element(e.source))
                    .map(|p| {
                        matches!(
                            p.element_type(),
                            ElementType::GroupBy | ElementType::CoGroup | ElementType::Every
                        )
                    })
                    .unwrap_or(false);
                if !upstream_ok {
                    errors.push(StructuralValidationError::InvalidSequence {
                        message: format!("{element} must follow GroupBy, CoGroup or Every"),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use weir_core::operation::Count;
    use weir_core::Fields;

    use super::*;
    use crate::element::{EverySpec, SourceSpec};

    fn source(g: &mut ElementGraph, name: &str) -> crate::ElementId {
        g.add_element(
            name,
            ElementKind::Source(SourceSpec {
                fields: Fields::from(["k"]),
            }),
        )
    }

    #[test]
    fn test_empty_graph() {
        let errors = StructuralValidator::validate(&ElementGraph::new()).unwrap_err();
        assert_eq!(errors, vec![StructuralValidationError::EmptyGraph]);
    }

    #[test]
    fn test_missing_inputs() {
        let mut g = ElementGraph::new();
        source(&mut g, "in");
        g.add_element("orphan", ElementKind::Sink);
        let errors = StructuralValidator::validate(&g).unwrap_err();
        assert!(matches!(
            &errors[0],
            StructuralValidationError::InvalidArity { actual: 0, .. }
        ));
    }

    #[test]
    fn test_every_needs_grouping() {
        let mut g = ElementGraph::new();
        let s = source(&mut g, "in");
        let every = g.add_element(
            "count",
            ElementKind::Every(EverySpec {
                argument: None,
                function: Arc::new(Count::new("n")),
            }),
        );
        g.add_edge(s, every, 0).unwrap();
        let out = g.add_element("out", ElementKind::Sink);
        g.add_edge(every, out, 0).unwrap();
        let errors = StructuralValidator::validate(&g).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralValidationError::InvalidSequence { .. })));
    }

    #[test]
    fn test_sparse_ordinals_and_duplicate_names() {
        let mut g = ElementGraph::new();
        let a = source(&mut g, "in");
        let b = source(&mut g, "in");
        let m = g.add_element("m", ElementKind::Merge);
        g.add_edge(a, m, 0).unwrap();
        g.add_edge(b, m, 2).unwrap();
        let out = g.add_element("out", ElementKind::Sink);
        g.add_edge(m, out, 0).unwrap();
        let errors = StructuralValidator::validate(&g).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralValidationError::NonDenseOrdinals { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, StructuralValidationError::DuplicateName { .. })));
    }
}
