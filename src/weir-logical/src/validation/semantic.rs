//! Semantic validation for resolved element graphs.

use crate::element::ElementType;
use crate::graph::ElementGraph;

/// A semantic validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticValidationError {
    /// An edge has no resolved fields.
    UnresolvedEdge { edge: String },

    /// An edge into a grouping or join carries no key.
    MissingKey { element: String, ordinal: usize },

    /// A key or sort field is absent from the edge's fields.
    UnknownKeyField { element: String, field: String },
}

impl std::fmt::Display for SemanticValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedEdge { edge } => write!(f, "Edge {edge} has unresolved fields"),
            Self::MissingKey { element, ordinal } => {
                write!(f, "Input {ordinal} of {element} has no grouping key")
            }
            Self::UnknownKeyField { element, field } => {
                write!(f, "Key field '{field}' of {element} is not an input field")
            }
        }
    }
}

impl std::error::Error for SemanticValidationError {}

/// Checks that field resolution left every edge consistent.
pub struct SemanticValidator;

impl SemanticValidator {
    pub fn validate(graph: &ElementGraph) -> Result<(), Vec<SemanticValidationError>> {
        let mut errors = Vec::new();
        for edge in graph.edges() {
            let Some(target) = graph.element(edge.target) else {
                continue;
            };
            let Some(fields) = &edge.scope.fields else {
                errors.push(SemanticValidationError::UnresolvedEdge {
                    edge: format!("{} -> {}", edge.source, edge.target),
                });
                continue;
            };

            let keyed = matches!(
                target.element_type(),
                ElementType::GroupBy | ElementType::CoGroup | ElementType::HashJoin
            );
            if keyed && edge.scope.key_fields.is_none() {
                errors.push(SemanticValidationError::MissingKey {
                    element: target.to_string(),
                    ordinal: edge.scope.ordinal,
                });
            }

            let named = edge
                .scope
                .key_fields
                .iter()
                .chain(edge.scope.sort_fields.iter())
                .flat_map(|f| f.iter());
            for field in named {
                if !fields.contains(field) {
                    errors.push(SemanticValidationError::UnknownKeyField {
                        element: target.to_string(),
                        field: field.to_string(),
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
    use weir_core::Fields;

    use super::*;
    use crate::element::{ElementKind, SourceSpec};
    use crate::resolve::resolve_fields;

    #[test]
    fn test_unresolved_then_resolved() {
        let mut g = ElementGraph::new();
        let s = g.add_element(
            "in",
            ElementKind::Source(SourceSpec {
                fields: Fields::from(["k"]),
            }),
        );
        let out = g.add_element("out", ElementKind::Sink);
        g.add_edge(s, out, 0).unwrap();

        let errors = SemanticValidator::validate(&g).unwrap_err();
        assert!(matches!(errors[0], SemanticValidationError::UnresolvedEdge { .. }));

        resolve_fields(&mut g).unwrap();
        assert!(SemanticValidator::validate(&g).is_ok());
    }
}
