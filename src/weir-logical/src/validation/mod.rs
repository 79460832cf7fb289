//! Validation layer for element graphs.
//!
//! Structural validation runs on a freshly built graph: non-empty, acyclic,
//! correct input arity and dense ordinals. Semantic validation runs after
//! field resolution and checks that every edge carries consistent fields.

mod semantic;
mod structural;

pub use semantic::{SemanticValidationError, SemanticValidator};
pub use structural::{StructuralValidationError, StructuralValidator};

use common_error::{WeirError, WeirResult};

use crate::graph::ElementGraph;

/// A validation error that can occur during graph validation.
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Structural validation error.
    Structural(StructuralValidationError),
    /// Semantic validation error.
    Semantic(SemanticValidationError),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structural(e) => write!(f, "Structural error: {e}"),
            Self::Semantic(e) => write!(f, "Semantic error: {e}"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<StructuralValidationError> for ValidationError {
    fn from(e: StructuralValidationError) -> Self {
        Self::Structural(e)
    }
}

impl From<SemanticValidationError> for ValidationError {
    fn from(e: SemanticValidationError) -> Self {
        Self::Semantic(e)
    }
}

/// Run both validators, collecting every error.
pub fn validate_graph(graph: &ElementGraph) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    if let Err(structural) = StructuralValidator::validate(graph) {
        errors.extend(structural.into_iter().map(ValidationError::Structural));
    }
    if let Err(semantic) = SemanticValidator::validate(graph) {
        errors.extend(semantic.into_iter().map(ValidationError::Semantic));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Collapse a list of validation errors into one `WeirError`.
pub fn into_weir_error<E: std::fmt::Display>(errors: &[E], wrap: fn(String) -> WeirError) -> WeirError {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    wrap(messages.join("; "))
}

/// Structural validation as a `WeirResult`.
pub fn check_structure(graph: &ElementGraph) -> WeirResult<()> {
    StructuralValidator::validate(graph)
        .map_err(|errors| into_weir_error(&errors, WeirError::GraphError))
}
