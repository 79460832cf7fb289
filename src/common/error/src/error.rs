//! Core error types for Weir.

use thiserror::Error;

/// Result type alias using `WeirError`.
pub type WeirResult<T> = std::result::Result<T, WeirError>;

/// Core error type for Weir operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WeirError {
    /// Field resolution failed (unknown field, duplicate name, mismatched inputs).
    #[error("FieldError: {0}")]
    FieldError(String),

    /// Invalid value provided.
    #[error("ValueError: {0}")]
    ValueError(String),

    /// Malformed element graph (bad arity, cycle, missing element).
    #[error("GraphError: {0}")]
    GraphError(String),

    /// The planner rejected the pipeline.
    #[error("PlanningError: {0}")]
    PlanningError(String),

    /// A per-record operation failed and no trap was bound.
    #[error("OperationError: {0}")]
    OperationError(String),

    /// Stream execution failure.
    #[error("ExecutionError: {0}")]
    ExecutionError(String),

    /// Spill file could not be written or read back.
    #[error("SpillError: {0}")]
    SpillError(String),

    /// External tap failure.
    #[error("TapError: {0}")]
    TapError(String),

    /// Execution was stopped on request.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Feature not yet implemented.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Internal error (bug in Weir).
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error.
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    /// Arrow error.
    #[error("ArrowError: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Invalid parameter provided.
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),
}

impl WeirError {
    /// Create a new `FieldError`.
    pub fn field<S: Into<String>>(msg: S) -> Self {
        Self::FieldError(msg.into())
    }

    /// Create a new `ValueError`.
    pub fn value_error<S: Into<String>>(msg: S) -> Self {
        Self::ValueError(msg.into())
    }

    /// Create a new `GraphError`.
    pub fn graph<S: Into<String>>(msg: S) -> Self {
        Self::GraphError(msg.into())
    }

    /// Create a new `PlanningError`.
    pub fn planning<S: Into<String>>(msg: S) -> Self {
        Self::PlanningError(msg.into())
    }

    /// Create a new `OperationError`.
    pub fn operation<S: Into<String>>(msg: S) -> Self {
        Self::OperationError(msg.into())
    }

    /// Create a new `ExecutionError`.
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionError(msg.into())
    }

    /// Create a new `SpillError`.
    pub fn spill<S: Into<String>>(msg: S) -> Self {
        Self::SpillError(msg.into())
    }

    /// Create a new `TapError`.
    pub fn tap<S: Into<String>>(msg: S) -> Self {
        Self::TapError(msg.into())
    }

    /// Create a cancellation error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a new `NotImplemented` error.
    pub fn not_implemented<S: Into<String>>(msg: S) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Create a new `InvalidParameter` error.
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Whether this error came from a per-record operation.
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::OperationError(_))
    }
}

/// Ensure a condition holds, returning an `ExecutionError` if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::WeirError::ExecutionError($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::WeirError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with a `GraphError`.
#[macro_export]
macro_rules! graph_err {
    ($($arg:tt)*) => {
        return Err($crate::WeirError::GraphError(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WeirError::field("unknown field 'k' in [v]");
        assert_eq!(err.to_string(), "FieldError: unknown field 'k' in [v]");
    }

    #[test]
    fn test_error_constructors() {
        let _ = WeirError::graph("cycle");
        let _ = WeirError::planning("rule failed");
        let _ = WeirError::spill("disk full");
        let _ = WeirError::tap("reader closed");
        let _ = WeirError::internal("unexpected state");
    }

    #[test]
    fn test_error_classification() {
        assert!(WeirError::cancelled("stop").is_cancelled());
        assert!(!WeirError::execution("boom").is_cancelled());
        assert!(WeirError::operation("bad record").is_operation());
    }

    fn checked(flag: bool) -> WeirResult<()> {
        ensure!(flag, GraphError: "flag was {}", flag);
        Ok(())
    }

    #[test]
    fn test_ensure_macro() {
        assert!(checked(true).is_ok());
        let err = checked(false).unwrap_err();
        assert_eq!(err.to_string(), "GraphError: flag was false");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "gone");
        let err: WeirError = io.into();
        assert!(matches!(err, WeirError::IoError(_)));
    }
}
