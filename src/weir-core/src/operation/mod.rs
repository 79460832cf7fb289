//! Per-record operation contracts.
//!
//! Elements delegate their record-level work to these traits. The engine
//! invokes them and decides, based on the [`OperationError`] variant, whether
//! a failure may be diverted to a trap or must abort execution.

mod builtin;
mod joiner;

use std::fmt::Debug;

use common_error::WeirError;
use thiserror::Error;

use crate::types::{Fields, Tuple, TupleEntry};

pub use builtin::{
    Count, FilterNull, First, FnFilter, FnFunction, FnGroupFunction, Identity, Insert, Sum,
};
pub use joiner::{InnerJoin, JoinerClosure, LeftJoin, MixedJoin, OuterJoin, RightJoin};

/// Failure raised by a user operation.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The operation rejected its input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation failed while processing a record.
    #[error("{0}")]
    Failed(String),

    /// Reading buffered input failed. Never diverted to a trap.
    #[error(transparent)]
    Resource(#[from] WeirError),
}

impl OperationError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn failed<S: Into<String>>(msg: S) -> Self {
        Self::Failed(msg.into())
    }

    /// Whether a trap may absorb this failure.
    pub fn is_trappable(&self) -> bool {
        !matches!(self, Self::Resource(_))
    }
}

impl From<OperationError> for WeirError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::Resource(inner) => inner,
            other => WeirError::operation(other.to_string()),
        }
    }
}

/// Result of a user operation.
pub type OperationResult<T = ()> = Result<T, OperationError>;

/// Receives tuples emitted by an operation.
#[derive(Debug, Default)]
pub struct OutputCollector {
    tuples: Vec<Tuple>,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, tuple: Tuple) {
        self.tuples.push(tuple);
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Take everything emitted so far.
    pub fn drain(&mut self) -> Vec<Tuple> {
        std::mem::take(&mut self.tuples)
    }
}

/// Map-like operation applied to each record's argument fields.
pub trait Function: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Fields of every tuple this function emits.
    fn declared_fields(&self) -> &Fields;

    /// Emit zero or more result tuples for `args`.
    fn operate(&self, args: &TupleEntry, output: &mut OutputCollector) -> OperationResult;
}

/// Record predicate. Returning `true` removes the record.
pub trait Filter: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn is_remove(&self, args: &TupleEntry) -> OperationResult<bool>;
}

/// Repeatable view over one group's argument values.
pub trait GroupValues {
    /// Fields tagging every value.
    fn fields(&self) -> &Fields;

    /// Iterate the group from the start. May be called repeatedly.
    fn iter(&self) -> Box<dyn Iterator<Item = OperationResult<Tuple>> + '_>;
}

/// Full-group aggregation run once per key after a grouping.
pub trait GroupFunction: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn declared_fields(&self) -> &Fields;

    /// Emit result tuples for the group identified by `key`.
    fn aggregate(
        &self,
        key: &Tuple,
        values: &dyn GroupValues,
        output: &mut OutputCollector,
    ) -> OperationResult;
}

/// Combines the per-ordinal value sequences of one key into joined tuples.
///
/// Each emitted tuple is the concatenation of one tuple per ordinal.
pub trait Joiner: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn join(&self, closure: &dyn JoinerClosure, output: &mut OutputCollector) -> OperationResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_conversion() {
        let err: WeirError = OperationError::failed("bad record").into();
        assert!(err.is_operation());

        let err: WeirError = OperationError::Resource(WeirError::spill("truncated")).into();
        assert!(matches!(err, WeirError::SpillError(_)));
        assert!(!OperationError::Resource(WeirError::spill("x")).is_trappable());
        assert!(OperationError::invalid_argument("x").is_trappable());
    }

    #[test]
    fn test_collector_drain() {
        let mut out = OutputCollector::new();
        out.emit(crate::tuple![1]);
        out.emit(crate::tuple![2]);
        assert_eq!(out.len(), 2);
        assert_eq!(out.drain().len(), 2);
        assert!(out.is_empty());
    }
}
