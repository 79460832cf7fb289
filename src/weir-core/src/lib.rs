//! Core record model for Weir pipelines.
//!
//! This crate provides the types every other Weir crate speaks:
//! - `Value`, `Tuple`, `Fields` and `TupleEntry` for records
//! - `KeyComparator` and `FieldComparator` for grouping order
//! - `Function`, `Filter`, `GroupFunction` and `Joiner` operation contracts

pub mod comparator;
pub mod operation;
pub mod testing;
pub mod types;

mod proptest_utils;

// Re-export commonly used types
pub use comparator::{FieldComparator, KeyComparator, ValueCompareFn};
pub use operation::{
    Filter, Function, GroupFunction, GroupValues, Joiner, JoinerClosure, OperationError,
    OperationResult, OutputCollector,
};
pub use types::{Fields, Tuple, TupleEntry, Value};
