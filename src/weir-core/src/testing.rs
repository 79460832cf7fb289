//! Test fixtures shared by Weir crates.

use std::sync::Arc;

use crate::types::{Fields, Tuple, TupleEntry, Value};

/// Build an entry from field names and a tuple.
pub fn entry(names: &[&str], tuple: Tuple) -> TupleEntry {
    TupleEntry::new(Arc::new(Fields::from(names)), tuple)
}

/// Integer rows, handy for grouping fixtures.
pub fn int_rows(rows: &[&[i64]]) -> Vec<Tuple> {
    rows.iter()
        .map(|row| row.iter().map(|&v| Value::Int64(v)).collect())
        .collect()
}

/// Sort tuples by natural order so unordered outputs can be compared.
pub fn sorted(mut tuples: Vec<Tuple>) -> Vec<Tuple> {
    tuples.sort();
    tuples
}
