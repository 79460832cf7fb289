//! Tuples and schema-tagged entries.

use std::fmt;
use std::sync::Arc;

use common_error::{WeirError, WeirResult};
use serde::{Deserialize, Serialize};

use super::{Fields, Value};

/// Ordered values of one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tuple(Vec<Value>);

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// A tuple of `len` nulls, used to pad missing join sides.
    pub fn nulls(len: usize) -> Self {
        Self(vec![Value::Null; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    /// Project onto positions. Out of range positions are an error.
    pub fn select(&self, positions: &[usize]) -> WeirResult<Tuple> {
        positions
            .iter()
            .map(|&i| {
                self.0.get(i).cloned().ok_or_else(|| {
                    WeirError::internal(format!(
                        "position {i} out of range for tuple of width {}",
                        self.0.len()
                    ))
                })
            })
            .collect::<WeirResult<Vec<_>>>()
            .map(Self)
    }

    /// Concatenate two tuples.
    pub fn append(&self, other: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend_from_slice(&self.0);
        values.extend_from_slice(&other.0);
        Self(values)
    }

    pub fn extend(&mut self, other: Tuple) {
        self.0.extend(other.0);
    }

    /// Rough in-memory footprint in bytes.
    pub fn estimated_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.0.iter().map(Value::estimated_size).sum::<usize>()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Build a [`Tuple`] from values convertible into [`Value`].
#[macro_export]
macro_rules! tuple {
    () => { $crate::Tuple::default() };
    ($($v:expr),+ $(,)?) => {
        $crate::Tuple::new(vec![$($crate::Value::from($v)),+])
    };
}

/// A tuple tagged with the fields naming its positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleEntry {
    fields: Arc<Fields>,
    tuple: Tuple,
}

impl TupleEntry {
    pub fn new(fields: Arc<Fields>, tuple: Tuple) -> Self {
        Self { fields, tuple }
    }

    pub fn fields(&self) -> &Arc<Fields> {
        &self.fields
    }

    pub fn tuple(&self) -> &Tuple {
        &self.tuple
    }

    pub fn into_tuple(self) -> Tuple {
        self.tuple
    }

    /// Value of a named field.
    pub fn get(&self, name: &str) -> WeirResult<&Value> {
        self.fields
            .position(name)
            .and_then(|i| self.tuple.get(i))
            .ok_or_else(|| WeirError::field(format!("unknown field '{name}' in {}", self.fields)))
    }

    /// Project the named fields into a new tuple.
    pub fn select(&self, selector: &Fields) -> WeirResult<Tuple> {
        let positions = self.fields.positions(selector)?;
        self.tuple.select(&positions)
    }

    /// Project into a new entry tagged with `selector`.
    pub fn project(&self, selector: &Fields) -> WeirResult<TupleEntry> {
        Ok(Self {
            fields: Arc::new(selector.clone()),
            tuple: self.select(selector)?,
        })
    }
}

impl fmt::Display for TupleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.fields, self.tuple)
    }
}
