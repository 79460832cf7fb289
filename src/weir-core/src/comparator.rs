//! Key comparators for grouping and sorting.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::types::{Tuple, Value};

/// User supplied value comparison.
pub type ValueCompareFn = dyn Fn(&Value, &Value) -> Ordering + Send + Sync;

/// Comparison applied to a single key position.
#[derive(Clone, Default)]
pub enum FieldComparator {
    /// Natural value ordering.
    #[default]
    Natural,
    /// Reversed natural ordering.
    Reverse,
    /// Custom ordering. Values comparing equal belong to the same group.
    Custom(Arc<ValueCompareFn>),
}

impl FieldComparator {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match self {
            Self::Natural => a.cmp(b),
            Self::Reverse => b.cmp(a),
            Self::Custom(f) => f(a, b),
        }
    }

    pub fn is_natural(&self) -> bool {
        matches!(self, Self::Natural)
    }
}

impl fmt::Debug for FieldComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Natural => write!(f, "Natural"),
            Self::Reverse => write!(f, "Reverse"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Lexicographic comparator over key tuples.
///
/// Positions without an explicit comparator use natural ordering.
#[derive(Clone, Debug, Default)]
pub struct KeyComparator {
    fields: Vec<FieldComparator>,
}

impl KeyComparator {
    pub fn new(fields: Vec<FieldComparator>) -> Self {
        Self { fields }
    }

    /// Natural ordering on every position.
    pub fn natural() -> Self {
        Self::default()
    }

    /// Reverse ordering on `width` positions.
    pub fn reverse(width: usize) -> Self {
        Self {
            fields: vec![FieldComparator::Reverse; width],
        }
    }

    pub fn field(&self, index: usize) -> &FieldComparator {
        static NATURAL: FieldComparator = FieldComparator::Natural;
        self.fields.get(index).unwrap_or(&NATURAL)
    }

    /// True when no position uses a custom comparator, so keys that compare
    /// equal are also equal values and can be hashed directly.
    pub fn is_hashable(&self) -> bool {
        !self
            .fields
            .iter()
            .any(|f| matches!(f, FieldComparator::Custom(_)))
    }

    pub fn compare(&self, a: &Tuple, b: &Tuple) -> Ordering {
        for (i, (x, y)) in a.values().iter().zip(b.values()).enumerate() {
            match self.field(i).compare(x, y) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        a.len().cmp(&b.len())
    }

    /// Compare two full tuples on `positions`, the i-th position using the
    /// i-th field comparator.
    pub fn compare_at(&self, a: &Tuple, b: &Tuple, positions: &[usize]) -> Ordering {
        for (i, p) in positions.iter().enumerate() {
            if let (Some(x), Some(y)) = (a.get(*p), b.get(*p)) {
                match self.field(i).compare(x, y) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple;

    #[test]
    fn test_natural_and_reverse() {
        let natural = KeyComparator::natural();
        assert_eq!(natural.compare(&tuple![1, 2], &tuple![1, 3]), Ordering::Less);
        let reverse = KeyComparator::reverse(2);
        assert_eq!(reverse.compare(&tuple![1, 2], &tuple![1, 3]), Ordering::Greater);
        assert!(natural.is_hashable());
    }

    #[test]
    fn test_compare_at_positions() {
        let cmp = KeyComparator::new(vec![FieldComparator::Natural, FieldComparator::Reverse]);
        let a = tuple!["x", 1, 5];
        let b = tuple!["y", 1, 9];
        assert_eq!(cmp.compare_at(&a, &b, &[1, 2]), Ordering::Greater);
        assert_eq!(cmp.compare_at(&a, &b, &[1]), Ordering::Equal);
        assert_eq!(KeyComparator::natural().compare_at(&a, &b, &[0]), Ordering::Less);
    }

    #[test]
    fn test_custom_case_insensitive() {
        let cmp = KeyComparator::new(vec![FieldComparator::custom(|a, b| {
            let a = a.as_str().unwrap_or_default().to_lowercase();
            let b = b.as_str().unwrap_or_default().to_lowercase();
            a.cmp(&b)
        })]);
        assert_eq!(cmp.compare(&tuple!["ABC"], &tuple!["abc"]), Ordering::Equal);
        assert!(!cmp.is_hashable());
    }
}
