//! Runtime value representation.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Runtime value carried in a tuple position.
///
/// Values have a total natural ordering so they can serve as grouping keys.
/// Kinds sort as `Null`, booleans, numbers, strings, then binary. `Int64`
/// and `Float64` compare exactly by numeric value, with NaN after every other
/// number. Equality and hashing agree with that ordering, so `Int64(1)` and
/// `Float64(1.0)` are the same key while `Int64(2^53 + 1)` and
/// `Float64(2^53)` are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(#[serde(with = "float_repr")] f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Binary(Vec<u8>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Self::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64, widening integers.
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Self::Float64(f) => Some(*f),
            Self::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int64(_) => "Int64",
            Self::Float64(_) => "Float64",
            Self::String(_) => "String",
            Self::Binary(_) => "Binary",
        }
    }

    /// Rough in-memory footprint, used for spill byte thresholds.
    pub fn estimated_size(&self) -> usize {
        let inline = std::mem::size_of::<Self>();
        match self {
            Self::String(s) => inline + s.len(),
            Self::Binary(b) => inline + b.len(),
            _ => inline,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int64(_) | Self::Float64(_) => 2,
            Self::String(_) => 3,
            Self::Binary(_) => 4,
        }
    }

    /// Natural ordering across all values.
    pub fn natural_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Int64(a), Self::Float64(b)) => cmp_int_float(*a, *b),
            (Self::Float64(a), Self::Int64(b)) => cmp_int_float(*b, *a).reverse(),
            (Self::Float64(a), Self::Float64(b)) => cmp_f64(*a, *b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Total order on floats: NaN last, -0.0 equal to 0.0.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Exact comparison of an integer with a float, without rounding the integer.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() || f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => cmp_f64(0.0, f - whole),
        other => other,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.natural_cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.natural_cmp(other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            // An integer equals a float only when the float holds it exactly,
            // so both hash through the float bits.
            Self::Int64(i) => (*i as f64).to_bits().hash(state),
            Self::Float64(f) => {
                let canonical = if f.is_nan() {
                    f64::NAN
                } else if *f == 0.0 {
                    0.0
                } else {
                    *f
                };
                canonical.to_bits().hash(state);
            }
            Self::String(s) => s.hash(state),
            Self::Binary(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int64(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float64(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// JSON cannot carry non-finite floats; those travel as strings.
mod float_repr {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Finite(f64),
        Special(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            Repr::Finite(*value).serialize(serializer)
        } else if value.is_nan() {
            Repr::Special("NaN".to_string()).serialize(serializer)
        } else if value.is_sign_positive() {
            Repr::Special("inf".to_string()).serialize(serializer)
        } else {
            Repr::Special("-inf".to_string()).serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Finite(v) => Ok(v),
            Repr::Special(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!(
                    "invalid float literal '{other}'"
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42i64).as_int64(), Some(42));
        assert_eq!(Value::from(2.5f64).as_float64(), Some(2.5));
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert!(Value::from(None::<i64>).is_null());
    }

    #[test]
    fn test_natural_ordering() {
        let mut values = vec![
            Value::from("b"),
            Value::Float64(f64::NAN),
            Value::from(3i64),
            Value::Null,
            Value::from(1.5f64),
            Value::from("a"),
        ];
        values.sort();
        assert!(values[0].is_null());
        assert_eq!(values[1], Value::Float64(1.5));
        assert_eq!(values[2], Value::Int64(3));
        assert!(matches!(values[3], Value::Float64(f) if f.is_nan()));
        assert_eq!(values[4], Value::from("a"));
    }

    #[test]
    fn test_numeric_equality_and_hash() {
        let a = Value::Int64(7);
        let b = Value::Float64(7.0);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&Value::Float64(0.0)), hash_of(&Value::Float64(-0.0)));
    }

    #[test]
    fn test_mixed_numeric_comparison_is_exact() {
        let two_53 = 1i64 << 53;
        let a = Value::Int64(two_53);
        let b = Value::Float64(two_53 as f64);
        let c = Value::Int64(two_53 + 1);
        assert_eq!(a, b);
        assert_ne!(b, c);
        assert!(b < c && a < c);

        assert!(Value::Int64(i64::MAX) < Value::Float64(9.3e18));
        assert!(Value::Int64(i64::MIN) > Value::Float64(-1e19));
        assert!(Value::Int64(2) > Value::Float64(1.5));
        assert!(Value::Int64(-2) < Value::Float64(-1.5));
        assert!(Value::Int64(-1) > Value::Float64(-1.5));
        assert!(Value::Int64(i64::MAX) < Value::Float64(f64::NAN));
        assert_eq!(Value::Int64(0), Value::Float64(-0.0));
    }

    #[test]
    fn test_kind_order() {
        let mut values = vec![
            Value::Binary(vec![1]),
            Value::from("s"),
            Value::from(1i64),
            Value::Bool(true),
            Value::Null,
        ];
        values.sort();
        let kinds: Vec<_> = values.iter().map(Value::type_name).collect();
        assert_eq!(kinds, ["Null", "Bool", "Int64", "String", "Binary"]);
    }

    #[test]
    fn test_non_finite_json_roundtrip() {
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1.25] {
            let json = serde_json::to_string(&Value::Float64(v)).unwrap();
            let back: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(back, Value::Float64(v));
        }
    }
}
