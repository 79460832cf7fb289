//! Ordered field names.

use std::collections::HashSet;
use std::fmt;

use common_error::{WeirError, WeirResult};
use serde::{Deserialize, Serialize};

/// Ordered list of field names naming the positions of a tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fields {
    names: Vec<String>,
}

impl Fields {
    /// Create fields from names. Uniqueness is checked by [`Fields::check_unique`].
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Fields with no names.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Position of a field name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Whether every name in `other` is present here.
    pub fn contains_all(&self, other: &Fields) -> bool {
        other.iter().all(|n| self.contains(n))
    }

    /// Resolve the positions of `selector` within these fields.
    pub fn positions(&self, selector: &Fields) -> WeirResult<Vec<usize>> {
        selector
            .iter()
            .map(|name| {
                self.position(name).ok_or_else(|| {
                    WeirError::field(format!("unknown field '{name}' in {self}"))
                })
            })
            .collect()
    }

    /// Select a subset of fields, in selector order.
    pub fn select(&self, selector: &Fields) -> WeirResult<Fields> {
        let positions = self.positions(selector)?;
        Ok(Self {
            names: positions.into_iter().map(|i| self.names[i].clone()).collect(),
        })
    }

    /// Append `other`, rejecting duplicate names.
    pub fn append(&self, other: &Fields) -> WeirResult<Fields> {
        let mut names = self.names.clone();
        for name in other.iter() {
            if self.contains(name) {
                return Err(WeirError::field(format!(
                    "duplicate field '{name}' appending {other} to {self}"
                )));
            }
            names.push(name.to_string());
        }
        let fields = Self { names };
        fields.check_unique()?;
        Ok(fields)
    }

    /// Rename a single field.
    pub fn rename(&self, from: &str, to: &str) -> WeirResult<Fields> {
        let index = self
            .position(from)
            .ok_or_else(|| WeirError::field(format!("unknown field '{from}' in {self}")))?;
        if from != to && self.contains(to) {
            return Err(WeirError::field(format!(
                "cannot rename '{from}' to existing field '{to}'"
            )));
        }
        let mut names = self.names.clone();
        names[index] = to.to_string();
        Ok(Self { names })
    }

    /// Fail if any name appears twice.
    pub fn check_unique(&self) -> WeirResult<()> {
        let mut seen = HashSet::with_capacity(self.names.len());
        for name in &self.names {
            if !seen.insert(name.as_str()) {
                return Err(WeirError::field(format!("duplicate field '{name}' in {self}")));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}

impl From<&[&str]> for Fields {
    fn from(names: &[&str]) -> Self {
        Self::new(names.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Fields {
    fn from(names: [&str; N]) -> Self {
        Self::new(names)
    }
}

impl From<Vec<String>> for Fields {
    fn from(names: Vec<String>) -> Self {
        Self { names }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_and_positions() {
        let fields = Fields::from(["k", "v", "w"]);
        assert_eq!(fields.positions(&Fields::from(["w", "k"])).unwrap(), vec![2, 0]);
        assert_eq!(fields.select(&Fields::from(["v"])).unwrap(), Fields::from(["v"]));
        assert!(fields.select(&Fields::from(["x"])).is_err());
    }

    #[test]
    fn test_append_rejects_duplicates() {
        let left = Fields::from(["k", "v"]);
        assert_eq!(
            left.append(&Fields::from(["sum"])).unwrap(),
            Fields::from(["k", "v", "sum"])
        );
        let err = left.append(&Fields::from(["v"])).unwrap_err();
        assert!(err.to_string().contains("duplicate field 'v'"));
    }

    #[test]
    fn test_rename() {
        let fields = Fields::from(["k", "v"]);
        assert_eq!(fields.rename("v", "value").unwrap(), Fields::from(["k", "value"]));
        assert!(fields.rename("v", "k").is_err());
        assert!(fields.rename("missing", "x").is_err());
    }

    #[test]
    fn test_check_unique() {
        assert!(Fields::from(["a", "b"]).check_unique().is_ok());
        assert!(Fields::from(["a", "a"]).check_unique().is_err());
        assert_eq!(Fields::from(["a", "b"]).to_string(), "[a, b]");
    }
}
