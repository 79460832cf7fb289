//! Integration tests for weir-core
//!
//! These exercise the public surface the planner and engine rely on, without
//! duplicating the unit tests in individual modules.

use std::sync::Arc;

use weir_core::operation::{InnerJoin, OuterJoin, Sum};
use weir_core::testing::{entry, int_rows};
use weir_core::*;

struct Sides {
    key: Tuple,
    sides: Vec<Vec<Tuple>>,
}

impl JoinerClosure for Sides {
    fn key(&self) -> &Tuple {
        &self.key
    }

    fn num_ordinals(&self) -> usize {
        self.sides.len()
    }

    fn width(&self, _ordinal: usize) -> usize {
        2
    }

    fn is_empty(&self, ordinal: usize) -> bool {
        self.sides[ordinal].is_empty()
    }

    fn values(&self, ordinal: usize) -> Box<dyn Iterator<Item = OperationResult<Tuple>> + '_> {
        Box::new(self.sides[ordinal].iter().cloned().map(Ok))
    }
}

struct Group(Fields, Vec<Tuple>);

impl GroupValues for Group {
    fn fields(&self) -> &Fields {
        &self.0
    }

    fn iter(&self) -> Box<dyn Iterator<Item = OperationResult<Tuple>> + '_> {
        Box::new(self.1.iter().cloned().map(Ok))
    }
}

#[test]
fn test_grouping_keys_by_comparator() {
    let rows = int_rows(&[&[2, 5], &[1, 3], &[1, 4]]);
    let fields = Arc::new(Fields::from(["k", "v"]));
    let key_fields = Fields::from(["k"]);

    let mut keyed: Vec<(Tuple, Tuple)> = rows
        .into_iter()
        .map(|t| {
            let e = TupleEntry::new(fields.clone(), t);
            (e.select(&key_fields).unwrap(), e.into_tuple())
        })
        .collect();
    let cmp = KeyComparator::natural();
    keyed.sort_by(|a, b| cmp.compare(&a.0, &b.0));

    let keys: Vec<_> = keyed.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![tuple![1], tuple![1], tuple![2]]);
    // stable sort keeps arrival order among ties
    assert_eq!(keyed[0].1, tuple![1, 3]);
    assert_eq!(keyed[1].1, tuple![1, 4]);
}

#[test]
fn test_sum_over_group() {
    let mut out = OutputCollector::new();
    Sum::new("sum")
        .aggregate(&tuple![1], &Group(Fields::from(["v"]), vec![tuple![3], tuple![4]]), &mut out)
        .unwrap();
    assert_eq!(out.drain(), vec![tuple![7]]);
}

#[test]
fn test_joiners_rescan_sides() {
    let closure = Sides {
        key: tuple![1],
        sides: vec![
            vec![tuple![1, "a"], tuple![1, "b"]],
            vec![tuple![1, "x"]],
        ],
    };
    let mut out = OutputCollector::new();
    InnerJoin.join(&closure, &mut out).unwrap();
    assert_eq!(
        out.drain(),
        vec![tuple![1, "a", 1, "x"], tuple![1, "b", 1, "x"]]
    );

    let lonely = Sides {
        key: tuple![2],
        sides: vec![vec![], vec![tuple![2, "y"]]],
    };
    OuterJoin.join(&lonely, &mut out).unwrap();
    let rows = out.drain();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].get(0).unwrap().is_null());
    assert_eq!(rows[0].get(3).unwrap(), &Value::from("y"));
}

#[test]
fn test_entry_errors_name_the_field() {
    let e = entry(&["k", "v"], tuple![1, 2]);
    let err = e.select(&Fields::from(["missing"])).unwrap_err();
    assert!(err.to_string().contains("missing"));
}
