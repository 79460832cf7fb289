//! Per-key views handed to joiners and group functions.

use std::iter;

use weir_core::{Fields, GroupValues, JoinerClosure, OperationError, OperationResult, Tuple};

use crate::spill::SpillableList;

/// One ordinal's values at a key.
#[derive(Debug)]
pub enum ClosureSide<'a> {
    /// The ordinal has no values at this key.
    Empty,
    List(&'a SpillableList<Tuple>),
    /// A single streamed record.
    Record(&'a Tuple),
}

impl ClosureSide<'_> {
    fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::List(list) => list.is_empty(),
            Self::Record(_) => false,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::List(list) => list.len(),
            Self::Record(_) => 1,
        }
    }
}

/// The values of one key, one sequence per input ordinal.
///
/// Every sequence can be iterated any number of times.
#[derive(Debug)]
pub struct Closure<'a> {
    key: &'a Tuple,
    widths: &'a [usize],
    sides: Vec<ClosureSide<'a>>,
}

impl<'a> Closure<'a> {
    /// `widths[i]` is the tuple width on ordinal `i`; `sides` must have the
    /// same length.
    pub fn new(key: &'a Tuple, widths: &'a [usize], sides: Vec<ClosureSide<'a>>) -> Self {
        debug_assert_eq!(widths.len(), sides.len());
        Self { key, widths, sides }
    }

    pub fn side(&self, ordinal: usize) -> Option<&ClosureSide<'a>> {
        self.sides.get(ordinal)
    }

    /// Values on `ordinal`.
    pub fn len(&self, ordinal: usize) -> usize {
        self.sides.get(ordinal).map_or(0, ClosureSide::len)
    }
}

impl JoinerClosure for Closure<'_> {
    fn key(&self) -> &Tuple {
        self.key
    }

    fn num_ordinals(&self) -> usize {
        self.sides.len()
    }

    fn width(&self, ordinal: usize) -> usize {
        self.widths.get(ordinal).copied().unwrap_or(0)
    }

    fn is_empty(&self, ordinal: usize) -> bool {
        self.sides.get(ordinal).map_or(true, ClosureSide::is_empty)
    }

    fn values(&self, ordinal: usize) -> Box<dyn Iterator<Item = OperationResult<Tuple>> + '_> {
        match self.sides.get(ordinal) {
            Some(ClosureSide::List(list)) => {
                Box::new(list.iter().map(|r| r.map_err(OperationError::Resource)))
            }
            Some(ClosureSide::Record(tuple)) => Box::new(iter::once(Ok((*tuple).clone()))),
            Some(ClosureSide::Empty) | None => Box::new(iter::empty()),
        }
    }
}

/// A group's values projected onto a group function's argument fields.
#[derive(Debug)]
pub struct GroupView<'a> {
    list: &'a SpillableList<Tuple>,
    fields: &'a Fields,
    /// `None` passes whole tuples through.
    positions: Option<&'a [usize]>,
}

impl<'a> GroupView<'a> {
    pub fn new(list: &'a SpillableList<Tuple>, fields: &'a Fields, positions: Option<&'a [usize]>) -> Self {
        Self {
            list,
            fields,
            positions,
        }
    }
}

impl GroupValues for GroupView<'_> {
    fn fields(&self) -> &Fields {
        self.fields
    }

    fn iter(&self) -> Box<dyn Iterator<Item = OperationResult<Tuple>> + '_> {
        let positions = self.positions;
        Box::new(self.list.iter().map(move |r| {
            let tuple = r.map_err(OperationError::Resource)?;
            match positions {
                Some(positions) => tuple.select(positions).map_err(OperationError::Resource),
                None => Ok(tuple),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use weir_core::operation::{InnerJoin, OuterJoin};
    use weir_core::{tuple, Joiner, OutputCollector};

    use super::*;
    use crate::spill::SpillConfig;

    fn list(rows: Vec<Tuple>) -> SpillableList<Tuple> {
        SpillableList::from_items(SpillConfig::default().with_threshold(2), rows).unwrap()
    }

    #[test]
    fn test_outer_shape_keeps_empty_ordinal() {
        let key = tuple![1];
        let left = list(vec![tuple![1, "a"], tuple![1, "b"], tuple![1, "c"]]);
        let widths = [2, 2];
        let closure = Closure::new(&key, &widths, vec![ClosureSide::List(&left), ClosureSide::Empty]);

        assert_eq!(closure.num_ordinals(), 2);
        assert!(closure.is_empty(1));
        assert_eq!(closure.values(1).count(), 0);
        // repeated iteration over a spilled side
        assert_eq!(closure.values(0).count(), 3);
        assert_eq!(closure.values(0).count(), 3);

        let mut out = OutputCollector::new();
        OuterJoin.join(&closure, &mut out).unwrap();
        assert_eq!(out.len(), 3);
        let mut out = OutputCollector::new();
        InnerJoin.join(&closure, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_record_side() {
        let key = tuple![7];
        let record = tuple![7, "x"];
        let right = list(vec![tuple![7, 1], tuple![7, 2]]);
        let widths = [2, 2];
        let closure = Closure::new(
            &key,
            &widths,
            vec![ClosureSide::Record(&record), ClosureSide::List(&right)],
        );
        let mut out = OutputCollector::new();
        InnerJoin.join(&closure, &mut out).unwrap();
        assert_eq!(out.drain(), vec![tuple![7, "x", 7, 1], tuple![7, "x", 7, 2]]);
        assert_eq!(closure.len(0), 1);
    }

    #[test]
    fn test_group_view_projects() {
        let values = list(vec![tuple![1, 3], tuple![1, 4]]);
        let fields = Fields::from(["v"]);
        let positions = [1];
        let view = GroupView::new(&values, &fields, Some(&positions));
        let seen: Vec<Tuple> = view.iter().map(Result::unwrap).collect();
        assert_eq!(seen, vec![tuple![3], tuple![4]]);
        assert_eq!(view.fields(), &fields);
    }
}
