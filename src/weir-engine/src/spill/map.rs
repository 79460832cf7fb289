use std::cmp::Ordering;
use std::collections::HashMap;

use common_error::WeirResult;
use weir_core::{KeyComparator, Tuple};

use super::{SpillConfig, SpillItem, SpillableList};

/// Finds the slot of a key, treating keys the comparator calls equal as one.
///
/// Keys are hashed when the comparator agrees with value equality and kept
/// in comparator order otherwise.
#[derive(Debug)]
pub(crate) struct KeyIndex {
    comparator: KeyComparator,
    hashed: HashMap<Tuple, usize>,
    ordered: Vec<(Tuple, usize)>,
}

impl KeyIndex {
    pub(crate) fn new(comparator: KeyComparator) -> Self {
        Self {
            comparator,
            hashed: HashMap::new(),
            ordered: Vec::new(),
        }
    }

    pub(crate) fn get(&self, key: &Tuple) -> Option<usize> {
        if self.comparator.is_hashable() {
            self.hashed.get(key).copied()
        } else {
            self.search(key).ok().map(|i| self.ordered[i].1)
        }
    }

    /// Slot of `key`, assigning `next` when the key is new.
    pub(crate) fn get_or_insert(&mut self, key: &Tuple, next: usize) -> (usize, bool) {
        if self.comparator.is_hashable() {
            if let Some(slot) = self.hashed.get(key) {
                return (*slot, false);
            }
            self.hashed.insert(key.clone(), next);
            return (next, true);
        }
        match self.search(key) {
            Ok(i) => (self.ordered[i].1, false),
            Err(i) => {
                self.ordered.insert(i, (key.clone(), next));
                (next, true)
            }
        }
    }

    fn search(&self, key: &Tuple) -> Result<usize, usize> {
        self.ordered
            .binary_search_by(|(candidate, _)| self.comparator.compare(candidate, key))
    }

    /// Sort groups ascending by key under the comparator, stable for equal keys.
    pub(crate) fn sort<T>(&self, groups: &mut [(Tuple, T)]) {
        groups.sort_by(|(a, _), (b, _)| self.compare(a, b));
    }

    fn compare(&self, a: &Tuple, b: &Tuple) -> Ordering {
        self.comparator.compare(a, b)
    }
}

/// Key to values container with a bound on the total elements in memory.
///
/// Entries are kept as one arrival-ordered segment; whole segments spill.
/// [`SpillableMap::into_groups`] regroups them by key.
#[derive(Debug)]
pub struct SpillableMap<T: SpillItem> {
    entries: SpillableList<(Tuple, T)>,
    comparator: KeyComparator,
}

impl<T: SpillItem> SpillableMap<T> {
    pub fn new(config: SpillConfig, comparator: KeyComparator) -> Self {
        Self {
            entries: SpillableList::new(config),
            comparator,
        }
    }

    pub fn insert(&mut self, key: Tuple, value: T) -> WeirResult<()> {
        self.entries.push((key, value))
    }

    pub async fn insert_async(&mut self, key: Tuple, value: T) -> WeirResult<()> {
        self.entries.push_async((key, value)).await
    }

    /// Whether regrouping touches the disk: something spilled already, or a
    /// single group could outgrow the threshold.
    pub fn needs_disk(&self) -> bool {
        self.entries.spill_count() > 0 || self.entries.len() > self.entries.config().threshold
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn spill_count(&self) -> usize {
        self.entries.spill_count()
    }

    /// Groups in first-seen key order, each with its values in arrival order.
    ///
    /// The first key seen stands for every key the comparator calls equal.
    pub fn into_groups(self) -> WeirResult<Vec<(Tuple, SpillableList<T>)>> {
        let config = self.entries.config().clone();
        let mut index = KeyIndex::new(self.comparator.clone());
        let mut groups: Vec<(Tuple, SpillableList<T>)> = Vec::new();
        for entry in self.entries.iter() {
            let (key, value) = entry?;
            let (slot, fresh) = index.get_or_insert(&key, groups.len());
            if fresh {
                groups.push((key, SpillableList::new(config.clone())));
            }
            groups[slot].1.push(value)?;
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use weir_core::{tuple, FieldComparator};

    use super::*;

    #[test]
    fn test_groups_across_spills() {
        let config = SpillConfig::default().with_threshold(2);
        let mut map = SpillableMap::new(config, KeyComparator::natural());
        for (k, v) in [(2, "a"), (1, "b"), (2, "c"), (3, "d"), (1, "e")] {
            map.insert(tuple![k], tuple![v]).unwrap();
        }
        assert_eq!(map.len(), 5);
        assert!(map.spill_count() >= 1);

        let groups = map.into_groups().unwrap();
        let keys: Vec<Tuple> = groups.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![tuple![2], tuple![1], tuple![3]]);
        assert_eq!(groups[0].1.to_vec().unwrap(), vec![tuple!["a"], tuple!["c"]]);
        assert_eq!(groups[1].1.to_vec().unwrap(), vec![tuple!["b"], tuple!["e"]]);
    }

    #[test]
    fn test_custom_comparator_merges_keys() {
        let case_insensitive = KeyComparator::new(vec![FieldComparator::custom(|a, b| {
            let a = a.as_str().unwrap_or_default().to_lowercase();
            let b = b.as_str().unwrap_or_default().to_lowercase();
            a.cmp(&b)
        })]);
        let mut map = SpillableMap::new(SpillConfig::default(), case_insensitive);
        map.insert(tuple!["Ab"], tuple![1]).unwrap();
        map.insert(tuple!["aB"], tuple![2]).unwrap();
        map.insert(tuple!["c"], tuple![3]).unwrap();

        let groups = map.into_groups().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, tuple!["Ab"]);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_key_index_sort() {
        let index = KeyIndex::new(KeyComparator::reverse(1));
        let mut groups = vec![(tuple![1], 'a'), (tuple![3], 'b'), (tuple![2], 'c')];
        index.sort(&mut groups);
        let order: Vec<char> = groups.iter().map(|(_, c)| *c).collect();
        assert_eq!(order, vec!['b', 'c', 'a']);
        assert!(index.get(&tuple![1]).is_none());
    }
}
