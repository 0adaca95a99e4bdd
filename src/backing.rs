//! The set capability decorated by [`ObservableSet`](crate::ObservableSet).
//!
//! The observable set does not store elements itself. It forwards membership
//! queries and mutations to any type implementing [`BackingSet`], so callers
//! choose hashing or ordering by picking the wrapped collection.

use std::collections::{BTreeSet, HashSet};
use std::hash::{BuildHasher, Hash};

/// A mutable set the observable set can wrap.
///
/// Implementations are only ever touched while the observable set holds its
/// backing lock, so they need no synchronization of their own.
pub trait BackingSet<E> {
    /// Membership test.
    fn contains(&self, element: &E) -> bool;

    /// Inserts `element`, returning true if membership changed.
    fn insert(&mut self, element: E) -> bool;

    /// Removes `element`, returning true if it was present.
    fn remove(&mut self, element: &E) -> bool;

    /// Number of elements.
    fn len(&self) -> usize;

    /// True if the set holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the elements out in the set's own iteration order.
    fn to_vec(&self) -> Vec<E>
    where
        E: Clone;
}

impl<E, H> BackingSet<E> for HashSet<E, H>
where
    E: Eq + Hash,
    H: BuildHasher,
{
    fn contains(&self, element: &E) -> bool {
        HashSet::contains(self, element)
    }

    fn insert(&mut self, element: E) -> bool {
        HashSet::insert(self, element)
    }

    fn remove(&mut self, element: &E) -> bool {
        HashSet::remove(self, element)
    }

    fn len(&self) -> usize {
        HashSet::len(self)
    }

    fn to_vec(&self) -> Vec<E>
    where
        E: Clone,
    {
        self.iter().cloned().collect()
    }
}

impl<E: Ord> BackingSet<E> for BTreeSet<E> {
    fn contains(&self, element: &E) -> bool {
        BTreeSet::contains(self, element)
    }

    fn insert(&mut self, element: E) -> bool {
        BTreeSet::insert(self, element)
    }

    fn remove(&mut self, element: &E) -> bool {
        BTreeSet::remove(self, element)
    }

    fn len(&self) -> usize {
        BTreeSet::len(self)
    }

    fn to_vec(&self) -> Vec<E>
    where
        E: Clone,
    {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<S: BackingSet<u32> + Default>() {
        let mut set = S::default();
        assert!(set.is_empty());
        assert!(set.insert(7));
        assert!(!set.insert(7));
        assert!(set.contains(&7));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&7));
        assert!(!set.remove(&7));
        assert!(set.is_empty());
    }

    #[test]
    fn hash_set_backing_reports_membership_changes() {
        exercise::<HashSet<u32>>();
    }

    #[test]
    fn btree_set_backing_reports_membership_changes() {
        exercise::<BTreeSet<u32>>();
    }

    #[test]
    fn btree_set_backing_copies_in_order() {
        let mut set = BTreeSet::new();
        for v in [3, 1, 2] {
            BackingSet::insert(&mut set, v);
        }
        assert_eq!(BackingSet::to_vec(&set), vec![1, 2, 3]);
    }
}
