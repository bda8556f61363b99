//! Ordered card collections.
//!
//! A `Pile` is a draw pile, a hand, a discard pile, or a deck. Index 0 is
//! the front (top of a draw pile); `add` appends at the back.
//!
//! `take` and `move_to` are **saturating**: asking for more items than the
//! pile holds moves what is there. Callers inspect the returned count.
//!
//! ```
//! use cardscript::zones::Pile;
//!
//! let mut draw: Pile<u32> = Pile::from_iter([1, 2, 3]);
//! let mut hand = Pile::new();
//!
//! assert_eq!(draw.move_to(5, &mut hand), 3);
//! assert!(draw.is_empty());
//! assert_eq!(hand.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
//! ```

use im::Vector;
use serde::{Deserialize, Serialize};

/// Ordered mutable sequence backed by a persistent vector.
///
/// Cloning is O(1), so piles can live inside drafted state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pile<T: Clone> {
    items: Vector<T>,
}

impl<T: Clone> Default for Pile<T> {
    fn default() -> Self {
        Self {
            items: Vector::new(),
        }
    }
}

impl<T: Clone> Pile<T> {
    /// Create an empty pile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items.
    #[must_use]
    pub fn size(&self) -> usize {
        self.items.len()
    }

    /// Alias for [`Pile::size`].
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append to the back.
    pub fn add(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Insert at `index`, clamped to the pile size.
    pub fn insert(&mut self, index: usize, item: T) {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    /// Remove the first item equal to `item`.
    ///
    /// Returns whether anything was removed.
    pub fn remove(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.remove_where(|candidate| candidate == item).is_some()
    }

    /// Remove and return the first item matching `predicate`.
    pub fn remove_where<F>(&mut self, predicate: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        let index = self.position(predicate)?;
        Some(self.items.remove(index))
    }

    /// Remove and return up to `n` items from the front, in order.
    pub fn take(&mut self, n: usize) -> Vec<T> {
        let n = n.min(self.items.len());
        let rest = self.items.split_off(n);
        let taken = std::mem::replace(&mut self.items, rest);
        taken.into_iter().collect()
    }

    /// Move up to `n` items from the front of this pile to the back of
    /// `other`, preserving their relative order.
    ///
    /// Returns how many items moved.
    pub fn move_to(&mut self, n: usize, other: &mut Pile<T>) -> usize {
        let n = n.min(self.items.len());
        let rest = self.items.split_off(n);
        let moved = std::mem::replace(&mut self.items, rest);
        other.items.append(moved);
        n
    }

    /// First item matching `predicate`.
    #[must_use]
    pub fn find<F>(&self, predicate: F) -> Option<&T>
    where
        F: Fn(&T) -> bool,
    {
        self.items.iter().find(|item| predicate(item))
    }

    /// Index of the first item matching `predicate`.
    #[must_use]
    pub fn position<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&T) -> bool,
    {
        self.items.iter().position(|item| predicate(item))
    }

    /// Map every item, front to back.
    pub fn map<U, F>(&self, f: F) -> Vec<U>
    where
        F: FnMut(&T) -> U,
    {
        self.items.iter().map(f).collect()
    }

    /// Item at `index`, if any.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Mutable item at `index`, if any.
    pub fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// Replace the contents.
    pub fn reset(&mut self, items: impl IntoIterator<Item = T>) {
        self.items = items.into_iter().collect();
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate front to back.
    pub fn iter(&self) -> im::vector::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterate mutably front to back.
    pub fn iter_mut(&mut self) -> im::vector::IterMut<'_, T> {
        self.items.iter_mut()
    }
}

impl<T: Clone> FromIterator<T> for Pile<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a, T: Clone> IntoIterator for &'a Pile<T> {
    type Item = &'a T;
    type IntoIter = im::vector::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Clone> IntoIterator for Pile<T> {
    type Item = T;
    type IntoIter = im::vector::ConsumingIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
