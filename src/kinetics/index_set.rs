//! Sorted-unique set of linear cell indices.
//!
//! Every set the stepper manipulates (boundary shell, extrapolation
//! candidates and their history, frontier, frontier closure) is an
//! `IndexSet`. Keeping the backing vector sorted makes union and difference
//! linear merges, iteration order deterministic, and guarantees that
//! parallel writers driven by a set never alias.

use rayon::prelude::*;

/// Below this many raw indices, sorting runs on the calling thread.
const PARALLEL_SORT_THRESHOLD: usize = 16_384;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexSet {
    items: Vec<usize>,
}

impl IndexSet {
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Sort and deduplicate an arbitrary index list.
    pub fn from_unsorted(mut items: Vec<usize>) -> Self {
        if items.len() >= PARALLEL_SORT_THRESHOLD {
            items.par_sort_unstable();
        } else {
            items.sort_unstable();
        }
        items.dedup();
        Self { items }
    }

    /// Wrap a list that is already strictly increasing.
    pub(crate) fn from_sorted(items: Vec<usize>) -> Self {
        debug_assert!(items.windows(2).all(|w| w[0] < w[1]));
        Self { items }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.iter().copied()
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.items.binary_search(&idx).is_ok()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Elements of `self` not present in `other`.
    pub fn difference(&self, other: &IndexSet) -> IndexSet {
        if other.is_empty() {
            return self.clone();
        }
        let mut out = Vec::with_capacity(self.len());
        let mut j = 0;
        for &a in &self.items {
            while j < other.items.len() && other.items[j] < a {
                j += 1;
            }
            if j == other.items.len() || other.items[j] != a {
                out.push(a);
            }
        }
        IndexSet { items: out }
    }

    pub fn union(&self, other: &IndexSet) -> IndexSet {
        let (a, b) = (&self.items, &other.items);
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    out.push(a[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(b[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&a[i..]);
        out.extend_from_slice(&b[j..]);
        IndexSet { items: out }
    }

    /// In-place union.
    pub fn merge(&mut self, other: &IndexSet) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.items.extend_from_slice(&other.items);
            return;
        }
        *self = self.union(other);
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a IndexSet {
    type Item = &'a usize;
    type IntoIter = std::slice::Iter<'a, usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
