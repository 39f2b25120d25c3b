//! Sparse Bitmap for Points-to Sets
//!
//! Node-id set made of 128-bit blocks keyed by `id >> 7`:
//! - **Hash-indexed blocks**: O(1) amortized membership, insert and remove
//! - **No empty blocks**: a block whose last bit is cleared is dropped, so
//!   `is_empty` is a single map check
//! - **Word-parallel set algebra**: union, superset and intersection tests
//!   touch one `u128` per 128 ids
//!
//! # Performance Characteristics
//! - Insert / Remove / Contains: O(1) amortized
//! - Union: O(blocks(other))
//! - Superset / Intersects: O(blocks(smaller side))
//! - is_empty: O(1)
//! - len: O(blocks), popcount over every block; prefer `is_empty`
//! - Iteration: O(b log b) to order the blocks, then ascending ids
//!
//! # References
//! - Hardekopf & Lin "The Ant and the Grasshopper" (PLDI 2007), sparse
//!   bitmap points-to sets

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::features::points_to::domain::node::NodeId;

const BLOCK_BITS: u32 = 128;
const BLOCK_SHIFT: u32 = 7;

#[inline]
fn split(id: NodeId) -> (u32, u128) {
    (id >> BLOCK_SHIFT, 1u128 << (id % BLOCK_BITS))
}

/// Sparse set of node ids
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PointsToSet {
    blocks: FxHashMap<u32, u128>,
}

impl PointsToSet {
    /// Create an empty set
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a single element
    #[inline]
    pub fn singleton(id: NodeId) -> Self {
        let mut set = Self::new();
        set.insert(id);
        set
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Basic Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert an element. Returns true if element was not present.
    #[inline]
    pub fn insert(&mut self, id: NodeId) -> bool {
        let (key, bit) = split(id);
        let block = self.blocks.entry(key).or_insert(0);
        let added = *block & bit == 0;
        *block |= bit;
        added
    }

    /// Remove an element. Returns true if element was present.
    #[inline]
    pub fn remove(&mut self, id: NodeId) -> bool {
        let (key, bit) = split(id);
        let Some(block) = self.blocks.get_mut(&key) else {
            return false;
        };
        let present = *block & bit != 0;
        *block &= !bit;
        if *block == 0 {
            self.blocks.remove(&key);
        }
        present
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        let (key, bit) = split(id);
        self.blocks.get(&key).is_some_and(|block| block & bit != 0)
    }

    /// Number of elements
    ///
    /// Not O(1): counts the bits of every block. Use [`is_empty`](Self::is_empty)
    /// when only emptiness matters.
    pub fn len(&self) -> usize {
        self.blocks.values().map(|b| b.count_ones() as usize).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Iterate over elements in ascending order
    pub fn iter(&self) -> Iter<'_> {
        let mut keys: Vec<u32> = self.blocks.keys().copied().collect();
        keys.sort_unstable();
        Iter {
            set: self,
            keys,
            next_key: 0,
            current: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Set Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// self = self ∪ other. Returns true if self changed.
    pub fn union_with(&mut self, other: &PointsToSet) -> bool {
        let mut changed = false;
        for (&key, &bits) in &other.blocks {
            let block = self.blocks.entry(key).or_insert(0);
            let merged = *block | bits;
            if merged != *block {
                *block = merged;
                changed = true;
            }
        }
        changed
    }

    /// Insert many elements. Returns true if any was new.
    pub fn insert_all(&mut self, ids: impl IntoIterator<Item = NodeId>) -> bool {
        let mut changed = false;
        for id in ids {
            changed |= self.insert(id);
        }
        changed
    }

    /// Superset test: every element of other is in self
    pub fn contains_all(&self, other: &PointsToSet) -> bool {
        if other.blocks.len() > self.blocks.len() {
            return false;
        }
        other.blocks.iter().all(|(key, &bits)| {
            self.blocks
                .get(key)
                .is_some_and(|&mine| mine & bits == bits)
        })
    }

    /// Check if sets share at least one element
    pub fn intersects(&self, other: &PointsToSet) -> bool {
        let (small, large) = if self.blocks.len() <= other.blocks.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.blocks.iter().any(|(key, &bits)| {
            large
                .blocks
                .get(key)
                .is_some_and(|&theirs| theirs & bits != 0)
        })
    }

    /// Smallest element
    pub fn first(&self) -> Option<NodeId> {
        let (&key, &bits) = self.blocks.iter().min_by_key(|(key, _)| **key)?;
        Some((key << BLOCK_SHIFT) + bits.trailing_zeros())
    }
}

/// Ascending iterator over a [`PointsToSet`]
pub struct Iter<'a> {
    set: &'a PointsToSet,
    keys: Vec<u32>,
    next_key: usize,
    current: Option<(u32, u128)>,
}

impl Iterator for Iter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            if let Some((key, bits)) = self.current {
                if bits != 0 {
                    let bit = bits.trailing_zeros();
                    self.current = Some((key, bits & (bits - 1)));
                    return Some((key << BLOCK_SHIFT) + bit);
                }
            }
            let key = *self.keys.get(self.next_key)?;
            self.next_key += 1;
            self.current = self.set.blocks.get(&key).map(|&bits| (key, bits));
        }
    }
}

impl<'a> IntoIterator for &'a PointsToSet {
    type Item = NodeId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl FromIterator<NodeId> for PointsToSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        let mut set = Self::new();
        set.insert_all(iter);
        set
    }
}

impl Extend<NodeId> for PointsToSet {
    fn extend<I: IntoIterator<Item = NodeId>>(&mut self, iter: I) {
        self.insert_all(iter);
    }
}

impl fmt::Debug for PointsToSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// Serialized as an ascending list of ids
impl Serialize for PointsToSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PointsToSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ids = Vec::<NodeId>::deserialize(deserializer)?;
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut set = PointsToSet::new();
        assert!(set.is_empty());

        assert!(set.insert(5));
        assert!(set.insert(3));
        assert!(set.insert(700));
        assert!(!set.insert(5)); // Duplicate

        assert_eq!(set.len(), 3);
        assert!(set.contains(3));
        assert!(set.contains(700));
        assert!(!set.contains(4));

        let elements: Vec<_> = set.iter().collect();
        assert_eq!(elements, vec![3, 5, 700]);
    }

    #[test]
    fn test_remove_drops_empty_blocks() {
        let mut set: PointsToSet = [1, 2, 300].into_iter().collect();
        assert!(set.remove(300));
        assert!(!set.remove(300));
        assert_eq!(set.blocks.len(), 1);

        set.remove(1);
        set.remove(2);
        assert!(set.is_empty());
    }

    #[test]
    fn test_union_reports_change() {
        let mut a: PointsToSet = [1, 3, 5].into_iter().collect();
        let b: PointsToSet = [2, 3, 129].into_iter().collect();

        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2, 3, 5, 129]);
        assert!(a.contains_all(&b));
        assert!(!b.contains_all(&a));
    }

    #[test]
    fn test_intersects() {
        let a: PointsToSet = [1, 3, 5].into_iter().collect();
        let b: PointsToSet = [2, 4, 6].into_iter().collect();
        let c: PointsToSet = [3, 6, 9000].into_iter().collect();

        assert!(!a.intersects(&b));
        assert!(a.intersects(&c)); // 3 is common
        assert!(b.intersects(&c)); // 6 is common
        assert!(!a.intersects(&PointsToSet::new()));
    }

    #[test]
    fn test_block_boundaries() {
        let ids = [0, 127, 128, 255, 256, u32::MAX];
        let set: PointsToSet = ids.into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), ids.to_vec());
        assert_eq!(set.first(), Some(0));
        assert_eq!(set.len(), ids.len());
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a: PointsToSet = [9, 1, 400].into_iter().collect();
        let b: PointsToSet = [400, 9, 1].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_as_sorted_list() {
        let set: PointsToSet = [300, 7, 2].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "[2,7,300]");
        let back: PointsToSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
