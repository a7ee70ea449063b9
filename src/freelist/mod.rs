//! The free-set index (spec C3): small-class direct buckets plus a
//! size-ordered BST of address-ordered rings.
//!
//! Every link field lives inside the free block's own payload, encoded as
//! a heap-relative word offset rather than a pointer (`0` doubles as NULL,
//! since word `0` is the prologue header and is never a free block). This
//! is what lets a free block's header stay 4 bytes even on a platform
//! where a real pointer would be 8: the offset comfortably fits the 32
//! bits the header format already allots to bookkeeping.
//!
//! Layout, relative to a free block's header word:
//!   +1  ring_pred (address-order predecessor in its size ring)
//!   +2  ring_succ (address-order successor in its size ring)
//!   +3  left  (BST left child — only meaningful on a ring's head)
//!   +4  right (BST right child — only meaningful on a ring's head)
//!
//! Small-class blocks (2, 4, ..., 12 words) only ever use +1/+2: their
//! minimum size leaves no room for +3/+4, and they don't need a BST
//! position anyway since `small` routes on exact size.

mod small;
mod tree;

use crate::header;
use crate::oracle::Oracle;

/// Sentinel word-offset meaning "no block" for every link field here.
pub const NONE: u32 = 0;

/// Number of small fixed-size classes: words 2, 4, 6, 8, 10, 12.
pub const SMALL_CLASSES: usize = 6;

/// Largest payload size, in words, still routed to a small-class bucket.
pub const SMALL_MAX_WORDS: u32 = (SMALL_CLASSES as u32) * 2;

#[inline]
pub(crate) fn size_of<O: Oracle>(o: &O, block: u32) -> u32 {
    header::size_words(header::read(o, block))
}

/// Whether a free block of this size must be indexed via the small-class
/// buckets rather than the tree. Size 2 always must: a tree node needs room
/// for `left`/`right` children at `+3`/`+4`, which a 2-word payload (only
/// `pred`/`succ` at `+1`/`+2`) doesn't have. Sizes 4–12 go through the
/// buckets too when the `size_classes` feature is enabled (the fast-path
/// default); with it disabled, everything above the 2-word floor routes
/// through the tree instead.
#[inline]
fn routes_through_small(words: u32) -> bool {
    words == 2 || (cfg!(feature = "size_classes") && words <= SMALL_MAX_WORDS)
}

#[inline]
pub(crate) fn read_pred<O: Oracle>(o: &O, block: u32) -> u32 {
    o.read(block + 1)
}

#[inline]
pub(crate) fn read_succ<O: Oracle>(o: &O, block: u32) -> u32 {
    o.read(block + 2)
}

#[inline]
fn write_ring<O: Oracle>(o: &mut O, block: u32, pred: u32, succ: u32) {
    o.write(block + 1, pred);
    o.write(block + 2, succ);
}

#[inline]
pub(crate) fn read_left<O: Oracle>(o: &O, block: u32) -> u32 {
    o.read(block + 3)
}

#[inline]
pub(crate) fn read_right<O: Oracle>(o: &O, block: u32) -> u32 {
    o.read(block + 4)
}

#[inline]
fn write_children<O: Oracle>(o: &mut O, block: u32, left: u32, right: u32) {
    o.write(block + 3, left);
    o.write(block + 4, right);
}

/// Small-class buckets plus the BST root, together covering every free
/// block on the heap.
#[derive(Debug, Clone, Copy)]
pub struct FreeSet {
    small: [u32; SMALL_CLASSES],
    tree_root: u32,
}

impl crate::const_init::ConstInit for FreeSet {
    const INIT: FreeSet = FreeSet {
        small: [NONE; SMALL_CLASSES],
        tree_root: NONE,
    };
}

impl FreeSet {
    pub const fn new() -> FreeSet {
        FreeSet {
            small: [NONE; SMALL_CLASSES],
            tree_root: NONE,
        }
    }

    /// Insert a free block (its header must already report the correct,
    /// even `size_words` and be marked free) into the index.
    pub fn insert<O: Oracle>(&mut self, o: &mut O, block: u32) {
        let words = size_of(o, block);
        if routes_through_small(words) {
            small::insert(o, &mut self.small, block, words);
        } else {
            self.tree_root = tree::insert(o, self.tree_root, block);
        }
    }

    /// Remove a specific free block (known to be in the index) from it.
    pub fn remove<O: Oracle>(&mut self, o: &mut O, block: u32) {
        let words = size_of(o, block);
        if routes_through_small(words) {
            small::remove(o, &mut self.small, block, words);
        } else {
            self.tree_root = tree::remove(o, self.tree_root, block);
        }
    }

    /// Best-fit search: the lowest-address free block of the smallest size
    /// that is still `>= awords`, or `None` if the index is empty of
    /// anything large enough. Always checks the small buckets first — even
    /// with `size_classes` disabled, the 2-word bucket alone may be
    /// populated (see `routes_through_small`) — at negligible cost when
    /// they're empty.
    pub fn find_fit<O: Oracle>(&self, o: &O, awords: u32) -> Option<u32> {
        if let Some(b) = small::find_fit(o, &self.small, awords) {
            return Some(b);
        }
        tree::ceiling(o, self.tree_root, awords)
    }

    /// Iterate every small-class bucket head, for the invariant checker.
    pub fn small_heads(&self) -> impl Iterator<Item = u32> + '_ {
        self.small.iter().copied().filter(|&h| h != NONE)
    }

    /// Every small-class bucket head, indexed by class (for the invariant
    /// checker's I7 check — bucket `i` must hold only size `2*(i+1)`).
    pub(crate) fn small_buckets(&self) -> &[u32; SMALL_CLASSES] {
        &self.small
    }

    pub fn tree_root(&self) -> u32 {
        self.tree_root
    }
}

impl Default for FreeSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ArrayOracle;

    fn heap_with_free_blocks(sizes: &[u32]) -> (ArrayOracle, Vec<u32>) {
        let total: u32 = sizes.iter().map(|s| s + 2).sum();
        let mut o = ArrayOracle::with_capacity_words(total + 4);
        o.sbrk(total + 2).unwrap();
        header::write_sentinel(&mut o, 0, true);
        let mut offsets = Vec::new();
        let mut at = 1;
        for &s in sizes {
            o.write(at, header::pack(s, false, true));
            header::mark_free(&mut o, at, true);
            offsets.push(at);
            at += s + 2;
        }
        header::write_sentinel(&mut o, at, false);
        (o, offsets)
    }

    #[test]
    #[cfg(feature = "size_classes")]
    fn small_classes_round_trip_insert_find_remove() {
        let (mut o, offsets) = heap_with_free_blocks(&[2, 4, 4, 12]);
        let mut set = FreeSet::new();
        for &b in &offsets {
            set.insert(&mut o, b);
        }
        assert_eq!(set.find_fit(&o, 2), Some(offsets[0]));
        assert_eq!(set.find_fit(&o, 5), Some(offsets[3]));
        assert_eq!(set.find_fit(&o, 13), None);

        set.remove(&mut o, offsets[0]);
        // Small classes are LIFO (unordered), not address-ordered: the
        // most recently inserted 4-word block is now the head.
        assert_eq!(set.find_fit(&o, 2), Some(offsets[2]));
    }

    #[test]
    fn size_two_blocks_always_use_the_small_bucket() {
        // A tree node needs room for left/right children it doesn't have at
        // a 2-word payload, so this must hold regardless of the
        // `size_classes` feature.
        let (mut o, offsets) = heap_with_free_blocks(&[2]);
        let mut set = FreeSet::new();
        set.insert(&mut o, offsets[0]);
        assert_eq!(set.tree_root(), NONE);
        assert!(set.small_heads().any(|h| h == offsets[0]));
        assert_eq!(set.find_fit(&o, 2), Some(offsets[0]));
    }

    #[test]
    fn large_blocks_route_through_the_tree_and_pick_the_low_address_tie() {
        let (mut o, offsets) = heap_with_free_blocks(&[20, 20, 30]);
        let mut set = FreeSet::new();
        for &b in &offsets {
            set.insert(&mut o, b);
        }
        // Two 20-word blocks: ceiling search for 18 must return the lower address.
        assert_eq!(set.find_fit(&o, 18), Some(offsets[0].min(offsets[1])));
        assert_eq!(set.find_fit(&o, 25), Some(offsets[2]));
        assert_eq!(set.find_fit(&o, 31), None);

        set.remove(&mut o, offsets[0].min(offsets[1]));
        assert_eq!(set.find_fit(&o, 18), Some(offsets[0].max(offsets[1])));
    }
}
