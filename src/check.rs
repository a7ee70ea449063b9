//! Invariant checker (spec C8): a side-effect-free walk of the heap and of
//! the free-set index, verifying I1–I9 and reconciling free-block counts
//! between the two walks.
//!
//! Grounded on `mm-tree-sb.c`'s `mm_checkheap`/`check_size_tree`/
//! `check_add_tree`, converted from recursion to iteration per spec.md §9
//! and from a `printf`-and-return-`-1` style to a typed `Result`, logged at
//! `log::error!` by the thin `check` wrapper rather than printed directly —
//! this is the "test oracle" role spec.md §2 assigns it, so its own
//! correctness matters more than its speed; no shortcuts are taken here
//! that the heap walk itself doesn't already take.

use crate::coalesce::assert_free_block_is_poisoned;
use crate::freelist::{self, FreeSet, NONE};
use crate::header;
use crate::oracle::Oracle;
use crate::walk;
use core::fmt;

/// One violated invariant, named after the I-number it falsifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// I1: the prologue sentinel isn't a zero-size allocated block.
    PrologueCorrupt,
    /// I1: the epilogue sentinel isn't a zero-size allocated block.
    EpilogueCorrupt,
    /// I3: a payload address at this block isn't 8-byte aligned.
    Misaligned(u32),
    /// I9: an offset the walk or the index reached falls outside the heap.
    OutOfBounds(u32),
    /// I2: `size_words` is below the 2-word (free) / 3-word (alloc) floor.
    SizeTooSmall(u32),
    /// I2: a free block has odd size, or an allocated one has even size.
    SizeParity(u32),
    /// I4: a free block's footer doesn't bit-match its header.
    FooterMismatch(u32),
    /// I5: two adjacent blocks are both free.
    AdjacentFreeBlocks(u32),
    /// I4: this block's `prev_alloc` bit disagrees with the free/alloc
    /// state of the block actually before it.
    PrevAllocBitWrong(u32),
    /// I6: the heap walk and the free-set-index walk disagree on how many
    /// free blocks exist.
    FreeCountMismatch { walked: u32, indexed: u32 },
    /// I7: a small-class bucket holds a block of the wrong size.
    WrongSmallClass { block: u32, bucket: usize },
    /// I8 (ring): a ring's `ring_pred`/`ring_succ` links aren't mutually
    /// consistent, or its addresses aren't strictly increasing.
    RingLinkInconsistent(u32),
    /// I8 (ring): two blocks in the same ring disagree on size.
    RingSizeMismatch(u32),
    /// I8 (tree): a subtree's size ordering relative to its parent is wrong.
    TreeOrderViolated(u32),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::PrologueCorrupt => write!(f, "prologue sentinel is corrupt"),
            Violation::EpilogueCorrupt => write!(f, "epilogue sentinel is corrupt"),
            Violation::Misaligned(b) => write!(f, "block at {b} has a misaligned payload"),
            Violation::OutOfBounds(o) => write!(f, "offset {o} falls outside the heap"),
            Violation::SizeTooSmall(b) => write!(f, "block at {b} is below the minimum size"),
            Violation::SizeParity(b) => write!(f, "block at {b} has the wrong size parity"),
            Violation::FooterMismatch(b) => write!(f, "block at {b}'s footer doesn't match its header"),
            Violation::AdjacentFreeBlocks(b) => write!(f, "block at {b} is adjacent to another free block"),
            Violation::PrevAllocBitWrong(b) => write!(f, "block at {b} has the wrong prev_alloc bit"),
            Violation::FreeCountMismatch { walked, indexed } => write!(
                f,
                "heap walk found {walked} free blocks but the free-set index holds {indexed}"
            ),
            Violation::WrongSmallClass { block, bucket } => {
                write!(f, "block at {block} is in small-class bucket {bucket} but doesn't fit it")
            }
            Violation::RingLinkInconsistent(b) => write!(f, "ring link at {b} is inconsistent"),
            Violation::RingSizeMismatch(b) => write!(f, "ring member at {b} doesn't match its ring's size"),
            Violation::TreeOrderViolated(b) => write!(f, "tree node at {b} violates BST size ordering"),
        }
    }
}

/// Walk the heap and the free-set index, verifying every invariant in §3.
/// Logs the specific violation at `log::error!` before returning it.
pub fn check<O: Oracle>(o: &O, freelist: &FreeSet) -> Result<(), Violation> {
    check_inner(o, freelist).inspect_err(|v| log::error!("heap invariant violated: {v}"))
}

fn in_bounds<O: Oracle>(o: &O, offset: u32) -> bool {
    offset >= o.heap_lo() && offset <= o.heap_hi()
}

fn check_inner<O: Oracle>(o: &O, freelist: &FreeSet) -> Result<(), Violation> {
    let prologue = header::read(o, o.heap_lo());
    if !header::is_sentinel(prologue) || header::is_free(prologue) {
        return Err(Violation::PrologueCorrupt);
    }

    let mut block = walk::first_block(o);
    let mut walked_free = 0u32;
    let mut prev_was_free = false;

    loop {
        if !in_bounds(o, block) {
            return Err(Violation::OutOfBounds(block));
        }
        let h = header::read(o, block);

        if header::is_prev_alloc(h) == prev_was_free {
            return Err(Violation::PrevAllocBitWrong(block));
        }

        if walk::is_epilogue(o, block) {
            if header::is_free(h) {
                return Err(Violation::EpilogueCorrupt);
            }
            break;
        }

        if !header::payload_offset(block).is_multiple_of(2) {
            return Err(Violation::Misaligned(block));
        }

        let words = header::size_words(h);
        let free = header::is_free(h);
        let min = if free { 2 } else { 3 };
        if words < min {
            return Err(Violation::SizeTooSmall(block));
        }
        if words.is_multiple_of(2) != free {
            return Err(Violation::SizeParity(block));
        }
        if free {
            let footer = header::read(o, header::footer_offset(block, words));
            if footer != h {
                return Err(Violation::FooterMismatch(block));
            }
            if prev_was_free {
                return Err(Violation::AdjacentFreeBlocks(block));
            }
            walked_free += 1;
        }

        prev_was_free = free;
        block = walk::next(o, block);
    }

    let mut indexed_free = 0u32;

    for (bucket, &head) in freelist.small_buckets().iter().enumerate() {
        if head == NONE {
            continue;
        }
        let expected_words = 2 * (bucket as u32 + 1);
        check_ring(o, head, expected_words, false, &mut indexed_free, |b| {
            Violation::WrongSmallClass { block: b, bucket }
        })?;
    }

    check_tree(o, freelist.tree_root(), 0, u32::MAX, &mut indexed_free)?;

    if walked_free != indexed_free {
        return Err(Violation::FreeCountMismatch {
            walked: walked_free,
            indexed: indexed_free,
        });
    }

    Ok(())
}

/// Verify the BST rooted at `node` has every size strictly within
/// `(low, high)`, then verify the address-ordered ring at `node`.
fn check_tree<O: Oracle>(
    o: &O,
    node: u32,
    low: u32,
    high: u32,
    indexed_free: &mut u32,
) -> Result<(), Violation> {
    if node == NONE {
        return Ok(());
    }
    if !in_bounds(o, node) {
        return Err(Violation::OutOfBounds(node));
    }
    let words = freelist::size_of(o, node);
    if words <= low || words >= high {
        return Err(Violation::TreeOrderViolated(node));
    }

    check_ring(o, node, words, true, indexed_free, Violation::RingSizeMismatch)?;

    let left = freelist::read_left(o, node);
    let right = freelist::read_right(o, node);
    check_tree(o, left, low, words, indexed_free)?;
    check_tree(o, right, words, high, indexed_free)
}

/// Walk a ring starting at `head`, verifying every member has
/// `expected_words` and that pred/succ links are mutually consistent.
/// `size_mismatch` builds the violation to report for a wrong-size member
/// (callers want different variants here).
///
/// `ordered` additionally requires addresses to strictly increase along the
/// ring — true for a tree node's ring (address order is how `find_fit`
/// picks the low-address tie) but not for a small-class bucket, which
/// pushes to the front and is deliberately LIFO (see `freelist::small`).
fn check_ring<O: Oracle>(
    o: &O,
    head: u32,
    expected_words: u32,
    ordered: bool,
    indexed_free: &mut u32,
    size_mismatch: impl Fn(u32) -> Violation,
) -> Result<(), Violation> {
    let mut cur = head;
    let mut prev = NONE;
    // A ring can't legitimately hold more members than the heap has words;
    // anything past that means a cycle, which a corrupt unordered ring
    // can't otherwise be caught going on forever.
    let budget = o.heap_hi().saturating_sub(o.heap_lo()) + 1;
    let mut seen = 0u32;
    loop {
        if !in_bounds(o, cur) {
            return Err(Violation::OutOfBounds(cur));
        }
        if freelist::size_of(o, cur) != expected_words {
            return Err(size_mismatch(cur));
        }
        if freelist::read_pred(o, cur) != prev {
            return Err(Violation::RingLinkInconsistent(cur));
        }
        if ordered && prev != NONE && cur <= prev {
            return Err(Violation::RingLinkInconsistent(cur));
        }
        seen += 1;
        if seen > budget {
            return Err(Violation::RingLinkInconsistent(cur));
        }
        assert_free_block_is_poisoned(o, cur, expected_words);
        *indexed_free += 1;
        let succ = freelist::read_succ(o, cur);
        if succ == NONE {
            return Ok(());
        }
        prev = cur;
        cur = succ;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coalesce;
    use crate::extend;
    use crate::oracle::ArrayOracle;
    use crate::place::{self, Placed};

    /// A heap with one big free block (62 words), already coalesced and
    /// indexed, nothing allocated.
    fn fresh_heap() -> (ArrayOracle, FreeSet) {
        let mut o = ArrayOracle::with_capacity_words(256);
        o.sbrk(2).unwrap();
        header::write_sentinel(&mut o, 0, true);
        header::write_sentinel(&mut o, 1, true);
        let mut fs = FreeSet::new();
        extend::extend(&mut o, &mut fs, 63).unwrap();
        (o, fs)
    }

    #[test]
    fn a_freshly_extended_heap_passes() {
        let (o, fs) = fresh_heap();
        assert_eq!(check(&o, &fs), Ok(()));
    }

    #[test]
    fn allocating_and_freeing_passes_throughout() {
        let (mut o, mut fs) = fresh_heap();
        let block = fs.find_fit(&o, 3).unwrap();
        fs.remove(&mut o, block);
        if let Placed::Split { remainder } = place::place(&mut o, block, 3) {
            fs.insert(&mut o, remainder);
        }
        assert_eq!(check(&o, &fs), Ok(()));

        coalesce::free(&mut o, &mut fs, block);
        assert_eq!(check(&o, &fs), Ok(()));
    }

    #[test]
    fn detects_a_corrupted_footer() {
        let (mut o, fs) = fresh_heap();
        let block = fs.tree_root();
        let words = header::size_words(header::read(&o, block));
        let corrupt = header::read(&o, block) ^ 0x1;
        o.write(header::footer_offset(block, words), corrupt);
        assert_eq!(check(&o, &fs), Err(Violation::FooterMismatch(block)));
    }

    #[test]
    fn detects_a_missing_index_entry() {
        let (mut o, mut fs) = fresh_heap();
        let block = fs.tree_root();
        fs.remove(&mut o, block);
        assert_eq!(
            check(&o, &fs),
            Err(Violation::FreeCountMismatch { walked: 1, indexed: 0 })
        );
    }

    #[test]
    fn detects_two_adjacent_free_blocks() {
        let (mut o, mut fs) = fresh_heap();
        let block = fs.tree_root();
        fs.remove(&mut o, block);
        let words = header::size_words(header::read(&o, block));
        // Split the single free block into two free blocks by hand,
        // bypassing coalescing, to manufacture the violation.
        let left_words = 4;
        let right_words = words - left_words - 2;
        let lh = header::pack(left_words, false, true);
        o.write(block, lh);
        o.write(header::footer_offset(block, left_words), lh);
        let right = header::footer_offset(block, left_words) + 1;
        let rh = header::pack(right_words, false, false);
        o.write(right, rh);
        o.write(header::footer_offset(right, right_words), rh);
        fs.insert(&mut o, block);
        fs.insert(&mut o, right);

        assert_eq!(check(&o, &fs), Err(Violation::AdjacentFreeBlocks(right)));
    }
}
