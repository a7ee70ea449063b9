//! Coalescing (spec C5): merge a freed block with any free neighbor,
//! eagerly, in all four cases.
//!
//! Grounded on `mm-tree-sb.c`'s `free`/`coalesce`. Two details worth
//! calling out because they're easy to get wrong from spec prose alone:
//!
//! - An allocated block's own `size_words` sometimes over-reports its true
//!   payload by one word (see `place`'s whole-occupation branch, which
//!   reclaims the word a footer would have used). Converting it back to a
//!   free block must therefore *shrink* the reported size by one before
//!   adding any neighbor, since a free block's footer needs a word an
//!   allocated block didn't have to spend.
//! - The next block's `prev_alloc` bit has to be cleared *before* running
//!   the merge, not as a side effect of it — clearing it is how the next
//!   block (if it survives unmerged) ever finds out this one went free.

use crate::freelist::FreeSet;
use crate::header;
use crate::oracle::Oracle;
use crate::walk;

/// Free the allocated block at `block`, coalescing with any free
/// neighbors and inserting the (possibly merged) result into `freelist`.
/// Returns the offset of the resulting free block.
pub fn free<O: Oracle>(o: &mut O, freelist: &mut FreeSet, block: u32) -> u32 {
    let next_block = walk::next(o, block);
    header::set_prev_alloc(o, next_block, false);
    coalesce(o, freelist, block)
}

/// Merge `block` (already free, not yet indexed) with any free neighbor and
/// insert the result into `freelist`. Shared by `free` (which first clears
/// the next block's `prev_alloc` bit) and `extend` (whose freshly grown
/// block never needs that: its next is a brand-new epilogue, always
/// allocated).
pub(crate) fn coalesce<O: Oracle>(o: &mut O, freelist: &mut FreeSet, block: u32) -> u32 {
    let this_header = header::read(o, block);
    let prev_alloc = header::is_prev_alloc(this_header);
    let mut words = header::size_words(this_header);
    if header::is_alloc(this_header) {
        words -= 1;
    }

    let next_block = walk::next(o, block);
    let next_header = header::read(o, next_block);
    let next_free = header::is_free(next_header);
    let prev_block = if prev_alloc { None } else { walk::prev_if_free(o, block) };

    match (prev_block, next_free) {
        (Some(prev), true) => {
            freelist.remove(o, prev);
            freelist.remove(o, next_block);
            let merged = words
                + header::size_words(header::read(o, prev))
                + header::size_words(next_header)
                + 4;
            write_free_block(o, prev, merged, true);
            freelist.insert(o, prev);
            prev
        }
        (None, true) => {
            freelist.remove(o, next_block);
            let merged = words + header::size_words(next_header) + 2;
            write_free_block(o, block, merged, prev_alloc);
            freelist.insert(o, block);
            block
        }
        (Some(prev), false) => {
            freelist.remove(o, prev);
            let merged = words + header::size_words(header::read(o, prev)) + 2;
            write_free_block(o, prev, merged, true);
            freelist.insert(o, prev);
            prev
        }
        (None, false) => {
            write_free_block(o, block, words, prev_alloc);
            freelist.insert(o, block);
            block
        }
    }
}

fn write_free_block<O: Oracle>(o: &mut O, offset: u32, words: u32, prev_alloc: bool) {
    let h = header::pack(words, false, prev_alloc);
    o.write(offset, h);
    o.write(header::footer_offset(offset, words), h);
    poison_free_payload(o, offset, words);
}

const POISON: u32 = 0xDEAD_BEEF;

// Fills the portion of a newly-freed block's payload that the free-set
// index never writes to (everything past the four link-field words at
// +1..=+4) with a recognizable pattern, so a write through a stale pointer
// shows up as corruption instead of silently succeeding. Grounded on
// wee_alloc's write_free_pattern/assert_is_poisoned_with_free_pattern.
extra_only! {
    fn poison_free_payload(o: &mut dyn Oracle, block: u32, words: u32) {
        let footer = header::footer_offset(block, words);
        let mut w = block + 5;
        while w < footer {
            o.write(w, POISON);
            w += 1;
        }
    }
}

// Checks that a free block still on the free-set is still poisoned past
// its link fields, catching a use-after-free write that happened while it
// sat there. Walked over the whole free-set by `check`'s ring traversal.
extra_only! {
    fn assert_is_poisoned(o: &dyn Oracle, block: u32, words: u32) {
        let footer = header::footer_offset(block, words);
        let mut w = block + 5;
        while w < footer {
            extra_assert_eq!(o.read(w), POISON, "freed memory was written to while still on the free-set");
            w += 1;
        }
    }
}

pub(crate) fn assert_free_block_is_poisoned<O: Oracle>(o: &O, block: u32, words: u32) {
    assert_is_poisoned(o, block, words);
}

/// Poisons a free block's payload past its link fields. For free blocks
/// built directly by a caller that isn't going through `free`/`coalesce`
/// itself (`Allocator::resize`'s in-place shrink/grow splits), so every
/// free block on the heap ends up poisoned the same way regardless of
/// which code path created it.
pub(crate) fn poison_free_block<O: Oracle>(o: &mut O, block: u32, words: u32) {
    poison_free_payload(o, block, words);
}
