//! Sbrk driver (spec C6): grow the heap and fold the new space into a
//! single free block, merging with whatever free tail was already there.
//!
//! Grounded on `mm-tree-sb.c`'s `extend_heap`. The caller-supplied `words`
//! is the odd word count this new block should report as payload plus one;
//! the function asks the oracle for one extra word up front, to cover the
//! header, and reclaims the old epilogue's own word as that header rather
//! than writing one past it. The old epilogue's `prev_alloc` bit survives
//! into the new block unchanged — it already recorded the right thing,
//! since nothing about the heap below the old break has moved.

use crate::coalesce;
use crate::freelist::FreeSet;
use crate::header;
use crate::oracle::{Oracle, OracleExhausted};

/// Grow the heap by `words` words of new payload capacity (must be odd, so
/// the resulting free block's reported size comes out even) and return the
/// offset of the resulting free block, already coalesced with any existing
/// free tail and inserted into `freelist`.
pub fn extend<O: Oracle>(
    o: &mut O,
    freelist: &mut FreeSet,
    words: u32,
) -> Result<u32, OracleExhausted> {
    debug_assert!(words % 2 == 1, "extend requires an odd word count");

    let sbrk_words = words + 1;
    let old_break = o.sbrk(sbrk_words)?;
    let block = old_break - 1;

    let prev_alloc = header::is_prev_alloc(header::read(o, block));
    let free_words = sbrk_words - 2;
    header::set_size(o, block, free_words);
    header::mark_free(o, block, prev_alloc);

    let epilogue = header::footer_offset(block, free_words) + 1;
    header::write_sentinel(o, epilogue, false);

    Ok(coalesce::coalesce(o, freelist, block))
}
