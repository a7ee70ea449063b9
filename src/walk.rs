//! Heap walker (spec C2): computing the next/previous block from a given
//! header position.
//!
//! Walking forward never needs a footer — `next` is computed purely from
//! the current block's own size and alloc bit. Walking backward does need
//! a footer, which is exactly why allocated blocks don't have to carry
//! one: `prev_if_free` only ever gets called when `prev_alloc` says the
//! predecessor is free, i.e. exactly when its footer exists to read.

use crate::header;
use crate::oracle::Oracle;

/// Word-offset of the block immediately after the one at `offset`.
///
/// Valid for any block, free or allocated, including the prologue — the
/// formula degenerates correctly to a zero-size sentinel's own `next`.
#[inline]
pub fn next<O: Oracle>(o: &O, offset: u32) -> u32 {
    let h = header::read(o, offset);
    let size = header::size_words(h);
    if header::is_free(h) {
        offset + size + 2
    } else {
        offset + size + 1
    }
}

/// Word-offset of the block immediately before the one at `offset`, if
/// that predecessor is free. Returns `None` when the predecessor is
/// allocated, since an allocated block carries no footer to read its
/// size from.
#[inline]
pub fn prev_if_free<O: Oracle>(o: &O, offset: u32) -> Option<u32> {
    let h = header::read(o, offset);
    if header::is_prev_alloc(h) {
        return None;
    }
    let footer = header::read(o, offset - 1);
    let size = header::size_words(footer);
    Some(offset - size - 2)
}

/// The first real block, immediately after the prologue sentinel.
#[inline]
pub fn first_block<O: Oracle>(o: &O) -> u32 {
    next(o, o.heap_lo())
}

/// Whether the block at `offset` is the epilogue sentinel.
#[inline]
pub fn is_epilogue<O: Oracle>(o: &O, offset: u32) -> bool {
    header::is_sentinel(header::read(o, offset))
}
