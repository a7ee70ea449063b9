//! Small-class buckets: one exact-size ring per class (2, 4, ..., 12
//! words), pushed to and popped from the front. Grounded on
//! `small_block_insert`/`small_block_delete`/`small_find_fit` in
//! `mm-tree-sb.c`'s `find_index(words) = (words - 2) / 2`.

use super::{read_pred, read_succ, write_ring, NONE, SMALL_CLASSES, SMALL_MAX_WORDS};
use crate::oracle::Oracle;

#[inline]
fn class_index(words: u32) -> usize {
    debug_assert!(words >= 2 && words.is_multiple_of(2) && words <= SMALL_MAX_WORDS);
    ((words - 2) / 2) as usize
}

pub fn insert<O: Oracle>(o: &mut O, buckets: &mut [u32; SMALL_CLASSES], block: u32, words: u32) {
    let index = class_index(words);
    let head = buckets[index];
    if head == NONE {
        write_ring(o, block, NONE, NONE);
    } else {
        write_ring(o, head, block, read_succ(o, head));
        write_ring(o, block, NONE, head);
    }
    buckets[index] = block;
}

pub fn remove<O: Oracle>(o: &mut O, buckets: &mut [u32; SMALL_CLASSES], block: u32, words: u32) {
    let index = class_index(words);
    let pred = read_pred(o, block);
    let succ = read_succ(o, block);
    match (pred, succ) {
        (NONE, NONE) => buckets[index] = NONE,
        (NONE, _) => {
            write_ring(o, succ, NONE, read_succ(o, succ));
            buckets[index] = succ;
        }
        (_, NONE) => write_ring(o, pred, read_pred(o, pred), NONE),
        (_, _) => {
            write_ring(o, pred, read_pred(o, pred), succ);
            write_ring(o, succ, pred, read_succ(o, succ));
        }
    }
}

/// Scan from `(awords - 2) / 2` upward for the first non-empty bucket and
/// return its head. Every block in a bucket has that bucket's exact size,
/// which is always `>= awords` once the starting class is chosen correctly,
/// so no per-block size check is needed.
pub fn find_fit<O: Oracle>(_o: &O, buckets: &[u32; SMALL_CLASSES], awords: u32) -> Option<u32> {
    if awords > SMALL_MAX_WORDS {
        return None;
    }
    // Smallest class whose exact size is >= awords; awords need not itself
    // be an exact class size (and need not even be even) here.
    let awords = awords.max(2);
    let start = ((awords - 2) as usize).div_ceil(2);
    buckets[start..].iter().copied().find(|&h| h != NONE)
}
