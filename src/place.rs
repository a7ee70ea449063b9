//! Placement (spec C4): split a free block or hand over the whole thing,
//! whichever keeps the leftover usably large.
//!
//! Grounded on `mm-tree-sb.c`'s `place`. A block is only ever split when
//! the leftover payload would be at least 2 words (the smallest a free
//! block can hold) — `cwords >= awords + 3` accounts for the leftover's
//! own header and footer on top of its payload. Below that threshold the
//! whole block, including the word its footer would have occupied, goes
//! to the caller; allocated blocks don't carry footers, so that word is
//! recovered as extra (unreported) payload rather than wasted. This is
//! also why a caller only ever needs `cwords >= awords - 1`, not `awords`
//! itself: the entry points (spec C7) search the free-set for exactly that
//! relaxed threshold, on the understanding that whole-occupation can make
//! up the missing word.

use crate::header;
use crate::oracle::Oracle;
use crate::walk;

/// Split result: the block actually handed to the caller keeps `block`'s
/// offset; `Split` additionally reports the new free remainder so the
/// caller can insert it into the free-set index.
pub enum Placed {
    Whole,
    Split { remainder: u32 },
}

/// Place `awords` of payload into the free block at `block`, which must
/// already have been removed from the free-set index. `awords` must be
/// the caller's already-rounded, already-minimum-enforced request size.
pub fn place<O: Oracle>(o: &mut O, block: u32, awords: u32) -> Placed {
    let header = header::read(o, block);
    let cwords = header::size_words(header);
    let prev_alloc = header::is_prev_alloc(header);
    debug_assert!(
        cwords + 1 >= awords,
        "free block chosen by find_fit must cover at least awords - 1"
    );

    if cwords >= awords + 3 {
        header::set_size(o, block, awords);
        header::mark_alloc(o, block, prev_alloc);

        let remainder = walk::next(o, block);
        let rem_words = cwords - awords - 1;
        let rem_header = header::pack(rem_words, false, true);
        o.write(remainder, rem_header);
        o.write(header::footer_offset(remainder, rem_words), rem_header);

        Placed::Split { remainder }
    } else {
        header::set_size(o, block, cwords + 1);
        header::mark_alloc(o, block, prev_alloc);

        let next = walk::next(o, block);
        header::set_prev_alloc(o, next, true);

        Placed::Whole
    }
}
