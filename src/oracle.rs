//! The heap oracle: a grow-only, contiguous word region, analogous to
//! `sbrk`/`mem_sbrk` in the classical malloc-lab driver this allocator's
//! design descends from. This is the one external collaborator the core
//! allocator (`header`, `walk`, `freelist`, `place`, `coalesce`, `extend`)
//! never reaches around: everything else only ever talks to a `&mut dyn
//! Oracle` (or, monomorphized, a generic `O: Oracle`).
//!
//! The heap only ever grows; nothing here ever shrinks it or returns pages.

use core::fmt;

/// The oracle has no more room to grow the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleExhausted;

impl fmt::Display for OracleExhausted {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("heap oracle is exhausted: no more room to extend the heap")
    }
}

/// The external heap oracle contract (spec §6): current bounds, current
/// size, and a grow-only `sbrk`.
///
/// Implementations own the backing storage and must guarantee that once a
/// word offset has been handed out (via `sbrk`), the address that offset
/// resolves to never changes — callers cache raw payload pointers across
/// calls that may themselves grow the heap.
pub trait Oracle {
    /// Word-offset of the first word of the committed region (always `0`;
    /// that word holds the prologue header).
    fn heap_lo(&self) -> u32;

    /// Word-offset of the last word of the committed region.
    fn heap_hi(&self) -> u32;

    /// Number of words currently committed.
    fn heap_size_words(&self) -> u32;

    /// Grow the committed region by `words` words. Returns the word-offset
    /// of the start of the newly committed region (the old break), or
    /// `Err(OracleExhausted)` if there isn't enough room. On error, no
    /// partial extension is installed.
    fn sbrk(&mut self, words: u32) -> Result<u32, OracleExhausted>;

    /// Read the word at `offset`.
    fn read(&self, offset: u32) -> u32;

    /// Write `value` to the word at `offset`.
    fn write(&mut self, offset: u32, value: u32);

    /// A raw, stable pointer to the byte at the given word offset. Used only
    /// to hand the user a payload address; never used to synthesize an
    /// offset back out of an arbitrary pointer (that direction goes through
    /// `header`'s block-from-payload arithmetic instead).
    fn payload_ptr(&self, offset: u32) -> *mut u8;

    /// Invert `payload_ptr`: the word offset a previously-handed-out pointer
    /// resolves to. Callers only ever pass back pointers this same oracle
    /// produced, at a word boundary.
    fn offset_of(&self, ptr: *mut u8) -> u32;
}

/// A fixed-capacity, pointer-stable backing store for the heap oracle.
///
/// Grounded on `imp_static_array.rs`'s scratch buffer: a single allocation
/// made once, up front, so that growing the logical heap (`sbrk`) never
/// invalidates a payload pointer handed out earlier. The capacity is a
/// build-time constant (see `build.rs`), the same way the teacher's
/// `WEE_ALLOC_STATIC_ARRAY_BACKEND_BYTES` env var is threaded through.
pub struct ArrayOracle {
    words: Box<[u32]>,
    committed: u32,
}

impl ArrayOracle {
    /// Build an oracle with room for exactly `capacity_words` words.
    pub fn with_capacity_words(capacity_words: u32) -> Self {
        ArrayOracle {
            words: vec![0u32; capacity_words as usize].into_boxed_slice(),
            committed: 0,
        }
    }

    /// Build an oracle sized from the build-time default (or the
    /// `SEGTREE_ALLOC_ORACLE_CAPACITY_WORDS` env var, see `build.rs`).
    pub fn new() -> Self {
        const CAPACITY_WORDS: u32 =
            include!(concat!(env!("OUT_DIR"), "/oracle_capacity_words.txt"));
        Self::with_capacity_words(CAPACITY_WORDS)
    }

    pub fn capacity_words(&self) -> u32 {
        self.words.len() as u32
    }
}

impl Default for ArrayOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl Oracle for ArrayOracle {
    #[inline]
    fn heap_lo(&self) -> u32 {
        0
    }

    #[inline]
    fn heap_hi(&self) -> u32 {
        self.committed.saturating_sub(1)
    }

    #[inline]
    fn heap_size_words(&self) -> u32 {
        self.committed
    }

    fn sbrk(&mut self, words: u32) -> Result<u32, OracleExhausted> {
        let old_break = self.committed;
        let new_break = old_break.checked_add(words).ok_or(OracleExhausted)?;
        if new_break as usize > self.words.len() {
            log::warn!(
                "heap oracle exhausted: requested {} more words, only {} of {} remain",
                words,
                self.words.len() as u32 - old_break,
                self.words.len()
            );
            return Err(OracleExhausted);
        }
        self.committed = new_break;
        Ok(old_break)
    }

    #[inline]
    fn read(&self, offset: u32) -> u32 {
        self.words[offset as usize]
    }

    #[inline]
    fn write(&mut self, offset: u32, value: u32) {
        self.words[offset as usize] = value;
    }

    #[inline]
    fn payload_ptr(&self, offset: u32) -> *mut u8 {
        self.words[offset as usize..].as_ptr() as *mut u8
    }

    #[inline]
    fn offset_of(&self, ptr: *mut u8) -> u32 {
        let base = self.words.as_ptr() as usize;
        let addr = ptr as usize;
        debug_assert!(addr >= base && (addr - base).is_multiple_of(4));
        ((addr - base) / 4) as u32
    }
}
