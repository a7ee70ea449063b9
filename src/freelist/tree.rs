//! The BST of address-ordered rings covering every free block larger than
//! the small classes. Grounded on `mm-tree-sb.c`'s `put`/`take`/`add`/`del`/
//! `deleteMin`/`ceiling`, converted from recursion to iteration (per
//! spec.md §9's explicit direction for this port).
//!
//! Each distinct size present in the tree is a BST node; every free block
//! of that size hangs off the node in an address-ascending ring. The node
//! itself is always the ring's lowest-address member, so that a successful
//! BST search already hands back the address-minimum block for that size
//! — no separate minimum-of-ring step is needed on the read path.
//!
//! Keeping the node pinned to the lowest address means an insert that
//! beats the current head promotes the new block to the node position,
//! carrying its left/right children along; an insert that doesn't beat it
//! just splices into the ring in the right place.

use super::{read_left, read_pred, read_right, read_succ, size_of, write_children, write_ring, NONE};
use crate::oracle::Oracle;

/// Insert `block` into the tree rooted at `root`, returning the new root.
pub fn insert<O: Oracle>(o: &mut O, root: u32, block: u32) -> u32 {
    if root == NONE {
        write_ring(o, block, NONE, NONE);
        write_children(o, block, NONE, NONE);
        return block;
    }

    let words = size_of(o, block);
    let mut parent = NONE;
    let mut parent_is_left = false;
    let mut cur = root;
    loop {
        let cur_words = size_of(o, cur);
        if words == cur_words {
            if block < cur {
                // `block` outranks `cur` by address and becomes the new node.
                write_children(o, block, read_left(o, cur), read_right(o, cur));
                write_ring(o, block, NONE, cur);
                write_ring(o, cur, block, read_succ(o, cur));
                write_children(o, cur, NONE, NONE);
                if parent == NONE {
                    return block;
                } else if parent_is_left {
                    o_write_left(o, parent, block);
                } else {
                    o_write_right(o, parent, block);
                }
            } else {
                splice_into_ring(o, cur, block);
            }
            return root;
        } else if words < cur_words {
            let left = read_left(o, cur);
            if left == NONE {
                write_ring(o, block, NONE, NONE);
                write_children(o, block, NONE, NONE);
                o_write_left(o, cur, block);
                return root;
            }
            parent = cur;
            parent_is_left = true;
            cur = left;
        } else {
            let right = read_right(o, cur);
            if right == NONE {
                write_ring(o, block, NONE, NONE);
                write_children(o, block, NONE, NONE);
                o_write_right(o, cur, block);
                return root;
            }
            parent = cur;
            parent_is_left = false;
            cur = right;
        }
    }
}

/// Remove a specific known free `block` from the tree rooted at `root`,
/// returning the new root.
pub fn remove<O: Oracle>(o: &mut O, root: u32, block: u32) -> u32 {
    let words = size_of(o, block);

    // Find the size-node for `words`, tracking how to rewrite whoever
    // points at it (the parent's child slot, or the root itself).
    let mut parent = NONE;
    let mut parent_is_left = false;
    let mut node = root;
    while node != NONE {
        let node_words = size_of(o, node);
        if words == node_words {
            break;
        } else if words < node_words {
            parent = node;
            parent_is_left = true;
            node = read_left(o, node);
        } else {
            parent = node;
            parent_is_left = false;
            node = read_right(o, node);
        }
    }
    debug_assert!(node != NONE, "removed block's size has no tree node");

    if node != block {
        // `block` is a non-head ring member; unlink it without touching
        // the tree shape at all.
        unlink_from_ring(o, block);
        return root;
    }

    let succ = read_succ(o, node);
    let new_node = if succ != NONE {
        // Promote the next address to head; it inherits the children.
        write_children(o, succ, read_left(o, node), read_right(o, node));
        write_ring(o, succ, NONE, read_succ(o, succ));
        succ
    } else {
        delete_bst_node(o, node)
    };

    if parent == NONE {
        new_node
    } else {
        if parent_is_left {
            o_write_left(o, parent, new_node);
        } else {
            o_write_right(o, parent, new_node);
        }
        root
    }
}

/// Ceiling search: the address-minimum block of the smallest tree size
/// that is `>= words`, or `None`.
pub fn ceiling<O: Oracle>(o: &O, root: u32, words: u32) -> Option<u32> {
    let mut cur = root;
    let mut best = NONE;
    while cur != NONE {
        let cur_words = size_of(o, cur);
        if cur_words == words {
            return Some(cur);
        } else if cur_words < words {
            cur = read_right(o, cur);
        } else {
            best = cur;
            cur = read_left(o, cur);
        }
    }
    if best == NONE {
        None
    } else {
        Some(best)
    }
}

fn o_write_left<O: Oracle>(o: &mut O, node: u32, left: u32) {
    write_children(o, node, left, read_right(o, node));
}

fn o_write_right<O: Oracle>(o: &mut O, node: u32, right: u32) {
    write_children(o, node, read_left(o, node), right);
}

/// Standard BST delete of a node with no remaining ring members: detach it
/// from its own subtree, returning the replacement root for that subtree.
fn delete_bst_node<O: Oracle>(o: &mut O, node: u32) -> u32 {
    let left = read_left(o, node);
    let right = read_right(o, node);
    if right == NONE {
        left
    } else if left == NONE {
        right
    } else {
        let (min, new_right) = delete_min(o, right);
        write_children(o, min, left, new_right);
        min
    }
}

/// Remove the minimum-size node from the subtree rooted at `subtree`,
/// returning `(min_node, new_subtree_root)`. The minimum node's own
/// left/right fields are left untouched by this function; callers that
/// reuse it as a node must overwrite them.
fn delete_min<O: Oracle>(o: &mut O, subtree: u32) -> (u32, u32) {
    if read_left(o, subtree) == NONE {
        return (subtree, read_right(o, subtree));
    }
    let mut parent = subtree;
    loop {
        let left = read_left(o, parent);
        if read_left(o, left) == NONE {
            o_write_left(o, parent, read_right(o, left));
            return (left, subtree);
        }
        parent = left;
    }
}

/// Splice `block` into the address-ordered ring headed by `head`, which is
/// known to be the lowest address in the ring (so `block` never belongs
/// before it).
fn splice_into_ring<O: Oracle>(o: &mut O, head: u32, block: u32) {
    let mut cur = head;
    loop {
        let succ = read_succ(o, cur);
        if succ == NONE || succ > block {
            write_ring(o, block, cur, succ);
            if succ != NONE {
                write_ring(o, succ, block, read_succ(o, succ));
            }
            write_ring(o, cur, read_pred(o, cur), block);
            return;
        }
        cur = succ;
    }
}

fn unlink_from_ring<O: Oracle>(o: &mut O, block: u32) {
    let pred = read_pred(o, block);
    let succ = read_succ(o, block);
    debug_assert!(pred != NONE, "a ring's lowest address member must be its BST node");
    write_ring(o, pred, read_pred(o, pred), succ);
    if succ != NONE {
        write_ring(o, succ, pred, read_succ(o, succ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header;
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
    fn insert_and_ceiling_across_distinct_sizes() {
        let (mut o, offsets) = heap_with_free_blocks(&[14, 20, 30]);
        let mut root = NONE;
        for &b in &offsets {
            root = insert(&mut o, root, b);
        }
        assert_eq!(ceiling(&o, root, 15), Some(offsets[1]));
        assert_eq!(ceiling(&o, root, 30), Some(offsets[2]));
        assert_eq!(ceiling(&o, root, 31), None);
    }

    #[test]
    fn same_size_ring_keeps_lowest_address_as_node() {
        let (mut o, offsets) = heap_with_free_blocks(&[20, 20, 20]);
        let mut root = NONE;
        // Insert out of address order; lowest must still end up as head.
        root = insert(&mut o, root, offsets[2]);
        root = insert(&mut o, root, offsets[0]);
        root = insert(&mut o, root, offsets[1]);
        assert_eq!(ceiling(&o, root, 20), Some(*offsets.iter().min().unwrap()));
    }

    #[test]
    fn remove_head_promotes_ring_successor() {
        let (mut o, offsets) = heap_with_free_blocks(&[20, 20]);
        let mut root = NONE;
        root = insert(&mut o, root, offsets[1]);
        root = insert(&mut o, root, offsets[0]);
        let head = offsets[0].min(offsets[1]);
        let other = offsets[0].max(offsets[1]);
        root = remove(&mut o, root, head);
        assert_eq!(ceiling(&o, root, 20), Some(other));
        root = remove(&mut o, root, other);
        assert_eq!(ceiling(&o, root, 20), None);
    }

    #[test]
    fn remove_non_head_ring_member_leaves_tree_shape_alone() {
        let (mut o, offsets) = heap_with_free_blocks(&[20, 20, 40]);
        let mut root = NONE;
        for &b in &offsets {
            root = insert(&mut o, root, b);
        }
        let head = offsets[0].min(offsets[1]);
        let other = offsets[0].max(offsets[1]);
        root = remove(&mut o, root, other);
        assert_eq!(ceiling(&o, root, 20), Some(head));
        assert_eq!(ceiling(&o, root, 21), Some(offsets[2]));
    }

    #[test]
    fn remove_node_with_two_children_promotes_successor_subtree() {
        let (mut o, offsets) = heap_with_free_blocks(&[10, 20, 30, 40, 50]);
        let mut root = NONE;
        for &b in &offsets {
            root = insert(&mut o, root, b);
        }
        // Remove the node sitting between smaller and larger sizes.
        root = remove(&mut o, root, offsets[2]);
        assert_eq!(ceiling(&o, root, 25), Some(offsets[3]));
        assert_eq!(ceiling(&o, root, 10), Some(offsets[0]));
        assert_eq!(ceiling(&o, root, 50), Some(offsets[4]));
        assert_eq!(ceiling(&o, root, 51), None);
    }
}
