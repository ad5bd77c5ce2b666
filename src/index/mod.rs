//! Paged B+ tree index over integer keys.

mod btree;
mod error;
mod node;

pub use btree::BPlusTree;
pub use error::{IndexError, IndexResult};
pub use node::{InternalNode, LeafNode};

use crate::file::PAGE_DATA_SIZE;

/// Key type for the index (INTEGER columns)
pub type IndexKey = i32;

pub(crate) const KEY_SIZE: usize = 4;
pub(crate) const RID_SIZE: usize = 8;
pub(crate) const CHILD_SIZE: usize = 4;

/// Leaf payload header: key count (4) + next leaf (4) + parent (4)
pub(crate) const LEAF_HEADER_SIZE: usize = 12;

/// Internal payload header: key count (4) + parent (4)
pub(crate) const INTERNAL_HEADER_SIZE: usize = 8;

/// Largest fanout whose leaf image still fits the page payload
pub const MAX_FANOUT: usize = (PAGE_DATA_SIZE - LEAF_HEADER_SIZE) / (KEY_SIZE + RID_SIZE);

/// Default fanout; chosen well inside the payload bound
pub const DEFAULT_FANOUT: usize = 100;

// Both node images must fit the page payload at the maximum fanout
const _: () = assert!(LEAF_HEADER_SIZE + MAX_FANOUT * (KEY_SIZE + RID_SIZE) <= PAGE_DATA_SIZE);
const _: () = assert!(
    INTERNAL_HEADER_SIZE + MAX_FANOUT * KEY_SIZE + (MAX_FANOUT + 1) * CHILD_SIZE
        <= PAGE_DATA_SIZE
);
const _: () = assert!(DEFAULT_FANOUT <= MAX_FANOUT);
