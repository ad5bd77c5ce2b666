use std::sync::Arc;

use super::error::{IndexError, IndexResult};
use super::node::{InternalNode, LeafNode};
use super::{IndexKey, MAX_FANOUT};
use crate::buffer::BufferPool;
use crate::file::{INVALID_PAGE_ID, PageId, PageType};
use crate::record::RecordId;

/// B+ tree over integer keys mapping to record ids, with all nodes living
/// in buffer pool pages.
///
/// Single value per key; duplicates are rejected on insert. The tree is
/// not internally synchronized: one writer at a time, with the buffer
/// pool providing pinning safety underneath. Descent pins exactly one
/// page at a time, consulting the page-type header to tell internal nodes
/// from leaves.
pub struct BPlusTree {
    pool: Arc<BufferPool>,
    fanout: usize,
    root_page_id: PageId,
    root_is_leaf: bool,
}

impl BPlusTree {
    /// Create an empty tree. A node is full at `fanout` keys.
    pub fn new(pool: Arc<BufferPool>, fanout: usize) -> IndexResult<Self> {
        if !(3..=MAX_FANOUT).contains(&fanout) {
            return Err(IndexError::InvalidFanout(fanout));
        }

        Ok(Self {
            pool,
            fanout,
            root_page_id: INVALID_PAGE_ID,
            root_is_leaf: true,
        })
    }

    /// Reattach to a tree whose pages already exist on disk. The caller
    /// supplies the root location out of band; nothing is persisted here.
    pub fn open(
        pool: Arc<BufferPool>,
        fanout: usize,
        root_page_id: PageId,
        root_is_leaf: bool,
    ) -> IndexResult<Self> {
        if !(3..=MAX_FANOUT).contains(&fanout) {
            return Err(IndexError::InvalidFanout(fanout));
        }

        Ok(Self {
            pool,
            fanout,
            root_page_id,
            root_is_leaf,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id == INVALID_PAGE_ID
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Root location; callers need this to reopen the tree.
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn root_is_leaf(&self) -> bool {
        self.root_is_leaf
    }

    /// Insert a key pointing at `rid`. Fails with `DuplicateKey` when the
    /// key is already present.
    pub fn insert(&mut self, key: IndexKey, rid: RecordId) -> IndexResult<()> {
        if self.is_empty() {
            let guard = self.pool.new_page_guard()?;
            let root_id = guard.page_id();
            guard.page().set_page_type(PageType::IndexLeaf);
            {
                let mut data = guard.data_mut();
                let mut leaf = LeafNode::init(&mut data, self.fanout);
                leaf.insert_at(0, key, rid);
            }
            guard.mark_dirty();
            drop(guard);

            self.root_page_id = root_id;
            self.root_is_leaf = true;
            return Ok(());
        }

        loop {
            let leaf_id = self.find_leaf(key)?;
            {
                let guard = self.pool.fetch_guard(leaf_id)?;
                let mut data = guard.data_mut();
                let mut leaf = LeafNode::from_data(&mut data, self.fanout);
                match leaf.find_key(key) {
                    Ok(_) => return Err(IndexError::DuplicateKey(key)),
                    Err(pos) if !leaf.is_full() => {
                        leaf.insert_at(pos, key, rid);
                        guard.mark_dirty();
                        return Ok(());
                    }
                    Err(_) => {}
                }
            }

            // The target leaf is full: split it and descend again
            self.split_leaf(leaf_id)?;
        }
    }

    /// Point lookup.
    pub fn lookup(&self, key: IndexKey) -> IndexResult<Option<RecordId>> {
        if self.is_empty() {
            return Ok(None);
        }

        let leaf_id = self.find_leaf(key)?;
        let guard = self.pool.fetch_guard(leaf_id)?;
        let mut data = guard.data_mut();
        let leaf = LeafNode::from_data(&mut data, self.fanout);
        Ok(leaf.find_key(key).ok().map(|pos| leaf.rid(pos)))
    }

    /// Remove a key. Underflowed nodes are tolerated (no rebalancing);
    /// order within every node is preserved, and an internal root that
    /// empties collapses into its sole child.
    pub fn remove(&mut self, key: IndexKey) -> IndexResult<()> {
        if self.is_empty() {
            return Err(IndexError::KeyNotFound(key));
        }

        let leaf_id = self.find_leaf(key)?;
        {
            let guard = self.pool.fetch_guard(leaf_id)?;
            let mut data = guard.data_mut();
            let mut leaf = LeafNode::from_data(&mut data, self.fanout);
            match leaf.find_key(key) {
                Ok(pos) => {
                    leaf.remove_at(pos);
                    guard.mark_dirty();
                }
                Err(_) => return Err(IndexError::KeyNotFound(key)),
            }
        }

        self.collapse_root()
    }

    /// All entries with key in `[lo, hi]`, ascending, via the leaf chain.
    pub fn range(&self, lo: IndexKey, hi: IndexKey) -> IndexResult<Vec<(IndexKey, RecordId)>> {
        let mut out = Vec::new();
        if self.is_empty() || lo > hi {
            return Ok(out);
        }

        let mut leaf_id = self.find_leaf(lo)?;
        while leaf_id != INVALID_PAGE_ID {
            let guard = self.pool.fetch_guard(leaf_id)?;
            let mut data = guard.data_mut();
            let leaf = LeafNode::from_data(&mut data, self.fanout);

            for i in 0..leaf.key_count() {
                let k = leaf.key(i);
                if k < lo {
                    continue;
                }
                if k > hi {
                    return Ok(out);
                }
                out.push((k, leaf.rid(i)));
            }

            leaf_id = leaf.next_leaf();
        }

        Ok(out)
    }

    /// Levels from root to leaf (0 for an empty tree, 1 for a sole leaf).
    pub fn height(&self) -> IndexResult<usize> {
        if self.is_empty() {
            return Ok(0);
        }

        let mut height = 1;
        let mut page_id = self.root_page_id;
        loop {
            let guard = self.pool.fetch_guard(page_id)?;
            match guard.page().page_type() {
                PageType::IndexLeaf => return Ok(height),
                PageType::IndexInternal => {
                    let mut data = guard.data_mut();
                    let node = InternalNode::from_data(&mut data, self.fanout);
                    page_id = node.child(0);
                    height += 1;
                }
                _ => return Err(IndexError::CorruptedNode(page_id)),
            }
        }
    }

    /// Descend to the leaf that should hold `key`, pinning one page at a
    /// time: the parent is unpinned before the child is fetched.
    fn find_leaf(&self, key: IndexKey) -> IndexResult<PageId> {
        let mut page_id = self.root_page_id;
        loop {
            let guard = self.pool.fetch_guard(page_id)?;
            match guard.page().page_type() {
                PageType::IndexLeaf => return Ok(page_id),
                PageType::IndexInternal => {
                    let mut data = guard.data_mut();
                    let node = InternalNode::from_data(&mut data, self.fanout);
                    page_id = node.find_child(key);
                }
                _ => return Err(IndexError::CorruptedNode(page_id)),
            }
        }
    }

    /// Split a full leaf: the upper half moves to a new right sibling,
    /// the sibling chain is relinked, and the new leaf's first key is
    /// promoted into the parent.
    fn split_leaf(&mut self, leaf_id: PageId) -> IndexResult<()> {
        let new_guard = self.pool.new_page_guard()?;
        let new_id = new_guard.page_id();
        new_guard.page().set_page_type(PageType::IndexLeaf);

        let old_guard = self.pool.fetch_guard(leaf_id)?;

        let (promote_key, parent_id) = {
            let mut old_data = old_guard.data_mut();
            let mut new_data = new_guard.data_mut();
            let mut old = LeafNode::from_data(&mut old_data, self.fanout);
            let mut new = LeafNode::init(&mut new_data, self.fanout);

            let count = old.key_count();
            let split = self.fanout / 2;
            for i in split..count {
                let k = old.key(i);
                let r = old.rid(i);
                new.set_key(i - split, k);
                new.set_rid(i - split, r);
            }
            new.set_key_count(count - split);
            old.set_key_count(split);

            new.set_next_leaf(old.next_leaf());
            old.set_next_leaf(new_id);
            new.set_parent(old.parent());

            (new.key(0), old.parent())
        };

        old_guard.mark_dirty();
        new_guard.mark_dirty();
        drop(old_guard);
        drop(new_guard);

        if parent_id == INVALID_PAGE_ID {
            self.create_new_root(leaf_id, promote_key, new_id)
        } else {
            self.insert_into_parent(leaf_id, promote_key, new_id)
        }
    }

    /// Split a full internal node. The key at the split index is promoted
    /// (not retained); children that moved to the new node are reparented.
    fn split_internal(&mut self, node_id: PageId) -> IndexResult<()> {
        let new_guard = self.pool.new_page_guard()?;
        let new_id = new_guard.page_id();
        new_guard.page().set_page_type(PageType::IndexInternal);

        let old_guard = self.pool.fetch_guard(node_id)?;

        let (promote_key, parent_id, moved_children) = {
            let mut old_data = old_guard.data_mut();
            let mut new_data = new_guard.data_mut();
            let mut old = InternalNode::from_data(&mut old_data, self.fanout);
            let mut new = InternalNode::init(&mut new_data, self.fanout);

            let count = old.key_count();
            let m = self.fanout / 2;
            let promote = old.key(m);

            for i in m + 1..count {
                let k = old.key(i);
                new.set_key(i - m - 1, k);
            }
            let mut moved = Vec::with_capacity(count - m);
            for i in m + 1..=count {
                let c = old.child(i);
                new.set_child(i - m - 1, c);
                moved.push(c);
            }
            new.set_key_count(count - m - 1);
            old.set_key_count(m);
            new.set_parent(old.parent());

            (promote, old.parent(), moved)
        };

        old_guard.mark_dirty();
        new_guard.mark_dirty();
        drop(old_guard);
        drop(new_guard);

        for child_id in moved_children {
            self.set_node_parent(child_id, new_id)?;
        }

        if parent_id == INVALID_PAGE_ID {
            self.create_new_root(node_id, promote_key, new_id)
        } else {
            self.insert_into_parent(node_id, promote_key, new_id)
        }
    }

    /// Insert a separator key and right-child pointer into `left`'s
    /// parent, splitting the parent first when it is full.
    fn insert_into_parent(
        &mut self,
        left_id: PageId,
        key: IndexKey,
        right_id: PageId,
    ) -> IndexResult<()> {
        let parent_id = self.node_parent(left_id)?;
        if parent_id == INVALID_PAGE_ID {
            return self.create_new_root(left_id, key, right_id);
        }

        let inserted = {
            let guard = self.pool.fetch_guard(parent_id)?;
            let mut data = guard.data_mut();
            let mut parent = InternalNode::from_data(&mut data, self.fanout);
            if parent.is_full() {
                false
            } else {
                parent.insert(key, right_id);
                guard.mark_dirty();
                true
            }
        };

        if inserted {
            // A parent split may have rehomed `left` since the sibling's
            // parent field was first copied; keep the right child in step
            self.set_node_parent(right_id, parent_id)?;
            return Ok(());
        }

        self.split_internal(parent_id)?;
        self.insert_into_parent(left_id, key, right_id)
    }

    /// Grow the tree by one level: a fresh internal root with one key and
    /// the two split halves as children.
    fn create_new_root(
        &mut self,
        left_id: PageId,
        key: IndexKey,
        right_id: PageId,
    ) -> IndexResult<()> {
        let guard = self.pool.new_page_guard()?;
        let root_id = guard.page_id();
        guard.page().set_page_type(PageType::IndexInternal);
        {
            let mut data = guard.data_mut();
            let mut root = InternalNode::init(&mut data, self.fanout);
            root.set_key(0, key);
            root.set_child(0, left_id);
            root.set_child(1, right_id);
            root.set_key_count(1);
        }
        guard.mark_dirty();
        drop(guard);

        self.set_node_parent(left_id, root_id)?;
        self.set_node_parent(right_id, root_id)?;

        self.root_page_id = root_id;
        self.root_is_leaf = false;
        Ok(())
    }

    /// An internal root with zero keys hands the tree over to its sole
    /// child and is deleted.
    fn collapse_root(&mut self) -> IndexResult<()> {
        if self.root_is_leaf || self.is_empty() {
            return Ok(());
        }

        let sole_child = {
            let guard = self.pool.fetch_guard(self.root_page_id)?;
            let mut data = guard.data_mut();
            let root = InternalNode::from_data(&mut data, self.fanout);
            (root.key_count() == 0).then(|| root.child(0))
        };

        if let Some(child_id) = sole_child {
            let old_root = self.root_page_id;
            self.set_node_parent(child_id, INVALID_PAGE_ID)?;

            let child_is_leaf = {
                let guard = self.pool.fetch_guard(child_id)?;
                guard.page().page_type() == PageType::IndexLeaf
            };

            self.root_page_id = child_id;
            self.root_is_leaf = child_is_leaf;
            self.pool.delete(old_root)?;
        }

        Ok(())
    }

    fn node_parent(&self, page_id: PageId) -> IndexResult<PageId> {
        let guard = self.pool.fetch_guard(page_id)?;
        let page_type = guard.page().page_type();
        let mut data = guard.data_mut();
        match page_type {
            PageType::IndexLeaf => Ok(LeafNode::from_data(&mut data, self.fanout).parent()),
            PageType::IndexInternal => {
                Ok(InternalNode::from_data(&mut data, self.fanout).parent())
            }
            _ => Err(IndexError::CorruptedNode(page_id)),
        }
    }

    fn set_node_parent(&self, page_id: PageId, parent: PageId) -> IndexResult<()> {
        let guard = self.pool.fetch_guard(page_id)?;
        let page_type = guard.page().page_type();
        {
            let mut data = guard.data_mut();
            match page_type {
                PageType::IndexLeaf => {
                    LeafNode::from_data(&mut data, self.fanout).set_parent(parent)
                }
                PageType::IndexInternal => {
                    InternalNode::from_data(&mut data, self.fanout).set_parent(parent)
                }
                _ => return Err(IndexError::CorruptedNode(page_id)),
            }
        }
        guard.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileManager;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<BufferPool>) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_manager =
            Arc::new(FileManager::open(temp_dir.path().join("test.db")).unwrap());
        (temp_dir, Arc::new(BufferPool::new(50, file_manager)))
    }

    fn rid(key: IndexKey) -> RecordId {
        RecordId::new(key as u32, 0)
    }

    impl BPlusTree {
        /// Test helper: DFS collecting every leaf's depth and the largest
        /// key count seen in any node.
        fn inspect(&self) -> (Vec<usize>, usize) {
            let mut depths = Vec::new();
            let mut max_keys = 0;
            if self.is_empty() {
                return (depths, max_keys);
            }

            let mut stack = vec![(self.root_page_id, 1usize)];
            while let Some((page_id, depth)) = stack.pop() {
                let guard = self.pool.fetch_guard(page_id).unwrap();
                let page_type = guard.page().page_type();
                let mut data = guard.data_mut();
                match page_type {
                    PageType::IndexLeaf => {
                        let leaf = LeafNode::from_data(&mut data, self.fanout);
                        max_keys = max_keys.max(leaf.key_count());
                        depths.push(depth);
                    }
                    PageType::IndexInternal => {
                        let node = InternalNode::from_data(&mut data, self.fanout);
                        max_keys = max_keys.max(node.key_count());
                        for i in 0..=node.key_count() {
                            stack.push((node.child(i), depth + 1));
                        }
                    }
                    other => panic!("unexpected page type {other:?}"),
                }
            }
            (depths, max_keys)
        }
    }

    #[test]
    fn test_empty_tree() {
        let (_temp_dir, pool) = setup();
        let mut tree = BPlusTree::new(pool, 4).unwrap();

        assert!(tree.is_empty());
        assert_eq!(tree.lookup(5).unwrap(), None);
        assert!(matches!(tree.remove(5), Err(IndexError::KeyNotFound(5))));
        assert_eq!(tree.range(0, 100).unwrap(), vec![]);
        assert_eq!(tree.height().unwrap(), 0);
    }

    #[test]
    fn test_invalid_fanout() {
        let (_temp_dir, pool) = setup();
        assert!(matches!(
            BPlusTree::new(Arc::clone(&pool), 2),
            Err(IndexError::InvalidFanout(2))
        ));
        assert!(matches!(
            BPlusTree::new(pool, MAX_FANOUT + 1),
            Err(IndexError::InvalidFanout(_))
        ));
    }

    #[test]
    fn test_insert_and_lookup_with_splits() {
        let (_temp_dir, pool) = setup();
        let mut tree = BPlusTree::new(pool, 4).unwrap();

        let keys = [10, 20, 5, 15, 25, 1, 30, 35, 40];
        for &k in &keys {
            tree.insert(k, rid(k)).unwrap();
        }

        assert_eq!(tree.lookup(15).unwrap(), Some(rid(15)));
        assert_eq!(tree.lookup(100).unwrap(), None);

        // Leaf chain yields all keys in ascending order
        let all = tree.range(i32::MIN, i32::MAX).unwrap();
        let chain: Vec<IndexKey> = all.iter().map(|&(k, _)| k).collect();
        assert_eq!(chain, vec![1, 5, 10, 15, 20, 25, 30, 35, 40]);
        for (k, r) in all {
            assert_eq!(r, rid(k));
        }
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let (_temp_dir, pool) = setup();
        let mut tree = BPlusTree::new(pool, 4).unwrap();

        tree.insert(7, rid(7)).unwrap();
        assert!(matches!(
            tree.insert(7, rid(7)),
            Err(IndexError::DuplicateKey(7))
        ));
        // The original mapping is untouched
        assert_eq!(tree.lookup(7).unwrap(), Some(rid(7)));
    }

    #[test]
    fn test_range_scan() {
        let (_temp_dir, pool) = setup();
        let mut tree = BPlusTree::new(pool, 4).unwrap();

        for &k in &[10, 20, 5, 15, 25, 1, 30, 35, 40] {
            tree.insert(k, rid(k)).unwrap();
        }

        let hits = tree.range(10, 30).unwrap();
        let keys: Vec<IndexKey> = hits.iter().map(|&(k, _)| k).collect();
        assert_eq!(keys, vec![10, 15, 20, 25, 30]);

        // Bounds that fall between keys
        let keys: Vec<IndexKey> = tree
            .range(11, 29)
            .unwrap()
            .iter()
            .map(|&(k, _)| k)
            .collect();
        assert_eq!(keys, vec![15, 20, 25]);

        assert_eq!(tree.range(50, 40).unwrap(), vec![]);
    }

    #[test]
    fn test_hundred_keys_balanced() {
        let (_temp_dir, pool) = setup();
        let mut tree = BPlusTree::new(pool, 8).unwrap();

        for k in 0..100 {
            tree.insert(k, rid(k)).unwrap();
        }

        for k in 0..100 {
            assert_eq!(tree.lookup(k).unwrap(), Some(rid(k)), "key {k}");
        }

        // ceil(log_4(100)) + 1
        assert!(tree.height().unwrap() <= 4);

        let (depths, max_keys) = tree.inspect();
        assert!(depths.windows(2).all(|w| w[0] == w[1]), "unequal leaf depths");
        assert!(max_keys <= 8, "node over fanout: {max_keys}");
    }

    #[test]
    fn test_deep_tree_with_internal_splits() {
        let (_temp_dir, pool) = setup();
        let mut tree = BPlusTree::new(pool, 4).unwrap();

        // Insert in a scattered deterministic order
        let keys: Vec<IndexKey> = (0..300).map(|i| (i * 7) % 300).collect();
        for &k in &keys {
            tree.insert(k, rid(k)).unwrap();
        }

        for k in 0..300 {
            assert_eq!(tree.lookup(k).unwrap(), Some(rid(k)), "key {k}");
        }

        let all: Vec<IndexKey> = tree
            .range(i32::MIN, i32::MAX)
            .unwrap()
            .iter()
            .map(|&(k, _)| k)
            .collect();
        assert_eq!(all, (0..300).collect::<Vec<_>>());

        let (depths, max_keys) = tree.inspect();
        assert!(depths.windows(2).all(|w| w[0] == w[1]));
        assert!(max_keys <= 4);
    }

    #[test]
    fn test_remove() {
        let (_temp_dir, pool) = setup();
        let mut tree = BPlusTree::new(pool, 4).unwrap();

        for k in 0..20 {
            tree.insert(k, rid(k)).unwrap();
        }

        tree.remove(7).unwrap();
        tree.remove(13).unwrap();

        assert_eq!(tree.lookup(7).unwrap(), None);
        assert_eq!(tree.lookup(13).unwrap(), None);
        assert!(matches!(tree.remove(7), Err(IndexError::KeyNotFound(7))));

        // Remaining keys stay ordered and reachable
        let keys: Vec<IndexKey> = tree
            .range(i32::MIN, i32::MAX)
            .unwrap()
            .iter()
            .map(|&(k, _)| k)
            .collect();
        let expected: Vec<IndexKey> = (0..20).filter(|&k| k != 7 && k != 13).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_remove_then_reinsert() {
        let (_temp_dir, pool) = setup();
        let mut tree = BPlusTree::new(pool, 4).unwrap();

        for k in 0..10 {
            tree.insert(k, rid(k)).unwrap();
        }
        for k in 0..10 {
            tree.remove(k).unwrap();
        }
        for k in 0..10 {
            assert_eq!(tree.lookup(k).unwrap(), None);
        }

        for k in 0..10 {
            tree.insert(k, rid(k)).unwrap();
        }
        for k in 0..10 {
            assert_eq!(tree.lookup(k).unwrap(), Some(rid(k)));
        }
    }

    #[test]
    fn test_pin_balance_after_operations() {
        let (_temp_dir, pool) = setup();
        let mut tree = BPlusTree::new(Arc::clone(&pool), 4).unwrap();

        for k in 0..50 {
            tree.insert(k, rid(k)).unwrap();
        }
        tree.lookup(25).unwrap();
        tree.range(10, 40).unwrap();
        tree.remove(25).unwrap();
        let _ = tree.insert(30, rid(30)); // duplicate error path

        assert_eq!(pool.pinned_frame_count(), 0);
    }

    #[test]
    fn test_reopen_from_root() {
        let (_temp_dir, pool) = setup();

        let (root, is_leaf) = {
            let mut tree = BPlusTree::new(Arc::clone(&pool), 4).unwrap();
            for k in 0..30 {
                tree.insert(k, rid(k)).unwrap();
            }
            (tree.root_page_id(), tree.root_is_leaf())
        };

        let tree = BPlusTree::open(pool, 4, root, is_leaf).unwrap();
        for k in 0..30 {
            assert_eq!(tree.lookup(k).unwrap(), Some(rid(k)));
        }
    }
}
