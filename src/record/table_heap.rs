use std::sync::Arc;

use super::error::RecordResult;
use super::schema::Schema;
use super::table_page::{SLOT_SIZE, TablePage};
use super::tuple::{RecordId, Tuple};
use crate::buffer::BufferPool;
use crate::file::{INVALID_PAGE_ID, PageId, PageType};

/// A table's storage: a linked list of record pages.
///
/// Inserts walk the chain first-fit and grow a new tail page when nothing
/// fits. Every page is pinned only while it is being consulted.
pub struct TableHeap {
    pool: Arc<BufferPool>,
    first_page_id: PageId,
    last_page_id: PageId,
}

impl TableHeap {
    /// Create a heap with a fresh, empty first page.
    pub fn new(pool: Arc<BufferPool>) -> RecordResult<Self> {
        let guard = pool.new_page_guard()?;
        let first_page_id = guard.page_id();
        guard.page().set_page_type(PageType::Table);
        {
            let mut data = guard.data_mut();
            TablePage::init(&mut data);
        }
        guard.mark_dirty();
        drop(guard);

        Ok(Self {
            pool,
            first_page_id,
            last_page_id: first_page_id,
        })
    }

    /// Open a heap whose first page already exists, walking the chain to
    /// find the current tail.
    pub fn open(pool: Arc<BufferPool>, first_page_id: PageId) -> RecordResult<Self> {
        let mut last_page_id = first_page_id;
        loop {
            let guard = pool.fetch_guard(last_page_id)?;
            let next = {
                let mut data = guard.data_mut();
                TablePage::from_data(&mut data).next_page_id()
            };
            if next == INVALID_PAGE_ID {
                break;
            }
            last_page_id = next;
        }

        Ok(Self {
            pool,
            first_page_id,
            last_page_id,
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn last_page_id(&self) -> PageId {
        self.last_page_id
    }

    /// Insert a serialized tuple into the first page with room, appending
    /// a new tail page when the whole chain is full.
    pub fn insert(&mut self, tuple: &Tuple) -> RecordResult<RecordId> {
        let bytes = tuple.serialize();
        let size = bytes.len();

        let mut page_id = self.first_page_id;
        loop {
            let guard = self.pool.fetch_guard(page_id)?;
            let next = {
                let mut data = guard.data_mut();
                let mut page = TablePage::from_data(&mut data);

                if page.free_space() >= size + SLOT_SIZE {
                    let slot_id = page.insert(&bytes)?;
                    drop(data);
                    guard.mark_dirty();
                    return Ok(RecordId::new(page_id, slot_id));
                }

                page.next_page_id()
            };
            drop(guard);

            if next == INVALID_PAGE_ID {
                page_id = self.append_page(page_id)?;
            } else {
                page_id = next;
            }
        }
    }

    /// Allocate an empty record page and link it after the current tail.
    fn append_page(&mut self, tail_page_id: PageId) -> RecordResult<PageId> {
        let guard = self.pool.new_page_guard()?;
        let new_page_id = guard.page_id();
        guard.page().set_page_type(PageType::Table);
        {
            let mut data = guard.data_mut();
            TablePage::init(&mut data);
        }
        guard.mark_dirty();

        {
            let tail = self.pool.fetch_guard(tail_page_id)?;
            let mut data = tail.data_mut();
            TablePage::from_data(&mut data).set_next_page_id(new_page_id);
            drop(data);
            tail.mark_dirty();
        }

        self.last_page_id = new_page_id;
        Ok(new_page_id)
    }

    /// Read and deserialize the tuple at `rid`.
    pub fn get(&self, rid: RecordId, schema: &Schema) -> RecordResult<Tuple> {
        let guard = self.pool.fetch_guard(rid.page_id)?;
        let mut data = guard.data_mut();
        let page = TablePage::from_data(&mut data);
        let bytes = page.tuple_bytes(rid.slot_id)?;
        Tuple::deserialize(bytes, schema)
    }

    /// Tombstone the tuple at `rid`.
    pub fn delete(&self, rid: RecordId) -> RecordResult<()> {
        let guard = self.pool.fetch_guard(rid.page_id)?;
        {
            let mut data = guard.data_mut();
            TablePage::from_data(&mut data).delete(rid.slot_id)?;
        }
        guard.mark_dirty();
        Ok(())
    }

    /// Replace the tuple at `rid`, keeping its record id.
    pub fn update(&self, rid: RecordId, tuple: &Tuple) -> RecordResult<()> {
        let bytes = tuple.serialize();
        let guard = self.pool.fetch_guard(rid.page_id)?;
        {
            let mut data = guard.data_mut();
            TablePage::from_data(&mut data).update(rid.slot_id, &bytes)?;
        }
        guard.mark_dirty();
        Ok(())
    }

    /// Forward iterator over live record ids, in page-chain order.
    pub fn iter(&self) -> TableHeapIter<'_> {
        TableHeapIter {
            heap: self,
            position: Position::Start,
        }
    }

    /// First live rid on or after `page_id`, following the chain.
    fn first_rid_from(&self, mut page_id: PageId) -> RecordResult<Option<RecordId>> {
        while page_id != INVALID_PAGE_ID {
            let guard = self.pool.fetch_guard(page_id)?;
            let mut data = guard.data_mut();
            let page = TablePage::from_data(&mut data);

            if let Some(slot_id) = page.first_slot() {
                return Ok(Some(RecordId::new(page_id, slot_id)));
            }
            page_id = page.next_page_id();
        }
        Ok(None)
    }

    /// Next live rid after `rid`, crossing page boundaries as needed.
    fn next_rid(&self, rid: RecordId) -> RecordResult<Option<RecordId>> {
        let next_page = {
            let guard = self.pool.fetch_guard(rid.page_id)?;
            let mut data = guard.data_mut();
            let page = TablePage::from_data(&mut data);

            if let Some(slot_id) = page.next_slot(rid.slot_id) {
                return Ok(Some(RecordId::new(rid.page_id, slot_id)));
            }
            page.next_page_id()
        };

        if next_page == INVALID_PAGE_ID {
            return Ok(None);
        }
        self.first_rid_from(next_page)
    }
}

enum Position {
    Start,
    At(RecordId),
    End,
}

/// Cursor over a heap's live tuples.
///
/// Holds no pin between steps; each advance pins a page only while
/// consulting it.
pub struct TableHeapIter<'a> {
    heap: &'a TableHeap,
    position: Position,
}

impl Iterator for TableHeapIter<'_> {
    type Item = RecordResult<RecordId>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = match self.position {
            Position::Start => self.heap.first_rid_from(self.heap.first_page_id),
            Position::At(rid) => self.heap.next_rid(rid),
            Position::End => return None,
        };

        match step {
            Ok(Some(rid)) => {
                self.position = Position::At(rid);
                Some(Ok(rid))
            }
            Ok(None) => {
                self.position = Position::End;
                None
            }
            Err(e) => {
                self.position = Position::End;
                Some(Err(e))
            }
        }
    }
}
