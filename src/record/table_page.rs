use super::error::{RecordError, RecordResult};
use super::tuple::SlotId;
use crate::file::{INVALID_PAGE_ID, PAGE_HEADER_SIZE, PAGE_SIZE, PageId};

/// Slotted page header: next page id (4) + slot count (4) +
/// free space pointer (4) + deleted slot count (4)
pub const TABLE_PAGE_HEADER_SIZE: usize = 16;

/// Each slot is a byte offset (4) and a byte size (4); offset 0 marks a
/// tombstone
pub const SLOT_SIZE: usize = 8;

const NEXT_PAGE_OFFSET: usize = PAGE_HEADER_SIZE;
const SLOT_COUNT_OFFSET: usize = PAGE_HEADER_SIZE + 4;
const FREE_SPACE_PTR_OFFSET: usize = PAGE_HEADER_SIZE + 8;
const DELETED_COUNT_OFFSET: usize = PAGE_HEADER_SIZE + 12;

/// First byte past the slotted header; the slot array grows forward from
/// here while tuple bytes grow backward from the page tail
const HEADER_END: usize = PAGE_HEADER_SIZE + TABLE_PAGE_HEADER_SIZE;

/// Slotted record layout over one page buffer.
///
/// A thin typed view borrowing the page bytes for the duration of a single
/// operation. Offsets stored in slots are absolute within the page.
pub struct TablePage<'a> {
    data: &'a mut [u8],
}

impl<'a> TablePage<'a> {
    /// Initialize a fresh record page in `data`: empty slot array, free
    /// space pointer at the page tail, no next page.
    pub fn init(data: &'a mut [u8]) -> Self {
        let mut page = Self { data };
        page.set_next_page_id(INVALID_PAGE_ID);
        page.set_slot_count(0);
        page.set_free_space_pointer(PAGE_SIZE as u32);
        page.set_deleted_slot_count(0);
        page
    }

    /// Wrap an existing record page buffer.
    pub fn from_data(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Page id from the common header, for error reporting.
    fn page_id(&self) -> PageId {
        self.read_u32(0)
    }

    pub fn next_page_id(&self) -> PageId {
        self.read_u32(NEXT_PAGE_OFFSET)
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        self.write_u32(NEXT_PAGE_OFFSET, page_id);
    }

    /// Number of slots, tombstones included.
    pub fn slot_count(&self) -> u32 {
        self.read_u32(SLOT_COUNT_OFFSET)
    }

    fn set_slot_count(&mut self, count: u32) {
        self.write_u32(SLOT_COUNT_OFFSET, count);
    }

    pub fn free_space_pointer(&self) -> u32 {
        self.read_u32(FREE_SPACE_PTR_OFFSET)
    }

    fn set_free_space_pointer(&mut self, ptr: u32) {
        self.write_u32(FREE_SPACE_PTR_OFFSET, ptr);
    }

    pub fn deleted_slot_count(&self) -> u32 {
        self.read_u32(DELETED_COUNT_OFFSET)
    }

    fn set_deleted_slot_count(&mut self, count: u32) {
        self.write_u32(DELETED_COUNT_OFFSET, count);
    }

    /// Number of live (non-tombstone) records.
    pub fn live_count(&self) -> u32 {
        self.slot_count() - self.deleted_slot_count()
    }

    fn slot(&self, slot_id: SlotId) -> (u32, u32) {
        let at = HEADER_END + slot_id as usize * SLOT_SIZE;
        (self.read_u32(at), self.read_u32(at + 4))
    }

    fn set_slot(&mut self, slot_id: SlotId, offset: u32, size: u32) {
        let at = HEADER_END + slot_id as usize * SLOT_SIZE;
        self.write_u32(at, offset);
        self.write_u32(at + 4, size);
    }

    /// Bytes available between the slot array and the tuple arena.
    pub fn free_space(&self) -> usize {
        let used = HEADER_END + self.slot_count() as usize * SLOT_SIZE;
        (self.free_space_pointer() as usize).saturating_sub(used)
    }

    /// Whether an insert of `tuple_size` bytes can go here, counting the
    /// slot a fresh insert would need when no tombstone is reusable.
    pub fn has_space_for(&self, tuple_size: usize) -> bool {
        let need_slot = self.deleted_slot_count() == 0;
        self.free_space() >= tuple_size + if need_slot { SLOT_SIZE } else { 0 }
    }

    /// Sum of live tuple sizes in the byte arena.
    fn live_bytes(&self) -> usize {
        (0..self.slot_count())
            .map(|i| self.slot(i))
            .filter(|&(offset, _)| offset != 0)
            .map(|(_, size)| size as usize)
            .sum()
    }

    /// Space that would be available after compaction, excluding the slot
    /// array (which compaction never shrinks).
    fn reclaimable_space(&self) -> usize {
        PAGE_SIZE - HEADER_END - self.slot_count() as usize * SLOT_SIZE - self.live_bytes()
    }

    /// Insert serialized tuple bytes, reusing a tombstone slot when one
    /// exists. Compacts once and retries if the arena is fragmented.
    pub fn insert(&mut self, bytes: &[u8]) -> RecordResult<SlotId> {
        let size = bytes.len();

        if !self.has_space_for(size) {
            self.compact();
            if !self.has_space_for(size) {
                return Err(RecordError::PageFull(self.page_id()));
            }
        }

        let slot_id = match self.find_tombstone() {
            Some(slot_id) => {
                self.set_deleted_slot_count(self.deleted_slot_count() - 1);
                slot_id
            }
            None => {
                let slot_id = self.slot_count();
                self.set_slot_count(slot_id + 1);
                slot_id
            }
        };

        let new_ptr = self.free_space_pointer() - size as u32;
        self.data[new_ptr as usize..new_ptr as usize + size].copy_from_slice(bytes);
        self.set_free_space_pointer(new_ptr);
        self.set_slot(slot_id, new_ptr, size as u32);

        Ok(slot_id)
    }

    /// Tombstone a slot. Fails on out-of-range or already-deleted slots.
    pub fn delete(&mut self, slot_id: SlotId) -> RecordResult<()> {
        let (offset, _) = self.checked_slot(slot_id)?;
        if offset == 0 {
            return Err(RecordError::TupleNotFound(super::tuple::RecordId::new(
                self.page_id(),
                slot_id,
            )));
        }

        self.set_slot(slot_id, 0, 0);
        self.set_deleted_slot_count(self.deleted_slot_count() + 1);
        Ok(())
    }

    /// Replace a tuple, keeping its slot index.
    ///
    /// A tuple that fits the existing slot is overwritten in place;
    /// otherwise the old slot is tombstoned, the new bytes are inserted
    /// (compacting if needed), and the slots are swapped so the record id
    /// stays stable.
    pub fn update(&mut self, slot_id: SlotId, bytes: &[u8]) -> RecordResult<()> {
        let (offset, size) = self.checked_slot(slot_id)?;
        if offset == 0 {
            return Err(RecordError::TupleNotFound(super::tuple::RecordId::new(
                self.page_id(),
                slot_id,
            )));
        }

        let new_size = bytes.len();

        if new_size <= size as usize {
            self.data[offset as usize..offset as usize + new_size].copy_from_slice(bytes);
            self.set_slot(slot_id, offset, new_size as u32);
            return Ok(());
        }

        // Relocation must be checked up front: once the old slot is
        // tombstoned a compaction discards its bytes
        if new_size > self.reclaimable_space() + size as usize {
            return Err(RecordError::PageFull(self.page_id()));
        }

        self.set_slot(slot_id, 0, 0);
        self.set_deleted_slot_count(self.deleted_slot_count() + 1);

        let new_slot = self.insert(bytes)?;
        if new_slot != slot_id {
            let (new_offset, new_len) = self.slot(new_slot);
            self.set_slot(slot_id, new_offset, new_len);
            self.set_slot(new_slot, 0, 0);
        }

        Ok(())
    }

    /// Borrow the serialized bytes of a live tuple.
    pub fn tuple_bytes(&self, slot_id: SlotId) -> RecordResult<&[u8]> {
        let (offset, size) = self.checked_slot(slot_id)?;
        if offset == 0 {
            return Err(RecordError::TupleNotFound(super::tuple::RecordId::new(
                self.page_id(),
                slot_id,
            )));
        }

        Ok(&self.data[offset as usize..(offset + size) as usize])
    }

    /// Lowest-index live slot, if any.
    pub fn first_slot(&self) -> Option<SlotId> {
        (0..self.slot_count()).find(|&i| self.slot(i).0 != 0)
    }

    /// Next live slot after `slot_id`, if any.
    pub fn next_slot(&self, slot_id: SlotId) -> Option<SlotId> {
        (slot_id + 1..self.slot_count()).find(|&i| self.slot(i).0 != 0)
    }

    fn find_tombstone(&self) -> Option<SlotId> {
        if self.deleted_slot_count() == 0 {
            return None;
        }
        (0..self.slot_count()).find(|&i| self.slot(i).0 == 0)
    }

    fn checked_slot(&self, slot_id: SlotId) -> RecordResult<(u32, u32)> {
        if slot_id >= self.slot_count() {
            return Err(RecordError::SlotOutOfRange(self.page_id(), slot_id));
        }
        Ok(self.slot(slot_id))
    }

    /// Rewrite live tuple bodies contiguously toward the page tail and
    /// reset the free space pointer. Slots keep their indices; tombstones
    /// stay tombstones.
    pub fn compact(&mut self) {
        let live: Vec<(SlotId, Vec<u8>)> = (0..self.slot_count())
            .filter_map(|i| {
                let (offset, size) = self.slot(i);
                (offset != 0).then(|| {
                    (
                        i,
                        self.data[offset as usize..(offset + size) as usize].to_vec(),
                    )
                })
            })
            .collect();

        let mut ptr = PAGE_SIZE;
        for (slot_id, bytes) in live.iter().rev() {
            ptr -= bytes.len();
            self.data[ptr..ptr + bytes.len()].copy_from_slice(bytes);
            self.set_slot(*slot_id, ptr as u32, bytes.len() as u32);
        }
        self.set_free_space_pointer(ptr as u32);
    }
}
