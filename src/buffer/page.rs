use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::file::{PAGE_SIZE, PageId, PageType};

/// Common page header offsets (see the on-disk format):
/// page id (4) + type tag (4) + log sequence slot (8, reserved) + reserved (8)
const PAGE_ID_OFFSET: usize = 0;
const PAGE_TYPE_OFFSET: usize = 4;
const LSN_OFFSET: usize = 8;

/// One buffer pool frame's worth of page data plus its cache metadata.
///
/// The byte buffer is shared between the pool and any caller holding a pin;
/// the pin count guarantees residency, not exclusive access, so the bytes
/// sit behind a lock and callers that mutate the same page must coordinate
/// above this layer. Pin count and dirty flag are atomic so they can be
/// read without taking the data lock.
pub struct Page {
    data: RwLock<Box<[u8]>>,
    pin_count: AtomicI32,
    is_dirty: AtomicBool,
}

impl Page {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(vec![0u8; PAGE_SIZE].into_boxed_slice()),
            pin_count: AtomicI32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Borrow the page bytes for reading.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.data.read().unwrap()
    }

    /// Borrow the page bytes for writing.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.data.write().unwrap()
    }

    /// Page id stored in the common header.
    pub fn page_id(&self) -> PageId {
        let data = self.data();
        u32::from_le_bytes(data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_page_id(&self, page_id: PageId) {
        let mut data = self.data_mut();
        data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4].copy_from_slice(&page_id.to_le_bytes());
    }

    /// Page type tag stored in the common header.
    pub fn page_type(&self) -> PageType {
        let data = self.data();
        let tag = u32::from_le_bytes(
            data[PAGE_TYPE_OFFSET..PAGE_TYPE_OFFSET + 4]
                .try_into()
                .unwrap(),
        );
        PageType::from_u32(tag)
    }

    pub fn set_page_type(&self, page_type: PageType) {
        let mut data = self.data_mut();
        data[PAGE_TYPE_OFFSET..PAGE_TYPE_OFFSET + 4]
            .copy_from_slice(&(page_type as u32).to_le_bytes());
    }

    /// Log sequence slot. Reserved for a write-ahead log; never consulted.
    pub fn lsn(&self) -> u64 {
        let data = self.data();
        u64::from_le_bytes(data[LSN_OFFSET..LSN_OFFSET + 8].try_into().unwrap())
    }

    pub fn set_lsn(&self, lsn: u64) {
        let mut data = self.data_mut();
        data[LSN_OFFSET..LSN_OFFSET + 8].copy_from_slice(&lsn.to_le_bytes());
    }

    pub fn pin_count(&self) -> i32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub fn inc_pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn dec_pin(&self) {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "pin count must stay non-negative");
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Zero the buffer and clear cache metadata, readying the frame for reuse.
    pub fn reset(&self) {
        self.data_mut().fill(0);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
