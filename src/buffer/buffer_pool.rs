use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use super::error::{BufferError, BufferResult};
use super::page::Page;
use super::replacer::LruReplacer;
use crate::file::{FileManager, FrameId, HEADER_PAGE_ID, PageId};

/// Bounded in-memory cache of pages with pin/unpin reference counting.
///
/// Owns a fixed array of frames, a page table mapping resident page ids to
/// frames, a free-frame queue, and an LRU replacer for victim selection.
/// The pool's mutex covers the page table and free list for the duration
/// of each operation; page bytes are read and written outside it, under
/// the pin that keeps the frame resident.
pub struct BufferPool {
    frames: Vec<Arc<Page>>,
    state: Mutex<PoolState>,
    replacer: LruReplacer,
    file_manager: Arc<FileManager>,
    eviction_write_failures: AtomicU64,
}

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

impl BufferPool {
    pub fn new(pool_size: usize, file_manager: Arc<FileManager>) -> Self {
        let frames = (0..pool_size).map(|_| Arc::new(Page::new())).collect();
        let free_list = (0..pool_size).collect();

        Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
            file_manager,
            eviction_write_failures: AtomicU64::new(0),
        }
    }

    /// Pin a page, loading it from disk if it is not resident.
    ///
    /// The page comes back with its pin count incremented; every fetch
    /// must be paired with exactly one `unpin`.
    pub fn fetch(&self, page_id: PageId) -> BufferResult<Arc<Page>> {
        let mut state = self.state.lock().unwrap();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let page = Arc::clone(&self.frames[frame_id]);
            page.inc_pin();
            self.replacer.pin(frame_id);
            return Ok(page);
        }

        let frame_id = self.find_free_frame(&mut state)?;
        let page = Arc::clone(&self.frames[frame_id]);

        {
            let mut data = page.data_mut();
            if let Err(e) = self.file_manager.read_page(page_id, &mut data) {
                state.free_list.push_back(frame_id);
                return Err(e.into());
            }
        }

        // The id stored in the page header must agree with the id we
        // asked for; a mismatch is reported but not fatal.
        let stored = page.page_id();
        if stored != page_id && page_id != HEADER_PAGE_ID {
            warn!(expected = page_id, found = stored, "page id mismatch on load");
        }
        page.set_page_id(page_id);
        page.set_dirty(false);
        page.inc_pin();

        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok(page)
    }

    /// Allocate a fresh page id and pin a zeroed frame for it.
    ///
    /// The new page starts dirty: it does not exist on disk until flushed
    /// or evicted.
    pub fn new_page(&self) -> BufferResult<(PageId, Arc<Page>)> {
        let mut state = self.state.lock().unwrap();

        let frame_id = self.find_free_frame(&mut state)?;
        let page_id = self.file_manager.allocate();

        let page = Arc::clone(&self.frames[frame_id]);
        page.reset();
        page.set_page_id(page_id);
        page.set_dirty(true);
        page.inc_pin();

        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok((page_id, page))
    }

    /// Drop one pin, OR-ing the dirty flag with `dirty`.
    ///
    /// When the pin count reaches zero the frame becomes evictable.
    pub fn unpin(&self, page_id: PageId, dirty: bool) -> BufferResult<()> {
        let state = self.state.lock().unwrap();

        let &frame_id = state
            .page_table
            .get(&page_id)
            .ok_or(BufferError::PageNotResident(page_id))?;
        let page = &self.frames[frame_id];

        if page.pin_count() <= 0 {
            return Err(BufferError::PageNotPinned(page_id));
        }

        if dirty {
            page.set_dirty(true);
        }
        page.dec_pin();

        if page.pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write a resident page through to disk and clear its dirty flag.
    pub fn flush(&self, page_id: PageId) -> BufferResult<()> {
        let state = self.state.lock().unwrap();

        let &frame_id = state
            .page_table
            .get(&page_id)
            .ok_or(BufferError::PageNotResident(page_id))?;
        let page = &self.frames[frame_id];

        {
            let data = page.data();
            self.file_manager.write_page(page_id, &data)?;
        }
        page.set_dirty(false);

        Ok(())
    }

    /// Flush every resident dirty page, best-effort.
    ///
    /// A per-page write failure is logged and the remaining pages are
    /// still attempted.
    pub fn flush_all(&self) {
        let state = self.state.lock().unwrap();

        for (&page_id, &frame_id) in &state.page_table {
            let page = &self.frames[frame_id];
            if !page.is_dirty() {
                continue;
            }

            let result = {
                let data = page.data();
                self.file_manager.write_page(page_id, &data)
            };
            match result {
                Ok(()) => page.set_dirty(false),
                Err(e) => warn!(page_id, error = %e, "failed to flush page"),
            }
        }

        if let Err(e) = self.file_manager.flush() {
            warn!(error = %e, "failed to sync database file");
        }
    }

    /// Evict a page if resident (it must be unpinned) and deallocate its
    /// id in the file manager.
    pub fn delete(&self, page_id: PageId) -> BufferResult<()> {
        let mut state = self.state.lock().unwrap();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let page = &self.frames[frame_id];

            if page.pin_count() > 0 {
                return Err(BufferError::PagePinned(page_id));
            }

            self.replacer.pin(frame_id);
            state.page_table.remove(&page_id);
            page.reset();
            state.free_list.push_back(frame_id);
        }

        self.file_manager.deallocate(page_id)?;
        Ok(())
    }

    /// Fetch a page behind a guard that unpins on scope exit.
    pub fn fetch_guard(&self, page_id: PageId) -> BufferResult<PageGuard<'_>> {
        let page = self.fetch(page_id)?;
        Ok(PageGuard {
            pool: self,
            page,
            page_id,
            dirty: Cell::new(false),
        })
    }

    /// Create a page behind a guard that unpins on scope exit.
    pub fn new_page_guard(&self) -> BufferResult<PageGuard<'_>> {
        let (page_id, page) = self.new_page()?;
        Ok(PageGuard {
            pool: self,
            page,
            page_id,
            dirty: Cell::new(false),
        })
    }

    /// Claim a frame for a new occupant: free list first, then LRU victim.
    ///
    /// A dirty victim is written through before its buffer is reused; on
    /// write failure the victim stays resident and the caller's operation
    /// fails.
    fn find_free_frame(&self, state: &mut MutexGuard<'_, PoolState>) -> BufferResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(BufferError::OutOfFrames)?;
        let victim = &self.frames[frame_id];
        let victim_page_id = victim.page_id();

        if victim.is_dirty() {
            let result = {
                let data = victim.data();
                self.file_manager.write_page(victim_page_id, &data)
            };
            if let Err(e) = result {
                self.eviction_write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(page_id = victim_page_id, error = %e, "failed to write back evicted page");
                self.replacer.unpin(frame_id);
                return Err(e.into());
            }
        }

        state.page_table.remove(&victim_page_id);
        victim.reset();

        Ok(frame_id)
    }

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Number of never-used or vacated frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().unwrap().free_list.len()
    }

    /// Number of unpinned resident frames eligible for eviction.
    pub fn replacer_size(&self) -> usize {
        self.replacer.size()
    }

    /// Number of frames currently holding a pinned page.
    pub fn pinned_frame_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .page_table
            .values()
            .filter(|&&frame_id| self.frames[frame_id].pin_count() > 0)
            .count()
    }

    /// Number of pages resident in the pool.
    pub fn resident_page_count(&self) -> usize {
        self.state.lock().unwrap().page_table.len()
    }

    /// Check whether a page is resident.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.state.lock().unwrap().page_table.contains_key(&page_id)
    }

    /// Write-back failures observed during eviction since startup.
    pub fn eviction_write_failures(&self) -> u64 {
        self.eviction_write_failures.load(Ordering::Relaxed)
    }

    pub fn file_manager(&self) -> &Arc<FileManager> {
        &self.file_manager
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.flush_all();
    }
}

/// A pinned page that unpins itself on scope exit.
///
/// The dirty flag passed to `unpin` defaults to clean; call `mark_dirty`
/// after mutating the page. Early returns cannot leak pins.
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    page: Arc<Page>,
    page_id: PageId,
    dirty: Cell<bool>,
}

impl PageGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Record that this pin mutated the page.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Borrow the page bytes for reading.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.page.data()
    }

    /// Borrow the page bytes for writing. Does not imply `mark_dirty`.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.page.data_mut()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.pool.unpin(self.page_id, self.dirty.get()) {
            warn!(page_id = self.page_id, error = %e, "failed to unpin page");
        }
    }
}
