use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::file::FrameId;

/// LRU victim selection over unpinned frames.
///
/// Tracks only frames whose pin count has dropped to zero. `unpin` promotes
/// a frame to most-recently-used, `pin` withdraws it from consideration,
/// and `victim` pops the least-recently-used entry. All operations are O(1)
/// through the backing `LruCache`.
pub struct LruReplacer {
    frames: Mutex<LruCache<FrameId, ()>>,
}

impl LruReplacer {
    /// `capacity` must cover the buffer pool size so entries are never
    /// silently evicted by the cache itself.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    /// Mark a frame evictable, moving it to the most-recent end.
    pub fn unpin(&self, frame_id: FrameId) {
        self.frames.lock().unwrap().put(frame_id, ());
    }

    /// Withdraw a frame from eviction consideration.
    pub fn pin(&self, frame_id: FrameId) {
        self.frames.lock().unwrap().pop(&frame_id);
    }

    /// Remove and return the least recently unpinned frame.
    pub fn victim(&self) -> Option<FrameId> {
        self.frames
            .lock()
            .unwrap()
            .pop_lru()
            .map(|(frame_id, ())| frame_id)
    }

    /// Number of frames currently eligible for eviction.
    pub fn size(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}
