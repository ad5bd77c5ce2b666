use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use super::error::{FileError, FileResult};
use super::{HEADER_PAGE_ID, PAGE_SIZE, PageId};

/// Magic number stored at the start of the header page
const MAGIC_NUMBER: u32 = 0xDEAD_BEEF;

/// Header layout: magic (4) + page count (4) + free list length (4)
const HEADER_FIXED_SIZE: usize = 12;

/// How many free page ids fit in the header page
const MAX_FREE_LIST_LEN: usize = (PAGE_SIZE - HEADER_FIXED_SIZE) / 4;

/// Manages the single database file as an array of fixed-size pages.
///
/// The first page is the header: magic number, total page count, and the
/// free list of deallocated page ids. The header is written when a new
/// file is initialized and again at shutdown; in between, allocation
/// state lives only in memory.
pub struct FileManager {
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,
    path: PathBuf,
    page_count: u32,
    free_list: Vec<PageId>,
}

impl FileManager {
    /// Open an existing database file or create a new one.
    ///
    /// A new (or empty) file receives an initialized header page
    /// synchronously. An existing file has its header parsed; a magic
    /// number mismatch is fatal.
    pub fn open<P: AsRef<Path>>(path: P) -> FileResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut inner = FileInner {
            file,
            path,
            page_count: 1,
            free_list: Vec::new(),
        };

        if inner.file.metadata()?.len() == 0 {
            inner.write_header()?;
            inner.file.sync_data()?;
        } else {
            inner.read_header()?;
        }

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Read one page into `buf` at its file offset.
    ///
    /// Pages past the end of the file (allocated but never written) read
    /// back as zeroes.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> FileResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut inner = self.inner.lock().unwrap();

        if page_id >= inner.page_count {
            return Err(FileError::PageOutOfRange(page_id));
        }

        inner.file.seek(SeekFrom::Start(file_offset(page_id)))?;
        let mut read = 0;
        while read < PAGE_SIZE {
            let n = inner.file.read(&mut buf[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }

        // Short read: the page was allocated but never written
        if read < PAGE_SIZE {
            buf[read..].fill(0);
        }

        Ok(())
    }

    /// Write one page at its file offset and flush the stream.
    ///
    /// Writing past the current page count raises the count to cover the
    /// new page.
    pub fn write_page(&self, page_id: PageId, buf: &[u8]) -> FileResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut inner = self.inner.lock().unwrap();

        inner.file.seek(SeekFrom::Start(file_offset(page_id)))?;
        inner.file.write_all(buf)?;
        inner.file.flush()?;

        if page_id >= inner.page_count {
            inner.page_count = page_id + 1;
        }

        Ok(())
    }

    /// Allocate a page id, reusing the free list when possible.
    ///
    /// No I/O happens here; the page exists on disk only once something
    /// is written to it.
    pub fn allocate(&self) -> PageId {
        let mut inner = self.inner.lock().unwrap();

        if let Some(page_id) = inner.free_list.pop() {
            page_id
        } else {
            let page_id = inner.page_count;
            inner.page_count += 1;
            page_id
        }
    }

    /// Return a page id to the free list for reuse.
    pub fn deallocate(&self, page_id: PageId) -> FileResult<()> {
        let mut inner = self.inner.lock().unwrap();

        if page_id == HEADER_PAGE_ID {
            return Err(FileError::DeallocateHeaderPage);
        }
        if page_id >= inner.page_count {
            return Err(FileError::PageOutOfRange(page_id));
        }

        inner.free_list.push(page_id);
        Ok(())
    }

    /// Force all buffered writes down to the device.
    pub fn flush(&self) -> FileResult<()> {
        let inner = self.inner.lock().unwrap();
        inner.file.sync_data()?;
        Ok(())
    }

    /// Rewrite the header page with the current page count and free list.
    pub fn write_header(&self) -> FileResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.write_header()?;
        inner.file.sync_data()?;
        Ok(())
    }

    /// Total number of pages the file logically contains.
    pub fn page_count(&self) -> u32 {
        self.inner.lock().unwrap().page_count
    }

    /// Number of deallocated pages awaiting reuse.
    pub fn free_list_len(&self) -> usize {
        self.inner.lock().unwrap().free_list.len()
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> PathBuf {
        self.inner.lock().unwrap().path.clone()
    }
}

impl FileInner {
    fn read_header(&mut self) -> FileResult<()> {
        let mut header = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut header)?;

        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        if magic != MAGIC_NUMBER {
            return Err(FileError::InvalidMagic);
        }

        self.page_count = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let free_len = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;

        self.free_list.clear();
        self.free_list.reserve(free_len);
        for i in 0..free_len {
            let at = HEADER_FIXED_SIZE + i * 4;
            self.free_list
                .push(u32::from_le_bytes(header[at..at + 4].try_into().unwrap()));
        }

        Ok(())
    }

    fn write_header(&mut self) -> FileResult<()> {
        let mut header = vec![0u8; PAGE_SIZE];
        header[0..4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        header[4..8].copy_from_slice(&self.page_count.to_le_bytes());

        if self.free_list.len() > MAX_FREE_LIST_LEN {
            warn!(
                dropped = self.free_list.len() - MAX_FREE_LIST_LEN,
                "free list exceeds header capacity; excess page ids will leak"
            );
            self.free_list.truncate(MAX_FREE_LIST_LEN);
        }

        header[8..12].copy_from_slice(&(self.free_list.len() as u32).to_le_bytes());
        for (i, page_id) in self.free_list.iter().enumerate() {
            let at = HEADER_FIXED_SIZE + i * 4;
            header[at..at + 4].copy_from_slice(&page_id.to_le_bytes());
        }

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.flush()?;

        Ok(())
    }
}

impl Drop for FileManager {
    fn drop(&mut self) {
        // Persist allocation metadata at shutdown
        if let Ok(mut inner) = self.inner.lock() {
            let _ = inner.write_header();
            let _ = inner.file.sync_data();
        }
    }
}

fn file_offset(page_id: PageId) -> u64 {
    page_id as u64 * PAGE_SIZE as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager = FileManager::open(temp_dir.path().join("test.db")).unwrap();
        (temp_dir, manager)
    }

    #[test]
    fn test_new_file_has_header_page() {
        let (_temp_dir, manager) = setup();
        assert_eq!(manager.page_count(), 1);
        assert_eq!(manager.free_list_len(), 0);
    }

    #[test]
    fn test_allocate_extends_page_count() {
        let (_temp_dir, manager) = setup();

        assert_eq!(manager.allocate(), 1);
        assert_eq!(manager.allocate(), 2);
        assert_eq!(manager.page_count(), 3);
    }

    #[test]
    fn test_deallocate_and_reuse() {
        let (_temp_dir, manager) = setup();

        let a = manager.allocate();
        let b = manager.allocate();
        manager.deallocate(a).unwrap();
        manager.deallocate(b).unwrap();

        // Last deallocated id comes back first
        assert_eq!(manager.allocate(), b);
        assert_eq!(manager.allocate(), a);
        assert_eq!(manager.free_list_len(), 0);
    }

    #[test]
    fn test_deallocate_header_page_fails() {
        let (_temp_dir, manager) = setup();
        assert!(matches!(
            manager.deallocate(0),
            Err(FileError::DeallocateHeaderPage)
        ));
    }

    #[test]
    fn test_deallocate_out_of_range_fails() {
        let (_temp_dir, manager) = setup();
        assert!(matches!(
            manager.deallocate(99),
            Err(FileError::PageOutOfRange(99))
        ));
    }

    #[test]
    fn test_read_write_page() {
        let (_temp_dir, manager) = setup();

        let page_id = manager.allocate();
        let mut write_buf = vec![0u8; PAGE_SIZE];
        write_buf[0] = 42;
        write_buf[100] = 99;
        write_buf[PAGE_SIZE - 1] = 255;
        manager.write_page(page_id, &write_buf).unwrap();

        let mut read_buf = vec![0u8; PAGE_SIZE];
        manager.read_page(page_id, &mut read_buf).unwrap();
        assert_eq!(read_buf, write_buf);
    }

    #[test]
    fn test_read_out_of_range_fails() {
        let (_temp_dir, manager) = setup();

        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            manager.read_page(10, &mut buf),
            Err(FileError::PageOutOfRange(10))
        ));
    }

    #[test]
    fn test_read_allocated_but_unwritten_page_is_zeroed() {
        let (_temp_dir, manager) = setup();

        let page_id = manager.allocate();
        let mut buf = vec![1u8; PAGE_SIZE];
        manager.read_page(page_id, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_past_end_raises_page_count() {
        let (_temp_dir, manager) = setup();

        let buf = vec![7u8; PAGE_SIZE];
        manager.write_page(5, &buf).unwrap();
        assert_eq!(manager.page_count(), 6);
    }

    #[test]
    fn test_invalid_buffer_size() {
        let (_temp_dir, manager) = setup();

        let mut small = vec![0u8; PAGE_SIZE - 1];
        assert!(matches!(
            manager.read_page(0, &mut small),
            Err(FileError::InvalidPageSize { .. })
        ));

        let large = vec![0u8; PAGE_SIZE + 1];
        assert!(matches!(
            manager.write_page(0, &large),
            Err(FileError::InvalidPageSize { .. })
        ));
    }

    #[test]
    fn test_metadata_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.db");

        {
            let manager = FileManager::open(&path).unwrap();
            let buf = vec![3u8; PAGE_SIZE];
            for _ in 0..4 {
                let id = manager.allocate();
                manager.write_page(id, &buf).unwrap();
            }
            manager.deallocate(2).unwrap();
            // Drop rewrites the header
        }

        let manager = FileManager::open(&path).unwrap();
        assert_eq!(manager.page_count(), 5);
        assert_eq!(manager.free_list_len(), 1);
        assert_eq!(manager.allocate(), 2);
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.db");

        std::fs::write(&path, vec![0xFFu8; PAGE_SIZE]).unwrap();

        assert!(matches!(
            FileManager::open(&path),
            Err(FileError::InvalidMagic)
        ));
    }
}
