use thiserror::Error;

use crate::file::{FileError, PageId};

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("All buffer pool frames are pinned")]
    OutOfFrames,

    #[error("Page not resident in the buffer pool: {0}")]
    PageNotResident(PageId),

    #[error("Page is not pinned: {0}")]
    PageNotPinned(PageId),

    #[error("Page is still pinned: {0}")]
    PagePinned(PageId),
}

pub type BufferResult<T> = Result<T, BufferError>;
