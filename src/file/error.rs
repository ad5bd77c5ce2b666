use std::io;
use thiserror::Error;

use super::PageId;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid database file format (bad magic number)")]
    InvalidMagic,

    #[error("Page ID out of range: {0}")]
    PageOutOfRange(PageId),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Cannot deallocate the header page")]
    DeallocateHeaderPage,
}

pub type FileResult<T> = Result<T, FileError>;
