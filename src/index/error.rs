use thiserror::Error;

use super::IndexKey;
use crate::buffer::BufferError;
use crate::file::PageId;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Duplicate key: {0}")]
    DuplicateKey(IndexKey),

    #[error("Key not found: {0}")]
    KeyNotFound(IndexKey),

    #[error("Invalid fanout: {0}")]
    InvalidFanout(usize),

    #[error("Unexpected page type in tree at page {0}")]
    CorruptedNode(PageId),
}
