use thiserror::Error;

use super::tuple::RecordId;
use crate::buffer::BufferError;
use crate::file::PageId;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Slot index out of range: page_id={0}, slot_id={1}")]
    SlotOutOfRange(PageId, u32),

    #[error("Tuple not found: {0:?}")]
    TupleNotFound(RecordId),

    #[error("Page full: page_id={0}")]
    PageFull(PageId),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
