mod error;
mod schema;
mod table;
mod table_heap;
mod table_page;
mod tuple;
mod value;

pub use error::{RecordError, RecordResult};
pub use schema::{Column, Schema};
pub use table::Table;
pub use table_heap::{TableHeap, TableHeapIter};
pub use table_page::{SLOT_SIZE, TABLE_PAGE_HEADER_SIZE, TablePage};
pub use tuple::{RecordId, SlotId, Tuple};
pub use value::{DataType, Value};
