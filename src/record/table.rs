use std::sync::Arc;

use super::error::RecordResult;
use super::schema::Schema;
use super::table_heap::TableHeap;
use super::tuple::{RecordId, Tuple};
use crate::buffer::BufferPool;
use crate::file::PageId;

/// A table handle: a heap file plus the schema its rows are checked
/// against.
///
/// Rows are validated before they reach the heap; reads come back
/// deserialized against the same schema. The schema itself is never
/// persisted and must be re-declared when reopening.
pub struct Table {
    name: String,
    schema: Schema,
    heap: TableHeap,
}

impl Table {
    /// Create a table with a fresh heap.
    pub fn create(
        name: impl Into<String>,
        schema: Schema,
        pool: Arc<BufferPool>,
    ) -> RecordResult<Self> {
        Ok(Self {
            name: name.into(),
            schema,
            heap: TableHeap::new(pool)?,
        })
    }

    /// Reattach to a table whose heap already exists on disk.
    pub fn open(
        name: impl Into<String>,
        schema: Schema,
        pool: Arc<BufferPool>,
        first_page_id: PageId,
    ) -> RecordResult<Self> {
        Ok(Self {
            name: name.into(),
            schema,
            heap: TableHeap::open(pool, first_page_id)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// First page of the heap; callers need this to reopen the table.
    pub fn first_page_id(&self) -> PageId {
        self.heap.first_page_id()
    }

    /// Validate a row against the schema and insert it.
    pub fn insert(&mut self, tuple: Tuple) -> RecordResult<RecordId> {
        self.schema.validate(tuple.values())?;
        self.heap.insert(&tuple)
    }

    pub fn get(&self, rid: RecordId) -> RecordResult<Tuple> {
        self.heap.get(rid, &self.schema)
    }

    pub fn delete(&self, rid: RecordId) -> RecordResult<()> {
        self.heap.delete(rid)
    }

    /// Validate a replacement row and update in place, keeping the rid.
    pub fn update(&self, rid: RecordId, tuple: Tuple) -> RecordResult<()> {
        self.schema.validate(tuple.values())?;
        self.heap.update(rid, &tuple)
    }

    /// All live rows in page-chain order.
    pub fn scan(&self) -> RecordResult<Vec<(RecordId, Tuple)>> {
        let mut rows = Vec::new();
        for rid in self.heap.iter() {
            let rid = rid?;
            rows.push((rid, self.heap.get(rid, &self.schema)?));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileManager;
    use crate::record::{Column, DataType, RecordError, Value};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<BufferPool>) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_manager =
            Arc::new(FileManager::open(temp_dir.path().join("test.db")).unwrap());
        (temp_dir, Arc::new(BufferPool::new(50, file_manager)))
    }

    fn test_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Varchar(20)),
            Column::new("active", DataType::Boolean),
        ])
    }

    fn row(id: i32, name: &str, active: bool) -> Tuple {
        Tuple::new(vec![
            Value::Integer(id),
            Value::Varchar(name.to_string()),
            Value::Boolean(active),
        ])
    }

    #[test]
    fn test_insert_scan_get() {
        let (_temp_dir, pool) = setup();
        let mut table = Table::create("users", test_schema(), pool).unwrap();

        let rows = [
            row(1, "Alice", true),
            row(2, "Bob", false),
            row(3, "Charlie", true),
        ];
        for r in &rows {
            table.insert(r.clone()).unwrap();
        }

        let scanned = table.scan().unwrap();
        assert_eq!(scanned.len(), 3);
        for ((rid, tuple), expected) in scanned.iter().zip(&rows) {
            assert_eq!(tuple, expected);
            assert_eq!(&table.get(*rid).unwrap(), expected);
        }
    }

    #[test]
    fn test_insert_rejects_bad_rows() {
        let (_temp_dir, pool) = setup();
        let mut table = Table::create("users", test_schema(), pool).unwrap();

        // Wrong column count
        let short = Tuple::new(vec![Value::Integer(1)]);
        assert!(matches!(
            table.insert(short),
            Err(RecordError::SchemaMismatch(_))
        ));

        // Wrong type
        let wrong = Tuple::new(vec![
            Value::Varchar("one".to_string()),
            Value::Varchar("Alice".to_string()),
            Value::Boolean(true),
        ]);
        assert!(matches!(
            table.insert(wrong),
            Err(RecordError::TypeMismatch { .. })
        ));

        // VARCHAR over the declared maximum
        let long = row(1, &"x".repeat(21), true);
        assert!(matches!(
            table.insert(long),
            Err(RecordError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_null_values_accepted() {
        let (_temp_dir, pool) = setup();
        let mut table = Table::create("users", test_schema(), pool).unwrap();

        let with_nulls = Tuple::new(vec![Value::Integer(1), Value::Null, Value::Null]);
        let rid = table.insert(with_nulls.clone()).unwrap();
        assert_eq!(table.get(rid).unwrap(), with_nulls);
    }

    #[test]
    fn test_delete_and_update() {
        let (_temp_dir, pool) = setup();
        let mut table = Table::create("users", test_schema(), pool).unwrap();

        let a = table.insert(row(1, "Alice", true)).unwrap();
        let b = table.insert(row(2, "Bob", false)).unwrap();

        table.delete(a).unwrap();
        assert!(table.get(a).is_err());

        table.update(b, row(2, "Robert", true)).unwrap();
        assert_eq!(table.get(b).unwrap(), row(2, "Robert", true));

        let scanned = table.scan().unwrap();
        assert_eq!(scanned.len(), 1);
    }
}
