
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::buffer::{BufferError, BufferPool};
use crate::file::{DEFAULT_BUFFER_POOL_SIZE, FileError, FileManager, PageId};
use crate::index::{BPlusTree, DEFAULT_FANOUT, IndexError};
use crate::record::{RecordError, Schema, Table};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Engine handle: one database file, one buffer pool, and the tables and
/// indexes a caller has wired up.
///
/// There is no durable catalog. Tables and indexes are registered per
/// process; on reopen the caller re-declares each schema and passes the
/// first-page / root ids it recorded out of band.
pub struct Database {
    pool: Arc<BufferPool>,
    tables: HashMap<String, Table>,
    indexes: HashMap<String, BPlusTree>,
}

impl Database {
    /// Open or create a database file with the default pool size.
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        Self::open_with_pool_size(path, DEFAULT_BUFFER_POOL_SIZE)
    }

    pub fn open_with_pool_size<P: AsRef<Path>>(
        path: P,
        pool_size: usize,
    ) -> DatabaseResult<Self> {
        let file_manager = Arc::new(FileManager::open(path)?);
        let pool = Arc::new(BufferPool::new(pool_size, file_manager));

        Ok(Self {
            pool,
            tables: HashMap::new(),
            indexes: HashMap::new(),
        })
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Create a table with a fresh heap and register it under `name`.
    pub fn create_table(&mut self, name: &str, schema: Schema) -> DatabaseResult<&mut Table> {
        if self.tables.contains_key(name) {
            return Err(DatabaseError::TableExists(name.to_string()));
        }

        let table = Table::create(name, schema, Arc::clone(&self.pool))?;
        Ok(self.tables.entry(name.to_string()).or_insert(table))
    }

    /// Reattach a table whose heap already exists; the caller supplies the
    /// schema and first page id it recorded before closing.
    pub fn open_table(
        &mut self,
        name: &str,
        schema: Schema,
        first_page_id: PageId,
    ) -> DatabaseResult<&mut Table> {
        if self.tables.contains_key(name) {
            return Err(DatabaseError::TableExists(name.to_string()));
        }

        let table = Table::open(name, schema, Arc::clone(&self.pool), first_page_id)?;
        Ok(self.tables.entry(name.to_string()).or_insert(table))
    }

    pub fn table(&self, name: &str) -> DatabaseResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DatabaseError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> DatabaseResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DatabaseError::TableNotFound(name.to_string()))
    }

    /// Create an empty B+ tree index with the default fanout and register
    /// it under `name`.
    pub fn create_index(&mut self, name: &str) -> DatabaseResult<&mut BPlusTree> {
        self.create_index_with_fanout(name, DEFAULT_FANOUT)
    }

    pub fn create_index_with_fanout(
        &mut self,
        name: &str,
        fanout: usize,
    ) -> DatabaseResult<&mut BPlusTree> {
        if self.indexes.contains_key(name) {
            return Err(DatabaseError::IndexExists(name.to_string()));
        }

        let index = BPlusTree::new(Arc::clone(&self.pool), fanout)?;
        Ok(self.indexes.entry(name.to_string()).or_insert(index))
    }

    /// Reattach an index from its recorded root location.
    pub fn open_index(
        &mut self,
        name: &str,
        fanout: usize,
        root_page_id: PageId,
        root_is_leaf: bool,
    ) -> DatabaseResult<&mut BPlusTree> {
        if self.indexes.contains_key(name) {
            return Err(DatabaseError::IndexExists(name.to_string()));
        }

        let index = BPlusTree::open(Arc::clone(&self.pool), fanout, root_page_id, root_is_leaf)?;
        Ok(self.indexes.entry(name.to_string()).or_insert(index))
    }

    pub fn index(&self, name: &str) -> DatabaseResult<&BPlusTree> {
        self.indexes
            .get(name)
            .ok_or_else(|| DatabaseError::IndexNotFound(name.to_string()))
    }

    pub fn index_mut(&mut self, name: &str) -> DatabaseResult<&mut BPlusTree> {
        self.indexes
            .get_mut(name)
            .ok_or_else(|| DatabaseError::IndexNotFound(name.to_string()))
    }

    /// Flush every dirty page and persist the file header, then shut down.
    pub fn close(self) -> DatabaseResult<()> {
        self.pool.flush_all();
        self.pool.file_manager().write_header()?;
        Ok(())
    }
}
