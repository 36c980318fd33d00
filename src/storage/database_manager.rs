use once_cell::sync::OnceCell;
use redb::{Database, TableDefinition, TableHandle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::storage::{StorageError, StorageResult};

/// Global database manager for handling shared database instances
/// redb refuses a second open of the same file, so instances are shared per path
static GLOBAL_DB_MANAGER: OnceCell<DatabaseManager> = OnceCell::new();

/// Database manager that maintains shared database instances
/// Maps database file paths to their respective Arc<Database> instances
pub struct DatabaseManager {
    databases: Mutex<HashMap<PathBuf, Arc<Database>>>,
}

impl DatabaseManager {
    fn new() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
        }
    }

    /// Get the global database manager instance
    pub fn global() -> &'static DatabaseManager {
        GLOBAL_DB_MANAGER.get_or_init(DatabaseManager::new)
    }

    /// Get or create a shared database instance for a specific path
    pub fn get_or_create_database(&self, db_path: &Path) -> StorageResult<Arc<Database>> {
        let db_path_buf = db_path.to_path_buf();

        let mut map = self
            .databases
            .lock()
            .map_err(|e| StorageError::Database(format!("Failed to lock database map: {}", e)))?;

        if let Some(existing_db) = map.get(&db_path_buf) {
            tracing::debug!(
                "Reusing existing database instance for: {}",
                db_path_buf.display()
            );
            Ok(existing_db.clone())
        } else {
            let db = self.create_database(&db_path_buf)?;
            map.insert(db_path_buf, db.clone());
            Ok(db)
        }
    }

    /// Create a new database instance, creating parent directories as needed
    fn create_database(&self, db_path: &Path) -> StorageResult<Arc<Database>> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!("Opening study database: {}", db_path.display());

        let db = Database::create(db_path)
            .map_err(|e| StorageError::Database(format!("Failed to create database: {}", e)))?;

        Ok(Arc::new(db))
    }

    /// Make sure the given tables exist so read transactions can open them
    pub fn initialize_tables(
        &self,
        db: &Database,
        table_definitions: &[TableDefinition<'static, &'static str, &'static str>],
    ) -> StorageResult<()> {
        DatabaseOperation::write(db, |txn| {
            for table_def in table_definitions {
                txn.open_table(*table_def).map_err(|e| {
                    StorageError::Database(format!("Failed to open table {}: {}", table_def.name(), e))
                })?;
            }
            Ok(())
        })?;

        tracing::debug!("Initialized {} tables", table_definitions.len());
        Ok(())
    }
}

/// Wrapper for database operations with error handling
pub struct DatabaseOperation;

impl DatabaseOperation {
    /// Execute a read operation
    pub fn read<F, R>(db: &Database, operation: F) -> StorageResult<R>
    where
        F: FnOnce(&redb::ReadTransaction) -> StorageResult<R>,
    {
        let read_txn = db.begin_read().map_err(|e| {
            StorageError::Database(format!("Failed to begin read transaction: {}", e))
        })?;

        operation(&read_txn)
    }

    /// Execute a write operation and commit it
    pub fn write<F, R>(db: &Database, operation: F) -> StorageResult<R>
    where
        F: FnOnce(&redb::WriteTransaction) -> StorageResult<R>,
    {
        let write_txn = db.begin_write().map_err(|e| {
            StorageError::Database(format!("Failed to begin write transaction: {}", e))
        })?;

        let result = operation(&write_txn)?;

        write_txn.commit().map_err(|e| {
            StorageError::Database(format!("Failed to commit write transaction: {}", e))
        })?;

        Ok(result)
    }
}
