//! Beacon DB - redb persistence of catalog state dumps.

pub mod dump_store;
pub mod tables;

pub use dump_store::RedbDumpStore;

use std::path::Path;
use std::sync::Arc;

use redb::Database;

use beacon_core::StorageError;

/// Initialize a database with all required tables.
pub fn init_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StorageError> {
    let db = Database::create(path).map_err(|e| StorageError::Database(e.to_string()))?;

    RedbDumpStore::init_tables(&db)?;

    Ok(Arc::new(db))
}
