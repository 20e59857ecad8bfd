use std::collections::BTreeMap;
use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use beacon_core::{StorageError, Table};
use beacon_state::StateDump;

use crate::tables::{
    encode_key, table_index_key, CHECKS_TABLE, DUMP_INDEX_KEY, KVS_TABLE, META_TABLE, NODES_TABLE,
    SERVICES_TABLE, TOMBSTONES_TABLE,
};

const RECORD_TABLES: [TableDefinition<&str, &[u8]>; 5] = [
    NODES_TABLE,
    SERVICES_TABLE,
    CHECKS_TABLE,
    KVS_TABLE,
    TOMBSTONES_TABLE,
];

/// Durable copy of the catalog state, replaced wholesale on every save.
pub struct RedbDumpStore {
    db: Arc<Database>,
}

impl RedbDumpStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db
            .begin_write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        {
            for def in RECORD_TABLES {
                let _ = write_txn
                    .open_table(def)
                    .map_err(|e| StorageError::Database(e.to_string()))?;
            }
            let _ = write_txn
                .open_table(META_TABLE)
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    /// Replace the stored dump with `dump` in one transaction.
    pub fn save(&self, dump: &StateDump) -> Result<(), StorageError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        for def in RECORD_TABLES {
            write_txn
                .delete_table(def)
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }
        write_txn
            .delete_table(META_TABLE)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        write_records(&write_txn, NODES_TABLE, &dump.nodes, |n| {
            encode_key(&[&n.partition, &n.node.to_lowercase()])
        })?;
        write_records(&write_txn, SERVICES_TABLE, &dump.services, |s| {
            encode_key(&[
                &s.scope.partition,
                &s.node.to_lowercase(),
                &s.scope.namespace,
                &s.id,
            ])
        })?;
        write_records(&write_txn, CHECKS_TABLE, &dump.checks, |c| {
            encode_key(&[
                &c.scope.partition,
                &c.node.to_lowercase(),
                &c.scope.namespace,
                &c.check_id,
            ])
        })?;
        write_records(&write_txn, KVS_TABLE, &dump.kvs, |e| {
            encode_key(&[&e.scope.partition, &e.scope.namespace, &e.key])
        })?;
        write_records(&write_txn, TOMBSTONES_TABLE, &dump.tombstones, |t| {
            encode_key(&[&t.scope.partition, &t.scope.namespace, &t.key])
        })?;

        {
            let mut meta = write_txn
                .open_table(META_TABLE)
                .map_err(|e| StorageError::Database(e.to_string()))?;
            meta.insert(DUMP_INDEX_KEY, dump.index)
                .map_err(|e| StorageError::Database(e.to_string()))?;
            for (table, index) in &dump.indexes {
                meta.insert(table_index_key(table.as_str()).as_str(), *index)
                    .map_err(|e| StorageError::Database(e.to_string()))?;
            }
        }

        write_txn
            .commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        tracing::debug!(index = dump.index, "saved state dump");
        Ok(())
    }

    /// The stored dump, or `None` if nothing was saved yet.
    pub fn load(&self) -> Result<Option<StateDump>, StorageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let meta = read_txn
            .open_table(META_TABLE)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let index = match meta
            .get(DUMP_INDEX_KEY)
            .map_err(|e| StorageError::Database(e.to_string()))?
        {
            Some(value) => value.value(),
            None => return Ok(None),
        };

        let mut indexes = BTreeMap::new();
        for table in Table::ALL {
            let key = table_index_key(table.as_str());
            if let Some(value) = meta
                .get(key.as_str())
                .map_err(|e| StorageError::Database(e.to_string()))?
            {
                indexes.insert(table, value.value());
            }
        }

        Ok(Some(StateDump {
            index,
            nodes: read_records(&read_txn, NODES_TABLE)?,
            services: read_records(&read_txn, SERVICES_TABLE)?,
            checks: read_records(&read_txn, CHECKS_TABLE)?,
            kvs: read_records(&read_txn, KVS_TABLE)?,
            tombstones: read_records(&read_txn, TOMBSTONES_TABLE)?,
            indexes,
        }))
    }
}

fn write_records<T, F>(
    write_txn: &WriteTransaction,
    def: TableDefinition<&str, &[u8]>,
    records: &[T],
    key: F,
) -> Result<(), StorageError>
where
    T: Serialize,
    F: Fn(&T) -> String,
{
    let mut table = write_txn
        .open_table(def)
        .map_err(|e| StorageError::Database(e.to_string()))?;
    for record in records {
        let value =
            serde_json::to_vec(record).map_err(|e| StorageError::Database(e.to_string()))?;
        table
            .insert(key(record).as_str(), value.as_slice())
            .map_err(|e| StorageError::Database(e.to_string()))?;
    }
    Ok(())
}

fn read_records<T: DeserializeOwned>(
    read_txn: &ReadTransaction,
    def: TableDefinition<&str, &[u8]>,
) -> Result<Vec<T>, StorageError> {
    let table = read_txn
        .open_table(def)
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let mut records = Vec::new();
    for entry in table
        .iter()
        .map_err(|e| StorageError::Database(e.to_string()))?
    {
        let (_, value) = entry.map_err(|e| StorageError::Database(e.to_string()))?;
        let record: T = serde_json::from_slice(value.value())
            .map_err(|e| StorageError::Database(e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{DirEntry, HealthCheck, Node, Scope, Service};
    use beacon_state::{Registration, Store};
    use tempfile::tempdir;

    fn create_test_db(dir: &tempfile::TempDir) -> Arc<Database> {
        let db = Database::create(dir.path().join("test.redb")).unwrap();
        RedbDumpStore::init_tables(&db).unwrap();
        Arc::new(db)
    }

    fn populated() -> Store {
        let store = Store::new();
        store
            .ensure_registration(
                &Registration::new(Node::new("node1", "10.0.0.1"))
                    .with_service(Service::new("node1", "web1", "web"))
                    .with_check(HealthCheck::service_check("node1", "web-alive", "web1")),
            )
            .unwrap();
        store.kvs_set(&DirEntry::new("foo/a", "1")).unwrap();
        store.kvs_set(&DirEntry::new("foo/b", "2")).unwrap();
        store.kvs_delete("foo/b", &Scope::default()).unwrap();
        store
    }

    #[test]
    fn test_load_empty_returns_none() {
        let dir = tempdir().unwrap();
        let store = RedbDumpStore::new(create_test_db(&dir));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let dumps = RedbDumpStore::new(create_test_db(&dir));
        let dump = populated().dump().unwrap();

        dumps.save(&dump).unwrap();
        let loaded = dumps.load().unwrap().unwrap();
        assert_eq!(loaded, dump);

        let restored = Store::new();
        restored.restore(loaded).unwrap();
        assert_eq!(restored.dump().unwrap(), dump);
    }

    #[test]
    fn test_save_replaces_previous_dump() {
        let dir = tempdir().unwrap();
        let dumps = RedbDumpStore::new(create_test_db(&dir));
        let store = populated();
        dumps.save(&store.dump().unwrap()).unwrap();

        store.delete_node("node1", "").unwrap();
        store.kvs_delete_tree("foo/", &Scope::default()).unwrap();
        dumps.save(&store.dump().unwrap()).unwrap();

        let loaded = dumps.load().unwrap().unwrap();
        assert!(loaded.nodes.is_empty());
        assert!(loaded.services.is_empty());
        assert!(loaded.kvs.is_empty());
        assert!(loaded.tombstones.is_empty());
        assert_eq!(loaded.index, store.latest_index());
    }
}
