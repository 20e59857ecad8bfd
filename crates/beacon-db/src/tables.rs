use redb::TableDefinition;

/// Nodes of the last dump.
/// Key: encoded (partition, node)
/// Value: serialized Node as bytes
pub const NODES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Key: encoded (partition, node, namespace, service id)
/// Value: serialized Service as bytes
pub const SERVICES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Key: encoded (partition, node, namespace, check id)
/// Value: serialized HealthCheck as bytes
pub const CHECKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("checks");

/// Key: encoded (partition, namespace, key)
/// Value: serialized DirEntry as bytes
pub const KVS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kvs");

/// Key: encoded (partition, namespace, key)
/// Value: serialized Tombstone as bytes
pub const TOMBSTONES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tombstones");

/// Dump index and per-table max indexes.
pub const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Meta key holding the index the dump was taken at.
pub const DUMP_INDEX_KEY: &str = "index";

const SEPARATOR: char = '\u{1f}';

/// Join key parts with a separator that sorts below every printable
/// character, so encoded keys order like the tuples they encode.
pub fn encode_key(parts: &[&str]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(SEPARATOR);
        }
        key.push_str(part);
    }
    key
}

/// Meta key for the max index of a store table.
pub fn table_index_key(table: &str) -> String {
    format!("index/{table}")
}
