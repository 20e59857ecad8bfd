use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use beacon_core::{
    CoreError, DirEntry, HealthCheck, Node, ReadTxn, Service, StorageError, Table, Tombstone,
    WriteTxn,
};

use crate::store::Store;

/// Every table of the store at one index.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateDump {
    pub index: u64,
    pub nodes: Vec<Node>,
    pub services: Vec<Service>,
    pub checks: Vec<HealthCheck>,
    pub kvs: Vec<DirEntry>,
    pub tombstones: Vec<Tombstone>,
    pub indexes: BTreeMap<Table, u64>,
}

impl StateDump {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.services.is_empty()
            && self.checks.is_empty()
            && self.kvs.is_empty()
            && self.tombstones.is_empty()
    }
}

fn raise<W: WriteTxn + ?Sized>(tx: &mut W, table: Table, index: u64) {
    if index > tx.table_index(table) {
        tx.set_table_index(table, index);
    }
}

impl Store {
    pub fn dump(&self) -> Result<StateDump, StorageError> {
        let tx = self.read_txn();
        let indexes = Table::ALL
            .iter()
            .map(|t| (*t, tx.table_index(*t)))
            .filter(|(_, idx)| *idx > 0)
            .collect();
        Ok(StateDump {
            index: self.latest_index(),
            nodes: tx.nodes()?,
            services: tx.services()?,
            checks: tx.checks()?,
            kvs: tx.kvs()?,
            tombstones: self.graveyard().dump_txn(&tx)?,
            indexes,
        })
    }

    /// Load a dump verbatim. Table indexes only move up, tombstones are not
    /// scheduled for reaping, and no events are published.
    pub fn restore(&self, dump: StateDump) -> Result<(), CoreError> {
        let mut tx = self.write_txn(dump.index.max(self.latest_index()));

        for node in dump.nodes {
            raise(&mut tx, Table::Nodes, node.modify_index);
            tx.insert_node(node)?;
        }
        for svc in dump.services {
            raise(&mut tx, Table::Services, svc.modify_index);
            tx.insert_service(svc)?;
        }
        for check in dump.checks {
            raise(&mut tx, Table::Checks, check.modify_index);
            tx.insert_check(check)?;
        }
        for entry in dump.kvs {
            raise(&mut tx, Table::Kvs, entry.modify_index);
            tx.insert_kv(entry)?;
        }
        for stone in dump.tombstones {
            self.graveyard().restore_txn(&mut tx, stone)?;
        }
        for (table, index) in dump.indexes {
            raise(&mut tx, table, index);
        }

        let restored_to = Table::ALL
            .iter()
            .map(|t| tx.table_index(*t))
            .max()
            .unwrap_or(0);
        tx.commit_silent()?;
        self.raise_latest_index(restored_to);
        tracing::info!(index = self.latest_index(), "restored state dump");
        Ok(())
    }
}
