use std::sync::Arc;

use beacon_core::{ReadTxn, Scope, StorageError, Table, Tombstone, WriteTxn};

use crate::gc::TombstoneGc;

/// Tombstones for deleted keys, so list and watch indexes never go backwards.
pub struct Graveyard {
    gc: Option<Arc<TombstoneGc>>,
}

impl Graveyard {
    pub fn new(gc: Option<Arc<TombstoneGc>>) -> Self {
        Self { gc }
    }

    /// Record that `key` was deleted at the transaction's index. The GC is
    /// hinted only once the transaction commits.
    pub fn insert_txn<W: WriteTxn + ?Sized>(
        &self,
        tx: &mut W,
        key: &str,
        scope: &Scope,
    ) -> Result<(), StorageError> {
        let index = tx.index();
        tx.insert_tombstone(Tombstone {
            key: key.to_string(),
            index,
            scope: scope.clone(),
        })?;
        tx.set_table_index(Table::Tombstones, index);

        if let Some(gc) = &self.gc {
            let gc = Arc::clone(gc);
            tx.defer(Box::new(move || gc.hint(index)));
        }
        Ok(())
    }

    /// Highest tombstone index under `prefix` in `scope`, 0 if none.
    pub fn max_index_txn<R: ReadTxn + ?Sized>(
        &self,
        tx: &R,
        prefix: &str,
        scope: &Scope,
    ) -> Result<u64, StorageError> {
        Ok(tx
            .scope_tombstones(scope)?
            .iter()
            .filter(|t| t.key.starts_with(prefix))
            .map(|t| t.index)
            .max()
            .unwrap_or(0))
    }

    pub fn dump_txn<R: ReadTxn + ?Sized>(&self, tx: &R) -> Result<Vec<Tombstone>, StorageError> {
        tx.tombstones()
    }

    /// Re-insert a tombstone from a dump. Raises the table index, never
    /// lowers it, and does not hint the GC.
    pub fn restore_txn<W: WriteTxn + ?Sized>(
        &self,
        tx: &mut W,
        stone: Tombstone,
    ) -> Result<(), StorageError> {
        let index = stone.index;
        tx.insert_tombstone(stone)?;
        if index > tx.table_index(Table::Tombstones) {
            tx.set_table_index(Table::Tombstones, index);
        }
        Ok(())
    }

    /// Delete every tombstone under `prefix` in `scope`, regardless of age.
    pub fn reap_prefix_txn<W: WriteTxn + ?Sized>(
        &self,
        tx: &mut W,
        prefix: &str,
        scope: &Scope,
    ) -> Result<usize, StorageError> {
        let buried: Vec<Tombstone> = tx
            .scope_tombstones(scope)?
            .into_iter()
            .filter(|t| t.key.starts_with(prefix))
            .collect();

        for stone in &buried {
            tx.delete_tombstone(&stone.key, &stone.scope)?;
        }
        Ok(buried.len())
    }

    /// Delete every tombstone at or below `upto`; returns how many went.
    pub fn reap_txn<W: WriteTxn + ?Sized>(
        &self,
        tx: &mut W,
        upto: u64,
    ) -> Result<usize, StorageError> {
        let expired: Vec<Tombstone> = tx
            .tombstones()?
            .into_iter()
            .filter(|t| t.index <= upto)
            .collect();

        for stone in &expired {
            tx.delete_tombstone(&stone.key, &stone.scope)?;
        }
        Ok(expired.len())
    }
}
