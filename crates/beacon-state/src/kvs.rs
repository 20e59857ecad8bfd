use beacon_core::{CoreError, DirEntry, ReadTxn, Scope, StorageError, Table, WriteTxn};

use crate::graveyard::Graveyard;
use crate::store::Store;

/// Write `entry` at the transaction's index, keeping its create index.
pub fn kvs_set_txn<W: WriteTxn + ?Sized>(tx: &mut W, entry: &DirEntry) -> Result<(), StorageError> {
    if entry.key.is_empty() {
        return Err(StorageError::Invalid("key is required".to_string()));
    }
    let idx = tx.index();
    let mut entry = entry.clone();
    entry.scope.normalize();
    let existing = tx.get_kv(&entry.key, &entry.scope)?;
    entry.create_index = existing.map_or(idx, |e| e.create_index);
    entry.modify_index = idx;
    tx.insert_kv(entry)?;
    tx.set_table_index(Table::Kvs, idx);
    Ok(())
}

/// Delete one key, leaving a tombstone. Missing keys are a no-op.
pub fn kvs_delete_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    graveyard: &Graveyard,
    key: &str,
    scope: &Scope,
) -> Result<(), StorageError> {
    if tx.get_kv(key, scope)?.is_none() {
        return Ok(());
    }
    let idx = tx.index();
    graveyard.insert_txn(tx, key, scope)?;
    tx.delete_kv(key, scope)?;
    tx.set_table_index(Table::Kvs, idx);
    Ok(())
}

/// Delete `key` only if its modify index equals `cas`. A missing key
/// counts as applied.
pub fn kvs_delete_cas_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    graveyard: &Graveyard,
    key: &str,
    cas: u64,
    scope: &Scope,
) -> Result<bool, StorageError> {
    match tx.get_kv(key, scope)? {
        None => return Ok(true),
        Some(entry) if entry.modify_index != cas => return Ok(false),
        Some(_) => {}
    }
    kvs_delete_txn(tx, graveyard, key, scope)?;
    Ok(true)
}

/// Write `entry` only if its modify index matches the stored one. A modify
/// index of 0 means the key must not exist yet.
pub fn kvs_set_cas_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    entry: &DirEntry,
) -> Result<bool, StorageError> {
    let existing = tx.get_kv(&entry.key, &entry.scope)?;
    let applies = match (&existing, entry.modify_index) {
        (Some(_), 0) => false,
        (None, 0) => true,
        (None, _) => false,
        (Some(e), cas) => e.modify_index == cas,
    };
    if !applies {
        return Ok(false);
    }
    kvs_set_txn(tx, entry)?;
    Ok(true)
}

/// Delete every key under `prefix` together with the tombstones under it.
/// No tombstones are written; the table index moves to this transaction's
/// index when anything was removed.
pub fn kvs_delete_tree_txn<W: WriteTxn + ?Sized>(
    tx: &mut W,
    graveyard: &Graveyard,
    prefix: &str,
    scope: &Scope,
) -> Result<usize, StorageError> {
    let deleted = tx.delete_kv_prefix(prefix, scope)?;
    let reaped = graveyard.reap_prefix_txn(tx, prefix, scope)?;
    if deleted + reaped > 0 {
        let idx = tx.index();
        tx.set_table_index(Table::Kvs, idx);
    }
    Ok(deleted)
}

/// List entries under `prefix` with an index that never goes backwards
/// across deletes.
pub fn kvs_list_txn<R: ReadTxn + ?Sized>(
    tx: &R,
    graveyard: &Graveyard,
    prefix: &str,
    scope: &Scope,
) -> Result<(u64, Vec<DirEntry>), StorageError> {
    let entries = tx.kvs_with_prefix(prefix, scope)?;

    let mut idx = 0;
    if !prefix.is_empty() {
        idx = entries.iter().map(|e| e.modify_index).max().unwrap_or(0);
        idx = idx.max(graveyard.max_index_txn(tx, prefix, scope)?);
    }
    if idx == 0 {
        idx = tx.max_index(&[Table::Kvs, Table::Tombstones]);
    }
    Ok((idx, entries))
}

impl Store {
    pub fn kvs_set(&self, entry: &DirEntry) -> Result<u64, CoreError> {
        let mut tx = self.begin_write();
        let idx = tx.index();
        kvs_set_txn(&mut tx, entry)?;
        tx.commit()?;
        Ok(idx)
    }

    /// Returns the applied flag and the write index.
    pub fn kvs_set_cas(&self, entry: &DirEntry) -> Result<(bool, u64), CoreError> {
        let mut tx = self.begin_write();
        let idx = tx.index();
        if !kvs_set_cas_txn(&mut tx, entry)? {
            return Ok((false, idx));
        }
        tx.commit()?;
        Ok((true, idx))
    }

    pub fn kvs_get(&self, key: &str, scope: &Scope) -> Result<(u64, Option<DirEntry>), StorageError> {
        let tx = self.read_txn();
        let idx = tx.max_index(&[Table::Kvs, Table::Tombstones]);
        Ok((idx, tx.get_kv(key, scope)?))
    }

    pub fn kvs_list(
        &self,
        prefix: &str,
        scope: &Scope,
    ) -> Result<(u64, Vec<DirEntry>), StorageError> {
        let tx = self.read_txn();
        kvs_list_txn(&tx, self.graveyard(), prefix, scope)
    }

    pub fn kvs_delete(&self, key: &str, scope: &Scope) -> Result<u64, CoreError> {
        let mut tx = self.begin_write();
        let idx = tx.index();
        kvs_delete_txn(&mut tx, self.graveyard(), key, scope)?;
        tx.commit()?;
        Ok(idx)
    }

    pub fn kvs_delete_cas(&self, key: &str, cas: u64, scope: &Scope) -> Result<bool, CoreError> {
        let mut tx = self.begin_write();
        if !kvs_delete_cas_txn(&mut tx, self.graveyard(), key, cas, scope)? {
            return Ok(false);
        }
        tx.commit()?;
        Ok(true)
    }

    pub fn kvs_delete_tree(&self, prefix: &str, scope: &Scope) -> Result<u64, CoreError> {
        let mut tx = self.begin_write();
        let idx = tx.index();
        kvs_delete_tree_txn(&mut tx, self.graveyard(), prefix, scope)?;
        tx.commit()?;
        Ok(idx)
    }

    /// Remove every tombstone at or below `upto` in a transaction of its own.
    /// Nothing is committed when no tombstone qualifies.
    pub fn reap_tombstones(&self, upto: u64) -> Result<usize, CoreError> {
        let mut tx = self.begin_write();
        let reaped = self.graveyard().reap_txn(&mut tx, upto)?;
        if reaped == 0 {
            return Ok(0);
        }
        tx.commit()?;
        Ok(reaped)
    }
}
