//! In-memory store used by tests and ephemeral chains.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::{Column, KeyValueStore, StoreError, WriteBatch, WriteOp};

type ColumnMap = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Default)]
pub struct MemoryStore {
    columns: RwLock<BTreeMap<Column, ColumnMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattened snapshot of every column, for state comparison in tests.
    pub fn snapshot(&self) -> Vec<(Column, Vec<u8>, Vec<u8>)> {
        let columns = self.read_columns();
        let mut out = Vec::new();
        for (column, map) in columns.iter() {
            for (key, value) in map {
                out.push((*column, key.clone(), value.clone()));
            }
        }
        out
    }

    fn read_columns(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<Column, ColumnMap>> {
        self.columns.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write_columns(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<Column, ColumnMap>> {
        self.columns.write().unwrap_or_else(|err| err.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let columns = self.read_columns();
        Ok(columns
            .get(&column)
            .and_then(|map| map.get(key))
            .cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut columns = self.write_columns();
        columns
            .entry(column)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut columns = self.write_columns();
        if let Some(map) = columns.get_mut(&column) {
            map.remove(key);
        }
        Ok(())
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let columns = self.read_columns();
        let mut results = Vec::new();
        if let Some(map) = columns.get(&column) {
            for (key, value) in map.range(prefix.to_vec()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                results.push((key.clone(), value.clone()));
            }
        }
        Ok(results)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut columns = self.write_columns();
        for op in batch.iter() {
            match op {
                WriteOp::Put(column, key, value) => {
                    columns
                        .entry(*column)
                        .or_default()
                        .insert(key.as_slice().to_vec(), value.clone());
                }
                WriteOp::Delete(column, key) => {
                    if let Some(map) = columns.get_mut(column) {
                        map.remove(key.as_slice());
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_applies_in_order() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(Column::Meta, *b"k", b"one".to_vec());
        batch.put(Column::Meta, *b"k", b"two".to_vec());
        batch.delete(Column::Meta, *b"k");
        batch.put(Column::Meta, *b"k", b"three".to_vec());
        store.write_batch(&batch).expect("batch");
        assert_eq!(
            store.get(Column::Meta, b"k").expect("get"),
            Some(b"three".to_vec())
        );
    }

    #[test]
    fn scan_prefix_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        store.put(Column::Header, b"aa1", b"1").expect("put");
        store.put(Column::Header, b"aa2", b"2").expect("put");
        store.put(Column::Header, b"ab1", b"3").expect("put");
        let result = store.scan_prefix(Column::Header, b"aa").expect("scan");
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, b"aa1".to_vec());
        assert_eq!(result[1].0, b"aa2".to_vec());
    }
}
