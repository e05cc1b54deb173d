//! Persistent backend over fjall, one partition per store column.

use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};

use crate::{Column, KeyValueStore, StoreError, WriteBatch, WriteOp};

pub struct FjallStore {
    keyspace: Keyspace,
    /// Partition handles in [`Column::ALL`] order.
    partitions: Vec<PartitionHandle>,
}

impl FjallStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(Config::new(path))
    }

    pub fn open_with_config(config: Config) -> Result<Self, StoreError> {
        let keyspace = config.open().map_err(backend)?;
        let mut partitions = Vec::with_capacity(Column::ALL.len());
        for column in Column::ALL {
            partitions.push(
                keyspace
                    .open_partition(column.as_str(), PartitionCreateOptions::default())
                    .map_err(backend)?,
            );
        }
        Ok(Self {
            keyspace,
            partitions,
        })
    }

    fn partition(&self, column: Column) -> &PartitionHandle {
        &self.partitions[column.position()]
    }
}

impl KeyValueStore for FjallStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let found = self.partition(column).get(key).map_err(backend)?;
        Ok(found.map(|slice| slice.to_vec()))
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.partition(column).insert(key, value).map_err(backend)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.partition(column).remove(key).map_err(backend)
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.partition(column)
            .prefix(prefix)
            .map(|entry| {
                entry
                    .map(|(key, value)| (key.to_vec(), value.to_vec()))
                    .map_err(backend)
            })
            .collect()
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut staged = self.keyspace.batch();
        for op in batch.iter() {
            match op {
                WriteOp::Put(column, key, value) => {
                    staged.insert(self.partition(*column), key.as_slice(), value.as_slice());
                }
                WriteOp::Delete(column, key) => {
                    staged.remove(self.partition(*column), key.as_slice());
                }
            }
        }
        staged.commit().map_err(backend)
    }
}

fn backend(err: fjall::Error) -> StoreError {
    StoreError::new("fjall", err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_sees_committed_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = FjallStore::open(dir.path()).expect("open");
            let mut batch = WriteBatch::new();
            batch.put(Column::Meta, *b"tip", b"genesis".to_vec());
            store.write_batch(&batch).expect("commit");
        }
        let store = FjallStore::open(dir.path()).expect("reopen");
        assert_eq!(
            store.get(Column::Meta, b"tip").expect("get"),
            Some(b"genesis".to_vec())
        );
    }
}
