use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::{Column, KeyValueStore, StoreError, WriteBatch, WriteOp};

type ColumnMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile store used by tests and ephemeral nodes.
pub struct MemoryStore {
    columns: [RwLock<ColumnMap>; 4],
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            columns: std::array::from_fn(|_| RwLock::new(ColumnMap::new())),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn column(&self, column: Column) -> &RwLock<ColumnMap> {
        &self.columns[column.index()]
    }

    pub fn len(&self, column: Column) -> usize {
        self.column(column).read().expect("memory store lock").len()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.column(column).read().expect("memory store lock");
        Ok(guard.get(key).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.column(column).write().expect("memory store lock");
        guard.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.column(column).write().expect("memory store lock");
        guard.remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        // Lock every column up front so a batch is observed whole.
        let mut guards: Vec<_> = self
            .columns
            .iter()
            .map(|column| column.write().expect("memory store lock"))
            .collect();
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    guards[column.index()].insert(key.as_slice().to_vec(), value.clone());
                }
                WriteOp::Delete { column, key } => {
                    guards[column.index()].remove(key.as_slice());
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
    fn columns_are_isolated() {
        let store = MemoryStore::new();
        store.put(Column::Coins, b"k", b"coins").expect("put");
        store.put(Column::Meta, b"k", b"meta").expect("put");
        assert_eq!(
            store.get(Column::Coins, b"k").expect("get"),
            Some(b"coins".to_vec())
        );
        store.delete(Column::Coins, b"k").expect("delete");
        assert_eq!(store.get(Column::Coins, b"k").expect("get"), None);
        assert_eq!(
            store.get(Column::Meta, b"k").expect("get"),
            Some(b"meta".to_vec())
        );
    }

    #[test]
    fn batch_applies_in_order() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(Column::StakeRecord, [1u8; 4], vec![1]);
        batch.put(Column::StakeRecord, [1u8; 4], vec![2]);
        batch.put(Column::CoinRewind, [0u8, 0, 0, 5], vec![5]);
        batch.delete(Column::CoinRewind, [0u8, 0, 0, 5]);
        store.write_batch(&batch).expect("batch");
        assert_eq!(
            store.get(Column::StakeRecord, &[1u8; 4]).expect("get"),
            Some(vec![2])
        );
        assert_eq!(store.len(Column::CoinRewind), 0);
    }
}
