//! `sled`-backed implementation of `KvStore`.
use std::path::Path;

use sled::transaction::Transactional;
use sled::{Db, IVec};

use super::keyspace;
use super::{BatchOp, KvStore, StoreError};

pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Engine(e.to_string()))?;
        Ok(Self { db })
    }

    /// An ephemeral, unflushed store, useful for tests.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn temporary() -> Result<Self, StoreError> {
        let config = sled::Config::new().temporary(true);
        let db = config.open().map_err(|e| StoreError::Engine(e.to_string()))?;
        Ok(Self { db })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree, StoreError> {
        self.db
            .open_tree(name)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }
}

impl KvStore for SledStore {
    fn get(&self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let tree = self.tree(tree)?;
        let value = tree
            .get(key)
            .map_err(|e| StoreError::Engine(e.to_string()))?;
        Ok(value.map(|v: IVec| v.to_vec()))
    }

    fn put(&self, tree: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let tree = self.tree(tree)?;
        tree.insert(key, value)
            .map_err(|e| StoreError::Engine(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, tree: &str, key: &[u8]) -> Result<(), StoreError> {
        let tree = self.tree(tree)?;
        tree.remove(key)
            .map_err(|e| StoreError::Engine(e.to_string()))?;
        Ok(())
    }

    fn iter_from(
        &self,
        tree: &str,
        from: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let tree = self.tree(tree)?;
        let iter = match from {
            Some(key) => {
                // Exclusive of `from` itself: start just past it.
                let mut start = key.to_vec();
                start.push(0);
                tree.range(start..)
            }
            None => tree.range::<Vec<u8>, _>(..),
        };
        iter.map(|entry| {
            let (k, v) = entry.map_err(|e| StoreError::Engine(e.to_string()))?;
            Ok((k.to_vec(), v.to_vec()))
        })
        .collect()
    }

    fn commit_with_cursor(
        &self,
        tree: &str,
        ops: Vec<BatchOp>,
        cursor_value: &[u8],
    ) -> Result<(), StoreError> {
        let entities = self.tree(tree)?;
        let sync_state = self.tree(keyspace::SYNC_STATE)?;

        (&entities, &sync_state)
            .transaction(|(entities, sync_state)| {
                for op in &ops {
                    match op {
                        BatchOp::Put(k, v) => {
                            entities.insert(k.as_slice(), v.as_slice())?;
                        }
                        BatchOp::Delete(k) => {
                            entities.remove(k.as_slice())?;
                        }
                    }
                }
                sync_state.insert(keyspace::SINGLETON_KEY, cursor_value)?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError<()>| StoreError::Engine(e.to_string()))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Engine(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_round_trip() {
        let store = SledStore::temporary().unwrap();
        store.put("t", b"k1", b"v1").unwrap();
        assert_eq!(store.get("t", b"k1").unwrap(), Some(b"v1".to_vec()));
        store.delete("t", b"k1").unwrap();
        assert_eq!(store.get("t", b"k1").unwrap(), None);
    }

    #[test]
    fn iter_from_resumes_past_the_given_key() {
        let store = SledStore::temporary().unwrap();
        store.put("t", b"a", b"1").unwrap();
        store.put("t", b"b", b"2").unwrap();
        store.put("t", b"c", b"3").unwrap();

        let all = store.iter_from("t", None).unwrap();
        assert_eq!(all.len(), 3);

        let resumed = store.iter_from("t", Some(b"a")).unwrap();
        assert_eq!(
            resumed.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn commit_with_cursor_lands_entity_writes_and_cursor_together() {
        let store = SledStore::temporary().unwrap();
        store
            .commit_with_cursor(
                "t",
                vec![
                    BatchOp::Put(b"a".to_vec(), b"1".to_vec()),
                    BatchOp::Put(b"b".to_vec(), b"2".to_vec()),
                ],
                b"cursor-v1",
            )
            .unwrap();
        assert_eq!(store.get("t", b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("t", b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(
            store.get(keyspace::SYNC_STATE, keyspace::SINGLETON_KEY).unwrap(),
            Some(b"cursor-v1".to_vec())
        );
    }

    #[test]
    fn commit_with_cursor_deletes_and_advances_cursor_in_one_commit() {
        let store = SledStore::temporary().unwrap();
        store.put("t", b"stale", b"old").unwrap();
        store
            .commit_with_cursor("t", vec![BatchOp::Delete(b"stale".to_vec())], b"cursor-v2")
            .unwrap();
        assert_eq!(store.get("t", b"stale").unwrap(), None);
        assert_eq!(
            store.get(keyspace::SYNC_STATE, keyspace::SINGLETON_KEY).unwrap(),
            Some(b"cursor-v2".to_vec())
        );
    }
}
