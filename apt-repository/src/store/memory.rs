// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! In-memory object store, primarily for testing. */

use {
    super::ObjectStore,
    crate::error::{RepoError, Result},
    async_trait::async_trait,
    std::{collections::BTreeMap, sync::Mutex},
};

/// [ObjectStore] holding all objects in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("store mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.objects
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), data);

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn head(&self, key: &str) -> Result<bool> {
        Ok(self
            .objects
            .lock()
            .expect("store mutex poisoned")
            .contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects
            .lock()
            .expect("store mutex poisoned")
            .remove(key);

        Ok(())
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<()> {
        let mut objects = self.objects.lock().expect("store mutex poisoned");

        let data = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| RepoError::store(source_key, "copy source does not exist"))?;

        objects.insert(dest_key.to_string(), data);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn basic_operations() {
        let store = MemoryStore::new();

        assert!(!store.head("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());

        store.put("a", b"hello".to_vec()).await.unwrap();
        assert!(store.head("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap().unwrap(), b"hello");

        store.copy("a", "b").await.unwrap();
        assert_eq!(store.get("b").await.unwrap().unwrap(), b"hello");

        store.delete("a").await.unwrap();
        assert!(!store.head("a").await.unwrap());

        // Deleting a missing key is fine.
        store.delete("a").await.unwrap();

        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn copy_missing_source_errors() {
        let store = MemoryStore::new();
        assert!(store.copy("nope", "dest").await.is_err());
    }
}
