//! Persisted collections: load once, mutate in memory, write the whole collection back.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;

mod memory;
mod sql;
mod unit_of_work;

pub use memory::MemoryStore;
pub use sql::SqlStore;
pub use unit_of_work::UnitOfWork;

pub const PROGRESS_KEY: &str = "progress_records";
pub const CRITERIA_KEY: &str = "peer_criteria";
pub const ASSESSMENTS_KEY: &str = "peer_assessments";
pub const RECOMMENDATIONS_KEY: &str = "recommendations";

/// Durable key-value collaborator. Each key holds one JSON-encoded collection.
pub trait Persistence: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub struct Staged<T> {
    key: String,
    items: Vec<T>,
}

impl<T> Staged<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

pub struct RecordStore<T> {
    key: String,
    backend: Arc<dyn Persistence>,
    items: Vec<T>,
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn load(backend: Arc<dyn Persistence>, key: &str) -> Result<Self, StoreError> {
        Self::load_or(backend, key, Vec::new)
    }

    /// Absent value falls back to `seed`; a value that does not decode is an error.
    pub fn load_or(
        backend: Arc<dyn Persistence>,
        key: &str,
        seed: impl FnOnce() -> Vec<T>,
    ) -> Result<Self, StoreError> {
        let items = match backend.read(key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            })?,
            None => seed(),
        };
        debug!(key, count = items.len(), "loaded collection");

        Ok(Self {
            key: key.to_string(),
            backend,
            items,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Applies `f` to a copy and persists it; memory only changes if the write succeeds.
    pub fn mutate<R>(&mut self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R, StoreError> {
        let mut next = self.items.clone();
        let output = f(&mut next);
        let encoded = encode(&self.key, &next)?;
        self.backend.write(&self.key, &encoded)?;
        debug!(key = %self.key, count = next.len(), "wrote collection");
        self.items = next;
        Ok(output)
    }

    /// Computes the next snapshot and queues its write on `uow` without touching this store.
    pub fn stage(
        &self,
        uow: &mut UnitOfWork,
        f: impl FnOnce(&mut Vec<T>),
    ) -> Result<Staged<T>, StoreError> {
        let mut next = self.items.clone();
        f(&mut next);
        let value = encode(&self.key, &next)?;
        let previous = encode(&self.key, &self.items)?;
        uow.put(&self.key, value, previous);

        Ok(Staged {
            key: self.key.clone(),
            items: next,
        })
    }

    /// Installs a snapshot produced by [`RecordStore::stage`] once its unit of work committed.
    pub fn apply(&mut self, staged: Staged<T>) {
        debug_assert_eq!(staged.key, self.key);
        self.items = staged.items;
    }
}

fn encode<T: Serialize>(key: &str, items: &[T]) -> Result<String, StoreError> {
    serde_json::to_string(items).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn absent_value_loads_seed() {
        let store: RecordStore<String> =
            RecordStore::load_or(backend(), "names", || vec!["seed".to_string()]).unwrap();
        assert_eq!(store.items(), ["seed".to_string()]);
    }

    #[test]
    fn undecodable_value_is_an_error() {
        let memory = backend();
        memory.insert_raw("names", "{not json");
        let result: Result<RecordStore<String>, _> = RecordStore::load(memory, "names");
        assert!(matches!(result, Err(StoreError::Decode { .. })));
    }

    #[test]
    fn mutate_writes_through() {
        let memory = backend();
        let mut store: RecordStore<u32> = RecordStore::load(memory.clone(), "numbers").unwrap();
        store.mutate(|items| items.push(7)).unwrap();

        assert_eq!(memory.raw("numbers").as_deref(), Some("[7]"));
        let reloaded: RecordStore<u32> = RecordStore::load(memory, "numbers").unwrap();
        assert_eq!(reloaded.items(), [7]);
    }

    #[test]
    fn failed_write_leaves_snapshot_untouched() {
        let memory = backend();
        let mut store: RecordStore<u32> = RecordStore::load(memory.clone(), "numbers").unwrap();
        store.mutate(|items| items.push(1)).unwrap();

        memory.fail_writes_for("numbers");
        assert!(store.mutate(|items| items.push(2)).is_err());
        assert_eq!(store.items(), [1]);
        assert_eq!(memory.raw("numbers").as_deref(), Some("[1]"));
    }
}
