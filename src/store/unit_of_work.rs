use std::sync::Arc;

use tracing::{error, warn};

use crate::error::StoreError;

use super::Persistence;

#[derive(Debug)]
struct StagedWrite {
    key: String,
    value: String,
    previous: String,
}

/// Writes to several collections that land together or are rolled back together.
pub struct UnitOfWork {
    backend: Arc<dyn Persistence>,
    writes: Vec<StagedWrite>,
}

impl UnitOfWork {
    pub fn new(backend: Arc<dyn Persistence>) -> Self {
        Self {
            backend,
            writes: Vec::new(),
        }
    }

    pub(crate) fn put(&mut self, key: &str, value: String, previous: String) {
        self.writes.push(StagedWrite {
            key: key.to_string(),
            value,
            previous,
        });
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Writes in staging order. On failure the writes already made are reverted, newest first,
    /// and the failing write's error is returned.
    pub fn commit(self) -> Result<(), StoreError> {
        for (index, write) in self.writes.iter().enumerate() {
            if let Err(err) = self.backend.write(&write.key, &write.value) {
                warn!(key = %write.key, reverted = index, "unit of work failed, rolling back");
                for done in self.writes[..index].iter().rev() {
                    if let Err(rollback_err) = self.backend.write(&done.key, &done.previous) {
                        error!(key = %done.key, error = %rollback_err, "rollback write failed");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn commit_writes_every_staged_value() {
        let memory = Arc::new(MemoryStore::new());
        let mut uow = UnitOfWork::new(memory.clone());
        uow.put("a", "[1]".to_string(), "[]".to_string());
        uow.put("b", "[2]".to_string(), "[]".to_string());
        assert_eq!(uow.len(), 2);

        uow.commit().unwrap();
        assert_eq!(memory.raw("a").as_deref(), Some("[1]"));
        assert_eq!(memory.raw("b").as_deref(), Some("[2]"));
    }

    #[test]
    fn failed_commit_restores_earlier_writes() {
        let memory = Arc::new(MemoryStore::new());
        memory.insert_raw("a", "[0]");
        memory.insert_raw("b", "[0]");
        memory.fail_writes_for("b");

        let mut uow = UnitOfWork::new(memory.clone());
        uow.put("a", "[1]".to_string(), "[0]".to_string());
        uow.put("b", "[2]".to_string(), "[0]".to_string());

        assert!(matches!(uow.commit(), Err(StoreError::Write { .. })));
        assert_eq!(memory.raw("a").as_deref(), Some("[0]"));
        assert_eq!(memory.raw("b").as_deref(), Some("[0]"));
    }
}
