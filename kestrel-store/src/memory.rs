// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::patch::{Category, KeyPatch};
use crate::traits::{KeyStore, KeyStoreError};

type Entries = HashMap<Category, HashMap<String, Vec<u8>>>;

/// In-memory key store.
///
/// This does not persist data permamently, all changes are lost when the process ends. Use this
/// only in development or test contexts.
///
/// The store can be cloned and used in multiple places in the application, every clone shares
/// the same entries and transaction state.
#[derive(Clone, Debug)]
pub struct MemoryKeyStore {
    entries: Arc<RwLock<Entries>>,
    pending: Arc<Mutex<Option<KeyPatch>>>,
    semaphore: Arc<Semaphore>,
    writes: Arc<AtomicUsize>,
    failing_commits: Arc<AtomicUsize>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::default(),
            pending: Arc::default(),
            // Only ever allow _one_ open transaction at a time.
            semaphore: Arc::new(Semaphore::new(1)),
            writes: Arc::default(),
            failing_commits: Arc::default(),
        }
    }

    /// Number of committed entries in a category.
    pub fn len(&self, category: Category) -> usize {
        self.entries
            .read()
            .map(|entries| entries.get(&category).map_or(0, HashMap::len))
            .unwrap_or_default()
    }

    /// Total number of entry writes (inserts and removals) applied since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of all committed entries.
    pub fn snapshot(&self) -> HashMap<Category, HashMap<String, Vec<u8>>> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Lets the next `count` commits fail, simulating an unavailable storage backend.
    #[cfg(any(test, feature = "test_utils"))]
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    fn apply(&self, patch: KeyPatch) -> Result<(), KeyStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| KeyStoreError::LockPoisoned)?;

        for (category, writes) in patch {
            let values = entries.entry(category).or_default();
            for (id, value) in writes {
                match value {
                    Some(value) => {
                        values.insert(id, value);
                    }
                    None => {
                        values.remove(&id);
                    }
                }
                self.writes.fetch_add(1, Ordering::SeqCst);
            }
        }

        Ok(())
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    type Permit = TransactionPermit;

    async fn get(
        &self,
        category: Category,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, KeyStoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| KeyStoreError::LockPoisoned)?;

        let Some(values) = entries.get(&category) else {
            return Ok(HashMap::new());
        };

        Ok(ids
            .iter()
            .filter_map(|id| values.get(id).map(|value| (id.clone(), value.clone())))
            .collect())
    }

    async fn set(&self, patch: KeyPatch) -> Result<(), KeyStoreError> {
        {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| KeyStoreError::LockPoisoned)?;
            if let Some(buffer) = pending.as_mut() {
                buffer.merge(patch);
                return Ok(());
            }
        }

        self.apply(patch)
    }

    async fn begin(&self) -> Result<TransactionPermit, KeyStoreError> {
        // Acquire a permit from the semaphore, it will await if currently another process has
        // the permit.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| KeyStoreError::Closed)?;

        self.pending
            .lock()
            .map_err(|_| KeyStoreError::LockPoisoned)?
            .replace(KeyPatch::new());

        Ok(TransactionPermit {
            _permit: permit,
            pending: self.pending.clone(),
        })
    }

    async fn commit(&self, _permit: &TransactionPermit) -> Result<(), KeyStoreError> {
        let failing = self.failing_commits.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_commits.store(failing - 1, Ordering::SeqCst);
            return Err(KeyStoreError::Commit("storage backend unavailable".into()));
        }

        let patch = self
            .pending
            .lock()
            .map_err(|_| KeyStoreError::LockPoisoned)?
            .take()
            .ok_or(KeyStoreError::TransactionMissing)?;

        self.apply(patch)
    }

    async fn rollback(&self, permit: TransactionPermit) -> Result<(), KeyStoreError> {
        let result = self
            .pending
            .lock()
            .map(|mut pending| {
                pending.take();
            })
            .map_err(|_| KeyStoreError::LockPoisoned);

        // Always drop the permit, both on successful rollback and error. This will allow other
        // processes now to begin a new transaction.
        drop(permit);

        result
    }
}

/// Held while a transaction is open.
///
/// Dropping the permit without commit or rollback, for example when the transaction's future gets
/// cancelled, discards the buffered writes before the next transaction can begin.
#[derive(Debug)]
pub struct TransactionPermit {
    _permit: OwnedSemaphorePermit,
    pending: Arc<Mutex<Option<KeyPatch>>>,
}

impl Drop for TransactionPermit {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.take();
        }
    }
}
