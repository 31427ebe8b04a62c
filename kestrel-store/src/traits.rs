// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use thiserror::Error;

use crate::patch::{Category, KeyPatch};

/// Interface for persisting key material by category, with atomic multi-write transactions.
///
/// Writes issued with `set` while a transaction is open are buffered by the store and only become
/// visible to `get` after a successful `commit`. Transactions are strictly serialized: processes
/// calling `begin` hold a permit until the transaction was committed or rolled back, any
/// concurrent process will await in `begin` until then.
///
/// Similar to the transaction provider of an SQL database, the permit does not protect from
/// misuse (a `set` from an unrelated process while a transaction is open will end up in the same
/// buffer) but helps to make "holding" a transaction explicit. Transactions do not nest.
///
/// Most callers want to use the [`transaction`](crate::transaction) helper instead of calling
/// `begin`, `commit` and `rollback` directly.
pub trait KeyStore {
    type Permit;

    /// Returns all committed values for the given ids. Absent ids are omitted from the result.
    fn get(
        &self,
        category: Category,
        ids: &[String],
    ) -> impl Future<Output = Result<HashMap<String, Vec<u8>>, KeyStoreError>>;

    /// Applies the patch, or buffers it when a transaction is currently open.
    fn set(&self, patch: KeyPatch) -> impl Future<Output = Result<(), KeyStoreError>>;

    /// Begins a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Permit, KeyStoreError>>;

    /// Commits all writes buffered since `begin` atomically.
    ///
    /// On failure nothing was written and the buffered writes are kept, the caller can either
    /// retry the commit or roll back. The permit is only released when it gets dropped.
    fn commit(&self, permit: &Self::Permit) -> impl Future<Output = Result<(), KeyStoreError>>;

    /// Discards all buffered writes and releases the permit.
    fn rollback(&self, permit: Self::Permit) -> impl Future<Output = Result<(), KeyStoreError>>;
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// The storage backend failed to read or write. This is a critical error.
    #[error("key store backend error: {0}")]
    Backend(String),

    /// Writes of the transaction could not be committed. Nothing was written.
    #[error("failed committing transaction: {0}")]
    Commit(String),

    /// This is a critical error as it indicates that something is wrong with the usage of this
    /// API: commits can only ever occur if a transaction was started _before_.
    #[error("tried to commit inexistant transaction")]
    TransactionMissing,

    #[error("key store lock is poisoned")]
    LockPoisoned,

    #[error("key store was closed")]
    Closed,
}
