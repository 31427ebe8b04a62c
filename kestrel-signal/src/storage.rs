// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed view on the key store for sessions, pre-keys and sender keys.
use kestrel_store::{Category, KeyPatch, KeyStore, KeyStoreError};
use thiserror::Error;
use tracing::trace;

use crate::address::{ProtocolAddress, SenderKeyName};
use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::x25519::PublicKey;
use crate::key_bundle::{PreKeyId, PreKeyRecord, SignedPreKeyId, SignedPreKeyRecord};
use crate::key_manager::Credentials;
use crate::sender_key::SenderKeyRecord;
use crate::session::{LocalIdentity, SessionRecord};

pub struct SignalStorage<'a, S> {
    store: &'a S,
    credentials: &'a Credentials,
}

impl<'a, S> SignalStorage<'a, S>
where
    S: KeyStore,
{
    pub fn new(store: &'a S, credentials: &'a Credentials) -> Self {
        Self { store, credentials }
    }

    async fn load<T>(&self, category: Category, id: String) -> Result<Option<T>, StorageError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let mut values = self.store.get(category, &[id.clone()]).await?;
        match values.remove(&id) {
            Some(bytes) => Ok(Some(decode_cbor(&bytes).map_err(|err| {
                StorageError::Decode(category, id, err)
            })?)),
            None => Ok(None),
        }
    }

    async fn store<T: serde::Serialize>(
        &self,
        category: Category,
        id: String,
        value: &T,
    ) -> Result<(), StorageError> {
        let mut patch = KeyPatch::new();
        patch.insert(category, id, encode_cbor(value)?);
        self.store.set(patch).await?;
        Ok(())
    }

    pub async fn load_session(
        &self,
        address: &ProtocolAddress,
    ) -> Result<Option<SessionRecord>, StorageError> {
        self.load(Category::Session, address.to_string()).await
    }

    pub async fn store_session(
        &self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<(), StorageError> {
        trace!(%address, "store session");
        self.store(Category::Session, address.to_string(), record)
            .await
    }

    pub async fn load_prekey(&self, id: PreKeyId) -> Result<Option<PreKeyRecord>, StorageError> {
        self.load(Category::PreKey, id.to_string()).await
    }

    pub async fn remove_prekey(&self, id: PreKeyId) -> Result<(), StorageError> {
        trace!(id, "remove consumed pre-key");
        let mut patch = KeyPatch::new();
        patch.remove(Category::PreKey, id.to_string());
        self.store.set(patch).await?;
        Ok(())
    }

    pub fn load_signed_prekey(&self, id: SignedPreKeyId) -> Option<&'a SignedPreKeyRecord> {
        self.credentials.signed_prekey(id)
    }

    pub async fn load_sender_key(
        &self,
        name: &SenderKeyName,
    ) -> Result<Option<SenderKeyRecord>, StorageError> {
        self.load(Category::SenderKey, name.to_string()).await
    }

    pub async fn store_sender_key(
        &self,
        name: &SenderKeyName,
        record: &SenderKeyRecord,
    ) -> Result<(), StorageError> {
        trace!(%name, "store sender key");
        self.store(Category::SenderKey, name.to_string(), record)
            .await
    }

    /// Loads the sender-key record, persisting an empty one first if there is none yet.
    ///
    /// Must run inside a transaction, the caller continues with the returned record.
    pub async fn ensure_sender_key(
        &self,
        name: &SenderKeyName,
    ) -> Result<SenderKeyRecord, StorageError> {
        if let Some(record) = self.load_sender_key(name).await? {
            return Ok(record);
        }

        trace!(%name, "create empty sender key record");
        let record = SenderKeyRecord::new();
        self.store_sender_key(name, &record).await?;
        Ok(record)
    }

    pub fn our_identity(&self) -> LocalIdentity<'a> {
        LocalIdentity {
            identity_key_pair: &self.credentials.identity_key_pair,
            registration_id: self.credentials.registration_id,
        }
    }

    /// Every remote identity is accepted, pinning is left to the layers above.
    pub fn is_trusted_identity(&self, _address: &ProtocolAddress, _identity: &PublicKey) -> bool {
        true
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    #[error("failed encoding record: {0}")]
    Encode(#[from] EncodeError),

    #[error("corrupt {0} record {1}: {2}")]
    Decode(Category, String, DecodeError),
}
