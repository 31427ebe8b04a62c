// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manager for our own secret key material.
//!
//! The identity key pair, registration id and the current signed pre-key form our
//! [`Credentials`], which the application persists itself. One-time pre-keys are persisted in
//! the key store under the `pre-key` category and consumed by incoming pre-key messages.
use kestrel_store::{Category, KeyPatch, KeyStore, KeyStoreError, TransactionOptions, transaction};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cbor::{EncodeError, encode_cbor};
use crate::crypto::x25519::PublicKey;
use crate::crypto::xeddsa::XEdDSAError;
use crate::crypto::{Rng, RngError};
use crate::key_bundle::{
    KeyPair, OneTimePreKey, PreKeyBundle, PreKeyId, PreKeyRecord, SignedPreKeyId,
    SignedPreKeyRecord,
};

/// Number of one-time pre-keys uploaded when registering a device.
pub const INITIAL_PREKEY_COUNT: usize = 30;

/// Below this number of remaining one-time pre-keys the server should be topped up again.
pub const MIN_PREKEY_COUNT: usize = 5;

/// Registration ids are random values in `1..=16380`.
const MAX_REGISTRATION_ID: u32 = 16380;

/// Our local identity and bootstrap key material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub identity_key_pair: KeyPair,
    pub registration_id: u32,
    pub signed_prekey: SignedPreKeyRecord,

    /// Rotated-out signed pre-key, kept so handshakes started against it still complete.
    pub previous_signed_prekey: Option<SignedPreKeyRecord>,
}

impl Credentials {
    pub fn identity_key(&self) -> PublicKey {
        self.identity_key_pair.public_key
    }

    pub fn signed_prekey(&self, id: SignedPreKeyId) -> Option<&SignedPreKeyRecord> {
        if self.signed_prekey.id == id {
            return Some(&self.signed_prekey);
        }
        self.previous_signed_prekey
            .as_ref()
            .filter(|prekey| prekey.id == id)
    }

    /// Public bundle other devices use to establish a session with us.
    pub fn prekey_bundle(&self, device_id: u32, onetime: Option<OneTimePreKey>) -> PreKeyBundle {
        PreKeyBundle {
            registration_id: self.registration_id,
            device_id,
            identity_key: self.identity_key(),
            signed_prekey_id: self.signed_prekey.id,
            signed_prekey: self.signed_prekey.key_pair.public_key,
            signed_prekey_signature: self.signed_prekey.signature,
            onetime_prekey: onetime,
        }
    }
}

#[derive(Clone, Debug)]
pub struct KeyManager;

impl KeyManager {
    /// Generates fresh credentials with a signed pre-key with id 1.
    pub fn init(rng: &Rng) -> Result<Credentials, KeyManagerError> {
        let identity_key_pair = KeyPair::generate(rng)?;
        let registration_id = rng.random_u32()? % MAX_REGISTRATION_ID + 1;
        let signed_prekey = SignedPreKeyRecord::generate(1, &identity_key_pair.secret_key, rng)?;

        Ok(Credentials {
            identity_key_pair,
            registration_id,
            signed_prekey,
            previous_signed_prekey: None,
        })
    }

    /// Replaces the signed pre-key with a new one, keeping the previous one around.
    pub fn rotate_signed_prekey(
        mut y: Credentials,
        rng: &Rng,
    ) -> Result<Credentials, KeyManagerError> {
        let next_id = y.signed_prekey.id.wrapping_add(1).max(1);
        let signed_prekey =
            SignedPreKeyRecord::generate(next_id, &y.identity_key_pair.secret_key, rng)?;
        y.previous_signed_prekey = Some(std::mem::replace(&mut y.signed_prekey, signed_prekey));
        Ok(y)
    }

    /// Generates `count` one-time pre-keys starting at `start_id` and persists all of them in one
    /// transaction. Returns the public halves for upload.
    pub async fn generate_prekeys<S: KeyStore>(
        store: &S,
        start_id: PreKeyId,
        count: usize,
        rng: &Rng,
    ) -> Result<Vec<OneTimePreKey>, KeyManagerError> {
        let mut patch = KeyPatch::new();
        let mut public = Vec::with_capacity(count);
        let mut id = start_id;

        for _ in 0..count {
            let record = PreKeyRecord::generate(id, rng)?;
            patch.insert(Category::PreKey, id.to_string(), encode_cbor(&record)?);
            public.push(record.public());
            id = id.wrapping_add(1);
        }

        transaction(
            store,
            "generate-prekeys",
            &TransactionOptions::default(),
            async move || store.set(patch).await.map_err(KeyManagerError::from),
        )
        .await?;

        debug!(start_id, count, "generated one-time pre-keys");
        Ok(public)
    }

    /// Returns true if the number of one-time pre-keys left on the server is too low.
    pub fn needs_prekey_upload(remaining: usize) -> bool {
        remaining < MIN_PREKEY_COUNT
    }
}

#[derive(Debug, Error)]
pub enum KeyManagerError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    XEdDSA(#[from] XEdDSAError),

    #[error("failed encoding pre-key: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
}

#[cfg(test)]
mod tests {
    use kestrel_store::{Category, KeyStore, MemoryKeyStore};

    use crate::cbor::decode_cbor;
    use crate::crypto::Rng;
    use crate::key_bundle::PreKeyRecord;

    use super::{INITIAL_PREKEY_COUNT, KeyManager, MIN_PREKEY_COUNT};

    #[test]
    fn init_credentials() {
        let rng = Rng::from_seed([1; 32]);
        let credentials = KeyManager::init(&rng).unwrap();

        assert!((1..=16380).contains(&credentials.registration_id));
        assert_eq!(credentials.signed_prekey.id, 1);
        assert!(credentials.prekey_bundle(0, None).verify().is_ok());
    }

    #[test]
    fn rotate_keeps_previous() {
        let rng = Rng::from_seed([1; 32]);
        let credentials = KeyManager::init(&rng).unwrap();
        let rotated = KeyManager::rotate_signed_prekey(credentials.clone(), &rng).unwrap();

        assert_eq!(rotated.signed_prekey.id, 2);
        assert_eq!(rotated.signed_prekey(1), Some(&credentials.signed_prekey));
        assert!(rotated.signed_prekey(2).is_some());
        assert!(rotated.signed_prekey(3).is_none());
        assert!(rotated.prekey_bundle(0, None).verify().is_ok());
    }

    #[tokio::test]
    async fn generate_and_persist_prekeys() {
        let rng = Rng::from_seed([1; 32]);
        let store = MemoryKeyStore::new();

        let prekeys = KeyManager::generate_prekeys(&store, 10, INITIAL_PREKEY_COUNT, &rng)
            .await
            .unwrap();

        assert_eq!(prekeys.len(), INITIAL_PREKEY_COUNT);
        assert_eq!(prekeys[0].id, 10);
        assert_eq!(store.len(Category::PreKey), INITIAL_PREKEY_COUNT);

        let stored = store
            .get(Category::PreKey, &["12".to_string()])
            .await
            .unwrap();
        let record: PreKeyRecord = decode_cbor(&stored["12"]).unwrap();
        assert_eq!(record.public(), prekeys[2]);
    }

    #[test]
    fn prekey_upload_threshold() {
        assert!(KeyManager::needs_prekey_upload(MIN_PREKEY_COUNT - 1));
        assert!(!KeyManager::needs_prekey_upload(MIN_PREKEY_COUNT));
    }
}
