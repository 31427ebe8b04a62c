// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairwise and group encryption on top of a key store.
//!
//! The [`SessionRepository`] loads session and sender-key state, runs the ciphers and writes the
//! advanced state back. Every operation which mutates state runs inside one key store
//! transaction, so a failed decryption or an aborted commit never leaves partial state behind.
//!
//! Ratchets are not safe under concurrent advancement: callers serialize encryption and
//! decryption for the same peer or group sender themselves.
use kestrel_store::{KeyStore, KeyStoreError, TransactionOptions, transaction};
use thiserror::Error;
use tracing::{debug, trace};

use crate::address::{Address, AddressError, ProtocolAddress, SenderKeyName};
use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::Rng;
use crate::key_bundle::{KeyBundleError, PreKeyBundle, PreKeyId, SignedPreKeyId};
use crate::key_manager::Credentials;
use crate::sender_key::{
    GroupCipher, SenderKeyDistributionMessage, SenderKeyError, SenderKeyMessage,
};
use crate::session::{
    MessageType, PreKeySignalMessage, SessionCipher, SessionError, SignalMessage,
};
use crate::storage::{SignalStorage, StorageError};

/// Pairwise ciphertext together with its type tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub message_type: MessageType,
    pub ciphertext: Vec<u8>,
}

/// Group ciphertext together with a fresh distribution message of our sender key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedGroupMessage {
    pub sender_key_distribution_message: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

pub struct SessionRepository<S> {
    store: S,
    credentials: Credentials,
    rng: Rng,
    options: TransactionOptions,
}

impl<S> SessionRepository<S>
where
    S: KeyStore,
{
    pub fn new(store: S, credentials: Credentials, rng: Rng) -> Self {
        Self {
            store,
            credentials,
            rng,
            options: TransactionOptions::default(),
        }
    }

    pub fn with_transaction_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn storage(&self) -> SignalStorage<'_, S> {
        SignalStorage::new(&self.store, &self.credentials)
    }

    async fn transaction<R>(
        &self,
        label: &str,
        body: impl AsyncFnOnce() -> Result<R, RepositoryError>,
    ) -> Result<R, RepositoryError> {
        transaction(&self.store, label, &self.options, body).await
    }

    /// String form `user.device` of the protocol address a session with `address` is keyed on.
    pub fn address_to_protocol_address(&self, address: &str) -> Result<String, RepositoryError> {
        Ok(protocol_address(address)?.to_string())
    }

    pub async fn decrypt_group_message(
        &self,
        group: &str,
        author: &str,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, RepositoryError> {
        let name = SenderKeyName::new(group, protocol_address(author)?);
        let message: SenderKeyMessage = decode_cbor(ciphertext).map_err(DecryptionError::from)?;

        self.transaction("decrypt-group-message", async || {
            let storage = self.storage();
            let record = storage
                .load_sender_key(&name)
                .await?
                .filter(|record| !record.is_empty())
                .ok_or_else(|| DecryptionError::NoSenderKey(name.to_string()))?;

            let (record, plaintext) =
                GroupCipher::decrypt(record, &message).map_err(DecryptionError::from)?;
            storage.store_sender_key(&name, &record).await?;
            Ok(plaintext)
        })
        .await
    }

    /// Applies a sender-key distribution message of `author` for `group`.
    ///
    /// A missing sender-key record is created first. Applying the same distribution again is a
    /// no-op.
    pub async fn process_sender_key_distribution(
        &self,
        group: Option<&str>,
        author: &str,
        distribution: &[u8],
    ) -> Result<(), RepositoryError> {
        let group = group
            .filter(|group| !group.is_empty())
            .ok_or(ValidationError::MissingGroupId)?;
        let name = SenderKeyName::new(group, protocol_address(author)?);
        let message: SenderKeyDistributionMessage =
            decode_cbor(distribution).map_err(ValidationError::Malformed)?;

        self.transaction("process-sender-key-distribution", async || {
            let storage = self.storage();
            let record = storage.ensure_sender_key(&name).await?;
            let record = GroupCipher::process_distribution(record, &message);
            storage.store_sender_key(&name, &record).await?;
            Ok(())
        })
        .await?;

        debug!(%name, key_id = message.key_id, "processed sender key distribution");
        Ok(())
    }

    /// Decrypts a pairwise message with type tag `pkmsg` or `msg`.
    pub async fn decrypt_message(
        &self,
        address: &str,
        message_type: &str,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, RepositoryError> {
        let message_type: MessageType = message_type
            .parse()
            .map_err(RepositoryError::UnknownMessageType)?;
        let address = protocol_address(address)?;

        match message_type {
            MessageType::PreKey => {
                let message: PreKeySignalMessage =
                    decode_cbor(ciphertext).map_err(DecryptionError::from)?;
                self.decrypt_prekey_message(&address, &message).await
            }
            MessageType::Whisper => {
                let message: SignalMessage =
                    decode_cbor(ciphertext).map_err(DecryptionError::from)?;
                self.decrypt_whisper_message(&address, &message).await
            }
        }
    }

    async fn decrypt_whisper_message(
        &self,
        address: &ProtocolAddress,
        message: &SignalMessage,
    ) -> Result<Vec<u8>, RepositoryError> {
        self.transaction("decrypt-message", async || {
            let storage = self.storage();
            let record = storage
                .load_session(address)
                .await?
                .ok_or_else(|| DecryptionError::NoSession(address.clone()))?;

            let (record, plaintext) =
                SessionCipher::decrypt(record, message, &self.rng).map_err(DecryptionError::from)?;
            storage.store_session(address, &record).await?;
            Ok(plaintext)
        })
        .await
    }

    async fn decrypt_prekey_message(
        &self,
        address: &ProtocolAddress,
        message: &PreKeySignalMessage,
    ) -> Result<Vec<u8>, RepositoryError> {
        self.transaction("decrypt-prekey-message", async || {
            let storage = self.storage();

            if !storage.is_trusted_identity(address, &message.identity_key) {
                return Err(DecryptionError::UntrustedIdentity(address.clone()).into());
            }

            // Repeated pre-key message of a handshake we already completed.
            if let Some(record) = storage
                .load_session(address)
                .await?
                .filter(|record| record.base_key() == &message.base_key)
            {
                trace!(%address, "pre-key message for existing session");
                let (record, plaintext) =
                    SessionCipher::decrypt(record, &message.message, &self.rng)
                        .map_err(DecryptionError::from)?;
                storage.store_session(address, &record).await?;
                return Ok(plaintext);
            }

            let signed_prekey = storage
                .load_signed_prekey(message.signed_prekey_id)
                .ok_or(DecryptionError::UnknownSignedPreKey(message.signed_prekey_id))?;
            let onetime_prekey = match message.prekey_id {
                Some(id) => Some(
                    storage
                        .load_prekey(id)
                        .await?
                        .ok_or(DecryptionError::MissingPreKey(id))?,
                ),
                None => None,
            };

            let record = SessionCipher::initialize_incoming(
                storage.our_identity(),
                &signed_prekey.key_pair,
                onetime_prekey.as_ref().map(|prekey| &prekey.key_pair),
                message,
            )
            .map_err(DecryptionError::from)?;
            let (record, plaintext) = SessionCipher::decrypt(record, &message.message, &self.rng)
                .map_err(DecryptionError::from)?;

            storage.store_session(address, &record).await?;
            if let Some(id) = message.prekey_id {
                storage.remove_prekey(id).await?;
            }

            debug!(%address, "established incoming session");
            Ok(plaintext)
        })
        .await
    }

    /// Encrypts for an existing session, as pre-key message while the handshake is pending.
    pub async fn encrypt_message(
        &self,
        address: &str,
        plaintext: &[u8],
    ) -> Result<EncryptedMessage, RepositoryError> {
        let address = protocol_address(address)?;

        self.transaction("encrypt-message", async || {
            let storage = self.storage();
            let record = storage
                .load_session(&address)
                .await?
                .ok_or_else(|| RepositoryError::NoSession(address.clone()))?;

            let (record, message) = SessionCipher::encrypt(record, plaintext)?;
            storage.store_session(&address, &record).await?;

            Ok(EncryptedMessage {
                message_type: message.message_type(),
                ciphertext: message.to_bytes()?,
            })
        })
        .await
    }

    /// Encrypts for all members of `group`, creating our sender key on first use.
    pub async fn encrypt_group_message(
        &self,
        group: &str,
        self_address: &str,
        plaintext: &[u8],
    ) -> Result<EncryptedGroupMessage, RepositoryError> {
        let name = SenderKeyName::new(group, protocol_address(self_address)?);

        self.transaction("encrypt-group-message", async || {
            let storage = self.storage();
            let record = storage.ensure_sender_key(&name).await?;
            let (record, distribution) = GroupCipher::create_distribution(record, &self.rng)?;
            let (record, message) = GroupCipher::encrypt(record, plaintext, &self.rng)?;
            storage.store_sender_key(&name, &record).await?;

            Ok(EncryptedGroupMessage {
                sender_key_distribution_message: encode_cbor(&distribution)?,
                ciphertext: encode_cbor(&message)?,
            })
        })
        .await
    }

    /// Establishes an outgoing session from a pre-key bundle, replacing any existing session.
    pub async fn inject_session(
        &self,
        address: &str,
        bundle: &PreKeyBundle,
    ) -> Result<(), RepositoryError> {
        let address = protocol_address(address)?;
        bundle.verify().map_err(ValidationError::from)?;

        self.transaction("inject-session", async || {
            let storage = self.storage();
            let record =
                SessionCipher::initialize_outgoing(storage.our_identity(), bundle, &self.rng)?;
            storage.store_session(&address, &record).await?;
            Ok(())
        })
        .await?;

        debug!(%address, "injected outgoing session");
        Ok(())
    }
}

fn protocol_address(address: &str) -> Result<ProtocolAddress, ValidationError> {
    Ok(Address::parse(address)?.to_protocol_address())
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("sender key distribution without group id")]
    MissingGroupId,

    #[error("malformed sender key distribution: {0}")]
    Malformed(DecodeError),

    #[error(transparent)]
    KeyBundle(#[from] KeyBundleError),
}

#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("malformed ciphertext: {0}")]
    Malformed(#[from] DecodeError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    SenderKey(#[from] SenderKeyError),

    #[error("no session with {0}")]
    NoSession(ProtocolAddress),

    #[error("no sender key state for {0}")]
    NoSenderKey(String),

    #[error("unknown signed pre-key {0}")]
    UnknownSignedPreKey(SignedPreKeyId),

    #[error("pre-key {0} not found")]
    MissingPreKey(PreKeyId),

    #[error("identity of {0} is not trusted")]
    UntrustedIdentity(ProtocolAddress),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("unknown message type {0}")]
    UnknownMessageType(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("no session with {0}")]
    NoSession(ProtocolAddress),

    #[error("encryption failed: {0}")]
    Session(#[from] SessionError),

    #[error("group encryption failed: {0}")]
    SenderKey(#[from] SenderKeyError),

    #[error("failed encoding ciphertext: {0}")]
    Encode(#[from] EncodeError),
}

impl From<KeyStoreError> for RepositoryError {
    fn from(err: KeyStoreError) -> Self {
        RepositoryError::Persistence(StorageError::KeyStore(err))
    }
}
