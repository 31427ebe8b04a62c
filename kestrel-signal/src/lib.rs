// SPDX-License-Identifier: MIT OR Apache-2.0

//! `kestrel-signal` is the encryption and identity-resolution core of a multi-device
//! end-to-end-encrypted messenger.
//!
//! ## Sessions and sender keys
//!
//! The [`SessionRepository`] owns pairwise ratchet sessions and group sender-key state. Pairwise
//! sessions are established with Signal's [X3DH](https://signal.org/docs/specifications/x3dh)
//! key agreement from a published [`PreKeyBundle`] and continue as a Double Ratchet. Until the
//! initiator receives a reply every message is sent as a pre-key message (`pkmsg`), afterwards as
//! an ordinary ratchet message (`msg`).
//!
//! Group messages are encrypted once with a symmetric sender key. Every group message comes with
//! a fresh distribution message so members who missed an earlier one can catch up.
//!
//! ## Address mapping
//!
//! Peers are addressed either by phone-number (`pn`) or by privacy-preserving linked identifier
//! (`lid`). The [`LidMappingStore`] keeps the one-to-one mapping between both namespaces at user
//! granularity, backed by a bounded cache, the key store and an optional remote
//! [`DirectoryResolver`].
//!
//! ## Persistence
//!
//! All state lives in a [`KeyStore`](kestrel_store::KeyStore) provided by the application.
//! Multi-entry writes are committed atomically through key store transactions.
pub mod address;
mod cbor;
pub mod crypto;
pub mod key_bundle;
pub mod key_manager;
pub mod lid_mapping;
mod ratchet;
pub mod repository;
pub mod sender_key;
pub mod session;
mod storage;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use address::{Address, AddressError, Domain, HOSTED_DEVICE_ID, ProtocolAddress, SenderKeyName};
pub use cbor::{DecodeError, EncodeError};
pub use crypto::{Rng, RngError};
pub use key_bundle::{OneTimePreKey, PreKeyBundle, PreKeyId, SignedPreKeyId};
pub use key_manager::{
    Credentials, INITIAL_PREKEY_COUNT, KeyManager, KeyManagerError, MIN_PREKEY_COUNT,
};
pub use lid_mapping::{
    CacheStats, DirectoryResolver, LidMapping, LidMappingError, LidMappingStore,
    LidMappingStoreBuilder, MappingCacheConfig, NoResolver,
};
pub use ratchet::{RatchetCiphertext, RatchetError};
pub use repository::{
    DecryptionError, EncryptedGroupMessage, EncryptedMessage, RepositoryError, SessionRepository,
    ValidationError,
};
pub use session::MessageType;
pub use storage::StorageError;
