// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairwise ratchet sessions between two devices.
mod cipher;
mod message;
mod state;
#[cfg(test)]
mod tests;
mod x3dh;

use thiserror::Error;

pub use cipher::{LocalIdentity, SessionCipher};
pub use message::{CiphertextMessage, MessageType, PreKeySignalMessage, SignalMessage};
pub use state::{MAX_RECEIVER_CHAINS, PendingPreKey, SessionRecord};
pub use x3dh::X3DHError;

use crate::crypto::RngError;
use crate::crypto::hkdf::HkdfError;
use crate::crypto::x25519::X25519Error;
use crate::key_bundle::KeyBundleError;
use crate::ratchet::RatchetError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Hkdf(#[from] HkdfError),

    #[error(transparent)]
    X25519(#[from] X25519Error),

    #[error(transparent)]
    X3DH(#[from] X3DHError),

    #[error(transparent)]
    KeyBundle(#[from] KeyBundleError),

    #[error(transparent)]
    Ratchet(#[from] RatchetError),
}
