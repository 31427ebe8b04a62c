// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extended Triple Diffie-Hellman (X3DH) key agreement as specified by Signal.
//!
//! Both sides derive the same shared secret from the initiator's identity and base key and the
//! responder's identity, signed pre-key and (optional) one-time pre-key. The secret seeds the
//! root key of the session's Diffie-Hellman ratchet.
//!
//! <https://signal.org/docs/specifications/x3dh/>
use thiserror::Error;

use crate::crypto::hkdf::{HkdfError, hkdf};
use crate::crypto::x25519::{PublicKey, SecretKey, X25519Error};

pub const SHARED_SECRET_SIZE: usize = 32;

const KDF_INFO: &[u8] = b"kestrel-x3dh";

fn derive(agreements: &[[u8; 32]]) -> Result<[u8; SHARED_SECRET_SIZE], X3DHError> {
    let mut ikm = Vec::with_capacity(32 * (agreements.len() + 1));
    ikm.extend_from_slice(&[0xFF; 32]); // "discontinuity bytes"
    for agreement in agreements {
        ikm.extend_from_slice(agreement);
    }
    Ok(hkdf(&[0u8; 32], &ikm, Some(KDF_INFO))?)
}

/// Shared secret computed by the side sending the first pre-key message.
pub fn x3dh_initiate(
    our_identity: &SecretKey,
    our_base: &SecretKey,
    their_identity: &PublicKey,
    their_signed_prekey: &PublicKey,
    their_onetime_prekey: Option<&PublicKey>,
) -> Result<[u8; SHARED_SECRET_SIZE], X3DHError> {
    let mut agreements = vec![
        our_identity.calculate_agreement(their_signed_prekey)?,
        our_base.calculate_agreement(their_identity)?,
        our_base.calculate_agreement(their_signed_prekey)?,
    ];
    if let Some(onetime) = their_onetime_prekey {
        agreements.push(our_base.calculate_agreement(onetime)?);
    }
    derive(&agreements)
}

/// Shared secret computed by the side receiving the first pre-key message.
pub fn x3dh_respond(
    our_identity: &SecretKey,
    our_signed_prekey: &SecretKey,
    our_onetime_prekey: Option<&SecretKey>,
    their_identity: &PublicKey,
    their_base: &PublicKey,
) -> Result<[u8; SHARED_SECRET_SIZE], X3DHError> {
    let mut agreements = vec![
        our_signed_prekey.calculate_agreement(their_identity)?,
        our_identity.calculate_agreement(their_base)?,
        our_signed_prekey.calculate_agreement(their_base)?,
    ];
    if let Some(onetime) = our_onetime_prekey {
        agreements.push(onetime.calculate_agreement(their_base)?);
    }
    derive(&agreements)
}

#[derive(Debug, Error)]
pub enum X3DHError {
    #[error(transparent)]
    Hkdf(#[from] HkdfError),

    #[error(transparent)]
    X25519(#[from] X25519Error),
}
