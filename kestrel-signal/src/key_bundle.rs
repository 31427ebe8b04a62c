// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pre-keys and the bundles peers publish for session establishment.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::x25519::{PublicKey, SecretKey};
use crate::crypto::xeddsa::{XEdDSAError, XSignature, xeddsa_sign, xeddsa_verify};
use crate::crypto::{Rng, RngError};

pub type PreKeyId = u32;

pub type SignedPreKeyId = u32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    pub fn generate(rng: &Rng) -> Result<Self, RngError> {
        Ok(Self::from_secret(SecretKey::generate(rng)?))
    }

    pub fn from_secret(secret_key: SecretKey) -> Self {
        let public_key = secret_key.public_key();
        Self {
            secret_key,
            public_key,
        }
    }
}

/// One-time pre-key as persisted under the `pre-key` category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyRecord {
    pub id: PreKeyId,
    pub key_pair: KeyPair,
}

impl PreKeyRecord {
    pub fn generate(id: PreKeyId, rng: &Rng) -> Result<Self, RngError> {
        Ok(Self {
            id,
            key_pair: KeyPair::generate(rng)?,
        })
    }

    pub fn public(&self) -> OneTimePreKey {
        OneTimePreKey {
            id: self.id,
            key: self.key_pair.public_key,
        }
    }
}

/// Medium-term pre-key, signed by the identity key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    pub id: SignedPreKeyId,
    pub key_pair: KeyPair,
    pub signature: XSignature,
}

impl SignedPreKeyRecord {
    pub fn generate(
        id: SignedPreKeyId,
        identity_secret: &SecretKey,
        rng: &Rng,
    ) -> Result<Self, XEdDSAError> {
        let key_pair = KeyPair::generate(rng)?;
        let signature = xeddsa_sign(key_pair.public_key.as_bytes(), identity_secret, rng)?;
        Ok(Self {
            id,
            key_pair,
            signature,
        })
    }
}

/// Public half of a one-time pre-key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimePreKey {
    pub id: PreKeyId,
    pub key: PublicKey,
}

/// Everything an initiator needs to establish an outgoing session with a device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyBundle {
    pub registration_id: u32,
    pub device_id: u32,
    pub identity_key: PublicKey,
    pub signed_prekey_id: SignedPreKeyId,
    pub signed_prekey: PublicKey,
    pub signed_prekey_signature: XSignature,
    pub onetime_prekey: Option<OneTimePreKey>,
}

impl PreKeyBundle {
    /// Checks that the signed pre-key was signed by the bundle's identity key.
    pub fn verify(&self) -> Result<(), KeyBundleError> {
        xeddsa_verify(
            self.signed_prekey.as_bytes(),
            &self.identity_key,
            &self.signed_prekey_signature,
        )?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum KeyBundleError {
    #[error("invalid signed pre-key signature: {0}")]
    Signature(#[from] XEdDSAError),
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;
    use crate::crypto::x25519::SecretKey;

    use super::{KeyBundleError, PreKeyBundle, PreKeyRecord, SignedPreKeyRecord};

    fn bundle(rng: &Rng) -> PreKeyBundle {
        let identity = SecretKey::generate(rng).unwrap();
        let signed_prekey = SignedPreKeyRecord::generate(1, &identity, rng).unwrap();
        let onetime = PreKeyRecord::generate(7, rng).unwrap();

        PreKeyBundle {
            registration_id: 42,
            device_id: 0,
            identity_key: identity.public_key(),
            signed_prekey_id: signed_prekey.id,
            signed_prekey: signed_prekey.key_pair.public_key,
            signed_prekey_signature: signed_prekey.signature,
            onetime_prekey: Some(onetime.public()),
        }
    }

    #[test]
    fn verify_signed_prekey() {
        let rng = Rng::from_seed([1; 32]);
        assert!(bundle(&rng).verify().is_ok());
    }

    #[test]
    fn forged_signed_prekey() {
        let rng = Rng::from_seed([1; 32]);
        let mut bundle = bundle(&rng);
        bundle.signed_prekey = SecretKey::generate(&rng).unwrap().public_key();

        assert!(matches!(bundle.verify(), Err(KeyBundleError::Signature(_))));
    }
}
