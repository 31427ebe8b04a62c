// SPDX-License-Identifier: MIT OR Apache-2.0

//! XEdDSA signatures created with Curve25519 key-agreement keys.
//!
//! Identity keys sign signed prekeys and sender-key signing keys sign group messages, both
//! without keeping a separate Ed25519 key pair around.
//!
//! <https://signal.org/docs/specifications/xeddsa/>
use std::fmt;

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::{EdwardsPoint, MontgomeryPoint, Scalar};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::crypto::sha2::sha2_512;
use crate::crypto::x25519::{PublicKey, SecretKey};
use crate::crypto::{Rng, RngError};

pub const SIGNATURE_SIZE: usize = 64;

/// Domain separation for the nonce hash, 0xFE followed by 31 bytes of 0xFF.
const NONCE_PREFIX: [u8; 32] = {
    let mut prefix = [0xFF; 32];
    prefix[0] = 0xFE;
    prefix
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct XSignature(#[serde(with = "serde_bytes")] [u8; SIGNATURE_SIZE]);

impl XSignature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl fmt::Display for XSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Edwards form of a Montgomery secret, forced to a zero sign bit.
fn edwards_key_pair(secret_key: &SecretKey) -> (CompressedEdwardsY, Scalar) {
    let k = Scalar::from_bytes_mod_order(*secret_key.as_bytes());
    let mut public = (&k * ED25519_BASEPOINT_TABLE).compress();
    let negative = public.0[31] >> 7 == 1;
    public.0[31] &= 0b0111_1111;
    let private = if negative { -k } else { k };
    (public, private)
}

fn challenge(r: &[u8; 32], public: &CompressedEdwardsY, message: &[u8]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(&sha2_512(&[r, public.as_bytes(), message]))
}

pub fn xeddsa_sign(
    message: &[u8],
    secret_key: &SecretKey,
    rng: &Rng,
) -> Result<XSignature, XEdDSAError> {
    let random: [u8; SIGNATURE_SIZE] = rng.random_array()?;
    let (public, private) = edwards_key_pair(secret_key);

    let r = Scalar::from_bytes_mod_order_wide(&sha2_512(&[
        &NONCE_PREFIX,
        private.as_bytes(),
        message,
        &random,
    ]));
    let cap_r = (&r * ED25519_BASEPOINT_TABLE).compress();
    let s = r + challenge(cap_r.as_bytes(), &public, message) * private;

    let mut signature = [0u8; SIGNATURE_SIZE];
    signature[..32].copy_from_slice(cap_r.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    Ok(XSignature(signature))
}

pub fn xeddsa_verify(
    message: &[u8],
    public_key: &PublicKey,
    signature: &XSignature,
) -> Result<(), XEdDSAError> {
    let (r_bytes, s_bytes) = signature.as_bytes().split_at(32);
    let mut cap_r = [0u8; 32];
    cap_r.copy_from_slice(r_bytes);
    let mut s = [0u8; 32];
    s.copy_from_slice(s_bytes);

    if s[31] & 0b1110_0000 != 0 {
        return Err(XEdDSAError::InvalidArgument);
    }

    let a: EdwardsPoint = MontgomeryPoint(public_key.to_bytes())
        .to_edwards(0)
        .ok_or(XEdDSAError::InvalidArgument)?;
    let h = challenge(&cap_r, &a.compress(), message);

    let cap_r_check = EdwardsPoint::vartime_double_scalar_mul_basepoint(
        &h,
        &-a,
        &Scalar::from_bytes_mod_order(s),
    )
    .compress();

    if bool::from(cap_r_check.as_bytes().ct_eq(&cap_r)) {
        Ok(())
    } else {
        Err(XEdDSAError::VerificationFailed)
    }
}

#[derive(Debug, Error)]
pub enum XEdDSAError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error("malformed xeddsa public key or signature")]
    InvalidArgument,

    #[error("signature does not match public key and bytes")]
    VerificationFailed,
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;
    use crate::crypto::x25519::SecretKey;

    use super::{XEdDSAError, xeddsa_sign, xeddsa_verify};

    #[test]
    fn sign_and_verify() {
        let rng = Rng::from_seed([3; 32]);
        let secret_key = SecretKey::generate(&rng).unwrap();

        let signature = xeddsa_sign(b"signed prekey", &secret_key, &rng).unwrap();
        assert!(xeddsa_verify(b"signed prekey", &secret_key.public_key(), &signature).is_ok());
    }

    #[test]
    fn wrong_key_or_message() {
        let rng = Rng::from_seed([3; 32]);
        let secret_key = SecretKey::generate(&rng).unwrap();
        let other_key = SecretKey::generate(&rng).unwrap();
        let signature = xeddsa_sign(b"signed prekey", &secret_key, &rng).unwrap();

        assert!(matches!(
            xeddsa_verify(b"other bytes", &secret_key.public_key(), &signature),
            Err(XEdDSAError::VerificationFailed)
        ));
        assert!(matches!(
            xeddsa_verify(b"signed prekey", &other_key.public_key(), &signature),
            Err(XEdDSAError::VerificationFailed)
        ));
    }
}
