// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::crypto::x25519::PublicKey;
use crate::crypto::xeddsa::XSignature;
use crate::ratchet::{CHAIN_KEY_SIZE, RatchetCiphertext};
use crate::sender_key::state::SenderKeyId;

/// Group message, signed by the sender's signing key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyMessage {
    pub key_id: SenderKeyId,
    pub message: RatchetCiphertext,
    pub signature: XSignature,
}

impl SenderKeyMessage {
    /// Bytes covered by the signature.
    pub(crate) fn signed_bytes(key_id: SenderKeyId, message: &RatchetCiphertext) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + message.ciphertext.len());
        bytes.extend_from_slice(&key_id.to_be_bytes());
        bytes.extend_from_slice(&message.counter.to_be_bytes());
        bytes.extend_from_slice(&message.ciphertext);
        bytes
    }
}

/// Everything a group member needs to decrypt our group messages from `iteration` onwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyDistributionMessage {
    pub key_id: SenderKeyId,
    pub iteration: u32,
    #[serde(with = "serde_bytes")]
    pub chain_key: [u8; CHAIN_KEY_SIZE],
    pub signing_key: PublicKey,
}
