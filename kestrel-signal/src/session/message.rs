// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cbor::{EncodeError, encode_cbor};
use crate::crypto::x25519::PublicKey;
use crate::key_bundle::{PreKeyId, SignedPreKeyId};
use crate::ratchet::RatchetCiphertext;

/// Type tag of a pairwise ciphertext.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Pre-key message `pkmsg`, completes a pending handshake.
    PreKey,

    /// Ordinary ratchet message `msg`.
    Whisper,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::PreKey => "pkmsg",
            MessageType::Whisper => "msg",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pkmsg" => Ok(MessageType::PreKey),
            "msg" => Ok(MessageType::Whisper),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinary ratchet message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub ratchet_key: PublicKey,
    pub previous_counter: u32,
    pub message: RatchetCiphertext,
}

impl SignalMessage {
    /// Binds the ciphertext to both identities and the unencrypted header.
    pub(crate) fn associated_data(
        sender_identity: &PublicKey,
        receiver_identity: &PublicKey,
        ratchet_key: &PublicKey,
        previous_counter: u32,
        counter: u32,
    ) -> Vec<u8> {
        let mut aad = Vec::with_capacity(32 * 3 + 8);
        aad.extend_from_slice(sender_identity.as_bytes());
        aad.extend_from_slice(receiver_identity.as_bytes());
        aad.extend_from_slice(ratchet_key.as_bytes());
        aad.extend_from_slice(&previous_counter.to_be_bytes());
        aad.extend_from_slice(&counter.to_be_bytes());
        aad
    }
}

/// First messages of an initiator, carrying everything needed to complete X3DH.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeySignalMessage {
    pub registration_id: u32,
    pub prekey_id: Option<PreKeyId>,
    pub signed_prekey_id: SignedPreKeyId,
    pub base_key: PublicKey,
    pub identity_key: PublicKey,
    pub message: SignalMessage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CiphertextMessage {
    PreKey(PreKeySignalMessage),
    Whisper(SignalMessage),
}

impl CiphertextMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            CiphertextMessage::PreKey(_) => MessageType::PreKey,
            CiphertextMessage::Whisper(_) => MessageType::Whisper,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        match self {
            CiphertextMessage::PreKey(message) => encode_cbor(message),
            CiphertextMessage::Whisper(message) => encode_cbor(message),
        }
    }
}
