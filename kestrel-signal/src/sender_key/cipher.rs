// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing::debug;

use crate::crypto::Rng;
use crate::crypto::x25519::SecretKey;
use crate::crypto::xeddsa::{xeddsa_sign, xeddsa_verify};
use crate::ratchet::Ratchet;
use crate::sender_key::SenderKeyError;
use crate::sender_key::message::{SenderKeyDistributionMessage, SenderKeyMessage};
use crate::sender_key::state::{SenderKeyRecord, SenderKeyState};

/// Key ids are random 31-bit values.
const KEY_ID_MASK: u32 = 0x7FFF_FFFF;

pub struct GroupCipher;

impl GroupCipher {
    /// Returns a distribution message for our latest sending state, creating one if the record is
    /// still empty.
    pub fn create_distribution(
        mut y: SenderKeyRecord,
        rng: &Rng,
    ) -> Result<(SenderKeyRecord, SenderKeyDistributionMessage), SenderKeyError> {
        if y.latest().is_none_or(|state| state.signing_secret.is_none()) {
            let signing_secret = SecretKey::generate(rng)?;
            let state = SenderKeyState {
                key_id: rng.random_u32()? & KEY_ID_MASK,
                chain: Ratchet::init(rng.random_array()?, 0),
                signing_key: signing_secret.public_key(),
                signing_secret: Some(signing_secret),
            };
            debug!(key_id = state.key_id, "created sender key state");
            y.add_state(state);
        }

        let state = y.latest().ok_or(SenderKeyError::NoState)?;
        let message = SenderKeyDistributionMessage {
            key_id: state.key_id,
            iteration: state.chain.iteration(),
            chain_key: *state.chain.chain_key(),
            signing_key: state.signing_key,
        };
        Ok((y, message))
    }

    /// Applies a distribution message received from another group member.
    ///
    /// Re-applying a distribution for an already known key id and signing key leaves the record
    /// untouched.
    pub fn process_distribution(
        mut y: SenderKeyRecord,
        message: &SenderKeyDistributionMessage,
    ) -> SenderKeyRecord {
        if y
            .state(message.key_id)
            .is_some_and(|state| state.signing_key == message.signing_key)
        {
            debug!(key_id = message.key_id, "sender key state already known");
            return y;
        }

        y.add_state(SenderKeyState {
            key_id: message.key_id,
            chain: Ratchet::init(message.chain_key, message.iteration),
            signing_key: message.signing_key,
            signing_secret: None,
        });
        y
    }

    pub fn encrypt(
        mut y: SenderKeyRecord,
        plaintext: &[u8],
        rng: &Rng,
    ) -> Result<(SenderKeyRecord, SenderKeyMessage), SenderKeyError> {
        let state = y.latest_mut().ok_or(SenderKeyError::NoState)?;
        let signing_secret = state
            .signing_secret
            .clone()
            .ok_or(SenderKeyError::NotOurState(state.key_id))?;

        let aad = state.key_id.to_be_bytes();
        let (chain, message) = Ratchet::encrypt(state.chain.clone(), plaintext, &aad)?;
        state.chain = chain;

        let signature = xeddsa_sign(
            &SenderKeyMessage::signed_bytes(state.key_id, &message),
            &signing_secret,
            rng,
        )?;

        let message = SenderKeyMessage {
            key_id: state.key_id,
            message,
            signature,
        };
        Ok((y, message))
    }

    pub fn decrypt(
        mut y: SenderKeyRecord,
        message: &SenderKeyMessage,
    ) -> Result<(SenderKeyRecord, Vec<u8>), SenderKeyError> {
        let state = y
            .state_mut(message.key_id)
            .ok_or(SenderKeyError::UnknownKeyId(message.key_id))?;

        xeddsa_verify(
            &SenderKeyMessage::signed_bytes(message.key_id, &message.message),
            &state.signing_key,
            &message.signature,
        )?;

        let aad = message.key_id.to_be_bytes();
        let (chain, plaintext) = Ratchet::decrypt(state.chain.clone(), &message.message, &aad)?;
        state.chain = chain;

        Ok((y, plaintext))
    }
}
