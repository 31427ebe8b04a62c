// SPDX-License-Identifier: MIT OR Apache-2.0

//! Double ratchet for pairwise sessions.
//!
//! Sessions start with an X3DH handshake. Afterwards every change of direction performs a
//! Diffie-Hellman ratchet step which renews the root key and starts new sending and receiving
//! chains, inside a chain each message advances a symmetric hash ratchet.
use std::collections::VecDeque;

use crate::crypto::Rng;
use crate::crypto::Secret;
use crate::crypto::hkdf::hkdf_pair;
use crate::crypto::x25519::PublicKey;
use crate::key_bundle::{KeyPair, PreKeyBundle};
use crate::ratchet::{ChainState, Ratchet};
use crate::session::message::{CiphertextMessage, PreKeySignalMessage, SignalMessage};
use crate::session::state::{PendingPreKey, ReceiverChain, SessionRecord};
use crate::session::x3dh::{x3dh_initiate, x3dh_respond};
use crate::session::SessionError;

const ROOT_INFO: &[u8] = b"kestrel-root";

const RATCHET_INFO: &[u8] = b"kestrel-ratchet";

pub struct SessionCipher;

/// Key material of our own device taking part in a handshake.
#[derive(Clone, Copy, Debug)]
pub struct LocalIdentity<'a> {
    pub identity_key_pair: &'a KeyPair,
    pub registration_id: u32,
}

impl SessionCipher {
    /// Establishes an outgoing session from a peer's published bundle.
    ///
    /// Messages of the new session are sent as pre-key messages until the peer replied.
    pub fn initialize_outgoing(
        local: LocalIdentity<'_>,
        bundle: &PreKeyBundle,
        rng: &Rng,
    ) -> Result<SessionRecord, SessionError> {
        bundle.verify()?;

        let base = KeyPair::generate(rng)?;
        let shared_secret = x3dh_initiate(
            &local.identity_key_pair.secret_key,
            &base.secret_key,
            &bundle.identity_key,
            &bundle.signed_prekey,
            bundle.onetime_prekey.as_ref().map(|prekey| &prekey.key),
        )?;
        let (root_key, chain_key) = hkdf_pair(b"", &shared_secret, ROOT_INFO)?;

        // The responder starts sending on its signed pre-key, we take a ratchet step right away.
        let sender_ratchet = KeyPair::generate(rng)?;
        let (root_key, sending_chain_key) = ratchet_root(
            &root_key,
            &sender_ratchet
                .secret_key
                .calculate_agreement(&bundle.signed_prekey)?,
        )?;

        Ok(SessionRecord {
            local_identity: local.identity_key_pair.public_key,
            remote_identity: bundle.identity_key,
            local_registration_id: local.registration_id,
            remote_registration_id: bundle.registration_id,
            base_key: base.public_key,
            root_key: Secret::from_bytes(root_key),
            sender_ratchet,
            sending_chain: Ratchet::init(sending_chain_key, 0),
            previous_counter: 0,
            receiver_chains: VecDeque::from([ReceiverChain {
                ratchet_key: bundle.signed_prekey,
                chain: Ratchet::init(chain_key, 0),
            }]),
            pending_prekey: Some(PendingPreKey {
                prekey_id: bundle.onetime_prekey.map(|prekey| prekey.id),
                signed_prekey_id: bundle.signed_prekey_id,
                base_key: base.public_key,
            }),
        })
    }

    /// Establishes an incoming session from a peer's pre-key message.
    pub fn initialize_incoming(
        local: LocalIdentity<'_>,
        signed_prekey: &KeyPair,
        onetime_prekey: Option<&KeyPair>,
        message: &PreKeySignalMessage,
    ) -> Result<SessionRecord, SessionError> {
        let shared_secret = x3dh_respond(
            &local.identity_key_pair.secret_key,
            &signed_prekey.secret_key,
            onetime_prekey.map(|prekey| &prekey.secret_key),
            &message.identity_key,
            &message.base_key,
        )?;
        let (root_key, chain_key) = hkdf_pair(b"", &shared_secret, ROOT_INFO)?;

        Ok(SessionRecord {
            local_identity: local.identity_key_pair.public_key,
            remote_identity: message.identity_key,
            local_registration_id: local.registration_id,
            remote_registration_id: message.registration_id,
            base_key: message.base_key,
            root_key: Secret::from_bytes(root_key),
            sender_ratchet: signed_prekey.clone(),
            sending_chain: Ratchet::init(chain_key, 0),
            previous_counter: 0,
            receiver_chains: VecDeque::new(),
            pending_prekey: None,
        })
    }

    pub fn encrypt(
        mut y: SessionRecord,
        plaintext: &[u8],
    ) -> Result<(SessionRecord, CiphertextMessage), SessionError> {
        let ratchet_key = y.sender_ratchet.public_key;
        let aad = SignalMessage::associated_data(
            &y.local_identity,
            &y.remote_identity,
            &ratchet_key,
            y.previous_counter,
            y.sending_chain.iteration(),
        );

        let (sending_chain, ciphertext) = Ratchet::encrypt(y.sending_chain, plaintext, &aad)?;
        y.sending_chain = sending_chain;

        let message = SignalMessage {
            ratchet_key,
            previous_counter: y.previous_counter,
            message: ciphertext,
        };

        let message = match &y.pending_prekey {
            Some(pending) => CiphertextMessage::PreKey(PreKeySignalMessage {
                registration_id: y.local_registration_id,
                prekey_id: pending.prekey_id,
                signed_prekey_id: pending.signed_prekey_id,
                base_key: pending.base_key,
                identity_key: y.local_identity,
                message,
            }),
            None => CiphertextMessage::Whisper(message),
        };

        Ok((y, message))
    }

    /// Decrypts an ordinary message, taking a Diffie-Hellman ratchet step if the sender moved to
    /// a new ratchet key.
    pub fn decrypt(
        mut y: SessionRecord,
        message: &SignalMessage,
        rng: &Rng,
    ) -> Result<(SessionRecord, Vec<u8>), SessionError> {
        let aad = SignalMessage::associated_data(
            &y.remote_identity,
            &y.local_identity,
            &message.ratchet_key,
            message.previous_counter,
            message.message.counter,
        );

        let chain = match y.receiver_chain(&message.ratchet_key).cloned() {
            Some(chain) => chain,
            None => Self::ratchet_step(&mut y, &message.ratchet_key, rng)?,
        };

        let (chain, plaintext) = Ratchet::decrypt(chain, &message.message, &aad)?;
        y.set_receiver_chain(message.ratchet_key, chain);

        // The peer answered, the handshake is complete.
        y.pending_prekey = None;

        Ok((y, plaintext))
    }

    fn ratchet_step(
        y: &mut SessionRecord,
        their_ratchet_key: &PublicKey,
        rng: &Rng,
    ) -> Result<ChainState, SessionError> {
        let (root_key, receiving_chain_key) = ratchet_root(
            y.root_key.as_bytes(),
            &y.sender_ratchet
                .secret_key
                .calculate_agreement(their_ratchet_key)?,
        )?;

        let sender_ratchet = KeyPair::generate(rng)?;
        let (root_key, sending_chain_key) = ratchet_root(
            &root_key,
            &sender_ratchet
                .secret_key
                .calculate_agreement(their_ratchet_key)?,
        )?;

        y.previous_counter = y.sending_chain.iteration();
        y.root_key = Secret::from_bytes(root_key);
        y.sender_ratchet = sender_ratchet;
        y.sending_chain = Ratchet::init(sending_chain_key, 0);

        Ok(Ratchet::init(receiving_chain_key, 0))
    }
}

fn ratchet_root(
    root_key: &[u8; 32],
    agreement: &[u8; 32],
) -> Result<([u8; 32], [u8; 32]), SessionError> {
    Ok(hkdf_pair(root_key, agreement, RATCHET_INFO)?)
}
