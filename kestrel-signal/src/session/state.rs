// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::crypto::Secret;
use crate::crypto::x25519::PublicKey;
use crate::key_bundle::{KeyPair, PreKeyId, SignedPreKeyId};
use crate::ratchet::ChainState;

pub const ROOT_KEY_SIZE: usize = 32;

/// Receiving chains kept per session, older ones are dropped.
pub const MAX_RECEIVER_CHAINS: usize = 5;

/// Handshake data repeated in every outgoing message until the peer replied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPreKey {
    pub prekey_id: Option<PreKeyId>,
    pub signed_prekey_id: SignedPreKeyId,
    pub base_key: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ReceiverChain {
    pub ratchet_key: PublicKey,
    pub chain: ChainState,
}

/// Ratchet state of one pairwise session, persisted under the `session` category.
///
/// A record is replaced as a whole when a session gets re-established.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub(crate) local_identity: PublicKey,
    pub(crate) remote_identity: PublicKey,
    pub(crate) local_registration_id: u32,
    pub(crate) remote_registration_id: u32,
    pub(crate) base_key: PublicKey,
    pub(crate) root_key: Secret<ROOT_KEY_SIZE>,
    pub(crate) sender_ratchet: KeyPair,
    pub(crate) sending_chain: ChainState,
    pub(crate) previous_counter: u32,
    pub(crate) receiver_chains: VecDeque<ReceiverChain>,
    pub(crate) pending_prekey: Option<PendingPreKey>,
}

impl SessionRecord {
    pub fn remote_identity(&self) -> &PublicKey {
        &self.remote_identity
    }

    pub fn remote_registration_id(&self) -> u32 {
        self.remote_registration_id
    }

    /// Initiator's base key of the handshake which established this session.
    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    /// True as long as we have not received a message from the peer in this session.
    pub fn has_pending_prekey(&self) -> bool {
        self.pending_prekey.is_some()
    }

    pub(crate) fn receiver_chain(&self, ratchet_key: &PublicKey) -> Option<&ChainState> {
        self.receiver_chains
            .iter()
            .find(|receiver| &receiver.ratchet_key == ratchet_key)
            .map(|receiver| &receiver.chain)
    }

    pub(crate) fn set_receiver_chain(&mut self, ratchet_key: PublicKey, chain: ChainState) {
        if let Some(receiver) = self
            .receiver_chains
            .iter_mut()
            .find(|receiver| receiver.ratchet_key == ratchet_key)
        {
            receiver.chain = chain;
            return;
        }

        self.receiver_chains.push_back(ReceiverChain { ratchet_key, chain });
        while self.receiver_chains.len() > MAX_RECEIVER_CHAINS {
            self.receiver_chains.pop_front();
        }
    }
}
