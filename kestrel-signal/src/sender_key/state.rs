// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::crypto::x25519::{PublicKey, SecretKey};
use crate::ratchet::ChainState;

/// Sender-key states retained per record, the oldest is evicted first.
pub const MAX_SENDER_KEY_STATES: usize = 5;

pub type SenderKeyId = u32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyState {
    pub(crate) key_id: SenderKeyId,
    pub(crate) chain: ChainState,
    pub(crate) signing_key: PublicKey,

    /// Only present on the sending device.
    pub(crate) signing_secret: Option<SecretKey>,
}

impl SenderKeyState {
    pub fn key_id(&self) -> SenderKeyId {
        self.key_id
    }

    pub fn signing_key(&self) -> &PublicKey {
        &self.signing_key
    }

    pub fn iteration(&self) -> u32 {
        self.chain.iteration()
    }
}

/// Group ratchet states of one sender in one group, persisted under the `sender-key` category.
///
/// An empty record is a valid value, it gets filled by creating or processing a distribution
/// message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyRecord {
    states: VecDeque<SenderKeyState>,
}

impl SenderKeyRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Most recently added state.
    pub fn latest(&self) -> Option<&SenderKeyState> {
        self.states.front()
    }

    pub(crate) fn latest_mut(&mut self) -> Option<&mut SenderKeyState> {
        self.states.front_mut()
    }

    pub fn state(&self, key_id: SenderKeyId) -> Option<&SenderKeyState> {
        self.states.iter().find(|state| state.key_id == key_id)
    }

    pub(crate) fn state_mut(&mut self, key_id: SenderKeyId) -> Option<&mut SenderKeyState> {
        self.states.iter_mut().find(|state| state.key_id == key_id)
    }

    pub(crate) fn add_state(&mut self, state: SenderKeyState) {
        self.states.retain(|existing| existing.key_id != state.key_id);
        self.states.push_front(state);
        self.states.truncate(MAX_SENDER_KEY_STATES);
    }
}
