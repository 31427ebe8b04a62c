// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender keys for group messaging.
//!
//! Every sender distributes a symmetric chain key and a public signing key to all group members
//! once, afterwards a group message is encrypted a single time for everyone.
mod cipher;
mod message;
mod state;
#[cfg(test)]
mod tests;

use thiserror::Error;

pub use cipher::GroupCipher;
pub use message::{SenderKeyDistributionMessage, SenderKeyMessage};
pub use state::{MAX_SENDER_KEY_STATES, SenderKeyId, SenderKeyRecord, SenderKeyState};

use crate::crypto::RngError;
use crate::crypto::xeddsa::XEdDSAError;
use crate::ratchet::RatchetError;

#[derive(Debug, Error)]
pub enum SenderKeyError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error("invalid sender key signature: {0}")]
    Signature(#[from] XEdDSAError),

    #[error(transparent)]
    Ratchet(#[from] RatchetError),

    #[error("no sender key state")]
    NoState,

    #[error("no sender key state with id {0}")]
    UnknownKeyId(SenderKeyId),

    #[error("sender key state {0} has no signing secret")]
    NotOurState(SenderKeyId),
}
