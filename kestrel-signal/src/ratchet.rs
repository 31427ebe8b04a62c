// SPDX-License-Identifier: MIT OR Apache-2.0

//! Symmetric hash ratchet shared by pairwise message chains and group sender-key chains.
//!
//! Every step derives a message key from the current chain key and then replaces the chain key
//! with its hash. Messages arriving ahead of the chain make it jump forward. Keys for the skipped
//! iterations are kept until those messages arrive, bounded by [`MAX_SKIPPED_KEYS`].
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::Secret;
use crate::crypto::aead::{AeadError, AeadKey, AeadNonce, aead_decrypt, aead_encrypt};
use crate::crypto::hkdf::{HkdfError, hkdf};

pub const CHAIN_KEY_SIZE: usize = 32;

/// Largest forward jump accepted for one message, also the number of retained skipped keys.
pub const MAX_SKIPPED_KEYS: u32 = 2000;

pub struct Ratchet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    chain_key: Secret<CHAIN_KEY_SIZE>,
    iteration: u32,
    skipped_keys: BTreeMap<u32, Secret<CHAIN_KEY_SIZE>>,
}

impl ChainState {
    pub fn chain_key(&self) -> &[u8; CHAIN_KEY_SIZE] {
        self.chain_key.as_bytes()
    }

    /// Iteration of the next message key this chain hands out.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetCiphertext {
    pub counter: u32,
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
}

impl Ratchet {
    pub fn init(chain_key: [u8; CHAIN_KEY_SIZE], iteration: u32) -> ChainState {
        ChainState {
            chain_key: Secret::from_bytes(chain_key),
            iteration,
            skipped_keys: BTreeMap::new(),
        }
    }

    pub fn encrypt(
        y: ChainState,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(ChainState, RatchetCiphertext), RatchetError> {
        let counter = y.iteration;
        let ciphertext = {
            let (key, nonce) = message_key(&y.chain_key)?;
            aead_encrypt(&key, plaintext, nonce, Some(aad))?
        };
        Ok((
            Self::advance(y)?,
            RatchetCiphertext {
                counter,
                ciphertext,
            },
        ))
    }

    /// Decrypts the message and returns the chain state after it.
    ///
    /// The passed state is consumed. Callers keep their own copy if a failed decryption must not
    /// affect the persisted chain.
    pub fn decrypt(
        mut y: ChainState,
        message: &RatchetCiphertext,
        aad: &[u8],
    ) -> Result<(ChainState, Vec<u8>), RatchetError> {
        if message.counter < y.iteration {
            // Message from the past, only decryptable with a key we skipped earlier.
            let Some(chain_key) = y.skipped_keys.remove(&message.counter) else {
                return Err(RatchetError::UnknownMessageKey(message.counter, y.iteration));
            };
            let plaintext = open(&chain_key, message, aad)?;
            return Ok((y, plaintext));
        }

        let jump = message.counter - y.iteration;
        if jump > MAX_SKIPPED_KEYS {
            return Err(RatchetError::TooFarInFuture(message.counter, y.iteration));
        }

        for _ in 0..jump {
            y.skipped_keys.insert(y.iteration, y.chain_key.clone());
            y = Self::advance(y)?;
        }
        while y.skipped_keys.len() > MAX_SKIPPED_KEYS as usize {
            y.skipped_keys.pop_first();
        }

        let plaintext = open(&y.chain_key, message, aad)?;
        Ok((Self::advance(y)?, plaintext))
    }

    fn advance(mut y: ChainState) -> Result<ChainState, RatchetError> {
        let next: [u8; CHAIN_KEY_SIZE] = hkdf(b"", y.chain_key.as_bytes(), Some(b"chain"))?;
        y.chain_key = Secret::from_bytes(next);
        y.iteration = y
            .iteration
            .checked_add(1)
            .ok_or(RatchetError::Exhausted)?;
        Ok(y)
    }
}

fn message_key(chain_key: &Secret<CHAIN_KEY_SIZE>) -> Result<(AeadKey, AeadNonce), RatchetError> {
    let key: AeadKey = hkdf(b"", chain_key.as_bytes(), Some(b"message-key"))?;
    let nonce: AeadNonce = hkdf(b"", chain_key.as_bytes(), Some(b"message-nonce"))?;
    Ok((key, nonce))
}

fn open(
    chain_key: &Secret<CHAIN_KEY_SIZE>,
    message: &RatchetCiphertext,
    aad: &[u8],
) -> Result<Vec<u8>, RatchetError> {
    let (key, nonce) = message_key(chain_key)?;
    Ok(aead_decrypt(&key, &message.ciphertext, nonce, Some(aad))?)
}

#[derive(Debug, Error)]
pub enum RatchetError {
    #[error(transparent)]
    Hkdf(#[from] HkdfError),

    #[error(transparent)]
    Aead(#[from] AeadError),

    #[error("no message key for counter {0} (chain is at {1})")]
    UnknownMessageKey(u32, u32),

    #[error("message counter {0} is too far ahead of chain at {1}")]
    TooFarInFuture(u32, u32),

    #[error("chain reached its last iteration")]
    Exhausted,
}
