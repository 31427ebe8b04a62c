// SPDX-License-Identifier: MIT OR Apache-2.0

//! XChaCha20Poly1305 authenticated encryption with additional data (AEAD), a ChaCha20Poly1305
//! variant with an extended 192-bit (24-byte) nonce.
use chacha20poly1305::{AeadInPlace, Key, KeyInit, XChaCha20Poly1305, XNonce};
use thiserror::Error;

pub type AeadNonce = [u8; 24];

pub type AeadKey = [u8; 32];

pub fn aead_encrypt(
    key: &AeadKey,
    plaintext: &[u8],
    nonce: AeadNonce,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, AeadError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut ciphertext: Vec<u8> = Vec::from(plaintext);
    cipher
        .encrypt_in_place(XNonce::from_slice(&nonce), aad.unwrap_or_default(), &mut ciphertext)
        .map_err(AeadError::Encrypt)?;
    Ok(ciphertext)
}

pub fn aead_decrypt(
    key: &AeadKey,
    ciphertext_tag: &[u8],
    nonce: AeadNonce,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, AeadError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut plaintext: Vec<u8> = Vec::from(ciphertext_tag);
    cipher
        .decrypt_in_place(XNonce::from_slice(&nonce), aad.unwrap_or_default(), &mut plaintext)
        .map_err(AeadError::Decrypt)?;
    Ok(plaintext)
}

#[derive(Debug, Error)]
pub enum AeadError {
    #[error("could not encrypt with xchacha20poly1305 aead: {0}")]
    Encrypt(chacha20poly1305::Error),

    #[error("could not decrypt with xchacha20poly1305 aead: {0}")]
    Decrypt(chacha20poly1305::Error),
}
