// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic building blocks for pairwise sessions and group sender keys.
pub mod aead;
pub mod hkdf;
mod rng;
mod secret;
pub mod sha2;
pub mod x25519;
pub mod xeddsa;

pub use rng::{Rng, RngError};
pub use secret::Secret;
