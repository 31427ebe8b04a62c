// SPDX-License-Identifier: MIT OR Apache-2.0

//! `kestrel-store` defines the persistence contract used by the kestrel encryption core.
//!
//! Key material and identity mappings are stored as opaque byte values, grouped by a
//! [`Category`] and addressed by a string id inside that category. Writes are expressed as a
//! [`KeyPatch`], where a `None` value removes the entry.
//!
//! Multiple writes can be grouped into one atomic unit with the [`transaction`] helper: all
//! patches issued while the transaction is open are buffered by the store and either committed
//! together or discarded together.
//!
//! An in-memory implementation is available behind the `memory` feature. It does not persist data
//! permanently and is meant for development and test contexts.
#[cfg(feature = "memory")]
pub mod memory;
mod patch;
mod traits;
mod transaction;

#[cfg(feature = "memory")]
pub use memory::MemoryKeyStore;
pub use patch::{Category, KeyPatch};
pub use traits::{KeyStore, KeyStoreError};
pub use transaction::{TransactionOptions, transaction};
