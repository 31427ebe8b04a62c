// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kestrel_store::{MemoryKeyStore, TransactionOptions};
use thiserror::Error;

use crate::crypto::Rng;
use crate::key_bundle::{OneTimePreKey, PreKeyBundle};
use crate::key_manager::{INITIAL_PREKEY_COUNT, KeyManager};
use crate::lid_mapping::{DirectoryResolver, LidMapping};
use crate::repository::SessionRepository;

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Transaction options without waiting between commit attempts.
pub fn fast_transactions() -> TransactionOptions {
    TransactionOptions {
        max_commit_retries: 2,
        delay_between_tries: Duration::ZERO,
    }
}

#[derive(Debug, Error)]
#[error("directory unavailable")]
pub struct MockResolverError;

#[derive(Default)]
struct MockResolverState {
    directory: HashMap<String, String>,
    calls: Vec<Vec<String>>,
    failing: bool,
}

/// Directory resolver answering from a fixed table and recording every batch it receives.
#[derive(Clone, Default)]
pub struct MockResolver {
    state: Arc<Mutex<MockResolverState>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the answer for a normalized phone-number user, for example `111@pn`.
    pub fn answer(&self, pn: &str, lid: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .directory
            .insert(pn.to_string(), lid.to_string());
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl DirectoryResolver for MockResolver {
    type Error = MockResolverError;

    async fn resolve_batch(&self, users: &[String]) -> Result<Vec<LidMapping>, Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(users.to_vec());
        if state.failing {
            return Err(MockResolverError);
        }

        Ok(users
            .iter()
            .filter_map(|pn| {
                state
                    .directory
                    .get(pn)
                    .map(|lid| LidMapping::new(lid.clone(), pn.clone()))
            })
            .collect())
    }
}

/// Device with its own key store, credentials and published one-time pre-keys.
pub struct Peer {
    pub address: String,
    pub store: MemoryKeyStore,
    pub repository: SessionRepository<MemoryKeyStore>,
    pub prekeys: Vec<OneTimePreKey>,
}

impl Peer {
    pub async fn new(address: &str, seed: u8) -> Self {
        let rng = Rng::from_seed([seed; 32]);
        let store = MemoryKeyStore::new();

        let credentials = KeyManager::init(&rng).unwrap();
        let prekeys = KeyManager::generate_prekeys(&store, 1, INITIAL_PREKEY_COUNT, &rng)
            .await
            .unwrap();

        let repository = SessionRepository::new(store.clone(), credentials, rng)
            .with_transaction_options(fast_transactions());

        Self {
            address: address.to_string(),
            store,
            repository,
            prekeys,
        }
    }

    /// Bundle handing out the one-time pre-key at `index`.
    pub fn bundle(&self, device_id: u32, index: usize) -> PreKeyBundle {
        self.repository
            .credentials()
            .prekey_bundle(device_id, self.prekeys.get(index).copied())
    }
}
