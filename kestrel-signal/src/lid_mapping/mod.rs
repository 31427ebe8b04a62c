// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bidirectional mapping between phone-number and linked-identifier users.
//!
//! Mappings are kept at user granularity. The key store holds a forward entry (`pn user` to
//! `lid user`) and a reverse entry (`{lid user}_reverse` to `pn user`) under the `lid-mapping`
//! category. Device-specific addresses are rebuilt from the requested address on every lookup.
//!
//! Lookups go through a bounded in-process cache, then the key store and finally, for phone
//! numbers still unknown, one batch call to the [`DirectoryResolver`]. Concurrent lookups for the
//! same unknown user are not coalesced, each of them queries the resolver.
mod cache;
mod resolver;
#[cfg(test)]
mod tests;

use std::collections::HashMap;

use kestrel_store::{
    Category, KeyPatch, KeyStore, KeyStoreError, TransactionOptions, transaction,
};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

pub use cache::{CacheStats, MappingCacheConfig};
pub use resolver::{DirectoryResolver, LidMapping, NoResolver};

use crate::address::{Address, Domain};
use cache::MappingCache;

const REVERSE_SUFFIX: &str = "_reverse";

pub struct LidMappingStore<S, R = NoResolver> {
    store: S,
    resolver: Option<R>,
    cache: MappingCache,
    options: TransactionOptions,
}

pub struct LidMappingStoreBuilder<S, R = NoResolver> {
    store: S,
    resolver: Option<R>,
    cache: MappingCacheConfig,
    options: TransactionOptions,
}

impl<S, R> LidMappingStoreBuilder<S, R> {
    pub fn resolver<T: DirectoryResolver>(self, resolver: T) -> LidMappingStoreBuilder<S, T> {
        LidMappingStoreBuilder {
            store: self.store,
            resolver: Some(resolver),
            cache: self.cache,
            options: self.options,
        }
    }

    pub fn cache(mut self, config: MappingCacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn transaction_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> LidMappingStore<S, R> {
        LidMappingStore {
            store: self.store,
            resolver: self.resolver,
            cache: MappingCache::new(self.cache),
            options: self.options,
        }
    }
}

impl<S> LidMappingStore<S, NoResolver> {
    pub fn builder(store: S) -> LidMappingStoreBuilder<S, NoResolver> {
        LidMappingStoreBuilder {
            store,
            resolver: None,
            cache: MappingCacheConfig::default(),
            options: TransactionOptions::default(),
        }
    }
}

/// Results of a batch lookup, deduplicated by phone-number address in first-seen order.
#[derive(Default)]
struct ResolvedPairs {
    pairs: Vec<LidMapping>,
    index: HashMap<String, usize>,
}

impl ResolvedPairs {
    fn insert(&mut self, pair: LidMapping) {
        match self.index.get(&pair.pn) {
            Some(position) => self.pairs[*position] = pair,
            None => {
                self.index.insert(pair.pn.clone(), self.pairs.len());
                self.pairs.push(pair);
            }
        }
    }
}

/// Decodes a pair into `(pn user, lid user)`, accepting either order of both sides.
fn decode_pair(pair: &LidMapping) -> Option<(String, String)> {
    let lid = Address::parse(&pair.lid).ok()?;
    let pn = Address::parse(&pair.pn).ok()?;

    if lid.domain.is_lid_class() && pn.domain.is_pn_class() {
        Some((pn.user, lid.user))
    } else if pn.domain.is_lid_class() && lid.domain.is_pn_class() {
        Some((lid.user, pn.user))
    } else {
        None
    }
}

/// Resolver answers may name the linked identifier without server.
fn qualify_resolved(pair: LidMapping) -> LidMapping {
    if pair.lid.contains('@') {
        pair
    } else {
        LidMapping {
            lid: Address::new(pair.lid, None, Domain::Lid).to_string(),
            pn: pair.pn,
        }
    }
}

fn decode_user(bytes: Vec<u8>, id: &str) -> Option<String> {
    match String::from_utf8(bytes) {
        Ok(user) => Some(user),
        Err(_) => {
            warn!(id, "ignoring lid mapping entry which is not utf-8");
            None
        }
    }
}

impl<S, R> LidMappingStore<S, R>
where
    S: KeyStore,
    R: DirectoryResolver,
{
    /// Persists mappings and updates the cache.
    ///
    /// Pairs which are not one linked-identifier and one phone-number address are logged and
    /// skipped. Pairs equal to the already known mapping cause no write. All remaining pairs are
    /// committed in one transaction.
    pub async fn store_mappings(&self, pairs: &[LidMapping]) -> Result<(), LidMappingError> {
        if pairs.is_empty() {
            debug!("no lid mappings to store");
            return Ok(());
        }

        let mut pending: Vec<(String, String)> = Vec::new();
        for pair in pairs {
            let Some((pn_user, lid_user)) = decode_pair(pair) else {
                warn!(lid = pair.lid, pn = pair.pn, "invalid lid mapping");
                continue;
            };

            if pending.contains(&(pn_user.clone(), lid_user.clone())) {
                continue;
            }

            if self.lid_user_for(&pn_user).await?.as_deref() == Some(lid_user.as_str()) {
                debug!(pn_user, lid_user, "lid mapping already exists, skipping");
                continue;
            }

            pending.push((pn_user, lid_user));
        }

        if pending.is_empty() {
            debug!("no new lid mappings to store after validation");
            return Ok(());
        }

        let mut patch = KeyPatch::new();
        for (pn_user, lid_user) in &pending {
            patch.insert(Category::LidMapping, pn_user.clone(), lid_user.clone().into_bytes());
            patch.insert(
                Category::LidMapping,
                format!("{lid_user}{REVERSE_SUFFIX}"),
                pn_user.clone().into_bytes(),
            );
        }

        let result: Result<(), LidMappingError> =
            transaction(&self.store, "lid-mapping", &self.options, async move || {
                self.store.set(patch).await?;
                Ok(())
            })
            .await;

        if let Err(err) = result {
            error!(%err, count = pending.len(), "failed to store lid mappings");
            return Err(err);
        }

        for (pn_user, lid_user) in &pending {
            self.cache.insert_pair(pn_user, lid_user);
        }
        debug!(count = pending.len(), "stored lid mappings");
        Ok(())
    }

    pub async fn get_lid_for_pn(&self, pn: &str) -> Result<Option<String>, LidMappingError> {
        Ok(self
            .get_lids_for_pns(&[pn])
            .await?
            .and_then(|pairs| pairs.into_iter().next())
            .map(|pair| pair.lid))
    }

    /// Resolves device-specific linked identifiers for phone-number addresses.
    ///
    /// Returns an empty list for empty input and `None` when nothing could be resolved.
    pub async fn get_lids_for_pns(
        &self,
        pns: &[&str],
    ) -> Result<Option<Vec<LidMapping>>, LidMappingError> {
        if pns.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let mut resolved = ResolvedPairs::default();

        // Normalized user address to requested devices, in first-seen order.
        let mut unresolved: Vec<(String, Vec<Option<u32>>)> = Vec::new();

        for pn in pns {
            let address = match Address::parse(pn) {
                Ok(address) if address.domain.is_pn_class() => address,
                Ok(_) => {
                    trace!(pn, "not a phone-number address");
                    continue;
                }
                Err(err) => {
                    warn!(pn, %err, "failed to decode phone-number address");
                    continue;
                }
            };

            match self.lid_user_for(&address.user).await? {
                Some(lid_user) => {
                    let lid = Address::device_specific(&lid_user, address.device, false);
                    trace!(pn, %lid, "resolved lid from user mapping");
                    resolved.insert(LidMapping::new(lid.to_string(), *pn));
                }
                None => {
                    let normalized = address.normalized_user().to_string();
                    trace!(pn, normalized, "no lid mapping known, resolving remotely");
                    match unresolved.iter_mut().find(|(user, _)| user == &normalized) {
                        Some((_, devices)) => devices.push(address.device),
                        None => unresolved.push((normalized, vec![address.device])),
                    }
                }
            }
        }

        if !unresolved.is_empty() {
            let users: Vec<String> = unresolved.iter().map(|(user, _)| user.clone()).collect();
            let pairs: Vec<LidMapping> = self
                .resolve(&users)
                .await
                .into_iter()
                .map(qualify_resolved)
                .collect();

            if pairs.is_empty() {
                warn!(count = users.len(), "failed to resolve lid mappings");
            } else {
                self.store_mappings(&pairs).await?;

                for pair in &pairs {
                    let Some((pn_user, lid_user)) = decode_pair(pair) else {
                        continue;
                    };
                    let normalized = Address::new(pn_user.as_str(), None, Domain::Pn).to_string();
                    let Some((_, devices)) = unresolved.iter().find(|(user, _)| user == &normalized)
                    else {
                        continue;
                    };

                    for device in devices {
                        let lid = Address::device_specific(&lid_user, *device, false);
                        let pn = Address::device_specific(&pn_user, *device, true);
                        trace!(%pn, %lid, "resolved lid from directory");
                        resolved.insert(LidMapping::new(lid.to_string(), pn.to_string()));
                    }
                }
            }
        }

        if resolved.pairs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(resolved.pairs))
        }
    }

    /// Resolves the device-specific phone-number address of a linked identifier.
    ///
    /// Never calls the directory resolver.
    pub async fn get_pn_for_lid(&self, lid: &str) -> Result<Option<String>, LidMappingError> {
        let address = match Address::parse(lid) {
            Ok(address) if address.domain.is_lid_class() => address,
            Ok(_) => {
                trace!(lid, "not a linked-identifier address");
                return Ok(None);
            }
            Err(err) => {
                warn!(lid, %err, "failed to decode linked-identifier address");
                return Ok(None);
            }
        };

        let Some(pn_user) = self.pn_user_for(&address.user).await? else {
            trace!(lid_user = address.user, "no reverse lid mapping");
            return Ok(None);
        };

        let pn = Address::device_specific(&pn_user, address.device, true);
        trace!(lid, %pn, "resolved phone number from reverse mapping");
        Ok(Some(pn.to_string()))
    }

    /// Drops cached entries of the given users, persisted mappings stay untouched.
    pub fn clear_cache_for_users(&self, pn_users: &[&str], lid_users: &[&str]) {
        for pn_user in pn_users {
            self.cache.remove_pn(pn_user);
        }
        for lid_user in lid_users {
            self.cache.remove_lid(lid_user);
        }
        trace!(
            pn_users = pn_users.len(),
            lid_users = lid_users.len(),
            "cleared lid mapping cache"
        );
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn lid_user_for(&self, pn_user: &str) -> Result<Option<String>, LidMappingError> {
        if let Some(lid_user) = self.cache.lid_for_pn(pn_user) {
            return Ok(Some(lid_user));
        }

        let id = pn_user.to_string();
        let mut values = self
            .store
            .get(Category::LidMapping, std::slice::from_ref(&id))
            .await?;
        let lid_user = values.remove(&id).and_then(|bytes| decode_user(bytes, &id));
        if let Some(lid_user) = &lid_user {
            self.cache.insert_lid_for_pn(pn_user, lid_user);
        }
        Ok(lid_user)
    }

    async fn pn_user_for(&self, lid_user: &str) -> Result<Option<String>, LidMappingError> {
        if let Some(pn_user) = self.cache.pn_for_lid(lid_user) {
            return Ok(Some(pn_user));
        }

        let id = format!("{lid_user}{REVERSE_SUFFIX}");
        let mut values = self
            .store
            .get(Category::LidMapping, std::slice::from_ref(&id))
            .await?;
        let pn_user = values.remove(&id).and_then(|bytes| decode_user(bytes, &id));
        if let Some(pn_user) = &pn_user {
            self.cache.insert_pn_for_lid(lid_user, pn_user);
        }
        Ok(pn_user)
    }

    /// Failures of the resolver are logged and treated as "nothing resolved".
    async fn resolve(&self, users: &[String]) -> Vec<LidMapping> {
        let Some(resolver) = &self.resolver else {
            warn!("no directory resolver available");
            return Vec::new();
        };

        debug!(count = users.len(), "resolving lid mappings");
        match resolver.resolve_batch(users).await {
            Ok(pairs) => pairs,
            Err(err) => {
                error!(%err, ?users, "directory resolver failed");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum LidMappingError {
    #[error("lid mapping persistence failed: {0}")]
    Persistence(#[from] KeyStoreError),
}
