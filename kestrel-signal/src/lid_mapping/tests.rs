// SPDX-License-Identifier: MIT OR Apache-2.0

use kestrel_store::{Category, KeyStore, MemoryKeyStore};

use crate::test_utils::{MockResolver, fast_transactions, setup_logging};

use super::{LidMapping, LidMappingError, LidMappingStore, MappingCacheConfig};

fn mapping_store(
    store: &MemoryKeyStore,
    resolver: &MockResolver,
) -> LidMappingStore<MemoryKeyStore, MockResolver> {
    LidMappingStore::builder(store.clone())
        .resolver(resolver.clone())
        .transaction_options(fast_transactions())
        .build()
}

#[tokio::test]
async fn stored_mapping_resolves_both_ways() {
    setup_logging();

    let store = MemoryKeyStore::new();
    let resolver = MockResolver::new();
    let mappings = mapping_store(&store, &resolver);

    mappings
        .store_mappings(&[LidMapping::new("222@lid", "111@pn")])
        .await
        .unwrap();

    assert_eq!(
        mappings.get_lid_for_pn("111@pn").await.unwrap().as_deref(),
        Some("222@lid")
    );
    assert_eq!(
        mappings.get_pn_for_lid("222@lid").await.unwrap().as_deref(),
        Some("111@pn")
    );
    assert!(resolver.calls().is_empty());

    let values = store
        .get(
            Category::LidMapping,
            &["111".to_string(), "222_reverse".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(values["111"], b"222".to_vec());
    assert_eq!(values["222_reverse"], b"111".to_vec());
}

#[tokio::test]
async fn storing_twice_writes_once() {
    let store = MemoryKeyStore::new();
    let mappings = mapping_store(&store, &MockResolver::new());

    let pair = LidMapping::new("222@lid", "111@pn");
    mappings.store_mappings(&[pair.clone()]).await.unwrap();
    let writes = store.write_count();
    assert_eq!(writes, 2);

    mappings.store_mappings(&[pair]).await.unwrap();
    assert_eq!(store.write_count(), writes);
    assert_eq!(store.len(Category::LidMapping), 2);
}

#[tokio::test]
async fn invalid_pairs_do_not_abort_batch() {
    let store = MemoryKeyStore::new();
    let mappings = mapping_store(&store, &MockResolver::new());

    mappings
        .store_mappings(&[
            LidMapping::new("222@pn", "111@pn"),
            LidMapping::new("no-server", "111@pn"),
            LidMapping::new("333@lid", "group@g.us"),
            // Swapped sides are still one mapping of each class.
            LidMapping::new("444@pn", "555@lid"),
        ])
        .await
        .unwrap();

    assert_eq!(store.len(Category::LidMapping), 2);
    assert_eq!(
        mappings.get_pn_for_lid("555@lid").await.unwrap().as_deref(),
        Some("444@pn")
    );
}

#[tokio::test]
async fn failed_transaction_stores_nothing() {
    let store = MemoryKeyStore::new();
    let mappings = mapping_store(&store, &MockResolver::new());
    store.fail_next_commits(3);

    let result = mappings
        .store_mappings(&[
            LidMapping::new("222@lid", "111@pn"),
            LidMapping::new("444@lid", "333@pn"),
        ])
        .await;

    assert!(matches!(result, Err(LidMappingError::Persistence(_))));
    assert_eq!(store.len(Category::LidMapping), 0);
    assert_eq!(mappings.cache_stats().size, 0);
}

#[tokio::test]
async fn empty_input_and_no_result() {
    let store = MemoryKeyStore::new();
    let resolver = MockResolver::new();
    let mappings = mapping_store(&store, &resolver);

    assert_eq!(mappings.get_lids_for_pns(&[]).await.unwrap(), Some(vec![]));
    assert!(resolver.calls().is_empty());

    assert_eq!(mappings.get_lids_for_pns(&["999@pn"]).await.unwrap(), None);
    assert_eq!(resolver.calls(), vec![vec!["999@pn".to_string()]]);
}

#[tokio::test]
async fn one_batch_call_for_all_devices() {
    setup_logging();

    let store = MemoryKeyStore::new();
    let resolver = MockResolver::new();
    resolver.answer("111@pn", "222");
    let mappings = mapping_store(&store, &resolver);

    let result = mappings
        .get_lids_for_pns(&["111@pn", "111:5@pn"])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        result,
        vec![
            LidMapping::new("222@lid", "111@pn"),
            LidMapping::new("222:5@lid", "111:5@pn"),
        ]
    );
    assert_eq!(resolver.calls(), vec![vec!["111@pn".to_string()]]);

    // Learned mappings are persisted and answered locally from now on.
    assert_eq!(store.len(Category::LidMapping), 2);
    assert_eq!(
        mappings.get_lid_for_pn("111:7@pn").await.unwrap().as_deref(),
        Some("222:7@lid")
    );
    assert_eq!(resolver.calls().len(), 1);
}

#[tokio::test]
async fn hosted_devices() {
    let store = MemoryKeyStore::new();
    let resolver = MockResolver::new();
    resolver.answer("111@pn", "222");
    let mappings = mapping_store(&store, &resolver);

    let result = mappings
        .get_lids_for_pns(&["111:99@hosted", "111:0@pn"])
        .await
        .unwrap()
        .unwrap();

    // Hosted phone numbers are resolved under their standard user address.
    assert_eq!(resolver.calls(), vec![vec!["111@pn".to_string()]]);
    assert_eq!(
        result,
        vec![
            LidMapping::new("222:99@hosted.lid", "111:99@hosted"),
            LidMapping::new("222@lid", "111@pn"),
        ]
    );

    assert_eq!(
        mappings.get_pn_for_lid("222:99@hosted.lid").await.unwrap().as_deref(),
        Some("111:99@hosted")
    );
    assert_eq!(
        mappings.get_pn_for_lid("222:3@lid").await.unwrap().as_deref(),
        Some("111:3@pn")
    );
}

#[tokio::test]
async fn hosted_domain_follows_device() {
    let store = MemoryKeyStore::new();
    let resolver = MockResolver::new();
    let mappings = mapping_store(&store, &resolver);

    mappings
        .store_mappings(&[LidMapping::new("222@lid", "111@pn")])
        .await
        .unwrap();

    // Hosted phone numbers on a regular device translate to the regular linked identifier.
    assert_eq!(
        mappings.get_lid_for_pn("111:3@hosted").await.unwrap().as_deref(),
        Some("222:3@lid")
    );
    assert_eq!(
        mappings.get_lid_for_pn("111:99@hosted").await.unwrap().as_deref(),
        Some("222:99@hosted.lid")
    );
    assert_eq!(
        mappings.get_pn_for_lid("222@lid").await.unwrap().as_deref(),
        Some("111@pn")
    );
    assert_eq!(
        mappings.get_pn_for_lid("222:4@hosted.lid").await.unwrap().as_deref(),
        Some("111:4@pn")
    );
    assert!(resolver.calls().is_empty());
}

#[tokio::test]
async fn mixed_cached_and_resolved() {
    let store = MemoryKeyStore::new();
    let resolver = MockResolver::new();
    resolver.answer("333@pn", "444");
    let mappings = mapping_store(&store, &resolver);

    mappings
        .store_mappings(&[LidMapping::new("222@lid", "111@pn")])
        .await
        .unwrap();

    let result = mappings
        .get_lids_for_pns(&["111:2@pn", "group@g.us", "333@pn", "555@pn"])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        result,
        vec![
            LidMapping::new("222:2@lid", "111:2@pn"),
            LidMapping::new("444@lid", "333@pn"),
        ]
    );
    assert_eq!(
        resolver.calls(),
        vec![vec!["333@pn".to_string(), "555@pn".to_string()]]
    );
}

#[tokio::test]
async fn resolver_failure_keeps_local_results() {
    let store = MemoryKeyStore::new();
    let resolver = MockResolver::new();
    resolver.set_failing(true);
    let mappings = mapping_store(&store, &resolver);

    mappings
        .store_mappings(&[LidMapping::new("222@lid", "111@pn")])
        .await
        .unwrap();

    let result = mappings
        .get_lids_for_pns(&["111@pn", "333@pn"])
        .await
        .unwrap();
    assert_eq!(result, Some(vec![LidMapping::new("222@lid", "111@pn")]));

    assert_eq!(mappings.get_lid_for_pn("333@pn").await.unwrap(), None);
    assert_eq!(resolver.calls().len(), 2);
}

#[tokio::test]
async fn without_resolver() {
    let store = MemoryKeyStore::new();
    let mappings = LidMappingStore::builder(store.clone()).build();

    assert_eq!(mappings.get_lid_for_pn("111@pn").await.unwrap(), None);

    mappings
        .store_mappings(&[LidMapping::new("222@lid", "111@pn")])
        .await
        .unwrap();
    assert_eq!(
        mappings.get_lid_for_pn("111@pn").await.unwrap().as_deref(),
        Some("222@lid")
    );
}

#[tokio::test]
async fn pn_for_lid_requires_lid_class() {
    let store = MemoryKeyStore::new();
    let mappings = mapping_store(&store, &MockResolver::new());

    mappings
        .store_mappings(&[LidMapping::new("222@lid", "111@pn")])
        .await
        .unwrap();

    assert_eq!(mappings.get_pn_for_lid("111@pn").await.unwrap(), None);
    assert_eq!(mappings.get_pn_for_lid("222").await.unwrap(), None);
    assert_eq!(mappings.get_pn_for_lid("999@lid").await.unwrap(), None);
}

#[tokio::test]
async fn clearing_cache_keeps_persisted_mappings() {
    let store = MemoryKeyStore::new();
    let resolver = MockResolver::new();
    let mappings = mapping_store(&store, &resolver);

    mappings
        .store_mappings(&[LidMapping::new("222@lid", "111@pn")])
        .await
        .unwrap();
    assert_eq!(mappings.cache_stats().size, 2);

    mappings.clear_cache_for_users(&["111"], &["222"]);
    assert_eq!(mappings.cache_stats().size, 0);

    assert_eq!(
        mappings.get_lid_for_pn("111@pn").await.unwrap().as_deref(),
        Some("222@lid")
    );
    assert_eq!(
        mappings.get_pn_for_lid("222@lid").await.unwrap().as_deref(),
        Some("111@pn")
    );
    assert!(resolver.calls().is_empty());
    assert_eq!(mappings.cache_stats().size, 2);
}

#[tokio::test]
async fn cache_stats_follow_config() {
    let store = MemoryKeyStore::new();
    let config = MappingCacheConfig {
        max_entries: 50,
        ..MappingCacheConfig::default()
    };
    let mappings = LidMappingStore::builder(store)
        .cache(config.clone())
        .build();

    let stats = mappings.cache_stats();
    assert_eq!(stats.size, 0);
    assert_eq!(stats.max, 50);
    assert_eq!(stats.ttl, config.ttl);
}
