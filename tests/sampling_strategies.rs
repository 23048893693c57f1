mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use feedcache::application::indexer::{IndexScope, MemberIndexer};
use feedcache::application::repos::{CacheError, CacheStore, StoreQuery};
use feedcache::application::sampling::SamplingError;
use feedcache::domain::keys;
use feedcache::domain::record::{FeedId, Item, SampleCount};
use feedcache::infra::memory::InMemoryStore;
use feedcache_api_types::CacheStatus;
use serde_json::json;

use common::{FEED_ONE_NAMES, Harness, items, names, record};

const FEED_ONE: FeedId = FeedId::new(1);

fn feed_items_queries(harness: &Harness) -> usize {
    harness
        .store
        .executed()
        .iter()
        .filter(|query| matches!(query, StoreQuery::FeedItems { .. }))
        .count()
}

#[tokio::test]
async fn uncached_sample_is_bounded_and_scoped_to_the_feed() {
    let harness = Harness::new();

    let timed = harness
        .sampling
        .sample_uncached(FEED_ONE, SampleCount::new(3))
        .await
        .expect("sample");

    assert_eq!(timed.value.len(), 3);
    assert!(timed.value.iter().all(|item| item.feed_id() == Some(FEED_ONE)));
    assert_eq!(timed.cache, CacheStatus::Uncached);
    assert_eq!(harness.cache.round_trips(), 0);
    assert_eq!(
        harness.store.executed(),
        vec![StoreQuery::RandomFeedItems {
            feed_id: FEED_ONE,
            count: 3
        }]
    );
}

#[tokio::test]
async fn uncached_sample_never_exceeds_the_feed() {
    let harness = Harness::new();

    let timed = harness
        .sampling
        .sample_uncached(FEED_ONE, SampleCount::new(50))
        .await
        .expect("sample");

    assert_eq!(timed.value.len(), FEED_ONE_NAMES.len());
}

#[tokio::test]
async fn cached_shuffle_misses_once_then_serves_the_snapshot() {
    let harness = Harness::new();
    let feed_one: HashSet<String> = FEED_ONE_NAMES.iter().map(|name| name.to_string()).collect();

    let first = harness
        .sampling
        .sample_cached_shuffle(FEED_ONE, SampleCount::new(3))
        .await
        .expect("first sample");
    assert_eq!(first.cache, CacheStatus::Miss);
    assert!(!first.was_hit());
    assert_eq!(first.value.len(), 3);
    assert!(names(&first.value).iter().all(|name| feed_one.contains(name)));

    let ttl = harness
        .cache
        .ttl(&keys::full_feed_key(FEED_ONE))
        .expect("snapshot has an expiry");
    assert!(ttl <= Duration::from_secs(300));
    assert!(ttl > Duration::from_secs(290));

    let second = harness
        .sampling
        .sample_cached_shuffle(FEED_ONE, SampleCount::new(3))
        .await
        .expect("second sample");
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(second.value.len(), 3);
    assert!(names(&second.value).iter().all(|name| feed_one.contains(name)));
    assert_eq!(feed_items_queries(&harness), 1);
}

#[tokio::test]
async fn cached_shuffle_returns_min_of_count_and_feed_size() {
    let harness = Harness::new();

    let all = harness
        .sampling
        .sample_cached_shuffle(FEED_ONE, SampleCount::new(40))
        .await
        .expect("sample");
    assert_eq!(all.value.len(), 5);

    let none = harness
        .sampling
        .sample_cached_shuffle(FEED_ONE, SampleCount::new(0))
        .await
        .expect("sample");
    assert!(none.value.is_empty());
    assert_eq!(none.cache, CacheStatus::Hit);
}

#[tokio::test]
async fn cached_shuffle_order_varies_between_calls() {
    let harness = Harness::new();

    let mut orders = HashSet::new();
    for _ in 0..20 {
        let timed = harness
            .sampling
            .sample_cached_shuffle(FEED_ONE, SampleCount::new(5))
            .await
            .expect("sample");
        orders.insert(names(&timed.value));
    }

    assert!(orders.len() > 1, "every call returned the same order");
}

#[tokio::test]
async fn seeded_services_shuffle_identically() {
    let left = Harness::with_records(common::feeds(), items(), 99);
    let right = Harness::with_records(common::feeds(), items(), 99);

    for _ in 0..5 {
        let a = left
            .sampling
            .sample_cached_shuffle(FEED_ONE, SampleCount::new(5))
            .await
            .expect("left");
        let b = right
            .sampling
            .sample_cached_shuffle(FEED_ONE, SampleCount::new(5))
            .await
            .expect("right");
        assert_eq!(names(&a.value), names(&b.value));
    }
}

#[tokio::test]
async fn malformed_snapshot_is_a_serialization_error() {
    let harness = Harness::new();
    harness
        .cache
        .insert_string(&keys::full_feed_key(FEED_ONE), "{not json");

    let err = harness
        .sampling
        .sample_cached_shuffle(FEED_ONE, SampleCount::new(2))
        .await
        .expect_err("malformed snapshot");

    assert!(matches!(err, SamplingError::Serialization { ref key, .. } if key == "feed-items:1"));
    assert_eq!(harness.store.query_count(), 0);
}

#[tokio::test]
async fn failed_snapshot_write_still_answers() {
    let harness = Harness::new();
    harness.cache.set_failing_writes(true);

    for _ in 0..2 {
        let timed = harness
            .sampling
            .sample_cached_shuffle(FEED_ONE, SampleCount::new(2))
            .await
            .expect("sample despite failed write");
        assert_eq!(timed.cache, CacheStatus::Miss);
        assert_eq!(timed.value.len(), 2);
    }
    assert_eq!(feed_items_queries(&harness), 2);
    assert!(!harness.cache.contains(&keys::full_feed_key(FEED_ONE)));
}

#[tokio::test]
async fn unavailable_cache_fails_the_cached_strategies() {
    let harness = Harness::new();
    harness.cache.set_unavailable(true);

    let err = harness
        .sampling
        .sample_cached_shuffle(FEED_ONE, SampleCount::new(2))
        .await
        .expect_err("cache is down");
    assert!(matches!(
        err,
        SamplingError::Cache(CacheError::Unavailable(_))
    ));

    let err = harness
        .sampling
        .sample_from_member_set(FEED_ONE, SampleCount::new(2))
        .await
        .expect_err("cache is down");
    assert!(matches!(
        err,
        SamplingError::Cache(CacheError::Unavailable(_))
    ));
    assert_eq!(harness.store.query_count(), 0);
}

#[tokio::test]
async fn backing_store_failure_surfaces_as_query_error() {
    let harness = Harness::new();
    harness.store.fail_with("connection reset");

    let err = harness
        .sampling
        .sample_uncached(FEED_ONE, SampleCount::new(2))
        .await
        .expect_err("store is down");
    assert!(matches!(err, SamplingError::Query(_)));

    harness.store.recover();
    assert!(
        harness
            .sampling
            .sample_uncached(FEED_ONE, SampleCount::new(2))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn concurrent_misses_leave_a_complete_snapshot() {
    let harness = Harness::new();

    let (left, right) = tokio::join!(
        harness
            .sampling
            .sample_cached_shuffle(FEED_ONE, SampleCount::new(3)),
        harness
            .sampling
            .sample_cached_shuffle(FEED_ONE, SampleCount::new(3)),
    );
    assert_eq!(left.expect("left").value.len(), 3);
    assert_eq!(right.expect("right").value.len(), 3);

    let blob = harness
        .cache
        .get(&keys::full_feed_key(FEED_ONE))
        .await
        .expect("get")
        .expect("snapshot written");
    let snapshot: Vec<Item> = serde_json::from_str(&blob).expect("snapshot deserializes");
    assert_eq!(snapshot.len(), 5);
}

#[tokio::test]
async fn member_set_sampling_takes_two_round_trips_for_any_feed_size() {
    let mut records = items();
    for id in 100..400 {
        records.push(record(json!({"id": id, "feed_id": 3, "name": format!("bulk-{id}")})));
    }
    let harness = Harness::with_records(common::feeds(), records, 5);
    harness
        .indexer()
        .rebuild(&IndexScope::Feeds(vec![FEED_ONE, FeedId::new(3)]))
        .await
        .expect("reindex");
    let queries_before = harness.store.query_count();

    for (feed, count, expected) in [(FEED_ONE, 3, 3), (FeedId::new(3), 250, 250)] {
        let before = harness.cache.round_trips();
        let timed = harness
            .sampling
            .sample_from_member_set(feed, SampleCount::new(count))
            .await
            .expect("sample");

        assert_eq!(harness.cache.round_trips() - before, 2);
        assert_eq!(timed.value.len(), expected);
        assert_eq!(timed.cache, CacheStatus::Hit);
        assert!(timed.value.iter().all(|item| item.feed_id() == Some(feed)));
    }
    assert_eq!(harness.store.query_count(), queries_before);
}

#[tokio::test]
async fn member_set_sampling_drops_failed_slots() {
    let harness = Harness::new();
    let set_key = keys::member_set_key(FEED_ONE);
    harness
        .cache
        .insert_members(&set_key, ["item:a", "item:b", "item:c"]);
    harness.cache.insert_hash("item:a", [("name", "A")]);
    harness.cache.insert_hash("item:c", [("name", "C")]);

    let timed = harness
        .sampling
        .sample_from_member_set(FEED_ONE, SampleCount::new(3))
        .await
        .expect("sample");
    let mut got = names(&timed.value);
    got.sort();
    assert_eq!(got, vec!["A", "C"]);
    for item in &timed.value {
        assert_eq!(item.feed_id(), Some(FEED_ONE));
        assert!(item.get("key").is_some());
    }

    harness.cache.fail_hash("item:c");
    let timed = harness
        .sampling
        .sample_from_member_set(FEED_ONE, SampleCount::new(3))
        .await
        .expect("sample");
    assert_eq!(names(&timed.value), vec!["A"]);
}

#[tokio::test]
async fn member_set_sampling_of_an_unindexed_feed_is_empty() {
    let harness = Harness::new();

    let timed = harness
        .sampling
        .sample_from_member_set(FeedId::new(42), SampleCount::new(5))
        .await
        .expect("sample");

    assert!(timed.value.is_empty());
    // SRANDMEMBER only: there are no members to pipeline.
    assert_eq!(harness.cache.round_trips(), 1);
}

#[tokio::test]
async fn member_set_sampling_never_exceeds_two_round_trips() {
    let harness = Harness::new();
    harness
        .indexer()
        .rebuild(&IndexScope::All)
        .await
        .expect("reindex");

    for (feed, count) in [
        (FEED_ONE, 0),
        (FEED_ONE, 1),
        (FEED_ONE, 50),
        (FeedId::new(42), 5),
        (FeedId::new(42), 0),
    ] {
        let before = harness.cache.round_trips();
        let timed = harness
            .sampling
            .sample_from_member_set(feed, SampleCount::new(count))
            .await
            .expect("sample");

        let used = harness.cache.round_trips() - before;
        assert!(used <= 2, "feed {feed} count {count} used {used} round trips");
        assert!(timed.value.len() <= count as usize);
        if count == 0 {
            assert_eq!(used, 0);
        }
    }
}

#[tokio::test]
async fn narrow_key_is_shared_by_every_request_for_a_feed() {
    let harness = Harness::new();
    let narrow = keys::narrow_key(FEED_ONE);

    // Whatever last wrote `item-1` answers every narrow lookup for feed 1.
    let foreign = vec![record(json!({"id": 77, "feed_id": 1, "name": "Z"}))];
    harness
        .cache
        .insert_string(&narrow, &serde_json::to_string(&foreign).expect("serialize"));

    let timed = harness
        .sampling
        .feed_items_narrow_cached(FEED_ONE)
        .await
        .expect("lookup");
    assert_eq!(timed.cache, CacheStatus::Hit);
    assert_eq!(names(&timed.value), vec!["Z"]);
    assert_eq!(harness.store.query_count(), 0);
    assert!(!harness.cache.contains(&keys::full_feed_key(FEED_ONE)));
}

#[tokio::test]
async fn narrow_lookup_populates_then_hits() {
    let harness = Harness::new();

    let first = harness
        .sampling
        .feed_items_narrow_cached(FEED_ONE)
        .await
        .expect("first");
    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(first.value.len(), 5);
    assert!(harness.cache.ttl(&keys::narrow_key(FEED_ONE)).is_some());

    let second = harness
        .sampling
        .feed_items_narrow_cached(FEED_ONE)
        .await
        .expect("second");
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(names(&second.value), names(&first.value));
    assert_eq!(feed_items_queries(&harness), 1);
}

#[tokio::test]
async fn malformed_narrow_entry_is_refetched() {
    let harness = Harness::new();
    let narrow = keys::narrow_key(FEED_ONE);
    harness.cache.insert_string(&narrow, "garbage");

    let timed = harness
        .sampling
        .feed_items_narrow_cached(FEED_ONE)
        .await
        .expect("lookup");
    assert_eq!(timed.cache, CacheStatus::Miss);
    assert_eq!(timed.value.len(), 5);

    let blob = harness
        .cache
        .get(&narrow)
        .await
        .expect("get")
        .expect("rewritten");
    assert!(serde_json::from_str::<Vec<Item>>(&blob).is_ok());
}

#[tokio::test]
async fn listings_are_capped_at_ten() {
    let mut records = items();
    for id in 500..520 {
        records.push(record(json!({"id": id, "feed_id": 2, "name": "extra"})));
    }
    let harness = Harness::with_records(common::feeds(), records, 1);

    let items = harness.sampling.list_items().await.expect("items");
    assert_eq!(items.value.len(), 10);
    assert_eq!(items.cache, CacheStatus::Uncached);

    let feeds = harness.sampling.list_feeds().await.expect("feeds");
    assert_eq!(feeds.len(), 2);
}

#[tokio::test]
async fn reindex_all_writes_sets_and_hashes() {
    let mut records = items();
    records.push(record(json!({"feed_id": 2, "name": "keyless"})));
    let harness = Harness::with_records(common::feeds(), records, 1);

    let reports = harness
        .indexer()
        .rebuild(&IndexScope::All)
        .await
        .expect("reindex");

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].indexed, 5);
    assert_eq!(reports[1].indexed, 3);
    assert_eq!(reports[1].skipped, 1);

    let members = harness.cache.members(&keys::member_set_key(FEED_ONE));
    assert_eq!(members.len(), 5);
    assert!(members.contains("item:ref-a"));
    let hash = harness.cache.hash("item:ref-a").expect("hash written");
    assert_eq!(hash.get("name").map(String::as_str), Some("A"));
    assert_eq!(hash.get("feed_id").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn reindex_writes_feed_metadata_and_deletes_orphaned_hashes() {
    let harness = Harness::new();
    harness
        .indexer()
        .rebuild(&IndexScope::Feeds(vec![FEED_ONE]))
        .await
        .expect("first reindex");

    let meta = harness
        .cache
        .hash(&keys::feed_meta_key(FEED_ONE))
        .expect("metadata written");
    assert_eq!(meta.get("id").map(String::as_str), Some("1"));
    assert_eq!(meta.get("title").map(String::as_str), Some("Lamps"));

    // Items D and E leave the feed.
    let remaining: Vec<_> = items()
        .into_iter()
        .filter(|item| !matches!(item.get("name").and_then(|name| name.as_str()), Some("D" | "E")))
        .collect();
    let shrunk = Arc::new(InMemoryStore::new(common::feeds(), remaining));
    let reports = MemberIndexer::new(shrunk, harness.cache.clone())
        .rebuild(&IndexScope::Feeds(vec![FEED_ONE]))
        .await
        .expect("second reindex");

    assert_eq!(reports[0].indexed, 3);
    assert_eq!(reports[0].removed, 2);
    let members = harness.cache.members(&keys::member_set_key(FEED_ONE));
    assert_eq!(members.len(), 3);
    assert!(!members.contains("item:ref-d"));
    assert!(harness.cache.hash("item:ref-d").is_none());
    assert!(harness.cache.hash("item:ref-e").is_none());
    assert!(harness.cache.hash("item:ref-a").is_some());
}

#[tokio::test]
async fn reindex_of_an_unknown_feed_skips_metadata() {
    let harness = Harness::new();

    let reports = harness
        .indexer()
        .rebuild(&IndexScope::Feeds(vec![FeedId::new(42)]))
        .await
        .expect("reindex");

    assert_eq!(reports[0].indexed, 0);
    assert!(!harness.cache.contains(&keys::feed_meta_key(FeedId::new(42))));
    assert!(harness.cache.members(&keys::member_set_key(FeedId::new(42))).is_empty());
}
