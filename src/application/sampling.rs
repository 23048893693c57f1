//! Randomized sampling over feed items.
//!
//! Three strategies answer "N random items from feed F":
//!
//! - **uncached**: the backing store orders by random and limits server-side.
//!   Always fresh, cost grows with the feed.
//! - **cached shuffle**: the whole feed is cached as one snapshot
//!   (`feed-items:{feed}`) and every call shuffles its own deserialized copy.
//!   Stale for at most the snapshot TTL.
//! - **member set**: keys are drawn from an externally maintained set
//!   (`feed:{feed}:items`) and their hashes fetched in one pipeline. Two cache
//!   round trips for any feed size, never touches the backing store.

use std::sync::Arc;
use std::time::Duration;

use feedcache_api_types::CacheStatus;
use metrics::counter;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::repos::{
    BackingStore, CacheError, CacheStore, HashSlot, QueryError, StoreQuery,
};
use crate::application::rng::RngSource;
use crate::application::timing::{self, Timed};
use crate::domain::keys;
use crate::domain::record::{FeedId, Item, Record, SampleCount};

pub const METRIC_CACHE_WRITE_FAILED_TOTAL: &str = "feedcache_cache_write_failed_total";
pub const METRIC_MEMBER_SLOT_DROPPED_TOTAL: &str = "feedcache_member_slot_dropped_total";

const DEFAULT_FULL_FEED_TTL: Duration = Duration::from_secs(300);
const DEFAULT_NARROW_TTL: Duration = Duration::from_secs(300);
const LISTING_LIMIT: i64 = 10;

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("cached entry `{key}` is malformed: {message}")]
    Serialization { key: String, message: String },
}

/// Expiry applied to lazily populated cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    pub full_feed_ttl: Duration,
    pub narrow_ttl: Duration,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            full_feed_ttl: DEFAULT_FULL_FEED_TTL,
            narrow_ttl: DEFAULT_NARROW_TTL,
        }
    }
}

impl From<&crate::config::SamplingSettings> for SamplingPolicy {
    fn from(settings: &crate::config::SamplingSettings) -> Self {
        Self {
            full_feed_ttl: settings.full_feed_ttl,
            narrow_ttl: settings.narrow_ttl,
        }
    }
}

pub struct SamplingService {
    store: Arc<dyn BackingStore>,
    cache: Arc<dyn CacheStore>,
    policy: SamplingPolicy,
    rng: RngSource,
}

impl SamplingService {
    pub fn new(
        store: Arc<dyn BackingStore>,
        cache: Arc<dyn CacheStore>,
        policy: SamplingPolicy,
        rng: RngSource,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
            rng,
        }
    }

    pub async fn list_feeds(&self) -> Result<Vec<Record>, SamplingError> {
        let feeds = self
            .store
            .fetch(&StoreQuery::Feeds {
                limit: LISTING_LIMIT,
            })
            .await?;
        Ok(feeds)
    }

    pub async fn list_items(&self) -> Result<Timed<Vec<Item>>, SamplingError> {
        timing::observe("items", async {
            let items = self
                .store
                .fetch(&StoreQuery::Items {
                    limit: LISTING_LIMIT,
                })
                .await?;
            Ok::<_, SamplingError>((items, CacheStatus::Uncached))
        })
        .await
    }

    /// Every item of a feed, straight from the backing store.
    pub async fn feed_items_uncached(
        &self,
        feed_id: FeedId,
    ) -> Result<Timed<Vec<Item>>, SamplingError> {
        timing::observe("feed_items", async {
            let items = self.store.fetch(&StoreQuery::FeedItems { feed_id }).await?;
            Ok::<_, SamplingError>((items, CacheStatus::Uncached))
        })
        .await
    }

    /// Legacy lookup cached under the feed-only narrow key.
    ///
    /// Any two narrow requests for the same feed share `item-{feed}`, whatever
    /// else distinguishes them. A malformed entry is treated as a miss and
    /// overwritten.
    pub async fn feed_items_narrow_cached(
        &self,
        feed_id: FeedId,
    ) -> Result<Timed<Vec<Item>>, SamplingError> {
        timing::observe("feed_items_narrow", async {
            let key = keys::narrow_key(feed_id);

            if let Some(blob) = self.cache.get(&key).await? {
                match serde_json::from_str::<Vec<Item>>(&blob) {
                    Ok(items) => return Ok((items, CacheStatus::Hit)),
                    Err(err) => warn!(
                        target = "feedcache::sampling",
                        key = %key,
                        error = %err,
                        "narrow cache entry is malformed; refetching"
                    ),
                }
            }

            let items = self.store.fetch(&StoreQuery::FeedItems { feed_id }).await?;
            self.write_best_effort(&key, &items, self.policy.narrow_ttl)
                .await;
            Ok::<_, SamplingError>((items, CacheStatus::Miss))
        })
        .await
    }

    /// Strategy A: database-side randomization, no caching.
    pub async fn sample_uncached(
        &self,
        feed_id: FeedId,
        count: SampleCount,
    ) -> Result<Timed<Vec<Item>>, SamplingError> {
        timing::observe("sample_uncached", async {
            let items = self
                .store
                .fetch(&StoreQuery::RandomFeedItems {
                    feed_id,
                    count: i64::from(count.get()),
                })
                .await?;
            Ok::<_, SamplingError>((items, CacheStatus::Uncached))
        })
        .await
    }

    /// Strategy B: cached full-feed snapshot with a per-call shuffle.
    pub async fn sample_cached_shuffle(
        &self,
        feed_id: FeedId,
        count: SampleCount,
    ) -> Result<Timed<Vec<Item>>, SamplingError> {
        timing::observe("sample_cached_shuffle", async {
            let (mut items, status) = self.load_full_feed(feed_id).await?;

            let mut rng = self.rng.next_rng();
            shuffle(&mut items, &mut rng);
            items.truncate(count.as_usize());

            Ok::<_, SamplingError>((items, status))
        })
        .await
    }

    /// Strategy C: random members of the feed's index set, hashes fetched in
    /// one pipeline. Slots that failed are dropped.
    pub async fn sample_from_member_set(
        &self,
        feed_id: FeedId,
        count: SampleCount,
    ) -> Result<Timed<Vec<Item>>, SamplingError> {
        timing::observe("sample_member_set", async {
            let set_key = keys::member_set_key(feed_id);
            let members = self
                .cache
                .random_members(&set_key, count.as_usize())
                .await?;
            let slots = self.cache.fetch_hashes(&members).await?;

            let mut items = Vec::with_capacity(slots.len());
            for (member, slot) in members.iter().zip(slots) {
                match slot {
                    HashSlot::Fetched(fields) => {
                        items.push(Record::from_hash(member, feed_id, fields));
                    }
                    HashSlot::Failed(reason) => {
                        counter!(METRIC_MEMBER_SLOT_DROPPED_TOTAL).increment(1);
                        debug!(
                            target = "feedcache::sampling",
                            member = %member,
                            reason = %reason,
                            "dropping member whose hash could not be fetched"
                        );
                    }
                }
            }

            Ok::<_, SamplingError>((items, CacheStatus::Hit))
        })
        .await
    }

    async fn load_full_feed(
        &self,
        feed_id: FeedId,
    ) -> Result<(Vec<Item>, CacheStatus), SamplingError> {
        let key = keys::full_feed_key(feed_id);

        if let Some(blob) = self.cache.get(&key).await? {
            let items = serde_json::from_str::<Vec<Item>>(&blob).map_err(|err| {
                SamplingError::Serialization {
                    key: key.clone(),
                    message: err.to_string(),
                }
            })?;
            return Ok((items, CacheStatus::Hit));
        }

        let items = self.store.fetch(&StoreQuery::FeedItems { feed_id }).await?;
        self.write_best_effort(&key, &items, self.policy.full_feed_ttl)
            .await;
        Ok((items, CacheStatus::Miss))
    }

    /// Cache population never fails the request that triggered it.
    async fn write_best_effort(&self, key: &str, items: &[Item], ttl: Duration) {
        let blob = match serde_json::to_string(items) {
            Ok(blob) => blob,
            Err(err) => {
                counter!(METRIC_CACHE_WRITE_FAILED_TOTAL).increment(1);
                warn!(
                    target = "feedcache::sampling",
                    key,
                    error = %err,
                    "failed to serialize items for cache"
                );
                return;
            }
        };

        if let Err(err) = self.cache.set_with_expiry(key, &blob, ttl).await {
            counter!(METRIC_CACHE_WRITE_FAILED_TOTAL).increment(1);
            warn!(
                target = "feedcache::sampling",
                key,
                error = %err,
                "failed to populate cache entry"
            );
        }
    }
}

/// Fisher–Yates: walk down from the last index, swapping each slot with a
/// uniformly chosen slot at or below it.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}
