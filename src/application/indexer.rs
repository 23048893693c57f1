//! Rebuilds the per-feed member index from the backing store.
//!
//! The sampling engine only reads `feed:{feed}:items`; this is the offline
//! path that fills it. Each feed costs one read of the old set and one
//! pipeline that writes the new set, the item hashes and `feed:{feed}:meta`.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::repos::{
    BackingStore, CacheError, CacheStore, MemberEntry, MemberIndex, QueryError, StoreQuery,
};
use crate::domain::keys;
use crate::domain::record::{FeedId, Item, Record};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Which feeds to rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexScope {
    All,
    Feeds(Vec<FeedId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedIndexReport {
    pub feed_id: FeedId,
    pub indexed: usize,
    pub skipped: usize,
    /// Former members whose hashes were deleted.
    pub removed: usize,
}

pub struct MemberIndexer {
    store: Arc<dyn BackingStore>,
    cache: Arc<dyn CacheStore>,
}

impl MemberIndexer {
    pub fn new(store: Arc<dyn BackingStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self { store, cache }
    }

    pub async fn rebuild(&self, scope: &IndexScope) -> Result<Vec<FeedIndexReport>, IndexError> {
        let feeds = match scope {
            IndexScope::Feeds(feed_ids) => {
                let mut feeds = Vec::with_capacity(feed_ids.len());
                for &feed_id in feed_ids {
                    let row = self.store.fetch(&StoreQuery::Feed { feed_id }).await?;
                    feeds.push((feed_id, row.into_iter().next()));
                }
                feeds
            }
            IndexScope::All => self
                .store
                .fetch(&StoreQuery::AllFeeds)
                .await?
                .into_iter()
                .filter_map(|feed| feed_record_id(&feed).map(|feed_id| (feed_id, Some(feed))))
                .collect(),
        };

        let mut reports = Vec::with_capacity(feeds.len());
        for (feed_id, feed) in feeds {
            let report = self.rebuild_feed(feed_id, feed.as_ref()).await?;
            info!(
                target = "feedcache::indexer",
                feed_id = feed_id.get(),
                indexed = report.indexed,
                skipped = report.skipped,
                removed = report.removed,
                "member index rebuilt"
            );
            reports.push(report);
        }
        Ok(reports)
    }

    async fn rebuild_feed(
        &self,
        feed_id: FeedId,
        feed: Option<&Record>,
    ) -> Result<FeedIndexReport, IndexError> {
        let items = self.store.fetch(&StoreQuery::FeedItems { feed_id }).await?;
        let (entries, skipped) = member_entries(&items);

        let set_key = keys::member_set_key(feed_id);
        let previous = self.cache.set_members(&set_key).await?;
        let stale = stale_members(previous, &entries);

        if feed.is_none() {
            warn!(
                target = "feedcache::indexer",
                feed_id = feed_id.get(),
                "feed row not found; metadata left untouched"
            );
        }
        let meta = feed.map(|feed| MemberEntry {
            key: keys::feed_meta_key(feed_id),
            fields: feed.to_hash_fields(),
        });

        let index = MemberIndex {
            set_key,
            entries,
            stale,
            meta,
        };
        self.cache.write_member_index(&index).await?;

        Ok(FeedIndexReport {
            feed_id,
            indexed: index.entries.len(),
            skipped,
            removed: index.stale.len(),
        })
    }
}

/// Members of the old set that the rebuilt set no longer contains.
fn stale_members(previous: Vec<String>, entries: &[MemberEntry]) -> Vec<String> {
    let current: HashSet<&str> = entries.iter().map(|entry| entry.key.as_str()).collect();
    let mut stale: Vec<String> = previous
        .into_iter()
        .filter(|member| !current.contains(member.as_str()))
        .collect();
    stale.sort_unstable();
    stale
}

fn feed_record_id(feed: &Record) -> Option<FeedId> {
    let id = feed.get("id")?;
    let value = match id {
        serde_json::Value::Number(number) => number.as_i64(),
        serde_json::Value::String(text) => text.parse().ok(),
        _ => None,
    };
    if value.is_none() {
        warn!(target = "feedcache::indexer", id = %id, "feed row has no usable id");
    }
    value.map(FeedId::new)
}

/// Items without a key cannot be addressed and are skipped.
fn member_entries(items: &[Item]) -> (Vec<MemberEntry>, usize) {
    let mut entries = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for item in items {
        match item.item_key() {
            Some(item_key) => entries.push(MemberEntry {
                key: keys::item_hash_key(&item_key),
                fields: item.to_hash_fields(),
            }),
            None => skipped += 1,
        }
    }
    (entries, skipped)
}
