//! Cache key shapes shared by the sampling engine and the indexer.

use super::record::FeedId;

/// Full-feed snapshot written by the shuffle strategy.
pub fn full_feed_key(feed_id: FeedId) -> String {
    format!("feed-items:{feed_id}")
}

/// Legacy narrow key.
///
/// Keyed by feed only: every narrow lookup for a feed reads and writes the
/// same entry regardless of what the request asked for.
pub fn narrow_key(feed_id: FeedId) -> String {
    format!("item-{feed_id}")
}

/// Set of per-item keys maintained by the ingestion side.
pub fn member_set_key(feed_id: FeedId) -> String {
    format!("feed:{feed_id}:items")
}

/// Hash holding a feed's own row, written alongside its member index.
pub fn feed_meta_key(feed_id: FeedId) -> String {
    format!("feed:{feed_id}:meta")
}

/// Hash holding one item's fields.
pub fn item_hash_key(item_key: &str) -> String {
    format!("item:{item_key}")
}
