//! Adapter traits for the backing store and the cache store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::record::{FeedId, Record};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("backing store connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Sql(String),
    #[error("query returned a non-object row")]
    MalformedRow,
}

impl QueryError {
    pub fn sql(err: impl std::fmt::Display) -> Self {
        Self::Sql(err.to_string())
    }

    pub fn connection(err: impl std::fmt::Display) -> Self {
        Self::Connection(err.to_string())
    }
}

/// The parameterized queries the backing store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreQuery {
    Feeds { limit: i64 },
    AllFeeds,
    Feed { feed_id: FeedId },
    Items { limit: i64 },
    FeedItems { feed_id: FeedId },
    /// Randomized by the store, limited server-side.
    RandomFeedItems { feed_id: FeedId, count: i64 },
}

impl StoreQuery {
    pub fn name(&self) -> &'static str {
        match self {
            StoreQuery::Feeds { .. } => "feeds",
            StoreQuery::AllFeeds => "all_feeds",
            StoreQuery::Feed { .. } => "feed",
            StoreQuery::Items { .. } => "items",
            StoreQuery::FeedItems { .. } => "feed_items",
            StoreQuery::RandomFeedItems { .. } => "random_feed_items",
        }
    }
}

#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Run a query and return its rows in store order.
    async fn fetch(&self, query: &StoreQuery) -> Result<Vec<Record>, QueryError>;
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache command failed: {0}")]
    Command(String),
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn command(err: impl std::fmt::Display) -> Self {
        Self::Command(err.to_string())
    }
}

/// Outcome of one key inside a pipelined hash fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashSlot {
    Fetched(HashMap<String, String>),
    Failed(String),
}

/// One item hash written into a member index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub key: String,
    pub fields: Vec<(String, String)>,
}

/// A feed's complete member index, replaced in one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberIndex {
    pub set_key: String,
    pub entries: Vec<MemberEntry>,
    /// Hashes of former members that are deleted with the rebuild.
    pub stale: Vec<String>,
    pub meta: Option<MemberEntry>,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store without expiry.
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), CacheError>;

    /// Up to `count` distinct members drawn at random.
    async fn random_members(&self, set_key: &str, count: usize) -> Result<Vec<String>, CacheError>;

    /// Fetch every hash in a single round trip, one slot per key in order.
    async fn fetch_hashes(&self, keys: &[String]) -> Result<Vec<HashSlot>, CacheError>;

    /// Every member of a set, in no particular order.
    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, CacheError>;

    /// Replace a member set, its item hashes and the feed metadata in a
    /// single round trip, deleting the stale hashes.
    async fn write_member_index(&self, index: &MemberIndex) -> Result<(), CacheError>;
}
