use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::application::repos::{BackingStore, QueryError, StoreQuery};
use crate::domain::record::Record;

use super::{PostgresStore, map_sqlx_error};

// Rows are returned whole as JSON objects so the adapter stays independent of
// the tables' column sets.
const FEEDS_SQL: &str = "SELECT to_jsonb(f) FROM feeds f LIMIT $1";
const ALL_FEEDS_SQL: &str = "SELECT to_jsonb(f) FROM feeds f ORDER BY f.id";
const FEED_SQL: &str = "SELECT to_jsonb(f) FROM feeds f WHERE f.id = $1";
const ITEMS_SQL: &str = "SELECT to_jsonb(i) FROM items i LIMIT $1";
const FEED_ITEMS_SQL: &str = "SELECT to_jsonb(i) FROM items i WHERE i.feed_id = $1";
const RANDOM_FEED_ITEMS_SQL: &str =
    "SELECT to_jsonb(i) FROM items i WHERE i.feed_id = $1 ORDER BY random() LIMIT $2";

impl StoreQuery {
    fn sql(&self) -> &'static str {
        match self {
            StoreQuery::Feeds { .. } => FEEDS_SQL,
            StoreQuery::AllFeeds => ALL_FEEDS_SQL,
            StoreQuery::Feed { .. } => FEED_SQL,
            StoreQuery::Items { .. } => ITEMS_SQL,
            StoreQuery::FeedItems { .. } => FEED_ITEMS_SQL,
            StoreQuery::RandomFeedItems { .. } => RANDOM_FEED_ITEMS_SQL,
        }
    }
}

#[async_trait]
impl BackingStore for PostgresStore {
    async fn fetch(&self, query: &StoreQuery) -> Result<Vec<Record>, QueryError> {
        let statement = sqlx::query_scalar::<_, Value>(query.sql());
        let statement = match *query {
            StoreQuery::Feeds { limit } | StoreQuery::Items { limit } => statement.bind(limit),
            StoreQuery::AllFeeds => statement,
            StoreQuery::Feed { feed_id } | StoreQuery::FeedItems { feed_id } => {
                statement.bind(feed_id.get())
            }
            StoreQuery::RandomFeedItems { feed_id, count } => {
                statement.bind(feed_id.get()).bind(count)
            }
        };

        let rows = match statement.fetch_all(self.pool()).await {
            Ok(rows) => rows,
            Err(err) => {
                let err = map_sqlx_error(err);
                warn!(
                    target = "feedcache::infra::db",
                    query = query.name(),
                    error = %err,
                    "backing store query failed"
                );
                return Err(err);
            }
        };
        debug!(
            target = "feedcache::infra::db",
            query = query.name(),
            rows = rows.len(),
            "backing store query finished"
        );

        rows.into_iter()
            .map(|row| Record::from_value(row).ok_or(QueryError::MalformedRow))
            .collect()
    }
}
