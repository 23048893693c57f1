//! In-process adapters for the backing store and the cache store.
//!
//! Used by the test suites and by anything that wants the sampling engine
//! without live services. Both adapters can be told to fail so that error
//! paths are reachable.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::Value;

use crate::application::repos::{
    BackingStore, CacheError, CacheStore, HashSlot, MemberIndex, QueryError, StoreQuery,
};
use crate::domain::record::Record;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct InMemoryStore {
    feeds: Vec<Record>,
    items: Vec<Record>,
    rng: Mutex<StdRng>,
    executed: Mutex<Vec<StoreQuery>>,
    failure: Mutex<Option<String>>,
}

impl InMemoryStore {
    pub fn new(feeds: Vec<Record>, items: Vec<Record>) -> Self {
        Self::seeded(feeds, items, 0)
    }

    /// The seed drives the order of randomized queries.
    pub fn seeded(feeds: Vec<Record>, items: Vec<Record>, seed: u64) -> Self {
        Self {
            feeds,
            items,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            executed: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Every query run so far, in order.
    pub fn executed(&self) -> Vec<StoreQuery> {
        lock(&self.executed).clone()
    }

    pub fn query_count(&self) -> usize {
        lock(&self.executed).len()
    }

    /// Make subsequent queries fail as if the connection dropped.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    fn feed_items(&self, feed_id: crate::domain::record::FeedId) -> Vec<Record> {
        self.items
            .iter()
            .filter(|item| item.feed_id() == Some(feed_id))
            .cloned()
            .collect()
    }
}

fn limited(records: &[Record], limit: i64) -> Vec<Record> {
    let limit = usize::try_from(limit).unwrap_or(0);
    records.iter().take(limit).cloned().collect()
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn fetch(&self, query: &StoreQuery) -> Result<Vec<Record>, QueryError> {
        lock(&self.executed).push(*query);
        if let Some(message) = lock(&self.failure).clone() {
            return Err(QueryError::Connection(message));
        }

        let rows = match *query {
            StoreQuery::Feeds { limit } => limited(&self.feeds, limit),
            StoreQuery::AllFeeds => self.feeds.clone(),
            StoreQuery::Feed { feed_id } => self
                .feeds
                .iter()
                .filter(|feed| feed.get("id") == Some(&Value::from(feed_id.get())))
                .cloned()
                .collect(),
            StoreQuery::Items { limit } => limited(&self.items, limit),
            StoreQuery::FeedItems { feed_id } => self.feed_items(feed_id),
            StoreQuery::RandomFeedItems { feed_id, count } => {
                let mut rows = self.feed_items(feed_id);
                rows.shuffle(&mut *lock(&self.rng));
                rows.truncate(usize::try_from(count).unwrap_or(0));
                rows
            }
        };
        Ok(rows)
    }
}

#[derive(Default)]
struct CacheState {
    strings: HashMap<String, (String, Option<Instant>)>,
    sets: HashMap<String, BTreeSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

pub struct InMemoryCache {
    state: Mutex<CacheState>,
    rng: Mutex<StdRng>,
    round_trips: AtomicUsize,
    unavailable: AtomicBool,
    failing_writes: AtomicBool,
    failing_hashes: Mutex<HashSet<String>>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::seeded(0)
    }

    /// The seed drives member selection.
    pub fn seeded(seed: u64) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            round_trips: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            failing_writes: AtomicBool::new(false),
            failing_hashes: Mutex::new(HashSet::new()),
        }
    }

    /// Commands and pipelines issued so far; a pipeline counts once.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Writes fail while reads keep working.
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Make one hash fail inside pipelined fetches.
    pub fn fail_hash(&self, key: impl Into<String>) {
        lock(&self.failing_hashes).insert(key.into());
    }

    /// Remaining lifetime of a string entry, `None` when absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let state = lock(&self.state);
        let (_, deadline) = state.strings.get(key)?;
        deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn contains(&self, key: &str) -> bool {
        let state = lock(&self.state);
        state.strings.contains_key(key)
            || state.sets.contains_key(key)
            || state.hashes.contains_key(key)
    }

    pub fn members(&self, set_key: &str) -> BTreeSet<String> {
        lock(&self.state)
            .sets
            .get(set_key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn hash(&self, key: &str) -> Option<HashMap<String, String>> {
        lock(&self.state).hashes.get(key).cloned()
    }

    /// Seed a member set directly, bypassing the round-trip counter.
    pub fn insert_members<I, S>(&self, set_key: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.state)
            .sets
            .entry(set_key.to_string())
            .or_default()
            .extend(members.into_iter().map(Into::into));
    }

    pub fn insert_hash<I, F, V>(&self, key: &str, fields: I)
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        lock(&self.state).hashes.insert(
            key.to_string(),
            fields
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        );
    }

    pub fn insert_string(&self, key: &str, value: &str) {
        lock(&self.state)
            .strings
            .insert(key.to_string(), (value.to_string(), None));
    }

    fn round_trip(&self) -> Result<(), CacheError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("connection refused"));
        }
        Ok(())
    }

    fn write_round_trip(&self) -> Result<(), CacheError> {
        self.round_trip()?;
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(CacheError::command("READONLY replica"));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.round_trip()?;
        let mut state = lock(&self.state);
        let expired = match state.strings.get(key) {
            None => return Ok(None),
            Some((_, Some(deadline))) => Instant::now() >= *deadline,
            Some((_, None)) => false,
        };
        if expired {
            state.strings.remove(key);
            return Ok(None);
        }
        Ok(state.strings.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.write_round_trip()?;
        lock(&self.state)
            .strings
            .insert(key.to_string(), (value.to_string(), None));
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.write_round_trip()?;
        lock(&self.state).strings.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(())
    }

    async fn random_members(&self, set_key: &str, count: usize) -> Result<Vec<String>, CacheError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.round_trip()?;
        let members: Vec<String> = lock(&self.state)
            .sets
            .get(set_key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        let mut rng = lock(&self.rng);
        Ok(members
            .choose_multiple(&mut *rng, count)
            .cloned()
            .collect())
    }

    async fn fetch_hashes(&self, keys: &[String]) -> Result<Vec<HashSlot>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.round_trip()?;
        let failing = lock(&self.failing_hashes).clone();
        let state = lock(&self.state);
        Ok(keys
            .iter()
            .map(|key| {
                if failing.contains(key) {
                    return HashSlot::Failed("WRONGTYPE".to_string());
                }
                match state.hashes.get(key) {
                    Some(fields) if !fields.is_empty() => HashSlot::Fetched(fields.clone()),
                    _ => HashSlot::Failed("hash is missing".to_string()),
                }
            })
            .collect())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, CacheError> {
        self.round_trip()?;
        Ok(self.members(set_key).into_iter().collect())
    }

    async fn write_member_index(&self, index: &MemberIndex) -> Result<(), CacheError> {
        self.write_round_trip()?;
        let mut state = lock(&self.state);
        for key in &index.stale {
            state.hashes.remove(key);
        }
        state.sets.remove(&index.set_key);
        for entry in index.entries.iter().chain(index.meta.as_ref()) {
            if entry.fields.is_empty() {
                state.hashes.remove(&entry.key);
            } else {
                state
                    .hashes
                    .insert(entry.key.clone(), entry.fields.iter().cloned().collect());
            }
        }
        if !index.entries.is_empty() {
            state.sets.insert(
                index.set_key.clone(),
                index.entries.iter().map(|entry| entry.key.clone()).collect(),
            );
        }
        Ok(())
    }
}
