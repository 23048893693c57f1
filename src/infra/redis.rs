//! Redis-backed cache store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::{AsyncCommands, Client, ErrorKind, FromRedisValue, RedisError};
use tracing::debug;

use crate::application::repos::{CacheError, CacheStore, HashSlot, MemberEntry, MemberIndex};

#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Open a managed connection and make sure the server answers.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(map_redis_error)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        let cache = Self { connection };
        cache.ping().await?;
        Ok(cache)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }
}

/// Transport failures mean the cache is unreachable; anything else is a
/// command the server refused.
pub fn map_redis_error(err: RedisError) -> CacheError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        CacheError::unavailable(err)
    } else {
        CacheError::command(err)
    }
}

fn hash_slot(value: &redis::Value) -> HashSlot {
    if let redis::Value::ServerError(err) = value {
        return HashSlot::Failed(match err.details() {
            Some(details) => format!("{} {details}", err.code()),
            None => err.code().to_string(),
        });
    }
    match HashMap::<String, String>::from_redis_value(value) {
        Ok(fields) if fields.is_empty() => HashSlot::Failed("hash is missing".to_string()),
        Ok(fields) => HashSlot::Fetched(fields),
        Err(err) => HashSlot::Failed(err.to_string()),
    }
}

/// One `HGETALL` per key, sent as a single pipeline.
///
/// The raw replies are read straight off the connection: `query_async` would
/// turn a server error in any slot into an error for the whole batch, while
/// here each reply becomes its own `HashSlot`.
async fn pipelined_hashes<C>(conn: &mut C, keys: &[String]) -> Result<Vec<HashSlot>, RedisError>
where
    C: ConnectionLike + Send,
{
    let mut pipe = redis::pipe();
    for key in keys {
        pipe.hgetall(key);
    }

    let replies = conn.req_packed_commands(&pipe, 0, keys.len()).await?;
    if replies.len() != keys.len() {
        return Err(RedisError::from((
            ErrorKind::ResponseError,
            "unexpected pipeline reply count",
            format!("{} replies for {} keys", replies.len(), keys.len()),
        )));
    }

    Ok(replies.iter().map(hash_slot).collect())
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(map_redis_error)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(map_redis_error)
    }

    async fn random_members(&self, set_key: &str, count: usize) -> Result<Vec<String>, CacheError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        conn.srandmember_multiple::<_, Vec<String>>(set_key, count)
            .await
            .map_err(map_redis_error)
    }

    async fn fetch_hashes(&self, keys: &[String]) -> Result<Vec<HashSlot>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        pipelined_hashes(&mut conn, keys)
            .await
            .map_err(map_redis_error)
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection.clone();
        conn.smembers::<_, Vec<String>>(set_key)
            .await
            .map_err(map_redis_error)
    }

    async fn write_member_index(&self, index: &MemberIndex) -> Result<(), CacheError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in &index.stale {
            pipe.del(key).ignore();
        }
        pipe.del(&index.set_key).ignore();
        for entry in index.entries.iter().chain(index.meta.as_ref()) {
            replace_hash(&mut pipe, entry);
        }
        let members: Vec<&str> = index
            .entries
            .iter()
            .map(|entry| entry.key.as_str())
            .collect();
        if !members.is_empty() {
            pipe.sadd(&index.set_key, members).ignore();
        }

        let mut conn = self.connection.clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_error)?;

        debug!(
            target = "feedcache::infra::redis",
            set_key = %index.set_key,
            members = index.entries.len(),
            stale = index.stale.len(),
            meta = index.meta.is_some(),
            "member index written"
        );
        Ok(())
    }
}

fn replace_hash(pipe: &mut redis::Pipeline, entry: &MemberEntry) {
    pipe.del(&entry.key).ignore();
    if !entry.fields.is_empty() {
        pipe.hset_multiple(&entry.key, &entry.fields).ignore();
    }
}
