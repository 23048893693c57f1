//! Feed and item records.
//!
//! Records are opaque field mappings: the relational store hands back whole
//! rows and the member index hands back Redis hashes, and neither shape is
//! interpreted beyond the feed id and the item key.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ParameterError;

pub const FEED_ID_FIELD: &str = "feed_id";
pub const KEY_FIELD: &str = "key";

/// Fields that identify an item, in lookup order.
const ITEM_KEY_FIELDS: [&str; 3] = ["item_id_ref", "id", KEY_FIELD];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(i64);

impl FeedId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Parse a path parameter.
    pub fn parse(raw: &str) -> Result<Self, ParameterError> {
        raw.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| ParameterError::not_numeric("feedId", raw))
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Requested number of sampled items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleCount(u32);

impl SampleCount {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub fn parse(name: &'static str, raw: &str) -> Result<Self, ParameterError> {
        let trimmed = raw.trim();
        let value = trimmed
            .parse::<i64>()
            .map_err(|_| ParameterError::not_numeric(name, raw))?;
        u32::try_from(value)
            .map(Self)
            .map_err(|_| ParameterError::out_of_range(name, raw))
    }
}

impl fmt::Display for SampleCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An opaque row or hash, serialized as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

/// Items are records that belong to a feed.
pub type Item = Record;

impl Record {
    /// Accepts only JSON objects; anything else is not a record.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Build an item from a member-index hash.
    ///
    /// Hash values are strings; the member key and the owning feed are added
    /// when the hash itself does not carry them.
    pub fn from_hash(member_key: &str, feed_id: FeedId, fields: HashMap<String, String>) -> Self {
        let mut map: Map<String, Value> = fields
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();
        map.entry(KEY_FIELD)
            .or_insert_with(|| Value::String(member_key.to_string()));
        map.entry(FEED_ID_FIELD)
            .or_insert_with(|| Value::from(feed_id.get()));
        Self(map)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn feed_id(&self) -> Option<FeedId> {
        match self.0.get(FEED_ID_FIELD)? {
            Value::Number(number) => number.as_i64().map(FeedId),
            Value::String(text) => text.parse().ok().map(FeedId),
            _ => None,
        }
    }

    /// The item's unique key, stringified.
    pub fn item_key(&self) -> Option<String> {
        ITEM_KEY_FIELDS
            .iter()
            .filter_map(|field| self.0.get(*field))
            .find_map(scalar_to_string)
    }

    /// Non-null scalar fields as strings, the shape stored in a Redis hash.
    pub fn to_hash_fields(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter_map(|(name, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::Array(_) | Value::Object(_) => value.to_string(),
                    other => scalar_to_string(other)?,
                };
                Some((name.clone(), text))
            })
            .collect()
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
