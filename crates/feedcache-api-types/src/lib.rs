//! Wire types shared by the feedcache server and its clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a timed response was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Miss,
    Uncached,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Uncached => "uncached",
        }
    }
}

/// Body returned by every timed endpoint.
///
/// `time` and `took` carry the same elapsed milliseconds; `took` is the field
/// the benchmark client reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedResponse<T = Vec<Value>> {
    pub result: T,
    pub time: f64,
    pub took: f64,
    pub cache: CacheStatus,
}

impl<T> TimedResponse<T> {
    pub fn new(result: T, elapsed_ms: f64, cache: CacheStatus) -> Self {
        Self {
            result,
            time: elapsed_ms,
            took: elapsed_ms,
            cache,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValueBody {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetKeyRequest {
    pub key: String,
    pub value: String,
}
