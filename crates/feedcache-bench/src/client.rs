use std::time::Duration;

use feedcache_api_types::TimedResponse;
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;

use crate::args::Strategy;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },
    #[error("no `took` field in response from {url}")]
    MissingTook { url: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Clone, Debug)]
pub struct Ctx {
    pub client: Client,
    pub base: Url,
}

impl Ctx {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BenchError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("feedcache-bench/", env!("CARGO_PKG_VERSION"))
    }

    pub fn sample_url(&self, strategy: Strategy, feed: i64, count: u32) -> Result<Url, BenchError> {
        Ok(self
            .base
            .join(&format!("{}/{feed}/{count}", strategy.route()))?)
    }

    /// Fetch one sample and return the server-reported latency in ms.
    pub async fn took(&self, strategy: Strategy, feed: i64, count: u32) -> Result<f64, BenchError> {
        let url = self.sample_url(strategy, feed, count)?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BenchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        extract_took(&body).ok_or_else(|| BenchError::MissingTook {
            url: url.to_string(),
        })
    }
}

/// Read `took` from a timed body, falling back to the first nested `took`
/// for servers that wrap their payload.
pub fn extract_took(body: &Value) -> Option<f64> {
    if let Ok(timed) = serde_json::from_value::<TimedResponse>(body.clone()) {
        return Some(timed.took);
    }
    find_took(body)
}

fn find_took(value: &Value) -> Option<f64> {
    match value {
        Value::Object(map) => map
            .get("took")
            .and_then(number)
            .or_else(|| map.values().find_map(find_took)),
        Value::Array(items) => items.iter().find_map(find_took),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}
