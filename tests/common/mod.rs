#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode},
};
use feedcache::application::indexer::MemberIndexer;
use feedcache::application::rng::RngSource;
use feedcache::application::sampling::{SamplingPolicy, SamplingService};
use feedcache::domain::record::Record;
use feedcache::infra::http::{ErrorStatusPolicy, HttpState, build_router};
use feedcache::infra::memory::{InMemoryCache, InMemoryStore};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

pub const FEED_ONE_NAMES: [&str; 5] = ["A", "B", "C", "D", "E"];

pub fn record(value: Value) -> Record {
    Record::from_value(value).expect("fixture is an object")
}

pub fn feeds() -> Vec<Record> {
    vec![
        record(json!({"id": 1, "title": "Lamps"})),
        record(json!({"id": 2, "title": "Chairs"})),
    ]
}

/// Feed 1 holds A..E, feed 2 holds F..H.
pub fn items() -> Vec<Record> {
    let mut items = Vec::new();
    for (offset, name) in FEED_ONE_NAMES.iter().enumerate() {
        items.push(record(json!({
            "id": offset as i64 + 1,
            "feed_id": 1,
            "item_id_ref": format!("ref-{}", name.to_lowercase()),
            "name": name,
        })));
    }
    for (offset, name) in ["F", "G", "H"].iter().enumerate() {
        items.push(record(json!({
            "id": offset as i64 + 6,
            "feed_id": 2,
            "item_id_ref": format!("ref-{}", name.to_lowercase()),
            "name": name,
        })));
    }
    items
}

pub fn names(items: &[Record]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.get("name").and_then(Value::as_str).map(str::to_string))
        .collect()
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<InMemoryCache>,
    pub sampling: Arc<SamplingService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_records(feeds(), items(), 11)
    }

    pub fn with_records(feeds: Vec<Record>, items: Vec<Record>, seed: u64) -> Self {
        let store = Arc::new(InMemoryStore::seeded(feeds, items, seed));
        let cache = Arc::new(InMemoryCache::seeded(seed));
        let sampling = Arc::new(SamplingService::new(
            store.clone(),
            cache.clone(),
            SamplingPolicy::default(),
            RngSource::seeded(seed),
        ));
        Self {
            store,
            cache,
            sampling,
        }
    }

    pub fn indexer(&self) -> MemberIndexer {
        MemberIndexer::new(self.store.clone(), self.cache.clone())
    }

    pub fn router(&self, errors: ErrorStatusPolicy) -> Router {
        build_router(HttpState::new(
            self.sampling.clone(),
            self.cache.clone(),
            errors,
        ))
    }
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).expect("request should build"))
        .await
        .expect("router should respond")
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = send(app, Method::GET, uri, None).await;
    read_json(response).await
}

pub async fn read_json(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    let value = serde_json::from_slice(&bytes).expect("body should be JSON");
    (status, value)
}
