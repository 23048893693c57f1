use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use feedcache_api_types::{KeyValueBody, MessageBody, SetKeyRequest, TimedResponse};

use crate::application::timing::Timed;
use crate::domain::record::{FeedId, Item, SampleCount};

use super::error::ApiError;
use super::state::HttpState;

fn timed_json(timed: Timed<Vec<Item>>) -> Response {
    let elapsed_ms = timed.elapsed_ms();
    Json(TimedResponse::new(timed.value, elapsed_ms, timed.cache)).into_response()
}

fn respond<T>(
    state: &HttpState,
    source: &'static str,
    result: Result<T, impl Into<ApiError>>,
    ok: impl FnOnce(T) -> Response,
) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(err) => err.into().respond(source, state.errors),
    }
}

pub(super) async fn health() -> Json<MessageBody> {
    Json(MessageBody {
        message: "ok".to_string(),
    })
}

pub(super) async fn list_feeds(State(state): State<HttpState>) -> Response {
    let result = state.sampling.list_feeds().await;
    respond(&state, "infra::http::list_feeds", result, |feeds| {
        Json(feeds).into_response()
    })
}

pub(super) async fn list_items(State(state): State<HttpState>) -> Response {
    let result = state.sampling.list_items().await;
    respond(&state, "infra::http::list_items", result, timed_json)
}

pub(super) async fn feed_items(
    State(state): State<HttpState>,
    Path(feed_id): Path<String>,
) -> Response {
    const SOURCE: &str = "infra::http::feed_items";
    let feed_id = match FeedId::parse(&feed_id) {
        Ok(feed_id) => feed_id,
        Err(err) => return ApiError::from(err).respond(SOURCE, state.errors),
    };
    let result = state.sampling.feed_items_uncached(feed_id).await;
    respond(&state, SOURCE, result, timed_json)
}

pub(super) async fn feed_items_cached(
    State(state): State<HttpState>,
    Path(feed_id): Path<String>,
) -> Response {
    const SOURCE: &str = "infra::http::feed_items_cached";
    let feed_id = match FeedId::parse(&feed_id) {
        Ok(feed_id) => feed_id,
        Err(err) => return ApiError::from(err).respond(SOURCE, state.errors),
    };
    let result = state.sampling.feed_items_narrow_cached(feed_id).await;
    respond(&state, SOURCE, result, timed_json)
}

pub(super) async fn sample_uncached(
    State(state): State<HttpState>,
    Path((feed_id, count)): Path<(String, String)>,
) -> Response {
    const SOURCE: &str = "infra::http::sample_uncached";
    let (feed_id, count) = match parse_sample(&feed_id, "count", &count) {
        Ok(parsed) => parsed,
        Err(err) => return err.respond(SOURCE, state.errors),
    };
    let result = state.sampling.sample_uncached(feed_id, count).await;
    respond(&state, SOURCE, result, timed_json)
}

pub(super) async fn sample_cached_shuffle(
    State(state): State<HttpState>,
    Path((feed_id, count)): Path<(String, String)>,
) -> Response {
    const SOURCE: &str = "infra::http::sample_cached_shuffle";
    let (feed_id, count) = match parse_sample(&feed_id, "count", &count) {
        Ok(parsed) => parsed,
        Err(err) => return err.respond(SOURCE, state.errors),
    };
    let result = state.sampling.sample_cached_shuffle(feed_id, count).await;
    respond(&state, SOURCE, result, timed_json)
}

pub(super) async fn sample_member_set(
    State(state): State<HttpState>,
    Path((feed_id, item_count)): Path<(String, String)>,
) -> Response {
    const SOURCE: &str = "infra::http::sample_member_set";
    let (feed_id, count) = match parse_sample(&feed_id, "itemCount", &item_count) {
        Ok(parsed) => parsed,
        Err(err) => return err.respond(SOURCE, state.errors),
    };
    let result = state.sampling.sample_from_member_set(feed_id, count).await;
    respond(&state, SOURCE, result, timed_json)
}

pub(super) async fn cache_get(State(state): State<HttpState>, Path(key): Path<String>) -> Response {
    let result = state.cache.get(&key).await;
    respond(&state, "infra::http::cache_get", result, |value| {
        Json(KeyValueBody { key, value }).into_response()
    })
}

pub(super) async fn cache_set(
    State(state): State<HttpState>,
    payload: Result<Json<SetKeyRequest>, JsonRejection>,
) -> Response {
    const SOURCE: &str = "infra::http::cache_set";
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return ApiError::from(err).respond(SOURCE, state.errors),
    };
    let result = state.cache.set(&request.key, &request.value).await;
    respond(&state, SOURCE, result, |()| {
        Json(MessageBody {
            message: "Key-value set successfully".to_string(),
        })
        .into_response()
    })
}

fn parse_sample(
    feed_id: &str,
    count_name: &'static str,
    count: &str,
) -> Result<(FeedId, SampleCount), ApiError> {
    let feed_id = FeedId::parse(feed_id)?;
    let count = SampleCount::parse(count_name, count)?;
    Ok((feed_id, count))
}
