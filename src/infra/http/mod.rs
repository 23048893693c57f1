//! HTTP surface: routes, handlers, error mapping and response logging.

mod error;
mod handlers;
mod middleware;
mod state;

pub use error::{ApiError, ErrorKind, ErrorStatusPolicy};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use state::HttpState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use middleware::{log_responses, set_request_context};

pub fn build_router(state: HttpState) -> Router {
    let postgres = Router::new()
        .route("/feeds", get(handlers::list_feeds))
        .route("/items", get(handlers::list_items))
        .route("/random-items/{feed_id}", get(handlers::feed_items))
        .route(
            "/random-items-cached/{feed_id}",
            get(handlers::feed_items_cached),
        )
        .route(
            "/random-items/{feed_id}/{count}",
            get(handlers::sample_uncached),
        )
        .route(
            "/random-items-cached/{feed_id}/{count}",
            get(handlers::sample_cached_shuffle),
        )
        .route(
            "/random-redis-items/{feed_id}/{item_count}",
            get(handlers::sample_member_set),
        );

    let redis = Router::new()
        .route("/get/{key}", get(handlers::cache_get))
        .route("/set", post(handlers::cache_set));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/postgres", postgres)
        .nest("/api/redis", redis)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
