//! Axum middleware applying the response cache to server-side GET routes.
//!
//! Mount with `middleware::from_fn_with_state(state, response_cache_layer)`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::interceptor::{
    CacheOptions, METRIC_CACHE_BYPASS, METRIC_CACHE_HIT, METRIC_CACHE_MISS,
    METRIC_CACHE_STORE_ERROR,
};
use crate::cache::{CacheStore, HttpResponse};

/// Shared state for [`response_cache_layer`].
#[derive(Clone)]
pub struct ResponseCacheState {
    pub store: Arc<CacheStore>,
    pub options: CacheOptions,
}

impl ResponseCacheState {
    pub fn new(store: Arc<CacheStore>, options: CacheOptions) -> Self {
        Self { store, options }
    }
}

/// Serve fresh GET responses from the store and capture cacheable misses.
///
/// The key is the request's path and query. Only 2xx responses without
/// `Set-Cookie` are stored.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<ResponseCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        counter!(METRIC_CACHE_BYPASS).increment(1);
        return next.run(request).await;
    }

    let key = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    if let Some(entry) = cache.options.lookup(&cache.store, &key, cache.store.now()) {
        counter!(METRIC_CACHE_HIT).increment(1);
        debug!(cache = "http", outcome = "hit", "serving cached response");
        return entry.data.into_axum();
    }

    counter!(METRIC_CACHE_MISS).increment(1);
    debug!(cache = "http", outcome = "miss", "cache miss, executing handler");

    let response = next.run(request).await;
    if !should_store_response(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(cache = "http", error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cached = HttpResponse::from_parts(parts.status, &parts.headers, bytes.clone()).with_url(&key);
    if let Err(err) = cache.store.set(key, cached) {
        counter!(METRIC_CACHE_STORE_ERROR).increment(1);
        warn!(cache = "http", error = %err, "failed to store response");
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn should_store_response(response: &Response) -> bool {
    response.status().is_success() && !response.headers().contains_key(header::SET_COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_are_not_stored() {
        let response = StatusCode::NOT_FOUND.into_response();
        assert!(!should_store_response(&response));
    }

    #[test]
    fn set_cookie_responses_are_not_stored() {
        let response = ([(header::SET_COOKIE, "session=1")], "hello").into_response();
        assert!(!should_store_response(&response));
    }

    #[test]
    fn plain_success_is_stored() {
        assert!(should_store_response(&"hello".into_response()));
    }
}
