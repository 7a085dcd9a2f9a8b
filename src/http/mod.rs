//! Request chain with GET response caching.
//!
//! Requests flow through [`HttpInterceptor`]s to a transport [`HttpHandler`].
//! The [`CacheInterceptor`] answers fresh GETs from the [`crate::cache::CacheStore`]
//! and writes forwarded responses back to it. [`HttpClient`] assembles the
//! chain; [`response_cache_layer`] applies the same policy inside axum.

mod chain;
mod client;
mod interceptor;
mod middleware;
mod request;

pub use chain::{ErrorHandlerInterceptor, HttpHandler, HttpInterceptor, InterceptorHandler};
pub use client::HttpClient;
pub use interceptor::{CacheInterceptor, CacheOptions};
pub(crate) use interceptor::{
    METRIC_CACHE_BYPASS, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_STORE_ERROR,
};
pub use middleware::{ResponseCacheState, response_cache_layer};
pub use request::{EventStream, HttpError, HttpEvent, HttpRequest};
