//! HTTP response caching for request-processing chains.
//!
//! - [`cache`] holds the [`cache::CacheStore`] and its pluggable persistence.
//! - [`http`] holds the handler chain, the [`http::CacheInterceptor`] and the
//!   [`http::HttpClient`] wrapper, plus an axum middleware adapter.
//! - [`config`] and [`telemetry`] wire the crate into a host application.

pub mod cache;
pub mod config;
pub mod http;
pub mod telemetry;
