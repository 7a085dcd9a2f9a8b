//! GET response caching for the handler chain.
//!
//! A fresh entry short-circuits the chain; otherwise the request is forwarded
//! and every complete response is written back before it is relayed.

use std::sync::Arc;

use async_stream::stream;
use axum::http::Method;
use futures::StreamExt;
use metrics::counter;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use super::{
    chain::{HttpHandler, HttpInterceptor},
    request::{EventStream, HttpError, HttpEvent, HttpRequest},
};
use crate::cache::{CacheEntry, CacheStore};
use crate::config::CacheSettings;

pub(crate) const METRIC_CACHE_HIT: &str = "httpcache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "httpcache_miss_total";
pub(crate) const METRIC_CACHE_BYPASS: &str = "httpcache_bypass_total";
pub(crate) const METRIC_CACHE_STORE_ERROR: &str = "httpcache_store_error_total";

/// Per-use cache behaviour. Cheap to copy; never shared mutably.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    force_update: bool,
    expire_after_minutes: u32,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the cache read; the response is still written back.
    pub fn with_force_update(mut self, force_update: bool) -> Self {
        self.force_update = force_update;
        self
    }

    /// How long after being stored an entry may be served.
    ///
    /// Zero keeps an entry fresh only at the instant it was written.
    pub fn with_expire_after_minutes(mut self, minutes: u32) -> Self {
        self.expire_after_minutes = minutes;
        self
    }

    pub fn force_update(&self) -> bool {
        self.force_update
    }

    pub fn expire_after_minutes(&self) -> u32 {
        self.expire_after_minutes
    }

    /// Fresh while `now <= last_updated + expire_after_minutes`.
    ///
    /// An expiry past the representable date range never lapses.
    pub fn is_fresh(&self, entry: &CacheEntry, now: OffsetDateTime) -> bool {
        entry
            .last_updated
            .checked_add(Duration::minutes(i64::from(self.expire_after_minutes)))
            .is_none_or(|expires_at| now <= expires_at)
    }

    /// The entry for `key` if these options allow serving it at `now`.
    pub fn lookup(&self, store: &CacheStore, key: &str, now: OffsetDateTime) -> Option<CacheEntry> {
        if self.force_update {
            return None;
        }
        store
            .get_entry(key)
            .filter(|entry| self.is_fresh(entry, now))
    }
}

/// Serves GET requests from a [`CacheStore`] and captures forwarded responses.
#[derive(Debug, Clone)]
pub struct CacheInterceptor {
    store: Arc<CacheStore>,
    options: CacheOptions,
}

impl CacheInterceptor {
    pub const NAME: &'static str = "cache";

    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            options: CacheOptions::default(),
        }
    }

    pub fn from_settings(store: Arc<CacheStore>, settings: &CacheSettings) -> Self {
        Self {
            store,
            options: settings.defaults,
        }
    }

    /// A new interceptor on the same store with `options` applied.
    pub fn configure(&self, options: CacheOptions) -> Self {
        Self {
            store: Arc::clone(&self.store),
            options,
        }
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }
}

impl HttpInterceptor for CacheInterceptor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn intercept(&self, request: HttpRequest, next: Arc<dyn HttpHandler>) -> EventStream {
        if request.method() != Method::GET {
            counter!(METRIC_CACHE_BYPASS).increment(1);
            return next.handle(request);
        }

        let store = Arc::clone(&self.store);
        let options = self.options;

        let events = stream! {
            let key = request.url_with_params();

            if let Some(entry) = options.lookup(&store, &key, store.now()) {
                counter!(METRIC_CACHE_HIT).increment(1);
                debug!(cache = "http", outcome = "hit", key = %key, "serving cached response");
                yield Ok(HttpEvent::Response(entry.data));
            } else {
                counter!(METRIC_CACHE_MISS).increment(1);
                debug!(
                    cache = "http",
                    outcome = "miss",
                    key = %key,
                    force_update = options.force_update(),
                    "forwarding request"
                );

                let mut upstream = next.handle(request);
                while let Some(event) = upstream.next().await {
                    match event {
                        Ok(event) => {
                            if let HttpEvent::Response(response) = &event {
                                if let Err(err) = store.set(key.clone(), response.clone()) {
                                    counter!(METRIC_CACHE_STORE_ERROR).increment(1);
                                    warn!(cache = "http", key = %key, error = %err, "failed to store response");
                                }
                            }
                            yield Ok(event);
                        }
                        Err(err) => {
                            yield Err::<HttpEvent, HttpError>(err);
                            break;
                        }
                    }
                }
            }
        };

        events.boxed()
    }
}
