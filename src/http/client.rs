//! Composable client over a transport handler.
//!
//! Every configuration method returns a new client with a rebuilt
//! interceptor list, so one client can be specialised per call site:
//!
//! ```ignore
//! let response = client
//!     .with_cache(CacheOptions::new().with_expire_after_minutes(5))
//!     .send(HttpRequest::get("/api/users"))
//!     .await?;
//! ```

use std::sync::Arc;

use futures::StreamExt;

use super::{
    chain::{ErrorHandlerInterceptor, HttpHandler, HttpInterceptor, InterceptorHandler},
    interceptor::{CacheInterceptor, CacheOptions},
    request::{EventStream, HttpError, HttpEvent, HttpRequest},
};
use crate::cache::HttpResponse;

#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn HttpHandler>,
    cache: CacheInterceptor,
    interceptors: Vec<Arc<dyn HttpInterceptor>>,
}

impl HttpClient {
    /// Client with the default error handler and no caching.
    pub fn new(transport: Arc<dyn HttpHandler>, cache: CacheInterceptor) -> Self {
        Self {
            transport,
            cache,
            interceptors: vec![Arc::new(ErrorHandlerInterceptor)],
        }
    }

    /// Replace the interceptor list. The first entry runs outermost.
    pub fn with_interceptors(&self, interceptors: Vec<Arc<dyn HttpInterceptor>>) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            cache: self.cache.clone(),
            interceptors,
        }
    }

    /// Cache GET responses for requests made through the returned client.
    pub fn with_cache(&self, options: CacheOptions) -> Self {
        self.with_interceptor(Arc::new(self.cache.configure(options)))
    }

    /// Cache with the options the base cache interceptor was built with.
    pub fn with_default_cache(&self) -> Self {
        self.with_cache(self.cache.options())
    }

    pub fn without_error_handler(&self) -> Self {
        self.without_interceptor(ErrorHandlerInterceptor::NAME)
    }

    pub fn interceptor_names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Run `request` through the interceptors and the transport.
    pub fn request(&self, request: HttpRequest) -> EventStream {
        let handler = self.interceptors.iter().rev().fold(
            Arc::clone(&self.transport),
            |next, interceptor| -> Arc<dyn HttpHandler> {
                Arc::new(InterceptorHandler::new(next, Arc::clone(interceptor)))
            },
        );
        handler.handle(request)
    }

    /// Drive the request to completion and return its final response.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut events = self.request(request);
        let mut last = None;
        while let Some(event) = events.next().await {
            if let HttpEvent::Response(response) = event? {
                last = Some(response);
            }
        }
        last.ok_or(HttpError::NoResponse)
    }

    fn with_interceptor(&self, interceptor: Arc<dyn HttpInterceptor>) -> Self {
        let mut interceptors = self.interceptors.clone();
        interceptors.push(interceptor);
        self.with_interceptors(interceptors)
    }

    fn without_interceptor(&self, name: &str) -> Self {
        let interceptors = self
            .interceptors
            .iter()
            .filter(|i| i.name() != name)
            .cloned()
            .collect();
        self.with_interceptors(interceptors)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("interceptors", &self.interceptor_names())
            .finish()
    }
}
