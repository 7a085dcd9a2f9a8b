//! Handler chain: handlers produce event streams, interceptors wrap them.

use std::sync::Arc;

use futures::TryStreamExt;
use tracing::error;

use super::request::{EventStream, HttpRequest};

/// Turns a request into a stream of events.
pub trait HttpHandler: Send + Sync {
    fn handle(&self, request: HttpRequest) -> EventStream;
}

/// A stage that may inspect, answer or forward a request.
pub trait HttpInterceptor: Send + Sync {
    /// Identifies the interceptor when a client removes it from its chain.
    fn name(&self) -> &'static str;

    fn intercept(&self, request: HttpRequest, next: Arc<dyn HttpHandler>) -> EventStream;
}

/// Binds an interceptor to the handler after it.
pub struct InterceptorHandler {
    next: Arc<dyn HttpHandler>,
    interceptor: Arc<dyn HttpInterceptor>,
}

impl InterceptorHandler {
    pub fn new(next: Arc<dyn HttpHandler>, interceptor: Arc<dyn HttpInterceptor>) -> Self {
        Self { next, interceptor }
    }
}

impl HttpHandler for InterceptorHandler {
    fn handle(&self, request: HttpRequest) -> EventStream {
        self.interceptor.intercept(request, Arc::clone(&self.next))
    }
}

/// Logs failed requests and passes the error on unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandlerInterceptor;

impl ErrorHandlerInterceptor {
    pub const NAME: &'static str = "error_handler";
}

impl HttpInterceptor for ErrorHandlerInterceptor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn intercept(&self, request: HttpRequest, next: Arc<dyn HttpHandler>) -> EventStream {
        let method = request.method().clone();
        let url = request.url_with_params();
        Box::pin(next.handle(request).inspect_err(move |err| {
            error!(
                target: "httpcache::http::request",
                method = %method,
                url = %url,
                error = %err,
                "request failed"
            );
        }))
    }
}
