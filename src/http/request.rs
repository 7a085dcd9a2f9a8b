//! Request descriptors and the events a handler emits for them.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use url::form_urlencoded;

use crate::cache::HttpResponse;

/// Lazily evaluated events for one request. Dropping it cancels interest.
pub type EventStream = BoxStream<'static, Result<HttpEvent, HttpError>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HttpError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("handler completed without a response")]
    NoResponse,
}

impl HttpError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// One step in the life of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpEvent {
    Sent,
    UploadProgress { loaded: u64, total: Option<u64> },
    ResponseHeader { status: u16, headers: Vec<(String, String)> },
    DownloadProgress { loaded: u64, total: Option<u64> },
    /// The complete response; terminal for a successful request.
    Response(HttpResponse),
}

impl HttpEvent {
    pub fn is_response(&self) -> bool {
        matches!(self, HttpEvent::Response(_))
    }

    pub fn into_response(self) -> Option<HttpResponse> {
        match self {
            HttpEvent::Response(response) => Some(response),
            _ => None,
        }
    }
}

/// An outgoing request as seen by the handler chain.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: String,
    params: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The URL with its params appended, used verbatim as the cache key.
    pub fn url_with_params(&self) -> String {
        if self.params.is_empty() {
            return self.url.clone();
        }

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();

        let separator = if !self.url.contains('?') {
            "?"
        } else if self.url.ends_with('?') || self.url.ends_with('&') {
            ""
        } else {
            "&"
        };

        format!("{}{separator}{query}", self.url)
    }
}
