#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::{StreamExt, stream};
use httpcache::{
    cache::{HttpResponse, PersistenceError, StorageBackend},
    http::{EventStream, HttpError, HttpEvent, HttpHandler, HttpRequest},
};
use time::{OffsetDateTime, macros::datetime};

pub const T0: OffsetDateTime = datetime!(2024-05-01 09:00 UTC);

/// What the recording transport does with each request.
#[derive(Clone)]
pub enum Reply {
    /// `Sent`, then a 200 whose body is `"<url> #<call number>"`.
    Ok,
    /// `Sent`, two download progress events, then the response.
    WithProgress,
    /// `Sent`, then the given error.
    Fail(HttpError),
}

/// Transport stub that counts how often it is asked to handle a request.
pub struct RecordingTransport {
    calls: AtomicUsize,
    reply: Reply,
}

impl RecordingTransport {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply,
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::new(Reply::Ok)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpHandler for RecordingTransport {
    fn handle(&self, request: HttpRequest) -> EventStream {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let url = request.url_with_params();
        let response = HttpResponse::new(200, format!("{url} #{call}")).with_url(url);

        let events: Vec<Result<HttpEvent, HttpError>> = match &self.reply {
            Reply::Ok => vec![Ok(HttpEvent::Sent), Ok(HttpEvent::Response(response))],
            Reply::WithProgress => vec![
                Ok(HttpEvent::Sent),
                Ok(HttpEvent::DownloadProgress {
                    loaded: 2,
                    total: Some(4),
                }),
                Ok(HttpEvent::DownloadProgress {
                    loaded: 4,
                    total: Some(4),
                }),
                Ok(HttpEvent::Response(response)),
            ],
            Reply::Fail(err) => vec![Ok(HttpEvent::Sent), Err(err.clone())],
        };
        stream::iter(events).boxed()
    }
}

pub fn as_next(transport: &Arc<RecordingTransport>) -> Arc<dyn HttpHandler> {
    transport.clone()
}

pub async fn collect(events: EventStream) -> Vec<Result<HttpEvent, HttpError>> {
    events.collect().await
}

/// Final response body of a collected stream, as text.
pub fn final_body(events: &[Result<HttpEvent, HttpError>]) -> Option<String> {
    events.iter().rev().find_map(|event| match event {
        Ok(HttpEvent::Response(response)) => {
            Some(String::from_utf8_lossy(&response.body).into_owned())
        }
        _ => None,
    })
}

/// Storage that accepts reads but rejects every write.
pub struct RejectingStorage;

impl StorageBackend for RejectingStorage {
    fn kind(&self) -> &'static str {
        "rejecting"
    }

    fn get(&self, _name: &str) -> Result<Option<String>, PersistenceError> {
        Ok(None)
    }

    fn set(&self, name: &str, _value: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::rejected(name, "quota exceeded"))
    }
}
