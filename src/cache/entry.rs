//! Cached response payloads and the entries that wrap them.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A complete HTTP response as captured from the handler chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, with = "body_base64")]
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        let status_text = StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            status_text,
            url: None,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Capture status, headers and an already-buffered body.
    ///
    /// Header values that are not visible ASCII are dropped.
    pub fn from_parts(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            url: None,
            headers: headers
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
                .collect(),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Rebuild an axum response. Invalid header names or values are skipped.
    pub fn into_axum(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(axum::body::Body::from(self.body));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) else {
                continue;
            };
            headers.append(name, value);
        }

        response
    }
}

/// One cached response and when it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub data: HttpResponse,
}

mod body_base64 {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
    use time::macros::datetime;

    use super::*;

    #[test]
    fn new_fills_canonical_status_text() {
        let response = HttpResponse::new(404, "gone");
        assert_eq!(response.status_text, "Not Found");
        assert!(!response.is_success());
    }

    #[test]
    fn entry_serializes_with_camel_case_and_rfc3339() {
        let entry = CacheEntry {
            last_updated: datetime!(2024-03-01 12:30:00 UTC),
            data: HttpResponse::new(200, "v1"),
        };

        let value = serde_json::to_value(&entry).expect("serialize");

        assert_eq!(value["lastUpdated"], "2024-03-01T12:30:00Z");
        assert_eq!(value["data"]["status"], 200);
        assert_eq!(value["data"]["statusText"], "OK");
        assert_eq!(value["data"]["body"], "djE=");
    }

    #[test]
    fn binary_body_survives_json() {
        let response = HttpResponse::new(200, vec![0_u8, 159, 146, 150]);
        let json = serde_json::to_string(&response).unwrap();
        let back: HttpResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.body, response.body);
    }

    #[test]
    fn into_axum_restores_status_and_headers() {
        let response = HttpResponse::new(201, "made")
            .with_header("content-type", "text/plain")
            .with_header("set-cookie", "a=1")
            .with_header("set-cookie", "b=2")
            .with_header("bad header", "x")
            .into_axum();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
        assert_eq!(response.headers().len(), 3);
    }
}
