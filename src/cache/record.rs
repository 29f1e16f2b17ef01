//! Cache entry wire format.
//!
//! Entries are stored as JSON:
//! ```json
//! {
//!   "status": "200 OK",
//!   "status_code": 200,
//!   "proto": "HTTP/1.1",
//!   "header": { "Content-Type": ["application/json"] },
//!   "body": "{\"id\":1}",
//!   "cacheControlValue": 60,
//!   "policy": { "maxAge": 30, "headers": ["Authorization"] }
//! }
//! ```
//! `cacheControlValue` is the upstream `max-age`; `policy.maxAge` is the
//! effective TTL the entry was written with. Other systems read this format
//! straight from the store, so field names are fixed.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::{
    header::CACHE_CONTROL, response::Parts, HeaderMap, HeaderName, HeaderValue, Response,
    StatusCode, Version,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::CacheError;

static MAX_AGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"max-age=(\d+)").expect("max-age pattern is valid"));

/// Policy in effect when an entry was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Effective TTL in seconds.
    #[serde(rename = "maxAge")]
    pub max_age: u64,
    /// Header names that took part in key derivation.
    pub headers: Vec<String>,
}

/// A response serialized for the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: String,
    pub status_code: u16,
    pub proto: String,
    #[serde(rename = "header")]
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
    #[serde(rename = "cacheControlValue")]
    pub cache_control_value: u64,
    pub policy: CachePolicy,
}

impl CachedResponse {
    /// Capture a buffered response. Bodies must be UTF-8 because the record stores text.
    pub fn capture(
        parts: &Parts,
        body: &[u8],
        original_max_age: u64,
        policy: CachePolicy,
    ) -> Result<Self, CacheError> {
        let body = std::str::from_utf8(body)
            .map_err(|_| CacheError::NonUtf8Body)?
            .to_string();

        Ok(Self {
            status: status_line(parts.status),
            status_code: parts.status.as_u16(),
            proto: proto_of(parts.version).to_string(),
            headers: headers_to_map(&parts.headers),
            body,
            cache_control_value: original_max_age,
            policy,
        })
    }

    pub fn to_json(&self) -> Result<String, CacheError> {
        serde_json::to_string(self).map_err(CacheError::Encode)
    }

    pub fn from_json(value: &str) -> Result<Self, CacheError> {
        serde_json::from_str(value).map_err(CacheError::Decode)
    }

    /// Rebuild a response with the stored status, protocol, headers and body.
    pub fn into_response(self) -> Result<Response<Body>, CacheError> {
        let status = StatusCode::from_u16(self.status_code)
            .map_err(|_| CacheError::Invalid(format!("status code {}", self.status_code)))?;

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        *response.version_mut() = version_from_proto(&self.proto);

        let headers = response.headers_mut();
        for (name, values) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CacheError::Invalid(format!("header name `{name}`")))?;
            for value in values {
                let value = HeaderValue::from_str(&value)
                    .map_err(|_| CacheError::Invalid(format!("value for header `{name}`")))?;
                headers.append(name.clone(), value);
            }
        }

        Ok(response)
    }
}

/// Extract `max-age` from a `Cache-Control` header; 0 when absent or malformed.
pub fn max_age(headers: &HeaderMap) -> u64 {
    headers
        .get(CACHE_CONTROL)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| MAX_AGE.captures(value))
        .and_then(|captures| captures.get(1))
        .and_then(|age| age.as_str().parse().ok())
        .unwrap_or(0)
}

/// `Cache-Control` value written on cached and freshly cached responses.
pub fn cache_control_value(max_age: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("max-age={max_age}, public"))
        .unwrap_or_else(|_| HeaderValue::from_static("public"))
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

fn proto_of(version: Version) -> &'static str {
    if version == Version::HTTP_09 {
        "HTTP/0.9"
    } else if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else if version == Version::HTTP_2 {
        "HTTP/2.0"
    } else if version == Version::HTTP_3 {
        "HTTP/3.0"
    } else {
        "HTTP/1.1"
    }
}

fn version_from_proto(proto: &str) -> Version {
    match proto {
        "HTTP/0.9" => Version::HTTP_09,
        "HTTP/1.0" => Version::HTTP_10,
        "HTTP/2" | "HTTP/2.0" => Version::HTTP_2,
        "HTTP/3" | "HTTP/3.0" => Version::HTTP_3,
        _ => Version::HTTP_11,
    }
}

fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(canonical_name(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

/// `content-type` → `Content-Type`, the form other readers of the store expect.
fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
