//! Cache key derivation.
//!
//! A key is the SHA-256 of `url | query | headers`, rendered as lowercase hex:
//! - url: scheme, host, port and path as normalized by the `url` crate, without query
//! - query: parameters grouped by name, names and values sorted
//! - headers: the configured header names, in configured order, values sorted
//!
//! Names and values are percent-encoded before joining so separators inside
//! values cannot make two different requests collide.

use std::collections::BTreeMap;
use std::fmt;

use axum::http::{HeaderMap, Request, Uri};
use sha2::{Digest, Sha256};
use url::{form_urlencoded, Url};

/// Deterministic fingerprint of a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `request` using the listed header names.
    pub fn from_request<B>(request: &Request<B>, key_headers: &[String]) -> Self {
        Self::from_parts(request.uri(), request.headers(), key_headers)
    }

    pub fn from_parts(uri: &Uri, headers: &HeaderMap, key_headers: &[String]) -> Self {
        let base = [
            url_part(uri),
            query_part(uri),
            headers_part(headers, key_headers),
        ]
        .join("|");

        Self(hex::encode(Sha256::digest(base.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn url_part(uri: &Uri) -> String {
    match Url::parse(&uri.to_string()) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        // Relative targets have no scheme or authority to normalize.
        Err(_) => uri.path().to_string(),
    }
}

fn query_part(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return String::new();
    };

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(encode(&name))
            .or_default()
            .push(encode(&value));
    }

    params
        .into_iter()
        .map(|(name, mut values)| {
            values.sort();
            format!("{}={}", name, values.join(","))
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn headers_part(headers: &HeaderMap, key_headers: &[String]) -> String {
    let mut parts = Vec::new();

    for name in key_headers {
        let mut values: Vec<String> = headers
            .get_all(name.as_str())
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .filter(|v| !v.is_empty())
            .map(|v| encode(&v))
            .collect();

        if values.is_empty() {
            continue;
        }
        values.sort();
        parts.push(format!("{}:{}", name.to_ascii_lowercase(), values.join(",")));
    }

    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn key(uri: &str, headers: &[(&str, &str)], key_headers: &[&str]) -> CacheKey {
        let mut builder = Request::get(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();
        let key_headers: Vec<String> = key_headers.iter().map(|h| h.to_string()).collect();
        CacheKey::from_request(&request, &key_headers)
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let k = key("http://api.local/items", &[], &[]);
        assert_eq!(k.as_str().len(), 64);
        assert!(k.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identical_requests_share_a_key() {
        let a = key("http://api.local/users/1", &[("Authorization", "Bearer abc")], &["Authorization"]);
        let b = key("http://api.local/users/1", &[("authorization", "Bearer abc")], &["authorization"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_selected_header_value_changes_key() {
        let abc = key("http://api.local/users/1", &[("Authorization", "Bearer abc")], &["Authorization"]);
        let xyz = key("http://api.local/users/1", &[("Authorization", "Bearer xyz")], &["Authorization"]);
        assert_ne!(abc, xyz);
    }

    #[test]
    fn test_unlisted_headers_are_ignored() {
        let a = key("http://api.local/items", &[("x-trace", "1")], &["Authorization"]);
        let b = key("http://api.local/items", &[("x-trace", "2")], &["Authorization"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_and_empty_header_are_equivalent() {
        let missing = key("http://api.local/items", &[], &["x-tenant-id"]);
        let empty = key("http://api.local/items", &[("x-tenant-id", "")], &["x-tenant-id"]);
        assert_eq!(missing, empty);
    }

    #[test]
    fn test_query_order_does_not_matter() {
        let a = key("http://api.local/items?b=2&a=1&a=0", &[], &[]);
        let b = key("http://api.local/items?a=0&b=2&a=1", &[], &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_query_values_change_key() {
        let a = key("http://api.local/items?page=1", &[], &[]);
        let b = key("http://api.local/items?page=2", &[], &[]);
        let c = key("http://api.local/items", &[], &[]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_separators_inside_values_do_not_collide() {
        let split = key("http://api.local/items?a=1&a=2", &[], &[]);
        let joined = key("http://api.local/items?a=1%2C2", &[], &[]);
        assert_ne!(split, joined);
    }

    #[test]
    fn test_url_is_normalized() {
        let a = key("http://API.local:80/items", &[], &[]);
        let b = key("http://api.local/items", &[], &[]);
        assert_eq!(a, b);

        let other_path = key("http://api.local/items/1", &[], &[]);
        assert_ne!(a, other_path);
    }
}
