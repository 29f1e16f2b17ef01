//! Facade and full-pipeline tests against real upstream servers.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use http_pipeline::cache::{CacheConfig, CacheMiddleware, MemoryStore, X_CACHE};
use http_pipeline::client::{ForwardedHeaders, HttpClient, RequestContext};
use http_pipeline::config::PipelineConfig;
use http_pipeline::observability::LoggingMiddleware;
use http_pipeline::pipeline::HeaderMiddleware;
use http_pipeline::resilience::{BreakerRegistry, CircuitBreakerMiddleware, Settings, State};
use http_pipeline::ClientError;

mod common;

#[tokio::test]
async fn test_get_through_hyper_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .and(query_param("expand", "roles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "roles": ["admin"]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::builder(server.uri()).build().unwrap();
    let response = client
        .get(&RequestContext::default(), "/users/1?expand=roles")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"id": 1, "roles": ["admin"]}));
}

#[tokio::test]
async fn test_post_sends_json_content_type_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"name":"widget"}"#))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::builder(server.uri()).build().unwrap();
    let response = client
        .post(&RequestContext::default(), "items", r#"{"name":"widget"}"#)
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["id"], 9);
}

#[tokio::test]
async fn test_non_2xx_is_returned_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .mount(&server)
        .await;

    let client = HttpClient::builder(server.uri()).build().unwrap();
    let response = client
        .delete(&RequestContext::default(), "items/1")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "not found");
}

#[tokio::test]
async fn test_forwarded_and_static_headers_reach_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-request-id", "req-1"))
        .and(header("x-api-key", "static"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::builder(server.uri())
        .header("x-api-key", "static")
        .build()
        .unwrap();
    let forwarded: ForwardedHeaders = [("x-request-id", "req-1"), ("x-api-key", "forwarded")]
        .into_iter()
        .collect();

    client
        .get(&RequestContext::new().with_forwarded_headers(forwarded), "/")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cache_hit_skips_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "max-age=60")
                .set_body_json(json!([1, 2, 3])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let client = HttpClient::builder(server.uri())
        .middleware(LoggingMiddleware::new("items"))
        .middleware(CacheMiddleware::new(CacheConfig::with_store(store.clone())))
        .middleware(CircuitBreakerMiddleware::new("items"))
        .build()
        .unwrap();
    let ctx = RequestContext::default();

    let first = client.get(&ctx, "items").await.unwrap();
    assert_eq!(first.headers[&X_CACHE], "MISS");
    assert_eq!(first.headers["cache-control"], "max-age=60, public");
    common::wait_for_entries(&store, 1).await;

    let second = client.get(&ctx, "items").await.unwrap();
    assert_eq!(second.headers[&X_CACHE], "HIT");
    assert_eq!(second.headers["cache-control"], "max-age=60, public");
    assert_eq!(second.body, first.body);
}

#[tokio::test]
async fn test_cache_key_headers_separate_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(2)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let cache = CacheConfig::with_store(store.clone()).key_headers(["Authorization"]);
    let abc = HttpClient::builder(server.uri())
        .middleware(HeaderMiddleware::from_pairs([("authorization", "Bearer abc")]).unwrap())
        .middleware(CacheMiddleware::new(cache.clone()))
        .build()
        .unwrap();
    let xyz = HttpClient::builder(server.uri())
        .middleware(HeaderMiddleware::from_pairs([("authorization", "Bearer xyz")]).unwrap())
        .middleware(CacheMiddleware::new(cache))
        .build()
        .unwrap();

    abc.get(&RequestContext::default(), "users/1").await.unwrap();
    xyz.get(&RequestContext::default(), "users/1").await.unwrap();
    common::wait_for_entries(&store, 2).await;

    let hit = abc.get(&RequestContext::default(), "users/1").await.unwrap();
    assert_eq!(hit.headers[&X_CACHE], "HIT");
}

#[tokio::test]
async fn test_override_ttl_rewrites_cache_control() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "max-age=60")
                .set_body_json(json!({})),
        )
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let client = HttpClient::builder(server.uri())
        .middleware(CacheMiddleware::new(
            CacheConfig::with_store(store.clone())
                .ttl(Duration::from_secs(30))
                .override_ttl(true),
        ))
        .build()
        .unwrap();

    let response = client.get(&RequestContext::default(), "items").await.unwrap();
    assert_eq!(response.headers["cache-control"], "max-age=30, public");
    common::wait_for_entries(&store, 1).await;
}

#[tokio::test]
async fn test_cache_hit_reports_effective_ttl_under_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "max-age=60")
                .set_body_json(json!({"items": []})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let client = HttpClient::builder(server.uri())
        .middleware(CacheMiddleware::new(
            CacheConfig::with_store(store.clone())
                .ttl(Duration::from_secs(30))
                .override_ttl(true),
        ))
        .build()
        .unwrap();
    let ctx = RequestContext::default();

    let miss = client.get(&ctx, "catalog").await.unwrap();
    assert_eq!(miss.headers[&X_CACHE], "MISS");
    common::wait_for_entries(&store, 1).await;

    let hit = client.get(&ctx, "catalog").await.unwrap();
    assert_eq!(hit.headers[&X_CACHE], "HIT");
    assert_eq!(hit.headers["cache-control"], "max-age=30, public");
}

#[tokio::test]
async fn test_server_errors_open_the_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .expect(20)
        .mount(&server)
        .await;

    let registry = BreakerRegistry::new();
    let client = HttpClient::builder(server.uri())
        .middleware(registry.middleware("svc"))
        .build()
        .unwrap();
    let ctx = RequestContext::default();

    for _ in 0..20 {
        let response = client.get(&ctx, "work").await.unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert_eq!(registry.snapshot(), vec![("svc".to_string(), State::Open)]);

    for _ in 0..5 {
        let err = client.get(&ctx, "work").await.unwrap_err();
        assert!(matches!(err, ClientError::CircuitOpen { ref name } if name == "svc"));
    }
}

#[tokio::test]
async fn test_cache_hits_do_not_count_toward_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "max-age=60")
                .set_body_json(json!({})),
        )
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let breaker = CircuitBreakerMiddleware::with_settings(Settings::new("svc"));
    let client = HttpClient::builder(server.uri())
        .middleware(CacheMiddleware::new(CacheConfig::with_store(store.clone())))
        .middleware(breaker.clone())
        .build()
        .unwrap();

    client.get(&RequestContext::default(), "items").await.unwrap();
    common::wait_for_entries(&store, 1).await;
    for _ in 0..5 {
        client.get(&RequestContext::default(), "items").await.unwrap();
    }

    assert_eq!(breaker.breaker().counts().requests, 1);
}

#[tokio::test]
async fn test_from_config_builds_working_chain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-api-key", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let mut config = PipelineConfig::default();
    config.client.base_url = server.uri();
    config.client.headers.insert("x-api-key".into(), "k".into());

    let client = HttpClient::from_config(&config, Some(Arc::new(MemoryStore::new())))
        .unwrap()
        .build()
        .unwrap();
    let response = client.get(&RequestContext::default(), "status").await.unwrap();
    assert_eq!(response.body["ok"], true);
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain text"))
        .mount(&server)
        .await;

    let client = HttpClient::builder(server.uri()).build().unwrap();
    let err = client.get(&RequestContext::default(), "x").await.unwrap_err();
    assert!(err.is_decode());
}
