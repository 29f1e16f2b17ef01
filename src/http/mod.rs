//! Inbound HTTP subsystem for the demo gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → server.rs origin headers (strip Server/X-Powered-By, set X-Origin-App)
//!     → forward_headers.rs (collect headers into a ForwardedHeaders extension)
//!     → proxy handler → HttpClient → outbound pipeline
//!     → cache_control.rs (optional Cache-Control policy on proxied responses)
//!     → Send to client
//! ```

pub mod cache_control;
pub mod forward_headers;
pub mod server;

pub use cache_control::{cache_control_layer, CacheType, InvalidCacheType};
pub use forward_headers::{forward_headers_middleware, ForwardHeaders, DEFAULT_FORWARD_HEADERS, X_ORIGIN_APP};
pub use server::GatewayServer;
