//! Client facade.
//!
//! # Data Flow
//! ```text
//! caller (method, RequestContext, path, body)
//!     → resolve path against base URL
//!     → forwarded headers, then static headers, then POST content-type default
//!     → composed transport (under the call deadline)
//!     → read body, decode JSON
//!     → HttpResponse { body, status, headers }
//! ```
//!
//! # Design Decisions
//! - Non-2xx statuses are not errors here; callers inspect `status`
//! - Empty or non-JSON bodies are decode errors, distinct from transport failures

pub mod context;
pub mod http_client;

pub use context::{ForwardedHeaders, RequestContext};
pub use http_client::{HttpClient, HttpClientBuilder, HttpResponse};
