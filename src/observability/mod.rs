//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline middlewares produce:
//!     → logging.rs (structured log events, LoggingMiddleware)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON or pretty)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap and no-ops until an exporter is installed
//! - Cache write failures and breaker transitions surface only here

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, LoggingMiddleware};
