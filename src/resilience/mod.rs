//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to dependency:
//!     → circuit_breaker.rs (admit or fail fast)
//!     → next transport
//!     → circuit_breaker.rs (classify result, report to breaker.rs)
//!     → breaker.rs (update counts, maybe transition, emit event)
//! ```
//!
//! # Design Decisions
//! - Breaker state lives in the instance; sharing is explicit (`Arc` or `BreakerRegistry`)
//! - Circuit breaker prevents cascading failures
//! - Resilience logic is composable middleware

pub mod breaker;
pub mod circuit_breaker;
pub mod registry;

pub use breaker::{CircuitBreaker, Counts, Outcome, Permit, Settings, State, StateChangeHook};
pub use circuit_breaker::{classify, is_failure_status, CircuitBreakerMiddleware};
pub use registry::BreakerRegistry;
