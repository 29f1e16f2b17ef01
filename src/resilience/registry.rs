//! Named breaker registry.
//!
//! Clients that should trip together look their breaker up by name here
//! instead of relying on hidden global state. Cloning the registry shares it.

use std::sync::Arc;

use dashmap::DashMap;

use crate::resilience::breaker::{CircuitBreaker, Settings, State};
use crate::resilience::circuit_breaker::CircuitBreakerMiddleware;

#[derive(Clone, Debug, Default)]
pub struct BreakerRegistry {
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    defaults: Arc<Settings>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// New breakers copy `defaults`, with their own name.
    pub fn with_defaults(defaults: Settings) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            defaults: Arc::new(defaults),
        }
    }

    /// The breaker registered as `name`, creating it from the defaults if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let settings = Settings::clone(&self.defaults).named(name);
                Arc::new(CircuitBreaker::new(settings))
            })
            .value()
            .clone()
    }

    /// Register a breaker with explicit settings. An existing breaker of the
    /// same name is kept and returned.
    pub fn register(&self, settings: Settings) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(settings.name.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(settings)))
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Middleware bound to the shared breaker `name`.
    pub fn middleware(&self, name: &str) -> CircuitBreakerMiddleware {
        CircuitBreakerMiddleware::from_breaker(self.get_or_create(name))
    }

    /// Current state of every breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, State)> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.value().clone()).collect();
        let mut states: Vec<(String, State)> = breakers
            .iter()
            .map(|breaker| (breaker.name().to_string(), breaker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
