//! Circuit breaker state machine.
//!
//! # States
//! - Closed: normal operation, outcomes counted
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a bounded number of trial calls probe recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: requests >= min_requests && failure ratio >= failure_ratio (current window)
//! Open → Half-Open: after `timeout`
//! Half-Open → Closed: `max_requests` consecutive trial successes
//! Half-Open → Open: any trial failure
//! ```
//!
//! Every state change, and every `interval` elapsed while closed, starts a new
//! counting window (a new generation). Outcomes reported for an older
//! generation are dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ClientError;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "CLOSED"),
            State::HalfOpen => write!(f, "HALF-OPEN"),
            State::Open => write!(f, "OPEN"),
        }
    }
}

/// Classified result of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Not attributable to the dependency (e.g. rejected by another breaker); not counted.
    Ignored,
}

/// Counters for the current window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Failures over requests in the window; 0 for an empty window.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(self.requests)
        }
    }
}

/// Called with (name, from, to) after every transition.
pub type StateChangeHook = Arc<dyn Fn(&str, State, State) + Send + Sync>;

/// Breaker tuning.
#[derive(Clone)]
pub struct Settings {
    pub name: String,
    /// Trial calls allowed while half-open, and successes needed to close.
    pub max_requests: u32,
    /// Closed-state window length; zero never resets the window while closed.
    pub interval: Duration,
    /// How long the breaker stays open before allowing trials.
    pub timeout: Duration,
    /// Minimum calls in the window before the failure ratio is considered.
    pub min_requests: u32,
    /// Failure ratio (0.0..=1.0) that trips the breaker.
    pub failure_ratio: f64,
    pub on_state_change: Option<StateChangeHook>,
}

impl Settings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_requests: 10,
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            min_requests: 20,
            failure_ratio: 0.5,
            on_state_change: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests.max(1);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn min_requests(mut self, min_requests: u32) -> Self {
        self.min_requests = min_requests;
        self
    }

    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    pub fn on_state_change(mut self, hook: impl Fn(&str, State, State) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(Arc::new(hook));
        self
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.min_requests && counts.failure_ratio() >= self.failure_ratio
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new("default")
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("min_requests", &self.min_requests)
            .field("failure_ratio", &self.failure_ratio)
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct Inner {
    state: State,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: State,
    to: State,
}

/// A named breaker. Share it with `Arc` to share state between call sites.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: Settings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(mut settings: Settings) -> Self {
        // Half-open has no expiry, so it needs at least one trial slot to ever leave.
        settings.max_requests = settings.max_requests.max(1);
        let expiry = (!settings.interval.is_zero()).then(|| Instant::now() + settings.interval);
        metrics::record_circuit_state(&settings.name, State::Closed);

        Self {
            settings,
            inner: Mutex::new(Inner {
                state: State::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current state, applying any time-based transition that is due.
    pub fn state(&self) -> State {
        let (state, transition) = {
            let mut inner = self.lock();
            let transition = self.refresh(&mut inner, Instant::now());
            (inner.state, transition)
        };
        self.emit(transition);
        state
    }

    /// Counters of the current window.
    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        let transition = self.refresh(&mut inner, Instant::now());
        let counts = inner.counts;
        drop(inner);
        self.emit(transition);
        counts
    }

    /// Admit a call or reject it without touching the dependency.
    ///
    /// The returned permit must be settled with [`Permit::record`]; a permit
    /// dropped unsettled counts as a failure.
    pub fn try_acquire(&self) -> Result<Permit<'_>, ClientError> {
        let (admitted, transition) = {
            let mut inner = self.lock();
            let transition = self.refresh(&mut inner, Instant::now());

            let admitted = match inner.state {
                State::Open => Err(ClientError::CircuitOpen {
                    name: self.settings.name.clone(),
                }),
                State::HalfOpen if inner.counts.requests >= self.settings.max_requests => {
                    Err(ClientError::TooManyTrialRequests {
                        name: self.settings.name.clone(),
                    })
                }
                _ => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            };
            (admitted, transition)
        };
        self.emit(transition);

        Ok(Permit {
            breaker: self,
            generation: admitted?,
            settled: false,
        })
    }

    fn settle(&self, generation: u64, outcome: Outcome) {
        let transition = {
            let mut inner = self.lock();
            let now = Instant::now();
            let refreshed = self.refresh(&mut inner, now);

            if generation != inner.generation {
                refreshed
            } else {
                match outcome {
                    Outcome::Success => self.on_success(&mut inner, now),
                    Outcome::Failure => self.on_failure(&mut inner, now),
                    Outcome::Ignored => {
                        inner.counts.requests = inner.counts.requests.saturating_sub(1);
                        None
                    }
                }
                .or(refreshed)
            }
        };
        self.emit(transition);
    }

    fn on_success(&self, inner: &mut Inner, now: Instant) -> Option<Transition> {
        match inner.state {
            State::Closed => {
                inner.counts.on_success();
                if self.settings.ready_to_trip(&inner.counts) {
                    return self.set_state(inner, State::Open, now);
                }
                None
            }
            State::HalfOpen => {
                inner.counts.on_success();
                if inner.counts.consecutive_successes >= self.settings.max_requests {
                    return self.set_state(inner, State::Closed, now);
                }
                None
            }
            State::Open => None,
        }
    }

    fn on_failure(&self, inner: &mut Inner, now: Instant) -> Option<Transition> {
        match inner.state {
            State::Closed => {
                inner.counts.on_failure();
                if self.settings.ready_to_trip(&inner.counts) {
                    return self.set_state(inner, State::Open, now);
                }
                None
            }
            State::HalfOpen => self.set_state(inner, State::Open, now),
            State::Open => None,
        }
    }

    /// Apply time-driven changes: window reset while closed, open → half-open.
    fn refresh(&self, inner: &mut Inner, now: Instant) -> Option<Transition> {
        let due = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            State::Closed if due => {
                self.new_generation(inner, now);
                None
            }
            State::Open if due => self.set_state(inner, State::HalfOpen, now),
            _ => None,
        }
    }

    fn set_state(&self, inner: &mut Inner, to: State, now: Instant) -> Option<Transition> {
        if inner.state == to {
            return None;
        }
        let from = inner.state;
        inner.state = to;
        self.new_generation(inner, now);
        Some(Transition { from, to })
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            State::Closed => (!self.settings.interval.is_zero()).then(|| now + self.settings.interval),
            State::Open => Some(now + self.settings.timeout),
            State::HalfOpen => None,
        };
    }

    /// Report a transition. Runs without the state lock held.
    fn emit(&self, transition: Option<Transition>) {
        let Some(Transition { from, to }) = transition else {
            return;
        };

        metrics::record_circuit_state(&self.settings.name, to);
        if to == State::Closed {
            tracing::info!(cb = %self.settings.name, from = %from, state = %to, "circuit-breaker:state change");
        } else {
            tracing::warn!(cb = %self.settings.name, from = %from, state = %to, "circuit-breaker:state change");
        }

        if let Some(hook) = &self.settings.on_state_change {
            hook(&self.settings.name, from, to);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An admitted call. Settle it once the outcome is known.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    pub fn record(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.settle(self.generation, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        // Abandoned calls (timeouts, cancellation) must not hold a trial slot forever.
        if !self.settled {
            self.breaker.settle(self.generation, Outcome::Failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(settings: Settings) -> CircuitBreaker {
        CircuitBreaker::new(settings)
    }

    fn run(cb: &CircuitBreaker, outcome: Outcome) {
        cb.try_acquire().expect("call should be admitted").record(outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_at_failure_ratio_after_min_requests() {
        let cb = breaker(Settings::new("svc"));

        for _ in 0..10 {
            run(&cb, Outcome::Success);
        }
        for _ in 0..9 {
            run(&cb, Outcome::Failure);
        }
        assert_eq!(cb.state(), State::Closed, "19 calls are below the minimum sample");

        run(&cb, Outcome::Failure);
        assert_eq!(cb.state(), State::Open);
        assert!(matches!(cb.try_acquire(), Err(ClientError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_when_failures_come_first() {
        let cb = breaker(Settings::new("svc"));

        for _ in 0..15 {
            run(&cb, Outcome::Failure);
        }
        assert_eq!(cb.state(), State::Closed);

        for _ in 0..5 {
            run(&cb, Outcome::Success);
        }
        assert_eq!(cb.state(), State::Open, "15/20 failures trips on the 20th outcome");
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_failure_ratio_stays_closed() {
        let cb = breaker(Settings::new("svc"));
        for i in 0..40 {
            run(&cb, if i % 3 == 0 { Outcome::Failure } else { Outcome::Success });
        }
        assert_eq!(cb.state(), State::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_moves_to_half_open_after_timeout() {
        let cb = breaker(Settings::new("svc").min_requests(1).timeout(Duration::from_secs(30)));
        run(&cb, Outcome::Failure);
        assert_eq!(cb.state(), State::Open);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cb.state(), State::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cb.state(), State::HalfOpen);
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(Settings::new("svc").min_requests(1).timeout(Duration::from_secs(5)));
        run(&cb, Outcome::Failure);
        tokio::time::advance(Duration::from_secs(5)).await;

        run(&cb, Outcome::Success);
        run(&cb, Outcome::Failure);
        assert_eq!(cb.state(), State::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_successes_close() {
        let cb = breaker(
            Settings::new("svc")
                .min_requests(1)
                .max_requests(3)
                .timeout(Duration::from_secs(5)),
        );
        run(&cb, Outcome::Failure);
        tokio::time::advance(Duration::from_secs(5)).await;

        run(&cb, Outcome::Success);
        run(&cb, Outcome::Success);
        assert_eq!(cb.state(), State::HalfOpen);
        run(&cb, Outcome::Success);
        assert_eq!(cb.state(), State::Closed);
        assert_eq!(cb.counts(), Counts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_caps_concurrent_trials() {
        let cb = breaker(
            Settings::new("svc")
                .min_requests(1)
                .max_requests(2)
                .timeout(Duration::from_secs(5)),
        );
        run(&cb, Outcome::Failure);
        tokio::time::advance(Duration::from_secs(5)).await;

        let first = cb.try_acquire().unwrap();
        let second = cb.try_acquire().unwrap();
        assert!(matches!(
            cb.try_acquire(),
            Err(ClientError::TooManyTrialRequests { .. })
        ));

        first.record(Outcome::Success);
        second.record(Outcome::Success);
        assert_eq!(cb.state(), State::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_trial_cap_still_recovers() {
        let settings = Settings {
            max_requests: 0,
            min_requests: 1,
            timeout: Duration::from_secs(5),
            ..Settings::new("svc")
        };
        let cb = breaker(settings);
        assert_eq!(cb.settings().max_requests, 1);

        run(&cb, Outcome::Failure);
        assert_eq!(cb.state(), State::Open);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cb.state(), State::HalfOpen);

        run(&cb, Outcome::Success);
        assert_eq!(cb.state(), State::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_starts_a_new_window() {
        let cb = breaker(Settings::new("svc").interval(Duration::from_secs(10)));
        for _ in 0..15 {
            run(&cb, Outcome::Failure);
        }
        assert_eq!(cb.counts().total_failures, 15);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cb.counts(), Counts::default());

        for _ in 0..15 {
            run(&cb, Outcome::Failure);
        }
        assert_eq!(cb.state(), State::Closed, "failures are split across two windows");
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_from_an_old_window_are_dropped() {
        let cb = breaker(Settings::new("svc").interval(Duration::from_secs(10)));
        let stale = cb.try_acquire().unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        stale.record(Outcome::Failure);
        assert_eq!(cb.counts(), Counts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_permit_counts_as_failure() {
        let cb = breaker(Settings::new("svc").min_requests(1).timeout(Duration::from_secs(5)));
        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.state(), State::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.state(), State::Open, "abandoned trial reopens instead of leaking the slot");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_outcome_is_not_counted() {
        let cb = breaker(Settings::new("svc"));
        run(&cb, Outcome::Ignored);
        assert_eq!(cb.counts(), Counts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_change_hook_sees_every_transition() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb = breaker(
            Settings::new("svc")
                .min_requests(1)
                .max_requests(1)
                .timeout(Duration::from_secs(5))
                .on_state_change(move |name, from, to| {
                    sink.lock().unwrap().push((name.to_string(), from, to));
                }),
        );

        run(&cb, Outcome::Failure);
        tokio::time::advance(Duration::from_secs(5)).await;
        run(&cb, Outcome::Success);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("svc".to_string(), State::Closed, State::Open),
                ("svc".to_string(), State::Open, State::HalfOpen),
                ("svc".to_string(), State::HalfOpen, State::Closed),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_outcomes_are_all_counted() {
        let cb = Arc::new(breaker(Settings::new("svc").min_requests(1000)));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cb = cb.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    cb.try_acquire().unwrap().record(Outcome::Success);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let counts = cb.counts();
        assert_eq!(counts.requests, 400);
        assert_eq!(counts.total_successes, 400);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(State::Open.to_string(), "OPEN");
        assert_eq!(State::HalfOpen.to_string(), "HALF-OPEN");
        assert_eq!(State::Closed.to_string(), "CLOSED");
    }
}
