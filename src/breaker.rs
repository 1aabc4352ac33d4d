//! Failure-rate circuit breaker for outbound Solar.web calls
//!
//! ```text
//! Closed   -> Open:     requests >= min_requests && failures / requests >= failure_ratio
//! Open     -> HalfOpen: cooldown elapsed (checked lazily on the next state query)
//! HalfOpen -> Closed:   first trial call succeeds
//! HalfOpen -> Open:     first trial call fails
//! ```
//!
//! Counts cover the window since the last transition; every transition resets
//! them and starts a new generation. Outcomes reported for a permit from an
//! older generation are dropped.

use crate::config::BreakerConfig;
use crate::error::{Result, SolarizerError};
use crate::logging::get_logger;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::{Duration, Instant};

/// Breaker position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling counts since the last transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BreakerCounts {
    pub requests: u32,
    pub failures: u32,
}

impl BreakerCounts {
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.failures) / f64::from(self.requests)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    counts: BreakerCounts,
    generation: u64,
    open_until: Option<Instant>,
    trials_admitted: u32,
}

/// Thread-safe breaker shared by every task calling the remote
#[derive(Debug)]
pub struct CircuitBreaker {
    min_requests: u32,
    failure_ratio: f64,
    cooldown: Duration,
    half_open_max_requests: u32,
    inner: Mutex<Inner>,
    logger: crate::logging::StructuredLogger,
}

/// Admission ticket for one call.
///
/// Dropping a permit without reporting leaves the counts alone; a dropped
/// half-open trial gives its slot back.
#[must_use = "report the call outcome with success() or failure()"]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    reported: bool,
}

impl Permit<'_> {
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.on_outcome(self.generation, Outcome::Success);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.on_outcome(self.generation, Outcome::Failure);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.on_cancel(self.generation);
        }
    }
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            min_requests: config.min_requests.max(1),
            failure_ratio: config.failure_ratio,
            cooldown: Duration::from_secs(config.cooldown_secs),
            half_open_max_requests: config.half_open_max_requests.max(1),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                counts: BreakerCounts::default(),
                generation: 0,
                open_until: None,
                trials_admitted: 0,
            }),
            logger: get_logger("breaker"),
        }
    }

    /// Current state, moving an expired open breaker to half-open
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now())
    }

    pub fn counts(&self) -> BreakerCounts {
        self.lock().counts
    }

    /// Admit a call or refuse it locally
    pub fn try_acquire(&self) -> Result<Permit<'_>> {
        let mut inner = self.lock();
        let state = self.refresh(&mut inner, Instant::now());
        match state {
            BreakerState::Closed => {}
            BreakerState::Open => return Err(SolarizerError::breaker_open(state.as_str())),
            BreakerState::HalfOpen => {
                if inner.trials_admitted >= self.half_open_max_requests {
                    return Err(SolarizerError::breaker_open(state.as_str()));
                }
                inner.trials_admitted += 1;
            }
        }
        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            reported: false,
        })
    }

    /// Run `f` through the breaker; any `Err` counts as a failure
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.try_acquire()?;
        match f().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) => {
                permit.failure();
                Err(e)
            }
        }
    }

    fn on_outcome(&self, generation: u64, outcome: Outcome) {
        let now = Instant::now();
        let mut inner = self.lock();
        let state = self.refresh(&mut inner, now);
        if generation != inner.generation {
            return;
        }

        match state {
            BreakerState::Closed => {
                inner.counts.requests = inner.counts.requests.saturating_add(1);
                if outcome == Outcome::Failure {
                    inner.counts.failures = inner.counts.failures.saturating_add(1);
                }
                if self.should_trip(inner.counts) {
                    self.logger.warn(&format!(
                        "Tripping circuit breaker: {} of {} calls failed",
                        inner.counts.failures, inner.counts.requests
                    ));
                    self.transition(&mut inner, BreakerState::Open, now);
                }
            }
            BreakerState::HalfOpen => match outcome {
                Outcome::Success => self.transition(&mut inner, BreakerState::Closed, now),
                Outcome::Failure => self.transition(&mut inner, BreakerState::Open, now),
            },
            BreakerState::Open => {}
        }
    }

    fn on_cancel(&self, generation: u64) {
        let mut inner = self.lock();
        let state = self.refresh(&mut inner, Instant::now());
        if generation != inner.generation {
            return;
        }
        if state == BreakerState::HalfOpen {
            inner.trials_admitted = inner.trials_admitted.saturating_sub(1);
            self.logger.debug("Half-open trial abandoned; slot released");
        }
    }

    fn should_trip(&self, counts: BreakerCounts) -> bool {
        counts.requests >= self.min_requests && counts.failure_ratio() >= self.failure_ratio
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) -> BreakerState {
        if inner.state == BreakerState::Open && inner.open_until.is_some_and(|t| now >= t) {
            self.transition(inner, BreakerState::HalfOpen, now);
        }
        inner.state
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = BreakerCounts::default();
        inner.trials_admitted = 0;
        inner.open_until = (to == BreakerState::Open).then(|| now + self.cooldown);
        self.logger
            .info(&format!("Circuit breaker state {} -> {}", from, to));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(&BreakerConfig::default())
    }

    fn report(b: &CircuitBreaker, outcome: Outcome) {
        let permit = b.try_acquire().unwrap();
        match outcome {
            Outcome::Success => permit.success(),
            Outcome::Failure => permit.failure(),
        }
    }

    // Reference model in integer arithmetic: failures / requests >= 3 / 5
    fn expected_trip_index(seq: &[Outcome]) -> Option<usize> {
        let (mut requests, mut failures) = (0u32, 0u32);
        for (i, o) in seq.iter().enumerate() {
            requests += 1;
            if *o == Outcome::Failure {
                failures += 1;
            }
            if requests >= 3 && failures * 5 >= requests * 3 {
                return Some(i);
            }
        }
        None
    }

    #[test]
    fn opens_exactly_when_window_crosses_threshold() {
        for len in 0..=10u32 {
            for bits in 0..(1u32 << len) {
                let seq: Vec<Outcome> = (0..len)
                    .map(|i| {
                        if bits & (1 << i) != 0 {
                            Outcome::Failure
                        } else {
                            Outcome::Success
                        }
                    })
                    .collect();
                let b = breaker();
                let mut opened_at = None;
                for (i, o) in seq.iter().enumerate() {
                    report(&b, *o);
                    if b.state() == BreakerState::Open {
                        opened_at = Some(i);
                        break;
                    }
                }
                assert_eq!(opened_at, expected_trip_index(&seq), "sequence {:?}", seq);
            }
        }
    }

    #[test]
    fn never_opens_below_minimum_sample() {
        let b = breaker();
        report(&b, Outcome::Failure);
        report(&b, Outcome::Failure);
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.counts(), BreakerCounts { requests: 2, failures: 2 });
    }

    #[test]
    fn open_refuses_calls() {
        let b = breaker();
        for _ in 0..3 {
            report(&b, Outcome::Failure);
        }
        assert_eq!(b.state(), BreakerState::Open);
        assert_eq!(b.counts(), BreakerCounts::default());
        let err = b.try_acquire().unwrap_err();
        assert!(err.is_breaker_open());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_closes_on_first_success() {
        let b = breaker();
        for _ in 0..3 {
            report(&b, Outcome::Failure);
        }
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(b.state(), BreakerState::Open);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(b.state(), BreakerState::HalfOpen);

        let trial = b.try_acquire().unwrap();
        // Only one trial is admitted
        assert!(b.try_acquire().is_err());
        trial.success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.counts(), BreakerCounts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_reopens_on_first_failure() {
        let b = breaker();
        for _ in 0..3 {
            report(&b, Outcome::Failure);
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        report(&b, Outcome::Failure);
        assert_eq!(b.state(), BreakerState::Open);
        assert_eq!(b.counts(), BreakerCounts::default());

        // A fresh cooldown starts from the re-open
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(b.state(), BreakerState::Open);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_recovery() {
        let b = breaker();
        // S S F F F trips at the fifth call (3/5)
        for o in [
            Outcome::Success,
            Outcome::Success,
            Outcome::Failure,
            Outcome::Failure,
        ] {
            report(&b, o);
        }
        assert_eq!(b.state(), BreakerState::Closed);
        report(&b, Outcome::Failure);
        assert_eq!(b.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(60)).await;
        report(&b, Outcome::Success);
        assert_eq!(b.state(), BreakerState::Closed);

        // Earlier successes no longer dilute the ratio: F F F trips again
        report(&b, Outcome::Failure);
        report(&b, Outcome::Failure);
        assert_eq!(b.state(), BreakerState::Closed);
        report(&b, Outcome::Failure);
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn stale_permits_are_ignored() {
        let b = breaker();
        let stale = b.try_acquire().unwrap();
        for _ in 0..3 {
            report(&b, Outcome::Failure);
        }
        assert_eq!(b.state(), BreakerState::Open);
        stale.success();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_releases_its_slot() {
        let b = breaker();
        for _ in 0..3 {
            report(&b, Outcome::Failure);
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        drop(b.try_acquire().unwrap());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        let trial = b.try_acquire().unwrap();
        assert!(b.try_acquire().is_err());
        trial.success();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn dropped_permits_while_closed_are_not_counted() {
        let b = breaker();
        for _ in 0..3 {
            drop(b.try_acquire().unwrap());
        }
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.counts(), BreakerCounts::default());

        report(&b, Outcome::Failure);
        report(&b, Outcome::Success);
        drop(b.try_acquire().unwrap());
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.counts(), BreakerCounts { requests: 2, failures: 1 });
    }

    #[tokio::test]
    async fn call_classifies_errors_as_failures() {
        let b = breaker();
        let ok: Result<u8> = b.call(|| async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let err: Result<u8> = b
            .call(|| async { Err(SolarizerError::transport("reset")) })
            .await;
        assert!(err.is_err());
        assert_eq!(b.counts(), BreakerCounts { requests: 2, failures: 1 });
    }
}
