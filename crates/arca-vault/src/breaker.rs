/// Circuit breaker: fault isolation around fallible async operations.
///
/// Closed → Open after `failure_threshold` consecutive failures.
/// Open rejects immediately until `reset_timeout` has elapsed, then the
/// next call moves it to HalfOpen and is attempted. In HalfOpen a success
/// closes the circuit, a failure reopens it, and at most
/// `half_open_max_attempts` trials may be admitted before it reopens.
///
/// State sits behind a `std::sync::Mutex` that is never held across an
/// `.await`. Time comes from `tokio::time::Instant` so tests can pause
/// and advance the clock.
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::VaultError;

/// Breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip Closed → Open.
    pub failure_threshold: u32,
    /// Minimum dwell time in Open before a trial is allowed.
    pub reset_timeout: Duration,
    /// Trial calls admitted in HalfOpen before reverting to Open.
    pub half_open_max_attempts: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_attempts: 3,
        }
    }
}

impl BreakerConfig {
    /// Reject tunings the state machine cannot recover from: a zero
    /// threshold or zero half-open trials.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.failure_threshold == 0 {
            return Err(VaultError::Config("breaker failure_threshold must be at least 1".into()));
        }
        if self.half_open_max_attempts == 0 {
            return Err(VaultError::Config(
                "breaker half_open_max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of the breaker's state.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitState {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
    pub half_open_attempts: u32,
}

impl CircuitState {
    fn closed() -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_attempts: 0,
        }
    }
}

/// Lifetime counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakerStats {
    /// Calls that reached the wrapped operation.
    pub calls: u64,
    /// Calls rejected without running.
    pub rejections: u64,
    /// Transitions into Open (from Closed or HalfOpen).
    pub trips: u64,
}

struct Inner {
    state: CircuitState,
    stats: BreakerStats,
}

/// Fault-isolation state machine shared by every call through one adapter.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::closed(),
                stats: BreakerStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Run `op` through the breaker.
    ///
    /// Rejected calls fail with `CircuitOpen { operation }` and `op` is
    /// never invoked. Otherwise `op`'s own error is returned unchanged
    /// after being counted.
    pub async fn call<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, VaultError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<VaultError>,
    {
        self.admit(operation)?;
        match op().await {
            Ok(value) => {
                self.record_success(operation);
                Ok(value)
            }
            Err(e) => {
                let err = e.into();
                self.record_failure(operation, &err);
                Err(err)
            }
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> CircuitState {
        self.lock().state.clone()
    }

    pub fn status(&self) -> CircuitStatus {
        self.lock().state.status
    }

    pub fn stats(&self) -> BreakerStats {
        self.lock().stats
    }

    /// Force the breaker back to Closed.
    pub fn reset(&self) {
        self.lock().state = CircuitState::closed();
    }

    // ── Internal ─────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit(&self, operation: &str) -> Result<(), VaultError> {
        let mut inner = self.lock();
        let now = Instant::now();

        if inner.state.status == CircuitStatus::Open {
            let elapsed = inner
                .state
                .opened_at
                .map(|at| now.saturating_duration_since(at))
                .unwrap_or(Duration::MAX);
            if elapsed < self.config.reset_timeout {
                inner.stats.rejections += 1;
                return Err(open_error(operation));
            }
            inner.state.status = CircuitStatus::HalfOpen;
            inner.state.half_open_attempts = 0;
            tracing::debug!(operation, "circuit half-open: probing recovery");
        }

        if inner.state.status == CircuitStatus::HalfOpen {
            if inner.state.half_open_attempts >= self.config.half_open_max_attempts {
                Self::open(&mut inner, now);
                inner.stats.rejections += 1;
                tracing::warn!(operation, "circuit reopened: half-open trials exhausted");
                return Err(open_error(operation));
            }
            inner.state.half_open_attempts += 1;
        }

        inner.stats.calls += 1;
        Ok(())
    }

    fn record_success(&self, operation: &str) {
        let mut inner = self.lock();
        match inner.state.status {
            CircuitStatus::Closed => inner.state.consecutive_failures = 0,
            CircuitStatus::HalfOpen => {
                inner.state = CircuitState::closed();
                tracing::info!(operation, "circuit closed: remote recovered");
            }
            // A trial that outlived its half-open window; the breaker has
            // already moved on.
            CircuitStatus::Open => {}
        }
    }

    fn record_failure(&self, operation: &str, err: &VaultError) {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.state.status {
            CircuitStatus::Closed => {
                inner.state.consecutive_failures += 1;
                if inner.state.consecutive_failures >= self.config.failure_threshold {
                    Self::open(&mut inner, now);
                    tracing::warn!(
                        operation,
                        failures = inner.state.consecutive_failures,
                        error = %err,
                        "circuit opened"
                    );
                } else {
                    tracing::debug!(
                        operation,
                        failures = inner.state.consecutive_failures,
                        error = %err,
                        "call failed"
                    );
                }
            }
            CircuitStatus::HalfOpen => {
                Self::open(&mut inner, now);
                tracing::warn!(operation, error = %err, "circuit reopened: trial failed");
            }
            CircuitStatus::Open => {}
        }
    }

    fn open(inner: &mut Inner, now: Instant) {
        inner.state.status = CircuitStatus::Open;
        inner.state.opened_at = Some(now);
        inner.state.half_open_attempts = 0;
        inner.stats.trips += 1;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

fn open_error(operation: &str) -> VaultError {
    VaultError::CircuitOpen {
        operation: operation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(threshold: u32, reset_secs: u64, half_open: u32) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_secs(reset_secs),
            half_open_max_attempts: half_open,
        })
    }

    async fn fail(b: &CircuitBreaker, counter: &AtomicU32) -> Result<(), VaultError> {
        b.call("upload", || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(VaultError::StorageUnavailable("down".into()))
        })
        .await
    }

    async fn succeed(b: &CircuitBreaker, counter: &AtomicU32) -> Result<u32, VaultError> {
        b.call("upload", || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, VaultError>(7)
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn trips_after_threshold_and_fast_fails() {
        let b = breaker(5, 60, 3);
        let calls = AtomicU32::new(0);

        for i in 0..5 {
            let err = fail(&b, &calls).await.unwrap_err();
            assert!(matches!(err, VaultError::StorageUnavailable(_)), "call {i}");
        }
        assert_eq!(b.status(), CircuitStatus::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        // Sixth call never reaches the operation
        let err = succeed(&b, &calls).await.unwrap_err();
        assert!(matches!(err, VaultError::CircuitOpen { ref operation } if operation == "upload"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(b.stats().rejections, 1);
        assert_eq!(b.stats().trips, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_failures() {
        let b = breaker(3, 60, 1);
        let calls = AtomicU32::new(0);

        let _ = fail(&b, &calls).await;
        let _ = fail(&b, &calls).await;
        assert_eq!(b.state().consecutive_failures, 2);

        succeed(&b, &calls).await.unwrap();
        assert_eq!(b.state().consecutive_failures, 0);

        let _ = fail(&b, &calls).await;
        let _ = fail(&b, &calls).await;
        assert_eq!(b.status(), CircuitStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_through_half_open() {
        let b = breaker(5, 60, 3);
        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            let _ = fail(&b, &calls).await;
        }
        assert_eq!(b.status(), CircuitStatus::Open);

        // Still within reset timeout
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(succeed(&b, &calls).await.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(succeed(&b, &calls).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 6);

        let state = b.state();
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.opened_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_and_restarts_timer() {
        let b = breaker(1, 10, 3);
        let calls = AtomicU32::new(0);

        let _ = fail(&b, &calls).await;
        let first_open = b.state().opened_at.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        let err = fail(&b, &calls).await.unwrap_err();
        assert!(matches!(err, VaultError::StorageUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let state = b.state();
        assert_eq!(state.status, CircuitStatus::Open);
        assert!(state.opened_at.unwrap() > first_open);
        assert_eq!(b.stats().trips, 2);

        // Timer restarted: 5s later still open
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(succeed(&b, &calls).await.unwrap_err().is_circuit_open());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_bounded_concurrent_trials() {
        let b = Arc::new(breaker(1, 1, 2));
        let calls = Arc::new(AtomicU32::new(0));
        let _ = fail(&b, &calls).await;
        tokio::time::advance(Duration::from_secs(1)).await;

        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let mut trials = Vec::new();
        for _ in 0..2 {
            let b = b.clone();
            let calls = calls.clone();
            let mut rx = release_rx.clone();
            trials.push(tokio::spawn(async move {
                b.call("probe", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let _ = rx.changed().await;
                    Ok::<_, VaultError>(())
                })
                .await
            }));
        }
        // Let both trials reach their await point
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(b.state().half_open_attempts, 2);

        // Third concurrent caller exceeds the trial budget
        let err = succeed(&b, &calls).await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(b.status(), CircuitStatus::Open);

        release_tx.send(true).unwrap();
        for t in trials {
            t.await.unwrap().unwrap();
        }
        // Late trial successes do not override the reopened circuit
        assert_eq!(b.status(), CircuitStatus::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn zero_tunings_are_rejected() {
        assert!(BreakerConfig::default().validate().is_ok());

        let no_trials = BreakerConfig {
            half_open_max_attempts: 0,
            ..BreakerConfig::default()
        };
        assert!(matches!(no_trials.validate(), Err(VaultError::Config(ref msg)) if msg.contains("half_open")));

        let no_threshold = BreakerConfig {
            failure_threshold: 0,
            ..BreakerConfig::default()
        };
        assert!(matches!(no_threshold.validate(), Err(VaultError::Config(ref msg)) if msg.contains("threshold")));
    }

    #[tokio::test]
    async fn reset_forces_closed() {
        let b = breaker(1, 3600, 1);
        let calls = AtomicU32::new(0);
        let _ = fail(&b, &calls).await;
        assert_eq!(b.status(), CircuitStatus::Open);

        b.reset();
        assert_eq!(b.state(), CircuitState::closed());
        assert_eq!(succeed(&b, &calls).await.unwrap(), 7);
    }
}
