use flowcore::{ErrorKind, FlowError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Circuit breaker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub enabled: bool,
    /// Requests observed in the window before the ratio is evaluated
    pub min_requests: u32,
    /// Failure ratio at or above which the breaker opens
    pub failure_ratio: f64,
    /// Length of the closed-state counting window in milliseconds; 0 never clears
    pub interval_ms: u64,
    /// Time spent open before probing in milliseconds
    pub open_timeout_ms: u64,
    /// Trial requests admitted while half-open, and successes needed to close
    pub half_open_max_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_requests: 10,
            failure_ratio: 0.6,
            interval_ms: 60_000,
            open_timeout_ms: 30_000,
            half_open_max_requests: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::HalfOpen => "half-open",
            BreakerState::Open => "open",
        };
        f.write_str(s)
    }
}

/// Request counters for the current generation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }
}

struct BreakerInner {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// Failure-ratio circuit breaker.
///
/// Closed counts outcomes per window and opens once at least `min_requests`
/// were seen with a failure ratio of `failure_ratio` or more. Open rejects
/// every call until `open_timeout` elapses, then admits a limited number of
/// half-open probes; enough consecutive successes close it again, and any
/// failure reopens it. Outcomes reported for an older generation are ignored.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Whether an error says something about the health of the guarded dependency.
fn counts_as_failure(err: &FlowError) -> bool {
    let kind = err.kind();
    !(kind.is_caller_error() || kind == ErrorKind::Canceled)
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let mut inner = BreakerInner {
            state: BreakerState::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
        };
        Self::new_generation(&config, &mut inner, Instant::now());

        Self {
            name: name.into(),
            config,
            inner: Mutex::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Current state, applying any pending time-based transition.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now())
    }

    pub fn counts(&self) -> Counts {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        inner.counts
    }

    /// Run `fut` through the breaker. Rejected calls return `CircuitOpen`
    /// without polling the future.
    ///
    /// If the returned future is dropped before `fut` settles, the admitted
    /// request is handed back without recording an outcome.
    pub async fn call<T, Fut>(&self, fut: Fut) -> Result<T, FlowError>
    where
        Fut: Future<Output = Result<T, FlowError>>,
    {
        if !self.config.enabled {
            return fut.await;
        }

        let admitted = Admitted {
            breaker: self,
            generation: self.before_request()?,
            settled: false,
        };
        let result = fut.await;
        let success = match &result {
            Ok(_) => true,
            Err(e) => !counts_as_failure(e),
        };
        admitted.settle(success);
        result
    }

    fn before_request(&self) -> Result<u64, FlowError> {
        let mut inner = self.inner.lock();
        let state = self.current_state(&mut inner, Instant::now());

        match state {
            BreakerState::Open => return Err(FlowError::CircuitOpen),
            BreakerState::HalfOpen
                if inner.counts.requests >= self.config.half_open_max_requests =>
            {
                return Err(FlowError::CircuitOpen)
            }
            _ => {}
        }

        inner.counts.requests += 1;
        Ok(inner.generation)
    }

    fn abandon_request(&self, before: u64) {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        if inner.generation == before {
            inner.counts.requests = inner.counts.requests.saturating_sub(1);
            debug!(breaker = %self.name, "request dropped before completion, slot released");
        }
    }

    fn after_request(&self, before: u64, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let state = self.current_state(&mut inner, now);
        if inner.generation != before {
            return;
        }

        if success {
            inner.counts.on_success();
            if state == BreakerState::HalfOpen
                && inner.counts.consecutive_successes >= self.config.half_open_max_requests
            {
                self.set_state(&mut inner, BreakerState::Closed, now);
            }
        } else {
            inner.counts.on_failure();
            match state {
                BreakerState::Closed if self.ready_to_trip(&inner.counts) => {
                    self.set_state(&mut inner, BreakerState::Open, now);
                }
                BreakerState::HalfOpen => {
                    self.set_state(&mut inner, BreakerState::Open, now);
                }
                _ => {}
            }
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.config.min_requests
            && counts.requests > 0
            && f64::from(counts.total_failures) / f64::from(counts.requests)
                >= self.config.failure_ratio
    }

    fn current_state(&self, inner: &mut BreakerInner, now: Instant) -> BreakerState {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            BreakerState::Closed if expired => Self::new_generation(&self.config, inner, now),
            BreakerState::Open if expired => self.set_state(inner, BreakerState::HalfOpen, now),
            _ => {}
        }
        inner.state
    }

    fn set_state(&self, inner: &mut BreakerInner, state: BreakerState, now: Instant) {
        if inner.state == state {
            return;
        }
        let previous = inner.state;
        inner.state = state;
        Self::new_generation(&self.config, inner, now);

        if state == BreakerState::Open {
            warn!(breaker = %self.name, from = %previous, to = %state, "circuit breaker opened");
        } else {
            debug!(breaker = %self.name, from = %previous, to = %state, "circuit breaker state changed");
        }
    }

    fn new_generation(config: &BreakerConfig, inner: &mut BreakerInner, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            BreakerState::Closed if config.interval_ms > 0 => {
                Some(now + Duration::from_millis(config.interval_ms))
            }
            BreakerState::Closed | BreakerState::HalfOpen => None,
            BreakerState::Open => Some(now + Duration::from_millis(config.open_timeout_ms)),
        };
    }
}

/// A request admitted by `before_request` that still owes an outcome.
struct Admitted<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Admitted<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for Admitted<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon_request(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore::{NodeError, RepositoryError};

    fn breaker(half_open_max_requests: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                half_open_max_requests,
                ..BreakerConfig::default()
            },
        )
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), FlowError> {
        breaker.call(async { Ok(()) }).await
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), FlowError> {
        breaker
            .call(async { Err(NodeError::ExecutionFailed("boom".into()).into()) })
            .await
    }

    async fn trip(breaker: &CircuitBreaker) {
        for _ in 0..4 {
            succeed(breaker).await.unwrap();
        }
        for _ in 0..6 {
            assert!(fail(breaker).await.is_err());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_at_failure_ratio() {
        let breaker = breaker(2);
        for _ in 0..4 {
            succeed(&breaker).await.unwrap();
        }
        for _ in 0..5 {
            fail(&breaker).await.unwrap_err();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);

        let mut polled = false;
        let err = breaker
            .call(async {
                polled = true;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::CircuitOpen));
        assert!(!polled);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_open_below_min_requests() {
        let breaker = breaker(2);
        for _ in 0..9 {
            fail(&breaker).await.unwrap_err();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.counts().total_failures, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_clears_counts() {
        let breaker = breaker(2);
        for _ in 0..9 {
            fail(&breaker).await.unwrap_err();
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.counts().requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_successes_close_the_breaker() {
        let breaker = breaker(2);
        trip(&breaker).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let breaker = breaker(2);
        trip(&breaker).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_limits_trial_requests() {
        let breaker = std::sync::Arc::new(breaker(1));
        trip(&breaker).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let breaker = std::sync::Arc::clone(&breaker);
            tokio::spawn(async move {
                breaker
                    .call(async {
                        let _ = wait.await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert!(matches!(succeed(&breaker).await, Err(FlowError::CircuitOpen)));
        release.send(()).unwrap();
        trial.await.unwrap().unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_call_releases_its_half_open_slot() {
        let breaker = breaker(2);
        trip(&breaker).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call(std::future::pending::<Result<(), FlowError>>()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!(breaker.counts().requests, 0);

        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_call_is_not_counted_while_closed() {
        let breaker = breaker(2);
        for _ in 0..3 {
            let _ = tokio::time::timeout(
                Duration::from_millis(10),
                breaker.call(std::future::pending::<Result<(), FlowError>>()),
            )
            .await;
        }
        let counts = breaker.counts();
        assert_eq!(counts.requests, 0);
        assert_eq!(counts.total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_errors_do_not_trip() {
        let breaker = breaker(2);
        for _ in 0..20 {
            breaker
                .call(async { Err::<(), _>(RepositoryError::NotFound(uuid::Uuid::nil()).into()) })
                .await
                .unwrap_err();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn disabled_breaker_passes_through() {
        let breaker = CircuitBreaker::new(
            "off",
            BreakerConfig {
                enabled: false,
                ..BreakerConfig::default()
            },
        );
        for _ in 0..20 {
            fail(&breaker).await.unwrap_err();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
