//! Per-provider circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to prevent cascading failures
//! when a provider is experiencing issues. The circuit has three states:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Provider is failing, requests are blocked.
//! - **HalfOpen**: Testing if provider has recovered with bounded probes.
//!
//! Unlike a simple consecutive-failure breaker, this one keeps a bounded
//! sliding window of recent call outcomes and opens on either an absolute
//! failure count or a failure-rate threshold, once the window holds enough
//! samples. A degradation level (None..Critical) derived from the current
//! failure rate is exposed so callers can choose fallback behavior.
//!
//! The breaker is in-memory and resets on application restart. Each
//! provider gets its own breaker instance with its own lock, so a hot
//! provider never contends with a broken one.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::errors::FailureKind;
use crate::models::ProviderId;

/// Default absolute failure count before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default failure rate (over the window) before opening the circuit.
const DEFAULT_FAILURE_RATE_THRESHOLD: f64 = 0.5;

/// Default duration above which a call counts as slow.
const DEFAULT_SLOW_CALL_THRESHOLD: Duration = Duration::from_secs(5);

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default sliding window size (bounded to [10, 1000] at construction).
const DEFAULT_WINDOW_SIZE: usize = 50;

/// Default minimum samples in the window before thresholds apply.
const DEFAULT_MIN_SAMPLES: u32 = 10;

/// Default maximum probe calls admitted while HalfOpen.
const DEFAULT_HALF_OPEN_MAX_CALLS: u32 = 3;

/// Default consecutive probe successes needed to close the circuit.
const DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Provider is failing - requests are blocked.
    Open,
    /// Testing recovery - limited probe requests allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Graded severity derived from the current failure rate.
///
/// Used by callers to choose fallback behavior; it does not affect the
/// state machine itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum DegradationLevel {
    /// Failure rate below the first threshold.
    None,
    /// Elevated failures, still serviceable.
    Minor,
    /// Degraded; callers may prefer alternatives.
    Moderate,
    /// Mostly failing.
    Severe,
    /// Effectively down.
    Critical,
}

/// One call outcome in the sliding window.
#[derive(Clone, Copy, Debug)]
struct CallRecord {
    success: bool,
    slow: bool,
    /// Failure category for diagnostics; `None` for successes.
    kind: Option<FailureKind>,
}

/// Circuit breaker configuration.
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Absolute failures in the window before opening the circuit.
    pub failure_threshold: u32,
    /// Failure rate over the window before opening the circuit.
    pub failure_rate_threshold: f64,
    /// Calls taking at least this long count as slow.
    pub slow_call_threshold: Duration,
    /// Time to wait before testing recovery.
    pub recovery_timeout: Duration,
    /// Sliding window capacity; clamped to [10, 1000].
    pub window_size: usize,
    /// Minimum window samples before thresholds apply.
    pub min_samples: u32,
    /// Maximum probe calls admitted while HalfOpen.
    pub half_open_max_calls: u32,
    /// Consecutive probe successes needed to close from HalfOpen.
    pub half_open_success_threshold: u32,
    /// When set, failure threshold and recovery timeout scale with the
    /// recent success rate, bounded to +/-50% of their configured values.
    pub adaptive: bool,
    /// Failure-rate boundaries for Minor/Moderate/Severe/Critical.
    pub degradation_thresholds: [f64; 4],
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            failure_rate_threshold: DEFAULT_FAILURE_RATE_THRESHOLD,
            slow_call_threshold: DEFAULT_SLOW_CALL_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            window_size: DEFAULT_WINDOW_SIZE,
            min_samples: DEFAULT_MIN_SAMPLES,
            half_open_max_calls: DEFAULT_HALF_OPEN_MAX_CALLS,
            half_open_success_threshold: DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD,
            adaptive: false,
            degradation_thresholds: [0.2, 0.4, 0.6, 0.8],
        }
    }
}

/// Internal mutable state, guarded by the breaker's mutex.
#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: VecDeque<CallRecord>,
    /// Probe calls admitted since entering HalfOpen.
    half_open_calls: u32,
    /// Consecutive probe successes since entering HalfOpen.
    half_open_successes: u32,
    last_failure: Option<Instant>,
    /// When the circuit last transitioned to Open.
    opened_at: Option<Instant>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            half_open_calls: 0,
            half_open_successes: 0,
            last_failure: None,
            opened_at: None,
        }
    }

    fn push(&mut self, record: CallRecord, capacity: usize) {
        if self.window.len() == capacity {
            self.window.pop_front();
        }
        self.window.push_back(record);
    }

    fn failure_count(&self) -> u32 {
        self.window.iter().filter(|r| !r.success).count() as u32
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.failure_count() as f64 / self.window.len() as f64
    }

    fn slow_call_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let slow = self.window.iter().filter(|r| r.slow).count();
        slow as f64 / self.window.len() as f64
    }

    fn success_rate(&self) -> f64 {
        1.0 - self.failure_rate()
    }
}

/// Circuit breaker guarding a single provider.
///
/// Thread-safe; all transitions are check-then-act under the breaker's own
/// mutex, so breakers for different providers never contend.
pub struct CircuitBreaker {
    provider_id: ProviderId,
    inner: Mutex<Inner>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a breaker for the given provider with default settings.
    pub fn new(provider_id: ProviderId) -> Self {
        Self::with_config(provider_id, CircuitBreakerConfig::default())
    }

    /// Create a breaker with custom configuration.
    ///
    /// The window size is clamped to [10, 1000].
    pub fn with_config(provider_id: ProviderId, mut config: CircuitBreakerConfig) -> Self {
        config.window_size = config.window_size.clamp(10, 1000);
        Self {
            provider_id,
            inner: Mutex::new(Inner::new()),
            config,
        }
    }

    /// The provider this breaker guards.
    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Lock the inner state, recovering from poison if necessary.
    ///
    /// For circuit breakers, it's safe to recover from a poisoned mutex
    /// since the worst case is slightly incorrect circuit state, which is
    /// better than panicking.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!(
                "Circuit breaker mutex for '{}' was poisoned, recovering",
                self.provider_id
            );
            poisoned.into_inner()
        })
    }

    /// Effective failure threshold after adaptive scaling.
    ///
    /// When recent success rate is high, the threshold widens (the breaker
    /// tolerates more failures); when low, it narrows. The scale factor is
    /// clamped to [0.5, 1.5].
    fn effective_failure_threshold(&self, inner: &Inner) -> u32 {
        if !self.config.adaptive || inner.window.len() < self.config.min_samples as usize {
            return self.config.failure_threshold;
        }
        let scale = (0.5 + inner.success_rate()).clamp(0.5, 1.5);
        ((self.config.failure_threshold as f64 * scale).round() as u32).max(1)
    }

    /// Effective recovery timeout after adaptive scaling, same bounds as
    /// the failure threshold.
    fn effective_recovery_timeout(&self, inner: &Inner) -> Duration {
        if !self.config.adaptive {
            return self.config.recovery_timeout;
        }
        let scale = (0.5 + inner.success_rate()).clamp(0.5, 1.5);
        self.config.recovery_timeout.mul_f64(scale)
    }

    /// Check whether a call may proceed.
    ///
    /// Returns true in Closed state, true for up to `half_open_max_calls`
    /// probes in HalfOpen state, and false in Open state until the
    /// recovery timeout has elapsed (at which point the breaker moves to
    /// HalfOpen and admits the caller as the first probe).
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => {
                let timeout = self.effective_recovery_timeout(&inner);
                let elapsed_enough = inner
                    .opened_at
                    .map(|t| t.elapsed() >= timeout)
                    .unwrap_or(false);
                if elapsed_enough {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        self.provider_id
                    );
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    // The caller consumes the first probe slot.
                    inner.half_open_calls = 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Non-mutating variant of [`can_execute`](Self::can_execute).
    ///
    /// Answers whether a call would currently be admitted without consuming
    /// a half-open probe slot or triggering the Open -> HalfOpen transition.
    /// Used by the registry when listing available providers.
    pub fn would_execute(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => inner.half_open_calls < self.config.half_open_max_calls,
            CircuitState::Open => {
                let timeout = self.effective_recovery_timeout(&inner);
                inner
                    .opened_at
                    .map(|t| t.elapsed() >= timeout)
                    .unwrap_or(false)
            }
        }
    }

    /// Record a successful call with its response time.
    pub fn record_success(&self, response_time: Duration) {
        let mut inner = self.lock();
        let record = CallRecord {
            success: true,
            slow: response_time >= self.config.slow_call_threshold,
            kind: None,
        };
        inner.push(record, self.config.window_size);

        match inner.state {
            CircuitState::Closed => {
                debug!(
                    "Circuit breaker: success for '{}' (failure rate {:.2})",
                    self.provider_id,
                    inner.failure_rate()
                );
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                debug!(
                    "Circuit breaker: probe success for '{}' ({}/{})",
                    self.provider_id,
                    inner.half_open_successes,
                    self.config.half_open_success_threshold
                );

                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    info!(
                        "Circuit breaker: closing circuit for '{}' after {} probe successes",
                        self.provider_id, inner.half_open_successes
                    );
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.half_open_calls = 0;
                    inner.half_open_successes = 0;
                    inner.last_failure = None;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {
                // A call slipped past an Open circuit, likely admitted just
                // before the transition. Harmless.
                debug!(
                    "Circuit breaker: unexpected success for '{}' in Open state",
                    self.provider_id
                );
            }
        }
    }

    /// Record a failed call with its category and response time.
    ///
    /// In Closed state, opens the circuit once the window holds at least
    /// `min_samples` outcomes and either the absolute failure count or
    /// the failure rate crosses its threshold. In HalfOpen state, any
    /// failure immediately reopens the circuit.
    pub fn record_failure(&self, kind: FailureKind, response_time: Duration) {
        let mut inner = self.lock();
        let record = CallRecord {
            success: false,
            slow: response_time >= self.config.slow_call_threshold,
            kind: Some(kind),
        };
        inner.push(record, self.config.window_size);
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                let samples = inner.window.len() as u32;
                let failures = inner.failure_count();
                let rate = inner.failure_rate();
                let threshold = self.effective_failure_threshold(&inner);

                let should_open = samples >= self.config.min_samples
                    && (failures >= threshold || rate >= self.config.failure_rate_threshold);

                if should_open {
                    info!(
                        "Circuit breaker: opening circuit for '{}' ({} failures, rate {:.2}, kind {})",
                        self.provider_id, failures, rate, kind
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{}, rate {:.2}, kind {})",
                        self.provider_id, failures, threshold, rate, kind
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after probe failure ({})",
                    self.provider_id, kind
                );
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_calls = 0;
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    self.provider_id
                );
            }
        }
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Failure count over the current window.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count()
    }

    /// Failure rate over the current window.
    pub fn failure_rate(&self) -> f64 {
        self.lock().failure_rate()
    }

    /// Degradation level derived from the current failure rate.
    pub fn degradation(&self) -> DegradationLevel {
        let rate = self.lock().failure_rate();
        let [minor, moderate, severe, critical] = self.config.degradation_thresholds;
        if rate >= critical {
            DegradationLevel::Critical
        } else if rate >= severe {
            DegradationLevel::Severe
        } else if rate >= moderate {
            DegradationLevel::Moderate
        } else if rate >= minor {
            DegradationLevel::Minor
        } else {
            DegradationLevel::None
        }
    }

    /// Reset the circuit to Closed and clear the window.
    pub fn reset(&self) {
        let mut inner = self.lock();
        info!(
            "Circuit breaker: manually resetting circuit for '{}'",
            self.provider_id
        );
        *inner = Inner::new();
    }

    /// Read-only snapshot for observability.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            provider_id: self.provider_id.clone(),
            state: inner.state,
            failure_count: inner.failure_count(),
            failure_rate: inner.failure_rate(),
            slow_call_rate: inner.slow_call_rate(),
            window_len: inner.window.len(),
            degradation: {
                let rate = inner.failure_rate();
                let [minor, moderate, severe, critical] = self.config.degradation_thresholds;
                if rate >= critical {
                    DegradationLevel::Critical
                } else if rate >= severe {
                    DegradationLevel::Severe
                } else if rate >= moderate {
                    DegradationLevel::Moderate
                } else if rate >= minor {
                    DegradationLevel::Minor
                } else {
                    DegradationLevel::None
                }
            },
            last_failure: inner.last_failure,
            recent_failure_kinds: inner.window.iter().filter_map(|r| r.kind).collect(),
        }
    }
}

/// Read-only view of a breaker's state.
#[derive(Clone, Debug)]
pub struct CircuitSnapshot {
    /// The provider this breaker guards.
    pub provider_id: ProviderId,
    /// Current circuit state.
    pub state: CircuitState,
    /// Failures in the current window.
    pub failure_count: u32,
    /// Failure rate over the current window.
    pub failure_rate: f64,
    /// Slow-call rate over the current window.
    pub slow_call_rate: f64,
    /// Outcomes currently held in the window.
    pub window_len: usize,
    /// Derived degradation level.
    pub degradation: DegradationLevel,
    /// Time of the last failure.
    pub last_failure: Option<Instant>,
    /// Failure categories in the window, oldest first, for diagnostics.
    pub recent_failure_kinds: Vec<FailureKind>,
}
