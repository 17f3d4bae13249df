//! Per-provider health status and runtime metrics.
//!
//! One [`ProviderMetrics`] record exists per registered provider. It is
//! mutated after every extraction attempt and read by every routing
//! strategy through read-only snapshots.

use chrono::{DateTime, Utc};

/// Smoothing factor for the EWMA quality and availability scores.
const EWMA_ALPHA: f64 = 0.2;

/// Administrative/probed status of a provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HealthStatus {
    /// Provider is usable.
    Active,
    /// Last health probe failed.
    Error,
    /// Administratively disabled; never selected.
    Disabled,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Error => write!(f, "Error"),
            Self::Disabled => write!(f, "Disabled"),
        }
    }
}

/// Runtime metrics for a single provider.
#[derive(Clone, Debug)]
pub struct ProviderMetrics {
    /// Total extraction attempts recorded.
    pub total_calls: u64,
    /// Successful attempts.
    pub success_calls: u64,
    /// Failed attempts.
    pub failure_calls: u64,
    /// Rolling average response time in milliseconds.
    pub avg_response_ms: f64,
    /// EWMA of per-result quality scores, in `[0, 1]`.
    pub quality_ewma: f64,
    /// EWMA of success/failure outcomes, in `[0, 1]`.
    pub availability_ewma: f64,
    /// Extraction calls currently in flight.
    pub current_load: u32,
    /// When the provider last succeeded.
    pub last_success: Option<DateTime<Utc>>,
    /// When the provider last failed.
    pub last_failure: Option<DateTime<Utc>>,
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self {
            total_calls: 0,
            success_calls: 0,
            failure_calls: 0,
            avg_response_ms: 0.0,
            // Optimistic priors so new providers aren't starved.
            quality_ewma: 0.8,
            availability_ewma: 1.0,
            current_load: 0,
            last_success: None,
            last_failure: None,
        }
    }
}

impl ProviderMetrics {
    /// Record the outcome of one extraction attempt.
    ///
    /// `quality` is the quality score of the produced result; pass `None`
    /// for failures or when no score is available.
    pub fn record(&mut self, success: bool, latency_ms: f64, quality: Option<f64>) {
        self.total_calls += 1;

        // Rolling average over all calls.
        self.avg_response_ms +=
            (latency_ms - self.avg_response_ms) / self.total_calls as f64;

        let outcome = if success { 1.0 } else { 0.0 };
        self.availability_ewma =
            EWMA_ALPHA * outcome + (1.0 - EWMA_ALPHA) * self.availability_ewma;

        if let Some(q) = quality {
            let q = q.clamp(0.0, 1.0);
            self.quality_ewma = EWMA_ALPHA * q + (1.0 - EWMA_ALPHA) * self.quality_ewma;
        }

        if success {
            self.success_calls += 1;
            self.last_success = Some(Utc::now());
        } else {
            self.failure_calls += 1;
            self.last_failure = Some(Utc::now());
        }
    }

    /// Lifetime success rate. Optimistic (1.0) before any calls.
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 1.0;
        }
        self.success_calls as f64 / self.total_calls as f64
    }

    /// Composite health score in `[0, 1]`.
    ///
    /// Availability dominates, quality refines, and latency applies a mild
    /// drag (a 1s average halves the latency term).
    pub fn health_score(&self) -> f64 {
        let latency_factor = 1.0 / (1.0 + self.avg_response_ms / 1000.0);
        (0.5 * self.availability_ewma + 0.3 * self.quality_ewma + 0.2 * latency_factor)
            .clamp(0.0, 1.0)
    }
}
