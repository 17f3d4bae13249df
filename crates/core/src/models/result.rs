//! The standard result returned by the pipeline, plus failover diagnostics.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::table::DataTable;
use super::types::ProviderId;

/// Why a candidate provider was skipped during failover.
#[derive(Clone, Debug)]
pub enum SkipReason {
    /// Circuit breaker is open for this provider.
    CircuitBreakerOpen,

    /// Provider is marked unhealthy by the registry.
    Unhealthy,

    /// The request's timeout budget ran out before this candidate was tried.
    BudgetExhausted,
}

/// Record of a single provider attempt during a request.
#[derive(Clone, Debug)]
pub struct ProviderAttempt {
    /// The provider concerned.
    pub provider_id: ProviderId,
    /// Set when the provider was skipped instead of called.
    pub skipped: Option<SkipReason>,
    /// Error message when the call failed.
    pub error: Option<String>,
    /// How long the call took, when one was made.
    pub elapsed: Option<Duration>,
    /// Whether the call succeeded.
    pub success: bool,
}

/// Detailed account of one failover pass across candidates.
#[derive(Clone, Debug, Default)]
pub struct FailoverReport {
    /// Every candidate touched, in ranked order.
    pub attempts: Vec<ProviderAttempt>,
}

impl FailoverReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    /// Record a skipped candidate.
    pub fn record_skip(&mut self, provider_id: ProviderId, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: Some(reason),
            error: None,
            elapsed: None,
            success: false,
        });
    }

    /// Record a failed call.
    pub fn record_error(&mut self, provider_id: ProviderId, error: String, elapsed: Duration) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: Some(error),
            elapsed: Some(elapsed),
            success: false,
        });
    }

    /// Record a successful call.
    pub fn record_success(&mut self, provider_id: ProviderId, elapsed: Duration) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: None,
            elapsed: Some(elapsed),
            success: true,
        });
    }

    /// Number of actual extraction calls made (skips don't count).
    pub fn call_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.skipped.is_none()).count()
    }

    /// Providers whose calls failed, in order.
    pub fn failed_providers(&self) -> Vec<&ProviderId> {
        self.attempts
            .iter()
            .filter(|a| a.error.is_some())
            .map(|a| &a.provider_id)
            .collect()
    }

    /// Check if any provider succeeded.
    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.provider_id)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({:?})", a.provider_id, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR ({})", a.provider_id, err)
                } else {
                    format!("{}: UNKNOWN", a.provider_id)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Which provider ultimately served a request, and at what cost.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    /// The provider that returned the data.
    pub provider_id: ProviderId,
    /// Total extraction calls made, including the successful one.
    pub attempts: usize,
    /// Latency of the winning call.
    pub latency: Duration,
    /// When the result was produced.
    pub fetched_at: DateTime<Utc>,
}

/// A validated, quality-scored response to a [`StandardQuery`].
///
/// Built once at the end of the pipeline; never mutated after return.
///
/// [`StandardQuery`]: super::query::StandardQuery
#[derive(Clone, Debug)]
pub struct StandardResult {
    /// The transformed tabular payload. Empty on failure.
    pub data: DataTable,
    /// Original column name -> canonical column name, for columns that
    /// were renamed by the field mapping engine.
    pub column_mapping: HashMap<String, String>,
    /// Which provider served the request. `None` on total failure.
    pub source: Option<SourceInfo>,
    /// Completeness/type-consistency score in `[0, 1]`. Zero on failure.
    pub quality_score: f64,
    /// Terminal error message when the request failed.
    pub error: Option<String>,
    /// Per-candidate account of the failover pass.
    pub failover: FailoverReport,
}

impl StandardResult {
    /// Whether the request produced data.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.source.is_some()
    }

    /// Build a failure result carrying the failover account.
    pub fn failure(error: String, failover: FailoverReport) -> Self {
        Self {
            data: DataTable::default(),
            column_mapping: HashMap::new(),
            source: None,
            quality_score: 0.0,
            error: Some(error),
            failover,
        }
    }
}
