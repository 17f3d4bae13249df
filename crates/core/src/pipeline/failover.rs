//! Extract-with-failover stage.
//!
//! Walks the ranked candidate order, gating each attempt on the
//! provider's circuit breaker and on the request's remaining time and
//! retry budgets. Every touch of a candidate, call or skip, lands in the
//! [`FailoverReport`] so callers can reconstruct exactly what happened.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::errors::{ExtractError, RetryClass};
use crate::models::{DataTable, FailoverReport, SkipReason};
use crate::provider::ExtractRequest;
use crate::registry::CapabilityRegistry;

/// A successful failover pass.
pub(crate) struct FailoverOutcome {
    /// Raw table from the winning provider.
    pub table: DataTable,
    /// The provider that served the request.
    pub provider_id: String,
    /// Latency of the winning call.
    pub latency: Duration,
    /// Account of every candidate touched.
    pub report: FailoverReport,
}

/// Walk the ranked candidates until one succeeds.
///
/// `time_budget` bounds the whole pass; `retry_budget` bounds the number
/// of actual extraction calls. Candidates skipped by either budget or by
/// an open breaker are recorded but not penalized.
///
/// On success the winning call is NOT yet recorded in the registry; the
/// pipeline records it together with the transform stage's quality score.
/// Failed calls are penalized here, where the failure kind is known.
pub(crate) async fn run(
    registry: &CapabilityRegistry,
    ranked: &[String],
    request: &ExtractRequest,
    time_budget: Duration,
    retry_budget: u32,
) -> Result<FailoverOutcome, (ExtractError, FailoverReport)> {
    let started = Instant::now();
    let mut report = FailoverReport::new();
    let mut attempted: Vec<String> = Vec::new();
    let mut messages: Vec<String> = Vec::new();
    let mut calls: u32 = 0;

    for (position, provider_id) in ranked.iter().enumerate() {
        if calls >= retry_budget {
            let skipped = ranked.len() - position;
            debug!(
                "Failover: retry budget spent, skipping {} remaining candidate(s)",
                skipped
            );
            for id in &ranked[position..] {
                report.record_skip(id.clone().into(), SkipReason::BudgetExhausted);
            }
            break;
        }

        let Some(remaining) = time_budget.checked_sub(started.elapsed()).filter(|r| !r.is_zero())
        else {
            let skipped = ranked.len() - position;
            debug!(
                "Failover: time budget spent, skipping {} remaining candidate(s)",
                skipped
            );
            for id in &ranked[position..] {
                report.record_skip(id.clone().into(), SkipReason::BudgetExhausted);
            }
            break;
        };

        let Some(breaker) = registry.breaker(provider_id) else {
            report.record_skip(provider_id.clone().into(), SkipReason::Unhealthy);
            continue;
        };
        if !breaker.can_execute() {
            debug!("Failover: '{}' skipped, circuit open", provider_id);
            report.record_skip(provider_id.clone().into(), SkipReason::CircuitBreakerOpen);
            continue;
        }

        let Some(provider) = registry.provider(provider_id) else {
            report.record_skip(provider_id.clone().into(), SkipReason::Unhealthy);
            continue;
        };

        // Fair share of the remaining budget across the candidates that
        // could still be called, so one slow provider can't starve the
        // rest of the order.
        let slots = (ranked.len() - position)
            .min((retry_budget - calls) as usize)
            .max(1) as u32;
        let attempt_timeout = (remaining / slots).min(request.timeout);
        debug!(
            "Failover: attempting '{}' (timeout {:?})",
            provider_id, attempt_timeout
        );

        registry.begin_call(provider_id);
        let attempt_start = Instant::now();
        let outcome = tokio::time::timeout(attempt_timeout, provider.extract(request)).await;
        let elapsed = attempt_start.elapsed();
        registry.end_call(provider_id);

        calls += 1;
        let latency_ms = elapsed.as_secs_f64() * 1000.0;

        let error = match outcome {
            Ok(Ok(table)) => {
                debug!(
                    "Failover: '{}' succeeded in {:?} ({} rows)",
                    provider_id,
                    elapsed,
                    table.len()
                );
                report.record_success(provider_id.clone().into(), elapsed);
                return Ok(FailoverOutcome {
                    table,
                    provider_id: provider_id.clone(),
                    latency: elapsed,
                    report,
                });
            }
            Ok(Err(error)) => error,
            Err(_) => ExtractError::Timeout {
                provider: provider_id.clone(),
            },
        };

        match error.retry_class() {
            RetryClass::Never => {
                warn!("Failover: terminal error from '{}': {}", provider_id, error);
                report.record_error(provider_id.clone().into(), error.to_string(), elapsed);
                return Err((error, report));
            }
            RetryClass::FailoverWithPenalty => {
                warn!("Failover: '{}' failed ({}), trying next", provider_id, error);
                registry.record_outcome_kind(
                    provider_id,
                    false,
                    latency_ms,
                    None,
                    error.failure_kind(),
                );
                report.record_error(provider_id.clone().into(), error.to_string(), elapsed);
                attempted.push(provider_id.clone());
                messages.push(error.to_string());
            }
            RetryClass::NextProvider => {
                debug!(
                    "Failover: '{}' can't serve this request ({}), trying next",
                    provider_id, error
                );
                report.record_error(provider_id.clone().into(), error.to_string(), elapsed);
                attempted.push(provider_id.clone());
                messages.push(error.to_string());
            }
            RetryClass::CircuitOpen => {
                report.record_skip(provider_id.clone().into(), SkipReason::CircuitBreakerOpen);
            }
        }
    }

    let error = if attempted.is_empty() {
        ExtractError::NoProvidersAvailable
    } else {
        ExtractError::AllProvidersFailed {
            attempted,
            messages,
        }
    };
    warn!("Failover: exhausted, {} ({})", error, report.summary());
    Err((error, report))
}
