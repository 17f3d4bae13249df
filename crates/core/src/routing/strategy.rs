//! Pluggable provider selection strategies.
//!
//! Every strategy implements [`RoutingStrategy`]: a pure function from a
//! candidate list, a request context, and a read-only metrics snapshot to
//! at most one provider id. Round-robin cursors and weighted credits are
//! the only internal state, and ties always break by provider id so that
//! identical inputs yield identical outputs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::debug;

use crate::models::{AssetType, DataType, Market, QueryPriority};
use crate::registry::{MetricsView, ProviderSnapshot};

/// Health score below which round-robin treats a provider as unhealthy.
const DEFAULT_HEALTH_FLOOR: f64 = 0.3;

/// Breaker error rate above which the circuit-aware strategy filters a
/// provider even while its circuit is technically Closed.
const DEFAULT_ERROR_RATE_CEILING: f64 = 0.5;

/// Candidate count at which dynamic selection prefers round-robin.
const SPREAD_CANDIDATE_COUNT: usize = 5;

/// Routing context derived from a query.
#[derive(Clone, Debug)]
pub struct RouteRequest {
    /// Kind of data requested.
    pub data_type: DataType,
    /// Asset classification.
    pub asset_type: AssetType,
    /// Market hint.
    pub market: Option<Market>,
    /// Caller-declared urgency.
    pub priority: QueryPriority,
}

/// A provider selection algorithm.
pub trait RoutingStrategy: Send + Sync {
    /// Stable identifier used for logging and performance tracking.
    fn name(&self) -> &'static str;

    /// Pick one provider from `candidates`, or `None` when the list is
    /// empty (or every candidate is filtered out).
    fn select(
        &self,
        candidates: &[String],
        request: &RouteRequest,
        metrics: &MetricsView,
    ) -> Option<String>;
}

fn snapshot<'a>(metrics: &'a MetricsView, id: &str) -> Option<&'a ProviderSnapshot> {
    metrics.get(id)
}

fn health_of(metrics: &MetricsView, id: &str) -> f64 {
    snapshot(metrics, id).map(|s| s.health_score).unwrap_or(0.0)
}

/// Selects by declared priority; ties broken by health score (descending),
/// then id.
pub struct PriorityStrategy;

impl RoutingStrategy for PriorityStrategy {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn select(
        &self,
        candidates: &[String],
        _request: &RouteRequest,
        metrics: &MetricsView,
    ) -> Option<String> {
        candidates
            .iter()
            .min_by(|a, b| {
                let pa = snapshot(metrics, a).map(|s| s.priority).unwrap_or(u8::MAX);
                let pb = snapshot(metrics, b).map(|s| s.priority).unwrap_or(u8::MAX);
                pa.cmp(&pb)
                    .then_with(|| {
                        let ha = health_of(metrics, a);
                        let hb = health_of(metrics, b);
                        // Higher health first.
                        hb.partial_cmp(&ha).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.cmp(b))
            })
            .cloned()
    }
}

/// Rotates through the healthy subset of candidates.
///
/// Candidates with a health score below the floor are skipped; if none
/// remain, the rotation falls back to the full candidate list.
pub struct RoundRobinStrategy {
    cursor: AtomicUsize,
    health_floor: f64,
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinStrategy {
    /// Create a rotation with the default health floor.
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            health_floor: DEFAULT_HEALTH_FLOOR,
        }
    }

    /// Create a rotation with a custom health floor.
    pub fn with_health_floor(health_floor: f64) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            health_floor,
        }
    }
}

impl RoutingStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(
        &self,
        candidates: &[String],
        _request: &RouteRequest,
        metrics: &MetricsView,
    ) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        let healthy: Vec<&String> = candidates
            .iter()
            .filter(|id| health_of(metrics, id) >= self.health_floor)
            .collect();

        let pool: Vec<&String> = if healthy.is_empty() {
            debug!("RoundRobin: no healthy candidates, rotating over all");
            candidates.iter().collect()
        } else {
            healthy
        };

        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
        Some(pool[slot].clone())
    }
}

/// Classic smooth weighted round-robin.
///
/// Each call credits every candidate with `weight x health`, picks the
/// candidate with the most accumulated credit, then debits the winner by
/// the batch total. Over time each provider is selected in proportion to
/// its effective weight.
pub struct WeightedRoundRobinStrategy {
    credits: Mutex<HashMap<String, f64>>,
}

impl Default for WeightedRoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightedRoundRobinStrategy {
    /// Create an empty credit table.
    pub fn new() -> Self {
        Self {
            credits: Mutex::new(HashMap::new()),
        }
    }
}

impl RoutingStrategy for WeightedRoundRobinStrategy {
    fn name(&self) -> &'static str {
        "weighted_round_robin"
    }

    fn select(
        &self,
        candidates: &[String],
        _request: &RouteRequest,
        metrics: &MetricsView,
    ) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        let mut credits = self.credits.lock().unwrap_or_else(|p| p.into_inner());

        let mut batch_total = 0.0;
        for id in candidates {
            let weight = snapshot(metrics, id).map(|s| s.weight).unwrap_or(1.0);
            let effective = weight * health_of(metrics, id).max(0.01);
            batch_total += effective;
            *credits.entry(id.clone()).or_insert(0.0) += effective;
        }

        let chosen = candidates
            .iter()
            .max_by(|a, b| {
                let ca = credits.get(*a).copied().unwrap_or(0.0);
                let cb = credits.get(*b).copied().unwrap_or(0.0);
                ca.partial_cmp(&cb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Prefer the smaller id on a credit tie.
                    .then_with(|| b.cmp(a))
            })?
            .clone();

        if let Some(credit) = credits.get_mut(&chosen) {
            *credit -= batch_total;
        }

        Some(chosen)
    }
}

/// Scores candidates on health, success rate, and latency.
///
/// `score = 0.4 x health + 0.4 x successRate + 0.2 x normalizedInverseLatency`
/// where the fastest candidate's latency term is 1.0.
pub struct HealthBasedStrategy;

impl HealthBasedStrategy {
    fn score(metrics: &MetricsView, id: &str, fastest_ms: f64) -> f64 {
        let Some(snap) = snapshot(metrics, id) else {
            return 0.0;
        };
        let latency_term = (fastest_ms + 1.0) / (snap.avg_response_ms + 1.0);
        0.4 * snap.health_score + 0.4 * snap.success_rate + 0.2 * latency_term.min(1.0)
    }

    fn fastest_ms(candidates: &[String], metrics: &MetricsView) -> f64 {
        candidates
            .iter()
            .filter_map(|id| snapshot(metrics, id).map(|s| s.avg_response_ms))
            .fold(f64::INFINITY, f64::min)
            .min(1_000_000.0)
            .max(0.0)
    }
}

impl RoutingStrategy for HealthBasedStrategy {
    fn name(&self) -> &'static str {
        "health_based"
    }

    fn select(
        &self,
        candidates: &[String],
        _request: &RouteRequest,
        metrics: &MetricsView,
    ) -> Option<String> {
        let fastest = Self::fastest_ms(candidates, metrics);
        candidates
            .iter()
            .max_by(|a, b| {
                let sa = Self::score(metrics, a, fastest);
                let sb = Self::score(metrics, b, fastest);
                sa.partial_cmp(&sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.cmp(a))
            })
            .cloned()
    }
}

/// Health-based selection that pre-filters providers trending toward an
/// open circuit.
///
/// Providers whose breaker-window error rate exceeds the ceiling are
/// dropped even while their circuit is technically Closed. If the filter
/// removes everyone, selection falls back to the unfiltered list rather
/// than failing the request.
pub struct CircuitAwareStrategy {
    error_rate_ceiling: f64,
    inner: HealthBasedStrategy,
}

impl Default for CircuitAwareStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitAwareStrategy {
    /// Create with the default error-rate ceiling.
    pub fn new() -> Self {
        Self {
            error_rate_ceiling: DEFAULT_ERROR_RATE_CEILING,
            inner: HealthBasedStrategy,
        }
    }

    /// Create with a custom error-rate ceiling.
    pub fn with_ceiling(error_rate_ceiling: f64) -> Self {
        Self {
            error_rate_ceiling,
            inner: HealthBasedStrategy,
        }
    }
}

impl RoutingStrategy for CircuitAwareStrategy {
    fn name(&self) -> &'static str {
        "circuit_aware"
    }

    fn select(
        &self,
        candidates: &[String],
        request: &RouteRequest,
        metrics: &MetricsView,
    ) -> Option<String> {
        let safe: Vec<String> = candidates
            .iter()
            .filter(|id| {
                snapshot(metrics, id)
                    .map(|s| s.breaker_failure_rate < self.error_rate_ceiling)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if safe.is_empty() {
            debug!("CircuitAware: every candidate over error ceiling, delegating unfiltered");
            self.inner.select(candidates, request, metrics)
        } else {
            self.inner.select(&safe, request, metrics)
        }
    }
}

/// Identifier of a built-in strategy.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StrategyKind {
    /// [`PriorityStrategy`].
    Priority,
    /// [`RoundRobinStrategy`].
    RoundRobin,
    /// [`WeightedRoundRobinStrategy`].
    WeightedRoundRobin,
    /// [`HealthBasedStrategy`].
    HealthBased,
    /// [`CircuitAwareStrategy`].
    CircuitAware,
}

impl StrategyKind {
    /// Stable name matching the strategy's `name()`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::RoundRobin => "round_robin",
            Self::WeightedRoundRobin => "weighted_round_robin",
            Self::HealthBased => "health_based",
            Self::CircuitAware => "circuit_aware",
        }
    }

    /// All built-in kinds.
    pub const ALL: &'static [StrategyKind] = &[
        StrategyKind::Priority,
        StrategyKind::RoundRobin,
        StrategyKind::WeightedRoundRobin,
        StrategyKind::HealthBased,
        StrategyKind::CircuitAware,
    ];
}

/// Pick a strategy kind from the request shape when none is configured.
///
/// High-urgency requests go health-based; large candidate sets under low
/// urgency are spread with round-robin; everything else follows declared
/// priority.
pub fn dynamic_strategy(request: &RouteRequest, candidate_count: usize) -> StrategyKind {
    if request.priority >= QueryPriority::High {
        StrategyKind::HealthBased
    } else if candidate_count >= SPREAD_CANDIDATE_COUNT && request.priority == QueryPriority::Low {
        StrategyKind::RoundRobin
    } else {
        StrategyKind::Priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{CircuitState, DegradationLevel};
    use crate::registry::HealthStatus;

    fn snap(id: &str, priority: u8) -> ProviderSnapshot {
        ProviderSnapshot {
            provider_id: id.to_string(),
            status: HealthStatus::Active,
            priority,
            weight: 1.0,
            total_calls: 100,
            success_rate: 0.9,
            avg_response_ms: 100.0,
            quality_ewma: 0.9,
            availability_ewma: 0.9,
            current_load: 0,
            health_score: 0.9,
            breaker_state: CircuitState::Closed,
            breaker_failure_rate: 0.0,
            degradation: DegradationLevel::None,
        }
    }

    fn request() -> RouteRequest {
        RouteRequest {
            data_type: DataType::Kline,
            asset_type: AssetType::Stock,
            market: None,
            priority: QueryPriority::Normal,
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_priority_strategy_prefers_low_priority_value() {
        let mut metrics = MetricsView::new();
        metrics.insert("A".into(), snap("A", 20));
        metrics.insert("B".into(), snap("B", 5));
        metrics.insert("C".into(), snap("C", 10));

        let strategy = PriorityStrategy;
        assert_eq!(
            strategy.select(&ids(&["A", "B", "C"]), &request(), &metrics),
            Some("B".to_string())
        );
    }

    #[test]
    fn test_priority_ties_break_by_health_then_id() {
        let mut metrics = MetricsView::new();
        let mut a = snap("A", 10);
        a.health_score = 0.5;
        let mut b = snap("B", 10);
        b.health_score = 0.9;
        metrics.insert("A".into(), a);
        metrics.insert("B".into(), b);

        let strategy = PriorityStrategy;
        assert_eq!(
            strategy.select(&ids(&["A", "B"]), &request(), &metrics),
            Some("B".to_string())
        );

        // Equal health: smaller id wins.
        let mut metrics = MetricsView::new();
        metrics.insert("A".into(), snap("A", 10));
        metrics.insert("B".into(), snap("B", 10));
        assert_eq!(
            strategy.select(&ids(&["B", "A"]), &request(), &metrics),
            Some("A".to_string())
        );
    }

    #[test]
    fn test_round_robin_rotates_over_healthy() {
        let mut metrics = MetricsView::new();
        metrics.insert("A".into(), snap("A", 1));
        metrics.insert("B".into(), snap("B", 1));
        let mut sick = snap("C", 1);
        sick.health_score = 0.1;
        metrics.insert("C".into(), sick);

        let strategy = RoundRobinStrategy::new();
        let candidates = ids(&["A", "B", "C"]);

        let first = strategy.select(&candidates, &request(), &metrics).unwrap();
        let second = strategy.select(&candidates, &request(), &metrics).unwrap();
        let third = strategy.select(&candidates, &request(), &metrics).unwrap();

        // C is below the floor, so the rotation covers A and B only.
        assert_eq!(first, "A");
        assert_eq!(second, "B");
        assert_eq!(third, "A");
    }

    #[test]
    fn test_round_robin_falls_back_to_all_when_none_healthy() {
        let mut metrics = MetricsView::new();
        let mut a = snap("A", 1);
        a.health_score = 0.05;
        let mut b = snap("B", 1);
        b.health_score = 0.1;
        metrics.insert("A".into(), a);
        metrics.insert("B".into(), b);

        let strategy = RoundRobinStrategy::new();
        assert!(strategy
            .select(&ids(&["A", "B"]), &request(), &metrics)
            .is_some());
    }

    #[test]
    fn test_weighted_round_robin_favors_heavy_weight() {
        let mut metrics = MetricsView::new();
        let mut heavy = snap("HEAVY", 1);
        heavy.weight = 3.0;
        metrics.insert("HEAVY".into(), heavy);
        let mut light = snap("LIGHT", 1);
        light.weight = 1.0;
        metrics.insert("LIGHT".into(), light);

        let strategy = WeightedRoundRobinStrategy::new();
        let candidates = ids(&["HEAVY", "LIGHT"]);

        let mut picks: HashMap<String, usize> = HashMap::new();
        for _ in 0..40 {
            let choice = strategy.select(&candidates, &request(), &metrics).unwrap();
            *picks.entry(choice).or_default() += 1;
        }

        let heavy_picks = picks.get("HEAVY").copied().unwrap_or(0);
        let light_picks = picks.get("LIGHT").copied().unwrap_or(0);
        assert_eq!(heavy_picks, 30);
        assert_eq!(light_picks, 10);
    }

    #[test]
    fn test_health_based_picks_best_composite() {
        let mut metrics = MetricsView::new();
        let mut good = snap("GOOD", 1);
        good.health_score = 0.95;
        good.success_rate = 0.99;
        good.avg_response_ms = 50.0;
        metrics.insert("GOOD".into(), good);

        let mut bad = snap("BAD", 1);
        bad.health_score = 0.4;
        bad.success_rate = 0.5;
        bad.avg_response_ms = 2000.0;
        metrics.insert("BAD".into(), bad);

        let strategy = HealthBasedStrategy;
        assert_eq!(
            strategy.select(&ids(&["BAD", "GOOD"]), &request(), &metrics),
            Some("GOOD".to_string())
        );
    }

    #[test]
    fn test_health_based_is_deterministic() {
        let mut metrics = MetricsView::new();
        metrics.insert("A".into(), snap("A", 1));
        metrics.insert("B".into(), snap("B", 1));

        let strategy = HealthBasedStrategy;
        let first = strategy.select(&ids(&["B", "A"]), &request(), &metrics);
        for _ in 0..10 {
            assert_eq!(strategy.select(&ids(&["B", "A"]), &request(), &metrics), first);
        }
    }

    #[test]
    fn test_circuit_aware_filters_high_error_rate() {
        let mut metrics = MetricsView::new();
        let mut flaky = snap("FLAKY", 1);
        flaky.breaker_failure_rate = 0.8;
        flaky.health_score = 0.99;
        flaky.success_rate = 1.0;
        flaky.avg_response_ms = 1.0;
        metrics.insert("FLAKY".into(), flaky);

        let mut steady = snap("STEADY", 1);
        steady.breaker_failure_rate = 0.1;
        steady.health_score = 0.7;
        metrics.insert("STEADY".into(), steady);

        let strategy = CircuitAwareStrategy::new();
        assert_eq!(
            strategy.select(&ids(&["FLAKY", "STEADY"]), &request(), &metrics),
            Some("STEADY".to_string())
        );
    }

    #[test]
    fn test_circuit_aware_falls_back_when_all_filtered() {
        let mut metrics = MetricsView::new();
        let mut flaky = snap("FLAKY", 1);
        flaky.breaker_failure_rate = 0.9;
        metrics.insert("FLAKY".into(), flaky);

        let strategy = CircuitAwareStrategy::new();
        assert_eq!(
            strategy.select(&ids(&["FLAKY"]), &request(), &metrics),
            Some("FLAKY".to_string())
        );
    }

    #[test]
    fn test_empty_candidates_select_none() {
        let metrics = MetricsView::new();
        let req = request();
        let empty: Vec<String> = Vec::new();

        assert!(PriorityStrategy.select(&empty, &req, &metrics).is_none());
        assert!(RoundRobinStrategy::new().select(&empty, &req, &metrics).is_none());
        assert!(WeightedRoundRobinStrategy::new()
            .select(&empty, &req, &metrics)
            .is_none());
        assert!(HealthBasedStrategy.select(&empty, &req, &metrics).is_none());
        assert!(CircuitAwareStrategy::new().select(&empty, &req, &metrics).is_none());
    }

    #[test]
    fn test_dynamic_strategy_rules() {
        let mut req = request();
        req.priority = QueryPriority::High;
        assert_eq!(dynamic_strategy(&req, 2), StrategyKind::HealthBased);

        req.priority = QueryPriority::Low;
        assert_eq!(dynamic_strategy(&req, 8), StrategyKind::RoundRobin);

        req.priority = QueryPriority::Normal;
        assert_eq!(dynamic_strategy(&req, 3), StrategyKind::Priority);
    }
}
