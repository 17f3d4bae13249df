//! Intelligent routing engine.
//!
//! The engine turns a capability-filtered candidate list into a ranked
//! failover order. Three modes exist:
//!
//! - **Composite** (default): every candidate gets a weighted score from
//!   five components (health, recent history, load balance, context match,
//!   learning adjustment) and the list is sorted by score.
//! - **Strategy**: a single configured [`RoutingStrategy`] picks the head
//!   of the order; the remaining candidates keep their incoming order.
//! - **Dynamic**: the strategy kind is chosen per request from its shape,
//!   biased by tracked per-strategy success rates.
//!
//! Decisions are cached for a short TTL keyed by the candidate set and
//! request context, so bursts of identical queries don't re-rank.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::models::QueryPriority;
use crate::registry::{MetricsView, ProviderSnapshot};
use crate::routing::strategy::{
    dynamic_strategy, CircuitAwareStrategy, HealthBasedStrategy, PriorityStrategy,
    RoundRobinStrategy, RouteRequest, RoutingStrategy, StrategyKind,
    WeightedRoundRobinStrategy,
};

/// Relative weights of the five composite score components.
///
/// Weights are clamped to `[0, 1]` and normalized to sum to one before
/// use, so callers may express them in any consistent scale.
#[derive(Clone, Copy, Debug)]
pub struct ScoreWeights {
    /// Current composite health score.
    pub health: f64,
    /// Recency-weighted success over the last N outcomes.
    pub history: f64,
    /// In-flight load relative to the peer average.
    pub load: f64,
    /// Fit between request context and provider declaration.
    pub context: f64,
    /// Bounded success-rate trend adjustment.
    pub learning: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            health: 0.3,
            history: 0.25,
            load: 0.2,
            context: 0.15,
            learning: 0.1,
        }
    }
}

impl ScoreWeights {
    fn normalized(self) -> Self {
        let h = self.health.clamp(0.0, 1.0);
        let hi = self.history.clamp(0.0, 1.0);
        let l = self.load.clamp(0.0, 1.0);
        let c = self.context.clamp(0.0, 1.0);
        let le = self.learning.clamp(0.0, 1.0);
        let sum = h + hi + l + c + le;
        if sum <= f64::EPSILON {
            warn!("Routing score weights sum to zero, using defaults");
            return Self::default();
        }
        Self {
            health: h / sum,
            history: hi / sum,
            load: l / sum,
            context: c / sum,
            learning: le / sum,
        }
    }
}

/// How the engine orders candidates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RouteMode {
    /// Weighted multi-component scoring.
    Composite,
    /// One fixed strategy picks the head of the order.
    Strategy(StrategyKind),
    /// Strategy kind chosen per request, biased by tracked performance.
    Dynamic,
}

/// Engine tuning knobs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Ordering mode.
    pub mode: RouteMode,
    /// Composite score component weights.
    pub weights: ScoreWeights,
    /// Outcomes per provider kept for the history component.
    pub history_len: usize,
    /// How long a routing decision stays cached.
    pub cache_ttl: Duration,
    /// Maximum cached decisions before oldest-first eviction.
    pub cache_capacity: usize,
    /// Bound on the learning trend adjustment.
    pub learning_clamp: f64,
    /// Minimum samples before a strategy's weight is renormalized.
    pub strategy_min_samples: u64,
    /// Floor for renormalized strategy weights.
    pub strategy_floor: f64,
    /// Ceiling for renormalized strategy weights.
    pub strategy_ceiling: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: RouteMode::Composite,
            weights: ScoreWeights::default(),
            history_len: 20,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1024,
            learning_clamp: 0.2,
            strategy_min_samples: 20,
            strategy_floor: 0.05,
            strategy_ceiling: 0.95,
        }
    }
}

/// A ranked failover order plus the strategy that produced it.
#[derive(Clone, Debug)]
pub struct RouteDecision {
    /// Providers in the order they should be attempted.
    pub ranked: Vec<String>,
    /// Name of the strategy (or "composite") that produced the order.
    pub strategy: &'static str,
}

struct CachedDecision {
    decision: RouteDecision,
    at: Instant,
}

#[derive(Clone, Debug, Default)]
struct StrategyPerf {
    uses: u64,
    successes: u64,
    weight: f64,
}

impl StrategyPerf {
    fn success_rate(&self) -> f64 {
        if self.uses == 0 {
            return 0.5;
        }
        self.successes as f64 / self.uses as f64
    }
}

/// Ranks capability-filtered candidates into a failover order.
pub struct RoutingEngine {
    config: EngineConfig,
    strategies: HashMap<StrategyKind, Box<dyn RoutingStrategy>>,
    /// Recent outcomes per provider, newest at the back.
    history: Mutex<HashMap<String, VecDeque<bool>>>,
    cache: Mutex<HashMap<String, CachedDecision>>,
    perf: Mutex<HashMap<StrategyKind, StrategyPerf>>,
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingEngine {
    /// Create an engine with default configuration (composite mode).
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(mut config: EngineConfig) -> Self {
        config.weights = config.weights.normalized();
        config.learning_clamp = config.learning_clamp.clamp(0.0, 0.5);
        config.history_len = config.history_len.clamp(2, 1000);

        let mut strategies: HashMap<StrategyKind, Box<dyn RoutingStrategy>> = HashMap::new();
        strategies.insert(StrategyKind::Priority, Box::new(PriorityStrategy));
        strategies.insert(StrategyKind::RoundRobin, Box::new(RoundRobinStrategy::new()));
        strategies.insert(
            StrategyKind::WeightedRoundRobin,
            Box::new(WeightedRoundRobinStrategy::new()),
        );
        strategies.insert(StrategyKind::HealthBased, Box::new(HealthBasedStrategy));
        strategies.insert(
            StrategyKind::CircuitAware,
            Box::new(CircuitAwareStrategy::new()),
        );

        let initial = 1.0 / StrategyKind::ALL.len() as f64;
        let perf = StrategyKind::ALL
            .iter()
            .map(|kind| {
                (
                    *kind,
                    StrategyPerf {
                        weight: initial,
                        ..StrategyPerf::default()
                    },
                )
            })
            .collect();

        Self {
            config,
            strategies,
            history: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            perf: Mutex::new(perf),
        }
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<bool>>> {
        self.history.lock().unwrap_or_else(|poisoned| {
            warn!("Routing history lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedDecision>> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            warn!("Routing cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_perf(&self) -> std::sync::MutexGuard<'_, HashMap<StrategyKind, StrategyPerf>> {
        self.perf.lock().unwrap_or_else(|poisoned| {
            warn!("Strategy performance lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Rank `candidates` into a failover order for `request`.
    ///
    /// Returns an empty order when `candidates` is empty. Identical inputs
    /// within the cache TTL return the cached decision.
    pub fn route(
        &self,
        candidates: &[String],
        request: &RouteRequest,
        metrics: &MetricsView,
    ) -> RouteDecision {
        if candidates.is_empty() {
            return RouteDecision {
                ranked: Vec::new(),
                strategy: "none",
            };
        }

        let key = Self::cache_key(candidates, request);
        {
            let mut cache = self.lock_cache();
            if let Some(entry) = cache.get(&key) {
                if entry.at.elapsed() < self.config.cache_ttl {
                    debug!("Routing cache hit for {}", key);
                    return entry.decision.clone();
                }
                cache.remove(&key);
            }
        }

        let decision = match self.config.mode {
            RouteMode::Composite => self.rank_composite(candidates, request, metrics),
            RouteMode::Strategy(kind) => self.rank_with(kind, candidates, request, metrics),
            RouteMode::Dynamic => {
                let kind = self.pick_dynamic(request, candidates.len());
                self.rank_with(kind, candidates, request, metrics)
            }
        };

        let mut cache = self.lock_cache();
        if cache.len() >= self.config.cache_capacity {
            // Evict the oldest entry.
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, entry)| entry.at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            key,
            CachedDecision {
                decision: decision.clone(),
                at: Instant::now(),
            },
        );

        decision
    }

    /// Convenience wrapper returning only the first choice.
    pub fn select(
        &self,
        candidates: &[String],
        request: &RouteRequest,
        metrics: &MetricsView,
    ) -> Option<String> {
        self.route(candidates, request, metrics).ranked.first().cloned()
    }

    fn cache_key(candidates: &[String], request: &RouteRequest) -> String {
        let mut sorted: Vec<&str> = candidates.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        format!(
            "{}|{:?}|{:?}|{:?}|{:?}",
            sorted.join(","),
            request.data_type,
            request.asset_type,
            request.market,
            request.priority
        )
    }

    fn rank_composite(
        &self,
        candidates: &[String],
        request: &RouteRequest,
        metrics: &MetricsView,
    ) -> RouteDecision {
        let history = self.lock_history();
        let peer_avg = Self::peer_average_load(candidates, metrics);

        let mut scored: Vec<(f64, &String)> = candidates
            .iter()
            .map(|id| {
                let score = metrics
                    .get(id)
                    .map(|snap| {
                        self.composite_score(snap, request, peer_avg, history.get(id))
                    })
                    .unwrap_or(0.0);
                (score, id)
            })
            .collect();
        drop(history);

        // Highest score first; ties break by id for determinism.
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(b))
        });

        RouteDecision {
            ranked: scored.into_iter().map(|(_, id)| id.clone()).collect(),
            strategy: "composite",
        }
    }

    fn rank_with(
        &self,
        kind: StrategyKind,
        candidates: &[String],
        request: &RouteRequest,
        metrics: &MetricsView,
    ) -> RouteDecision {
        let head = self
            .strategies
            .get(&kind)
            .and_then(|s| s.select(candidates, request, metrics));

        let ranked = match head {
            Some(first) => {
                let mut order = Vec::with_capacity(candidates.len());
                order.push(first.clone());
                order.extend(candidates.iter().filter(|id| **id != first).cloned());
                order
            }
            None => candidates.to_vec(),
        };

        RouteDecision {
            ranked,
            strategy: kind.name(),
        }
    }

    /// Rule-based kind choice, overridable by a clearly dominant tracked
    /// strategy.
    fn pick_dynamic(&self, request: &RouteRequest, candidate_count: usize) -> StrategyKind {
        let rule_kind = dynamic_strategy(request, candidate_count);
        let perf = self.lock_perf();

        StrategyKind::ALL
            .iter()
            .copied()
            .max_by(|a, b| {
                let score = |kind: StrategyKind| {
                    let affinity = if kind == rule_kind { 0.5 } else { 0.0 };
                    affinity + perf.get(&kind).map(|p| p.weight).unwrap_or(0.0)
                };
                score(*a)
                    .partial_cmp(&score(*b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(rule_kind)
    }

    fn peer_average_load(candidates: &[String], metrics: &MetricsView) -> f64 {
        if candidates.is_empty() {
            return 0.0;
        }
        let total: f64 = candidates
            .iter()
            .map(|id| {
                metrics
                    .get(id)
                    .map(|s| f64::from(s.current_load))
                    .unwrap_or(0.0)
            })
            .sum();
        total / candidates.len() as f64
    }

    fn composite_score(
        &self,
        snap: &ProviderSnapshot,
        request: &RouteRequest,
        peer_avg_load: f64,
        history: Option<&VecDeque<bool>>,
    ) -> f64 {
        let w = self.config.weights;
        w.health * snap.health_score
            + w.history * self.history_component(history)
            + w.load * Self::load_component(snap, peer_avg_load)
            + w.context * Self::context_component(snap, request)
            + w.learning * self.learning_component(history)
    }

    /// Recency-weighted success over the most recent outcomes; neutral 0.5
    /// when no history exists.
    fn history_component(&self, history: Option<&VecDeque<bool>>) -> f64 {
        let Some(outcomes) = history else {
            return 0.5;
        };
        let recent: Vec<bool> = outcomes
            .iter()
            .rev()
            .take(self.config.history_len)
            .copied()
            .collect();
        if recent.is_empty() {
            return 0.5;
        }

        // Newest outcome carries the largest weight.
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (age, success) in recent.iter().enumerate() {
            let weight = (recent.len() - age) as f64;
            total += weight;
            if *success {
                weighted += weight;
            }
        }
        weighted / total
    }

    /// Inverse in-flight load relative to the peer average; idle providers
    /// score 1.0.
    fn load_component(snap: &ProviderSnapshot, peer_avg: f64) -> f64 {
        ((peer_avg + 1.0) / (f64::from(snap.current_load) + 1.0)).min(1.0)
    }

    /// Context fit. Candidates arrive capability-filtered, so the
    /// capability axis is satisfied by construction; urgent requests
    /// additionally favor providers with a strong declared priority.
    fn context_component(snap: &ProviderSnapshot, request: &RouteRequest) -> f64 {
        if request.priority >= QueryPriority::High {
            0.5 + 0.5 * (1.0 - f64::from(snap.priority) / 255.0)
        } else {
            0.75
        }
    }

    /// Bounded trend adjustment: recent success rate minus the prior
    /// window's, mapped around 0.5.
    fn learning_component(&self, history: Option<&VecDeque<bool>>) -> f64 {
        let Some(outcomes) = history else {
            return 0.5;
        };
        if outcomes.len() < 4 {
            return 0.5;
        }

        let split = outcomes.len() / 2;
        let rate = |slice: &[bool]| -> f64 {
            if slice.is_empty() {
                return 0.5;
            }
            slice.iter().filter(|s| **s).count() as f64 / slice.len() as f64
        };
        let flat: Vec<bool> = outcomes.iter().copied().collect();
        let prior = rate(&flat[..split]);
        let recent = rate(&flat[split..]);

        let delta = (recent - prior).clamp(-self.config.learning_clamp, self.config.learning_clamp);
        0.5 + delta
    }

    /// Record the outcome of an extraction attempt against `provider_id`.
    pub fn record_outcome(&self, provider_id: &str, success: bool) {
        let mut history = self.lock_history();
        let outcomes = history.entry(provider_id.to_string()).or_default();
        outcomes.push_back(success);
        // Keep one extra window so the learning trend has a prior to
        // compare against.
        while outcomes.len() > self.config.history_len * 2 {
            outcomes.pop_front();
        }
    }

    /// Record whether a routing decision produced by `strategy` succeeded,
    /// renormalizing strategy weights once enough samples accumulate.
    pub fn record_strategy_outcome(&self, strategy: &str, success: bool) {
        let Some(kind) = StrategyKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == strategy)
        else {
            // Composite mode outcomes have no per-strategy weight to tune.
            return;
        };

        let mut perf = self.lock_perf();
        {
            let entry = perf.entry(kind).or_default();
            entry.uses += 1;
            if success {
                entry.successes += 1;
            }
        }

        let ready = perf
            .get(&kind)
            .map(|p| p.uses >= self.config.strategy_min_samples)
            .unwrap_or(false);
        if !ready {
            return;
        }

        // Re-derive each weight from its success rate, then normalize.
        let floor = self.config.strategy_floor;
        let ceiling = self.config.strategy_ceiling;
        for entry in perf.values_mut() {
            entry.weight = entry.success_rate().clamp(floor, ceiling);
        }
        let sum: f64 = perf.values().map(|p| p.weight).sum();
        if sum > f64::EPSILON {
            for entry in perf.values_mut() {
                entry.weight /= sum;
            }
        }
    }

    /// Current tracked weight of a strategy, if known.
    pub fn strategy_weight(&self, kind: StrategyKind) -> Option<f64> {
        self.lock_perf().get(&kind).map(|p| p.weight)
    }

    /// Number of decisions currently cached.
    pub fn cached_decisions(&self) -> usize {
        self.lock_cache().len()
    }

    /// Drop all cached decisions.
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{CircuitState, DegradationLevel};
    use crate::models::{AssetType, DataType};
    use crate::registry::HealthStatus;

    fn snap(id: &str, health: f64) -> ProviderSnapshot {
        ProviderSnapshot {
            provider_id: id.to_string(),
            status: HealthStatus::Active,
            priority: 10,
            weight: 1.0,
            total_calls: 50,
            success_rate: health,
            avg_response_ms: 100.0,
            quality_ewma: health,
            availability_ewma: health,
            current_load: 0,
            health_score: health,
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
    fn test_composite_ranks_healthier_first() {
        let engine = RoutingEngine::new();
        let mut metrics = MetricsView::new();
        metrics.insert("WEAK".into(), snap("WEAK", 0.3));
        metrics.insert("STRONG".into(), snap("STRONG", 0.95));

        let decision = engine.route(&ids(&["WEAK", "STRONG"]), &request(), &metrics);
        assert_eq!(decision.strategy, "composite");
        assert_eq!(decision.ranked, vec!["STRONG".to_string(), "WEAK".to_string()]);
    }

    #[test]
    fn test_composite_ties_break_by_id() {
        let engine = RoutingEngine::new();
        let mut metrics = MetricsView::new();
        metrics.insert("B".into(), snap("B", 0.8));
        metrics.insert("A".into(), snap("A", 0.8));

        let decision = engine.route(&ids(&["B", "A"]), &request(), &metrics);
        assert_eq!(decision.ranked, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_empty_candidates_yield_empty_order() {
        let engine = RoutingEngine::new();
        let decision = engine.route(&[], &request(), &MetricsView::new());
        assert!(decision.ranked.is_empty());
    }

    #[test]
    fn test_history_shifts_ranking() {
        let engine = RoutingEngine::new();
        let mut metrics = MetricsView::new();
        metrics.insert("A".into(), snap("A", 0.8));
        metrics.insert("B".into(), snap("B", 0.8));

        // A keeps failing, B keeps succeeding.
        for _ in 0..20 {
            engine.record_outcome("A", false);
            engine.record_outcome("B", true);
        }

        let decision = engine.route(&ids(&["A", "B"]), &request(), &metrics);
        assert_eq!(decision.ranked.first(), Some(&"B".to_string()));
    }

    #[test]
    fn test_loaded_provider_ranks_below_idle_peer() {
        let engine = RoutingEngine::new();
        let mut metrics = MetricsView::new();
        let mut busy = snap("BUSY", 0.8);
        busy.current_load = 50;
        metrics.insert("BUSY".into(), busy);
        metrics.insert("IDLE".into(), snap("IDLE", 0.8));

        let decision = engine.route(&ids(&["BUSY", "IDLE"]), &request(), &metrics);
        assert_eq!(decision.ranked.first(), Some(&"IDLE".to_string()));
    }

    #[test]
    fn test_high_priority_request_favors_low_priority_provider() {
        let engine = RoutingEngine::new();
        let mut metrics = MetricsView::new();
        let mut primary = snap("PRIMARY", 0.8);
        primary.priority = 1;
        metrics.insert("PRIMARY".into(), primary);
        let mut backup = snap("BACKUP", 0.8);
        backup.priority = 200;
        metrics.insert("BACKUP".into(), backup);

        let mut req = request();
        req.priority = QueryPriority::Critical;
        let decision = engine.route(&ids(&["BACKUP", "PRIMARY"]), &req, &metrics);
        assert_eq!(decision.ranked.first(), Some(&"PRIMARY".to_string()));
    }

    #[test]
    fn test_decision_cache_hit_and_expiry() {
        let engine = RoutingEngine::with_config(EngineConfig {
            cache_ttl: Duration::from_millis(30),
            ..EngineConfig::default()
        });
        let mut metrics = MetricsView::new();
        metrics.insert("A".into(), snap("A", 0.9));

        let first = engine.route(&ids(&["A"]), &request(), &metrics);
        assert_eq!(engine.cached_decisions(), 1);

        let cached = engine.route(&ids(&["A"]), &request(), &metrics);
        assert_eq!(cached.ranked, first.ranked);

        std::thread::sleep(Duration::from_millis(40));
        engine.route(&ids(&["A"]), &request(), &metrics);
        assert_eq!(engine.cached_decisions(), 1);
    }

    #[test]
    fn test_cache_capacity_evicts_oldest() {
        let engine = RoutingEngine::with_config(EngineConfig {
            cache_capacity: 2,
            ..EngineConfig::default()
        });
        let mut metrics = MetricsView::new();
        metrics.insert("A".into(), snap("A", 0.9));

        for name in ["ONE", "TWO", "THREE"] {
            let mut req = request();
            req.data_type = DataType::Quote;
            engine.route(&ids(&[name]), &req, &metrics);
        }
        assert!(engine.cached_decisions() <= 2);
    }

    #[test]
    fn test_strategy_mode_puts_pick_first() {
        let engine = RoutingEngine::with_config(EngineConfig {
            mode: RouteMode::Strategy(StrategyKind::Priority),
            ..EngineConfig::default()
        });
        let mut metrics = MetricsView::new();
        let mut low = snap("LOW", 0.5);
        low.priority = 1;
        metrics.insert("LOW".into(), low);
        let mut high = snap("HIGH", 0.9);
        high.priority = 50;
        metrics.insert("HIGH".into(), high);

        let decision = engine.route(&ids(&["HIGH", "LOW"]), &request(), &metrics);
        assert_eq!(decision.strategy, "priority");
        assert_eq!(decision.ranked, vec!["LOW".to_string(), "HIGH".to_string()]);
    }

    #[test]
    fn test_dynamic_mode_uses_health_based_for_urgent() {
        let engine = RoutingEngine::with_config(EngineConfig {
            mode: RouteMode::Dynamic,
            ..EngineConfig::default()
        });
        let mut metrics = MetricsView::new();
        metrics.insert("A".into(), snap("A", 0.9));
        metrics.insert("B".into(), snap("B", 0.8));

        let mut req = request();
        req.priority = QueryPriority::High;
        let decision = engine.route(&ids(&["A", "B"]), &req, &metrics);
        assert_eq!(decision.strategy, "health_based");
    }

    #[test]
    fn test_strategy_weights_renormalize_after_min_samples() {
        let engine = RoutingEngine::with_config(EngineConfig {
            strategy_min_samples: 10,
            ..EngineConfig::default()
        });

        for _ in 0..10 {
            engine.record_strategy_outcome("health_based", true);
        }
        for _ in 0..10 {
            engine.record_strategy_outcome("priority", false);
        }

        let good = engine.strategy_weight(StrategyKind::HealthBased).unwrap();
        let bad = engine.strategy_weight(StrategyKind::Priority).unwrap();
        assert!(good > bad);

        // Weights stay a proper distribution.
        let total: f64 = StrategyKind::ALL
            .iter()
            .filter_map(|k| engine.strategy_weight(*k))
            .sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_learning_component_is_bounded() {
        let engine = RoutingEngine::new();
        let mut outcomes = VecDeque::new();
        for _ in 0..10 {
            outcomes.push_back(false);
        }
        for _ in 0..10 {
            outcomes.push_back(true);
        }
        let value = engine.learning_component(Some(&outcomes));
        assert!(value <= 0.7 + 1e-9);
        assert!(value >= 0.5);

        let mut reversed = VecDeque::new();
        for _ in 0..10 {
            reversed.push_back(true);
        }
        for _ in 0..10 {
            reversed.push_back(false);
        }
        let value = engine.learning_component(Some(&reversed));
        assert!(value >= 0.3 - 1e-9);
        assert!(value <= 0.5);
    }

    #[test]
    fn test_history_is_bounded() {
        let engine = RoutingEngine::with_config(EngineConfig {
            history_len: 5,
            ..EngineConfig::default()
        });
        for _ in 0..100 {
            engine.record_outcome("A", true);
        }
        let history = engine.lock_history();
        assert_eq!(history.get("A").map(|h| h.len()), Some(10));
    }
}
