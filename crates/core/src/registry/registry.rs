//! Capability registry: provider discovery, indexing, and health tracking.
//!
//! The registry owns everything the router reads:
//! - the provider table (registration/deregistration),
//! - the capability index `(data type, asset type) -> provider ids`,
//! - one [`ProviderMetrics`] record per provider,
//! - one [`CircuitBreaker`] per provider.
//!
//! Provider/index/metrics maps sit behind a single read/write lock since
//! routing reads vastly outnumber registration and metric writes. Breakers
//! live outside that lock, one mutex per provider.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState, DegradationLevel};
use crate::errors::FailureKind;
use crate::models::{AssetType, DataType, Market};
use crate::provider::{Capabilities, DataProvider, HealthCheck};

use super::health::{HealthStatus, ProviderMetrics};
use super::probe::{self, ProbeMethod};

/// Bounds for the background health check interval.
const MIN_HEALTH_INTERVAL: Duration = Duration::from_secs(30);
const MAX_HEALTH_INTERVAL: Duration = Duration::from_secs(300);

/// Registry configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Breaker configuration applied to every registered provider.
    pub breaker: CircuitBreakerConfig,
    /// Background health probe period; clamped to [30s, 300s].
    pub health_check_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::default(),
            health_check_interval: Duration::from_secs(60),
        }
    }
}

/// One registered provider and its bookkeeping.
struct Registered {
    provider: Arc<dyn DataProvider>,
    /// Capability set resolved once at registration time.
    capabilities: Capabilities,
    probe_method: ProbeMethod,
    priority: u8,
    weight: f64,
    status: HealthStatus,
    metrics: ProviderMetrics,
}

/// State guarded by the registry's read/write lock.
#[derive(Default)]
struct Inner {
    providers: HashMap<String, Registered>,
    /// Derived lookup structure; rebuilt on every register/deregister.
    index: HashMap<(DataType, AssetType), Vec<String>>,
}

impl Inner {
    /// Rebuild the capability index from the provider table.
    ///
    /// Buckets are sorted by (priority, id) so lookups come back in stable
    /// preference order, and an id never appears twice in one bucket.
    fn rebuild_index(&mut self) {
        self.index.clear();
        for (id, reg) in &self.providers {
            for &data_type in &reg.capabilities.data_types {
                for &asset_type in &reg.capabilities.asset_types {
                    let bucket = self.index.entry((data_type, asset_type)).or_default();
                    if !bucket.contains(id) {
                        bucket.push(id.clone());
                    }
                }
            }
        }
        let providers = &self.providers;
        for bucket in self.index.values_mut() {
            bucket.sort_by(|a, b| {
                let pa = providers.get(a).map(|r| r.priority).unwrap_or(u8::MAX);
                let pb = providers.get(b).map(|r| r.priority).unwrap_or(u8::MAX);
                pa.cmp(&pb).then_with(|| a.cmp(b))
            });
        }
    }
}

/// Read-only per-provider view handed to routing strategies.
#[derive(Clone, Debug)]
pub struct ProviderSnapshot {
    /// Provider id.
    pub provider_id: String,
    /// Administrative/probed status.
    pub status: HealthStatus,
    /// Declared priority (lower is better).
    pub priority: u8,
    /// Weight for weighted strategies.
    pub weight: f64,
    /// Total extraction attempts.
    pub total_calls: u64,
    /// Lifetime success rate.
    pub success_rate: f64,
    /// Rolling average response time in milliseconds.
    pub avg_response_ms: f64,
    /// EWMA quality score.
    pub quality_ewma: f64,
    /// EWMA availability score.
    pub availability_ewma: f64,
    /// Calls currently in flight.
    pub current_load: u32,
    /// Composite health score in `[0, 1]`.
    pub health_score: f64,
    /// Current breaker state.
    pub breaker_state: CircuitState,
    /// Failure rate over the breaker's window.
    pub breaker_failure_rate: f64,
    /// Current degradation level.
    pub degradation: DegradationLevel,
}

/// Map from provider id to its snapshot; the input to every strategy.
pub type MetricsView = HashMap<String, ProviderSnapshot>;

/// Provider registry with capability index and health tracking.
pub struct CapabilityRegistry {
    inner: RwLock<Inner>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    config: RegistryConfig,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    /// Create a registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration.
    pub fn with_config(mut config: RegistryConfig) -> Self {
        config.health_check_interval = config
            .health_check_interval
            .clamp(MIN_HEALTH_INTERVAL, MAX_HEALTH_INTERVAL);
        Self {
            inner: RwLock::new(Inner::default()),
            breakers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Lock helpers; poisoning is treated like the breaker's mutex - recover
    /// rather than panic, stale bookkeeping beats a crashed router.
    fn read_inner(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("Registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("Registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Register a provider.
    ///
    /// The provider's declared capabilities are resolved through the
    /// capability probe exactly once; partial declarations get best-effort
    /// defaults. Returns false if the id is already taken or the probe
    /// rejects the provider.
    pub fn register(
        &self,
        provider_id: impl Into<String>,
        provider: Arc<dyn DataProvider>,
        priority: u8,
        weight: f64,
    ) -> bool {
        let provider_id = provider_id.into();
        let declared = provider.capabilities();

        let outcome = match probe::probe(&provider_id, &declared) {
            Some(o) => o,
            None => {
                warn!(
                    "Registry: '{}' rejected by capability probe",
                    provider_id
                );
                return false;
            }
        };

        let mut inner = self.write_inner();
        if inner.providers.contains_key(&provider_id) {
            warn!("Registry: '{}' is already registered", provider_id);
            return false;
        }

        info!(
            "Registry: registered '{}' (priority {}, weight {}, probe {:?})",
            provider_id, priority, weight, outcome.method
        );

        inner.providers.insert(
            provider_id.clone(),
            Registered {
                provider,
                capabilities: outcome.capabilities,
                probe_method: outcome.method,
                priority,
                weight: weight.max(0.0),
                status: HealthStatus::Active,
                metrics: ProviderMetrics::default(),
            },
        );
        inner.rebuild_index();
        drop(inner);

        let breaker = Arc::new(CircuitBreaker::with_config(
            provider_id.clone().into(),
            self.config.breaker.clone(),
        ));
        self.breakers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(provider_id, breaker);

        true
    }

    /// Remove a provider. Returns false if it was not registered.
    pub fn deregister(&self, provider_id: &str) -> bool {
        let mut inner = self.write_inner();
        let removed = inner.providers.remove(provider_id).is_some();
        if removed {
            inner.rebuild_index();
            drop(inner);
            self.breakers
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .remove(provider_id);
            info!("Registry: deregistered '{}'", provider_id);
        }
        removed
    }

    /// Provider ids able to serve `(data_type, asset_type)` right now.
    ///
    /// Index lookup filtered by health status, market coverage, and breaker
    /// state: Open breakers are excluded until their recovery timeout has
    /// elapsed (at which point their probe calls become visible again).
    /// Results come back in (priority, id) order.
    pub fn get_available(
        &self,
        data_type: DataType,
        asset_type: AssetType,
        market: Option<Market>,
    ) -> Vec<String> {
        let inner = self.read_inner();
        let breakers = self.breakers.read().unwrap_or_else(|p| p.into_inner());

        let Some(bucket) = inner.index.get(&(data_type, asset_type)) else {
            return Vec::new();
        };

        bucket
            .iter()
            .filter(|id| {
                let Some(reg) = inner.providers.get(*id) else {
                    return false;
                };
                if reg.status != HealthStatus::Active {
                    debug!("Registry: '{}' filtered ({})", id, reg.status);
                    return false;
                }
                if !reg.capabilities.supports(data_type, asset_type, market) {
                    return false;
                }
                match breakers.get(*id) {
                    Some(b) if !b.would_execute() => {
                        debug!("Registry: '{}' filtered (circuit open)", id);
                        false
                    }
                    _ => true,
                }
            })
            .cloned()
            .collect()
    }

    /// Look up a registered provider.
    pub fn provider(&self, provider_id: &str) -> Option<Arc<dyn DataProvider>> {
        self.read_inner()
            .providers
            .get(provider_id)
            .map(|r| Arc::clone(&r.provider))
    }

    /// Whether the id is registered at all, regardless of health.
    pub fn contains(&self, provider_id: &str) -> bool {
        self.read_inner().providers.contains_key(provider_id)
    }

    /// The circuit breaker guarding a provider.
    pub fn breaker(&self, provider_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(provider_id)
            .cloned()
    }

    /// Record the outcome of one extraction attempt.
    ///
    /// Updates the provider's metrics record and its circuit breaker. The
    /// failure category defaults to [`FailureKind::Unknown`]; the pipeline
    /// uses [`record_outcome_kind`](Self::record_outcome_kind) to attach
    /// the classified kind.
    pub fn record_outcome(
        &self,
        provider_id: &str,
        success: bool,
        latency_ms: f64,
        quality: Option<f64>,
    ) {
        self.record_outcome_kind(provider_id, success, latency_ms, quality, FailureKind::Unknown);
    }

    /// [`record_outcome`](Self::record_outcome) with an explicit failure
    /// category for the breaker's diagnostic window.
    pub fn record_outcome_kind(
        &self,
        provider_id: &str,
        success: bool,
        latency_ms: f64,
        quality: Option<f64>,
        kind: FailureKind,
    ) {
        {
            let mut inner = self.write_inner();
            if let Some(reg) = inner.providers.get_mut(provider_id) {
                reg.metrics.record(success, latency_ms, quality);
            }
        }

        if let Some(breaker) = self.breaker(provider_id) {
            let rt = Duration::from_secs_f64((latency_ms / 1000.0).max(0.0));
            if success {
                breaker.record_success(rt);
            } else {
                breaker.record_failure(kind, rt);
            }
        }
    }

    /// Note that an extraction call to the provider started.
    pub fn begin_call(&self, provider_id: &str) {
        let mut inner = self.write_inner();
        if let Some(reg) = inner.providers.get_mut(provider_id) {
            reg.metrics.current_load += 1;
        }
    }

    /// Note that an extraction call to the provider finished.
    pub fn end_call(&self, provider_id: &str) {
        let mut inner = self.write_inner();
        if let Some(reg) = inner.providers.get_mut(provider_id) {
            reg.metrics.current_load = reg.metrics.current_load.saturating_sub(1);
        }
    }

    /// Administratively enable or disable a provider.
    pub fn set_enabled(&self, provider_id: &str, enabled: bool) -> bool {
        let mut inner = self.write_inner();
        match inner.providers.get_mut(provider_id) {
            Some(reg) => {
                reg.status = if enabled {
                    HealthStatus::Active
                } else {
                    HealthStatus::Disabled
                };
                info!("Registry: '{}' set to {}", provider_id, reg.status);
                true
            }
            None => false,
        }
    }

    /// Probe one provider's health and update its status.
    ///
    /// Disabled providers are left alone. Returns the probe result, or
    /// `None` for unknown ids.
    pub async fn check_health(&self, provider_id: &str) -> Option<HealthCheck> {
        let (provider, disabled) = {
            let inner = self.read_inner();
            let reg = inner.providers.get(provider_id)?;
            (
                Arc::clone(&reg.provider),
                reg.status == HealthStatus::Disabled,
            )
        };
        if disabled {
            return None;
        }

        let check = provider.health_check().await;

        let mut inner = self.write_inner();
        if let Some(reg) = inner.providers.get_mut(provider_id) {
            let new_status = if check.healthy {
                HealthStatus::Active
            } else {
                HealthStatus::Error
            };
            if reg.status != new_status {
                info!(
                    "Registry: '{}' health changed {} -> {} ({})",
                    provider_id, reg.status, new_status, check.message
                );
            }
            reg.status = new_status;
        }
        Some(check)
    }

    /// Probe every enabled provider's health.
    pub async fn check_all_health(&self) {
        let ids: Vec<String> = {
            let inner = self.read_inner();
            inner.providers.keys().cloned().collect()
        };
        for id in ids {
            self.check_health(&id).await;
        }
    }

    /// Spawn the background health check loop.
    ///
    /// Runs until the returned handle is aborted. The period comes from
    /// the registry configuration (clamped to [30s, 300s]).
    pub fn spawn_health_loop(registry: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = registry.config.health_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it so a fresh registry
            // isn't probed before providers finish registering.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!("Registry: running periodic health checks");
                registry.check_all_health().await;
            }
        })
    }

    /// Read-only metrics view for routing strategies and monitoring.
    pub fn metrics_view(&self) -> MetricsView {
        let inner = self.read_inner();
        let breakers = self.breakers.read().unwrap_or_else(|p| p.into_inner());

        inner
            .providers
            .iter()
            .map(|(id, reg)| {
                let breaker_snapshot: Option<CircuitSnapshot> =
                    breakers.get(id).map(|b| b.snapshot());
                let snapshot = ProviderSnapshot {
                    provider_id: id.clone(),
                    status: reg.status,
                    priority: reg.priority,
                    weight: reg.weight,
                    total_calls: reg.metrics.total_calls,
                    success_rate: reg.metrics.success_rate(),
                    avg_response_ms: reg.metrics.avg_response_ms,
                    quality_ewma: reg.metrics.quality_ewma,
                    availability_ewma: reg.metrics.availability_ewma,
                    current_load: reg.metrics.current_load,
                    health_score: reg.metrics.health_score(),
                    breaker_state: breaker_snapshot
                        .as_ref()
                        .map(|s| s.state)
                        .unwrap_or(CircuitState::Closed),
                    breaker_failure_rate: breaker_snapshot
                        .as_ref()
                        .map(|s| s.failure_rate)
                        .unwrap_or(0.0),
                    degradation: breaker_snapshot
                        .map(|s| s.degradation)
                        .unwrap_or(DegradationLevel::None),
                };
                (id.clone(), snapshot)
            })
            .collect()
    }

    /// Breaker snapshots for all providers, for external monitoring.
    pub fn breaker_snapshots(&self) -> Vec<CircuitSnapshot> {
        self.breakers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .map(|b| b.snapshot())
            .collect()
    }

    /// Manually close a provider's circuit breaker. Returns false for
    /// unknown ids.
    pub fn reset_breaker(&self, provider_id: &str) -> bool {
        match self.breaker(provider_id) {
            Some(breaker) => {
                breaker.reset();
                info!("Registry: breaker for '{}' manually reset", provider_id);
                true
            }
            None => false,
        }
    }

    /// Manually close every circuit breaker.
    pub fn reset_all_breakers(&self) {
        let breakers = self.breakers.read().unwrap_or_else(|p| p.into_inner());
        for breaker in breakers.values() {
            breaker.reset();
        }
        info!("Registry: all breakers manually reset");
    }

    /// How a provider's capabilities were resolved at registration.
    pub fn probe_method(&self, provider_id: &str) -> Option<ProbeMethod> {
        self.read_inner()
            .providers
            .get(provider_id)
            .map(|r| r.probe_method)
    }
}
