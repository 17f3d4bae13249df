//! The extract/transform pipeline.
//!
//! [`ExtractPipeline`] is the single entry point callers interact with.
//! A query flows through five stages:
//!
//! 1. transform-query: [`StandardQuery`] -> [`ExtractRequest`];
//! 2. candidate resolution: capability index lookup, or the pinned
//!    provider when the query names one;
//! 3. extract-with-failover: ranked candidate order, breaker gates,
//!    per-attempt timeouts under the request budget;
//! 4. transform-data: field mapping, type coercion, quality scoring;
//! 5. cache & return: TTL result cache keyed by the query signature.
//!
//! Ownership is one-directional: the pipeline holds the registry and the
//! routing engine; neither ever calls back into the pipeline.

mod failover;
mod transform;

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::mapping::FieldMapper;
use crate::models::{FailoverReport, SourceInfo, StandardQuery, StandardResult};
use crate::provider::ExtractRequest;
use crate::registry::CapabilityRegistry;
use crate::routing::{RouteRequest, RoutingEngine};

/// Pipeline tuning knobs.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// How long successful results stay cached.
    pub cache_ttl: Duration,
    /// Maximum cached results before oldest-first eviction.
    pub cache_capacity: usize,
    /// Concurrency bound for [`ExtractPipeline::process_many`].
    pub worker_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 256,
            worker_cap: 8,
        }
    }
}

struct CachedResult {
    result: StandardResult,
    at: Instant,
}

/// Routes queries to providers and turns raw payloads into
/// [`StandardResult`]s.
pub struct ExtractPipeline {
    registry: Arc<CapabilityRegistry>,
    engine: Arc<RoutingEngine>,
    mapper: FieldMapper,
    cache: Mutex<HashMap<String, CachedResult>>,
    config: PipelineConfig,
}

impl ExtractPipeline {
    /// Create a pipeline with default mapper and configuration.
    pub fn new(registry: Arc<CapabilityRegistry>, engine: Arc<RoutingEngine>) -> Self {
        Self::with_config(registry, engine, FieldMapper::new(), PipelineConfig::default())
    }

    /// Create a pipeline with an explicit mapper and configuration.
    pub fn with_config(
        registry: Arc<CapabilityRegistry>,
        engine: Arc<RoutingEngine>,
        mapper: FieldMapper,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            engine,
            mapper,
            cache: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// The registry this pipeline routes over.
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedResult>> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            warn!("Result cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Process one query end to end.
    ///
    /// Never panics and never returns `Err`; total failures come back as
    /// a [`StandardResult`] carrying the error and the failover account.
    pub async fn process(&self, query: &StandardQuery) -> StandardResult {
        let signature = query.signature();

        {
            let mut cache = self.lock_cache();
            if let Some(entry) = cache.get(&signature) {
                if entry.at.elapsed() < self.config.cache_ttl {
                    debug!("Pipeline: cache hit for '{}'", query.symbol);
                    return entry.result.clone();
                }
                cache.remove(&signature);
            }
        }

        let request = ExtractRequest::from_query(query);

        // Candidate resolution. A pinned provider bypasses routing; an
        // unknown pin is a configuration error and fails fast.
        let (ranked, strategy) = match &query.provider {
            Some(pin) => {
                if !self.registry.contains(pin) {
                    let error = crate::errors::ExtractError::UnknownProvider {
                        provider: pin.to_string(),
                    };
                    warn!("Pipeline: {}", error);
                    return StandardResult::failure(error.to_string(), FailoverReport::new());
                }
                (vec![pin.to_string()], None)
            }
            None => {
                let candidates = self.registry.get_available(
                    query.data_type,
                    query.asset_type,
                    query.market,
                );
                if candidates.is_empty() {
                    let error = crate::errors::ExtractError::NoProvidersAvailable;
                    debug!(
                        "Pipeline: no providers for {:?}/{:?}",
                        query.data_type, query.asset_type
                    );
                    return StandardResult::failure(error.to_string(), FailoverReport::new());
                }

                let route_request = RouteRequest {
                    data_type: query.data_type,
                    asset_type: query.asset_type,
                    market: query.market,
                    priority: query.priority,
                };
                let metrics = self.registry.metrics_view();
                let decision = self.engine.route(&candidates, &route_request, &metrics);
                (decision.ranked, Some(decision.strategy))
            }
        };

        let outcome = failover::run(
            &self.registry,
            &ranked,
            &request,
            query.timeout,
            query.retry_budget,
        )
        .await;

        match outcome {
            Ok(win) => {
                let transformed =
                    transform::transform(&self.mapper, win.table, query.data_type);

                // The winning call is recorded here so the quality score
                // makes it into the provider's metrics.
                self.registry.record_outcome(
                    &win.provider_id,
                    true,
                    win.latency.as_secs_f64() * 1000.0,
                    Some(transformed.quality),
                );
                self.feed_engine(&win.report, strategy, true);

                info!(
                    "Pipeline: '{}' served by {} in {:?} (quality {:.2}, {} call(s))",
                    query.symbol,
                    win.provider_id,
                    win.latency,
                    transformed.quality,
                    win.report.call_count()
                );

                let result = StandardResult {
                    data: transformed.table,
                    column_mapping: transformed.column_mapping,
                    source: Some(SourceInfo {
                        provider_id: Cow::Owned(win.provider_id),
                        attempts: win.report.call_count(),
                        latency: win.latency,
                        fetched_at: Utc::now(),
                    }),
                    quality_score: transformed.quality,
                    error: None,
                    failover: win.report,
                };

                let mut cache = self.lock_cache();
                if cache.len() >= self.config.cache_capacity {
                    if let Some(oldest) = cache
                        .iter()
                        .min_by_key(|(_, entry)| entry.at)
                        .map(|(k, _)| k.clone())
                    {
                        cache.remove(&oldest);
                    }
                }
                cache.insert(
                    signature,
                    CachedResult {
                        result: result.clone(),
                        at: Instant::now(),
                    },
                );

                result
            }
            Err((error, report)) => {
                self.feed_engine(&report, strategy, false);
                warn!("Pipeline: '{}' failed: {}", query.symbol, error);
                StandardResult::failure(error.to_string(), report)
            }
        }
    }

    /// Blocking wrapper around [`process`](Self::process).
    ///
    /// Builds a throwaway current-thread runtime; must not be called from
    /// inside an async context.
    pub fn process_sync(&self, query: &StandardQuery) -> StandardResult {
        match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.process(query)),
            Err(error) => StandardResult::failure(
                format!("failed to start runtime: {}", error),
                FailoverReport::new(),
            ),
        }
    }

    /// Process a batch of queries with bounded concurrency.
    ///
    /// Results come back in input order regardless of completion order.
    pub async fn process_many(&self, queries: &[StandardQuery]) -> Vec<StandardResult> {
        let mut indexed: Vec<(usize, StandardResult)> = stream::iter(queries.iter().enumerate())
            .map(|(idx, query)| async move { (idx, self.process(query).await) })
            .buffer_unordered(self.config.worker_cap.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    /// Number of results currently cached.
    pub fn cached_results(&self) -> usize {
        self.lock_cache().len()
    }

    /// Drop all cached results.
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    /// Push the failover outcome into the routing engine's history and
    /// strategy tracker.
    fn feed_engine(&self, report: &FailoverReport, strategy: Option<&'static str>, won: bool) {
        for attempt in &report.attempts {
            if attempt.skipped.is_some() {
                continue;
            }
            self.engine
                .record_outcome(&attempt.provider_id, attempt.success);
        }
        if let Some(strategy) = strategy {
            self.engine.record_strategy_outcome(strategy, won);
        }
    }
}
