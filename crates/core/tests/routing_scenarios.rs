//! End-to-end scenarios exercised through the crate's public API:
//! failover across providers, multilingual field mapping, and circuit
//! breaker isolation and recovery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use marketroute_core::{
    AssetType, Capabilities, CapabilityRegistry, CircuitBreaker, CircuitBreakerConfig,
    CircuitState, DataProvider, DataTable, DataType, ExtractError, ExtractPipeline,
    ExtractRequest, FailureKind, FieldMapper, HealthCheck, Market, RoutingEngine, StandardQuery,
};

struct ScriptedProvider {
    id: &'static str,
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn ok(id: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            id,
            fail: false,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            fail: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            asset_types: vec![AssetType::Stock],
            data_types: vec![DataType::Kline],
            markets: vec![Market::Cn],
        }
    }

    async fn extract(&self, _request: &ExtractRequest) -> Result<DataTable, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ExtractError::Connection {
                provider: self.id.to_string(),
                message: "connection refused".to_string(),
            });
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut table = DataTable::new(vec![
            "日期".into(),
            "开盘价".into(),
            "最高价".into(),
            "最低价".into(),
            "收盘价".into(),
            "成交量".into(),
        ]);
        table.push_row(vec![
            json!("2024-01-02"),
            json!(1688.0),
            json!(1702.5),
            json!(1679.0),
            json!("1695.30"),
            json!(2_450_000),
        ]);
        Ok(table)
    }

    async fn health_check(&self) -> HealthCheck {
        HealthCheck::healthy(Duration::from_millis(1))
    }
}

fn build_pipeline(providers: Vec<(Arc<ScriptedProvider>, u8)>) -> ExtractPipeline {
    let registry = Arc::new(CapabilityRegistry::new());
    for (provider, priority) in providers {
        let id = provider.id();
        assert!(registry.register(id, provider, priority, 1.0));
    }
    ExtractPipeline::new(registry, Arc::new(RoutingEngine::new()))
}

#[tokio::test]
async fn failing_primary_fails_over_to_backup() {
    let primary = ScriptedProvider::failing("AAA_PRIMARY");
    let backup = ScriptedProvider::ok("BBB_BACKUP", Duration::from_millis(50));
    let pipeline = build_pipeline(vec![(Arc::clone(&primary), 1), (Arc::clone(&backup), 2)]);

    let query = StandardQuery::builder("600519", AssetType::Stock, DataType::Kline)
        .market(Market::Cn)
        .build()
        .unwrap();
    let result = pipeline.process(&query).await;

    assert!(result.is_success(), "error: {:?}", result.error);
    let source = result.source.expect("source info");
    assert_eq!(source.provider_id, "BBB_BACKUP");
    assert_eq!(source.attempts, 2);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    assert_eq!(backup.calls.load(Ordering::SeqCst), 1);

    // The primary's failure is visible in its breaker window.
    let breaker = pipeline.registry().breaker("AAA_PRIMARY").unwrap();
    assert_eq!(breaker.failure_count(), 1);
}

#[tokio::test]
async fn chinese_kline_columns_map_to_canonical_schema() {
    let provider = ScriptedProvider::ok("CN_FEED", Duration::ZERO);
    let pipeline = build_pipeline(vec![(provider, 1)]);

    let query = StandardQuery::builder("600519", AssetType::Stock, DataType::Kline)
        .market(Market::Cn)
        .build()
        .unwrap();
    let result = pipeline.process(&query).await;

    assert!(result.is_success());
    assert_eq!(
        result.data.columns,
        vec!["date", "open", "high", "low", "close", "volume"]
    );
    assert_eq!(
        result.column_mapping.get("收盘价"),
        Some(&"close".to_string())
    );
    // String-typed close and comma-free volume arrive as numbers.
    let close_idx = result.data.column_index("close").unwrap();
    assert_eq!(result.data.rows[0][close_idx], json!(1695.3));
    assert!(result.quality_score > 0.9);
}

#[test]
fn close_price_synonym_maps_exactly() {
    let mapper = FieldMapper::new();
    let mapping = mapper.map_column("收盘价", DataType::Kline, &[]);
    assert_eq!(mapping.target, "close");
    assert_eq!(mapping.confidence, 1.0);
}

#[test]
fn repeated_failures_open_the_breaker_until_recovery() {
    let breaker = CircuitBreaker::with_config(
        "FLAKY".into(),
        CircuitBreakerConfig {
            failure_threshold: 5,
            window_size: 10,
            min_samples: 10,
            recovery_timeout: Duration::from_millis(50),
            ..CircuitBreakerConfig::default()
        },
    );

    for _ in 0..10 {
        assert!(breaker.can_execute());
        breaker.record_failure(FailureKind::Connection, Duration::from_millis(5));
    }

    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.can_execute());

    std::thread::sleep(Duration::from_millis(60));

    // After the recovery timeout one probe call is admitted.
    assert!(breaker.can_execute());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

#[tokio::test]
async fn open_breaker_removes_provider_from_candidates() {
    let flaky = ScriptedProvider::failing("FLAKY_FEED");
    let registry = Arc::new(CapabilityRegistry::new());
    assert!(registry.register("FLAKY_FEED", flaky, 1, 1.0));

    let breaker = registry.breaker("FLAKY_FEED").unwrap();
    for _ in 0..60 {
        registry.record_outcome_kind("FLAKY_FEED", false, 10.0, None, FailureKind::ServerError);
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let available = registry.get_available(DataType::Kline, AssetType::Stock, Some(Market::Cn));
    assert!(available.is_empty());

    // A manual reset makes it selectable again.
    assert!(registry.reset_breaker("FLAKY_FEED"));
    let available = registry.get_available(DataType::Kline, AssetType::Stock, Some(Market::Cn));
    assert_eq!(available, vec!["FLAKY_FEED".to_string()]);
}

#[tokio::test]
async fn all_providers_failing_reports_every_attempt() {
    let a = ScriptedProvider::failing("AAA");
    let b = ScriptedProvider::failing("BBB");
    let pipeline = build_pipeline(vec![(a, 1), (b, 2)]);

    let query = StandardQuery::builder("600519", AssetType::Stock, DataType::Kline)
        .market(Market::Cn)
        .build()
        .unwrap();
    let result = pipeline.process(&query).await;

    assert!(!result.is_success());
    let error = result.error.unwrap();
    assert!(error.contains("AAA") && error.contains("BBB"), "{}", error);
    assert_eq!(result.failover.call_count(), 2);
    assert_eq!(result.failover.failed_providers().len(), 2);
}
