//! Marketroute Core
//!
//! Provider-agnostic routing and resilience core for market data
//! aggregation.
//!
//! # Overview
//!
//! The core supports:
//! - Multiple asset types: equities, indices, funds, bonds, futures,
//!   crypto, FX
//! - Pluggable data providers behind one [`DataProvider`] trait
//! - Per-provider circuit breaking with failure-rate windows
//! - Capability-indexed provider discovery and health tracking
//! - Intelligent routing (composite scoring plus pluggable strategies)
//! - Field mapping of heterogeneous provider schemas, multilingual
//!   synonyms included
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  StandardQuery   | --> | ExtractPipeline  |  (five-stage pipeline)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | CapabilityRegistry|  (index, health, breakers)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  RoutingEngine   |  (ranked failover order)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |   DataProvider   |  (extraction backends)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  StandardResult  |  (mapped, scored table)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`StandardQuery`] - Provider-agnostic data request, built via
//!   [`StandardQuery::builder`]
//! - [`StandardResult`] - Mapped, quality-scored tabular response
//! - [`DataProvider`] - Trait extraction backends implement
//! - [`CapabilityRegistry`] - Provider registry with capability index
//! - [`RoutingEngine`] - Candidate ranking with decision caching
//! - [`CircuitBreaker`] - Per-provider failure isolation
//! - [`FieldMapper`] - Column name resolution engine

pub mod breaker;
pub mod errors;
pub mod mapping;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod routing;

// Re-export the error taxonomy
pub use errors::{ExtractError, FailureKind, RetryClass};

// Re-export all public types from models
pub use models::{
    AssetType, DataTable, DataType, FailoverReport, Market, Period, ProviderAttempt, ProviderId,
    QueryPriority, SkipReason, SourceInfo, StandardQuery, StandardQueryBuilder, StandardResult,
};

// Re-export provider types
pub use provider::{Capabilities, DataProvider, ExtractRequest, HealthCheck};

// Re-export breaker types
pub use breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState, DegradationLevel,
};

// Re-export registry types
pub use registry::{
    CapabilityRegistry, HealthStatus, MetricsView, ProbeMethod, ProviderMetrics,
    ProviderSnapshot, RegistryConfig,
};

// Re-export routing types
pub use routing::{
    EngineConfig, RouteDecision, RouteMode, RouteRequest, RoutingEngine, RoutingStrategy,
    ScoreWeights, StrategyKind,
};

// Re-export mapping types
pub use mapping::{FieldMapper, FieldMapping, FieldType, MapMethod, MapperConfig, MappingRule};

// Re-export the pipeline
pub use pipeline::{ExtractPipeline, PipelineConfig};
