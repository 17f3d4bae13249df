//! Provider routing: selection strategies and the ranking engine.

mod engine;
mod strategy;

pub use engine::{EngineConfig, RouteDecision, RouteMode, RoutingEngine, ScoreWeights};
pub use strategy::{
    dynamic_strategy, CircuitAwareStrategy, HealthBasedStrategy, PriorityStrategy,
    RoundRobinStrategy, RouteRequest, RoutingStrategy, StrategyKind,
    WeightedRoundRobinStrategy,
};
