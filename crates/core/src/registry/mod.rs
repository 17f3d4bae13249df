//! Provider registry: discovery, capability indexing, health, and metrics.

mod health;
mod probe;
mod registry;

pub use health::{HealthStatus, ProviderMetrics};
pub use probe::{probe, ProbeMethod, ProbeOutcome};
pub use registry::{CapabilityRegistry, MetricsView, ProviderSnapshot, RegistryConfig};
