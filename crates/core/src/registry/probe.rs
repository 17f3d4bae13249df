//! Registration-time capability probe.
//!
//! The original heterogeneous plugin zoo required duck-typing checks to
//! decide whether an object was a data-source provider at all. With a typed
//! [`DataProvider`] contract the interface check is the compiler's job, so
//! what remains is deciding, once at registration, which capabilities a
//! provider actually has when its declarations are partial or absent:
//!
//! 1. complete declaration - taken as-is;
//! 2. partial declaration - missing axes filled with best-effort defaults;
//! 3. no declaration - accepted on a name heuristic with full defaults;
//! 4. otherwise rejected.
//!
//! First match wins. The resolved capability set is stored by the registry
//! and never re-probed per call.
//!
//! [`DataProvider`]: crate::provider::DataProvider

use log::debug;

use crate::models::{AssetType, DataType};
use crate::provider::Capabilities;

/// Substrings that mark an undeclared provider as a plausible data source.
const NAME_HINTS: &[&str] = &["data", "feed", "quote", "market", "finance", "tick"];

/// How a provider's capability set was resolved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProbeMethod {
    /// All three capability axes were declared.
    Declared,
    /// Some axes were declared; the rest were defaulted.
    PartiallyDeclared,
    /// Nothing was declared; the provider id matched a data-source hint.
    NameHeuristic,
}

/// Outcome of probing one provider at registration time.
#[derive(Clone, Debug)]
pub struct ProbeOutcome {
    /// The resolved, possibly defaulted capability set.
    pub capabilities: Capabilities,
    /// Which rule resolved it.
    pub method: ProbeMethod,
}

/// Default data types assumed for providers that don't declare any.
fn default_data_types() -> Vec<DataType> {
    vec![DataType::Kline, DataType::Quote]
}

/// Resolve a provider's effective capabilities, or reject it.
///
/// Returns `None` when the provider declares nothing and its id carries no
/// recognizable data-source hint.
pub fn probe(provider_id: &str, declared: &Capabilities) -> Option<ProbeOutcome> {
    let has_assets = !declared.asset_types.is_empty();
    let has_data = !declared.data_types.is_empty();
    let has_markets = !declared.markets.is_empty();

    // Markets are allowed to be empty (meaning global), so completeness is
    // judged on the asset and data axes.
    if has_assets && has_data {
        return Some(ProbeOutcome {
            capabilities: declared.clone(),
            method: ProbeMethod::Declared,
        });
    }

    if has_assets || has_data || has_markets {
        let capabilities = Capabilities {
            asset_types: if has_assets {
                declared.asset_types.clone()
            } else {
                AssetType::ALL.to_vec()
            },
            data_types: if has_data {
                declared.data_types.clone()
            } else {
                default_data_types()
            },
            markets: declared.markets.clone(),
        };
        debug!(
            "Capability probe: '{}' partially declared, defaulted to {:?}",
            provider_id, capabilities
        );
        return Some(ProbeOutcome {
            capabilities,
            method: ProbeMethod::PartiallyDeclared,
        });
    }

    let lowered = provider_id.to_ascii_lowercase();
    if NAME_HINTS.iter().any(|hint| lowered.contains(hint)) {
        debug!(
            "Capability probe: '{}' accepted on name heuristic with defaults",
            provider_id
        );
        return Some(ProbeOutcome {
            capabilities: Capabilities {
                asset_types: AssetType::ALL.to_vec(),
                data_types: default_data_types(),
                markets: Vec::new(),
            },
            method: ProbeMethod::NameHeuristic,
        });
    }

    debug!(
        "Capability probe: '{}' declares nothing and matches no hint, rejected",
        provider_id
    );
    None
}
