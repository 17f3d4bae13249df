//! Data model: queries, results, and the tabular payload.

mod query;
mod result;
mod table;
mod types;

pub use query::{StandardQuery, StandardQueryBuilder};
pub use result::{FailoverReport, ProviderAttempt, SkipReason, SourceInfo, StandardResult};
pub use table::DataTable;
pub use types::{AssetType, DataType, Market, Period, ProviderId, QueryPriority};
