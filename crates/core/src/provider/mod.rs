//! The provider contract implemented by data source plugins.

mod capabilities;
mod traits;

pub use capabilities::{Capabilities, HealthCheck};
pub use traits::{DataProvider, ExtractRequest};
