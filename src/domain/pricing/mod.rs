//! Pricing domain - feature price list, resolution and usage records.

mod feature_cost;
mod usage;

pub use feature_cost::{resolve_cost, FeatureCost};
pub use usage::FeatureUsage;
