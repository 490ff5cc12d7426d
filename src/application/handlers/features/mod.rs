//! Feature usage handlers.

mod use_feature;

pub use use_feature::{UseFeatureCommand, UseFeatureHandler, UseFeatureResult};
