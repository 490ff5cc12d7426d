//! Subscription domain - plans and per-account subscriptions.

mod aggregate;
mod plan;

pub use aggregate::{Subscription, SubscriptionChange};
pub use plan::SubscriptionPlan;
