//! Payment provider checkout port.
//!
//! The provider hosts the payment page. Whatever `request_id` we hand it
//! comes back on the confirmation event, which is how the reconciler finds
//! the PENDING transaction created alongside the checkout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, DomainError, PlanId};

/// What the customer is paying for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Purchase {
    /// One-off purchase of `points` for `price` minor currency units.
    Topup { points: i64, price: i64 },
    Subscription { plan_id: PlanId },
}

/// Request sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub account_id: AccountId,
    /// Correlation key echoed back on confirmation.
    pub request_id: String,
    pub purchase: Purchase,
    /// Amount to charge, in minor currency units.
    pub price: i64,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Hosted checkout created by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session id.
    pub checkout_id: String,
    /// URL the customer completes payment at.
    pub checkout_url: String,
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Creates a hosted checkout.
    ///
    /// # Errors
    ///
    /// - `ExternalServiceError` if the provider rejects or cannot be reached
    async fn create_checkout(&self, request: &CheckoutRequest)
        -> Result<CheckoutSession, DomainError>;
}
