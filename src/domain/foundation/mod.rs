//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the state machine trait and the
//! error vocabulary shared by the ledger, pricing, subscription and task
//! domains.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{
    AccountId, FeatureCostId, PlanId, SubscriptionId, TaskId, TenantId, TransactionId, UsageId,
};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
