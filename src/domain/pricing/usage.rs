//! Feature usage record.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::{AccountId, FeatureCostId, Timestamp, TransactionId, UsageId};

use super::FeatureCost;

/// One successful feature invocation.
///
/// `points_used` is a snapshot of the price at the time of use and does not
/// follow later repricing of the referenced [`FeatureCost`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureUsage {
    pub id: UsageId,
    pub account_id: AccountId,
    pub feature_cost_id: FeatureCostId,
    pub points_used: i64,
    /// The REDEEM transaction that paid for this usage.
    pub transaction_id: TransactionId,
    pub metadata: JsonValue,
    pub created_at: Timestamp,
}

impl FeatureUsage {
    pub fn record(
        account_id: AccountId,
        cost: &FeatureCost,
        transaction_id: TransactionId,
        metadata: Option<JsonValue>,
    ) -> Self {
        Self {
            id: UsageId::new(),
            account_id,
            feature_cost_id: cost.id,
            points_used: cost.points_cost,
            transaction_id,
            metadata: metadata.unwrap_or(JsonValue::Null),
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_repricing() {
        let mut cost = FeatureCost::new("image", None, 3).unwrap();
        let usage = FeatureUsage::record(AccountId::new(), &cost, TransactionId::new(), None);
        cost.reprice(10).unwrap();

        assert_eq!(usage.points_used, 3);
        assert_eq!(usage.feature_cost_id, cost.id);
        assert!(usage.metadata.is_null());
    }
}
