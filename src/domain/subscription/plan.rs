//! Subscription plan reference data.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlanId, ValidationError};

/// A purchasable plan. Read-mostly reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: PlanId,
    pub name: String,
    /// Price in the provider's minor currency unit.
    pub price: i64,
    pub monthly_points: i64,
    pub duration_days: i64,
    /// Descriptive only.
    pub features: Vec<String>,
}

impl SubscriptionPlan {
    pub fn new(
        name: impl Into<String>,
        price: i64,
        monthly_points: i64,
        duration_days: i64,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        if price < 0 {
            return Err(ValidationError::out_of_range("price", 0, i64::MAX, price));
        }
        if monthly_points <= 0 {
            return Err(ValidationError::out_of_range(
                "monthly_points",
                1,
                i64::MAX,
                monthly_points,
            ));
        }
        if !(1..=3660).contains(&duration_days) {
            return Err(ValidationError::out_of_range(
                "duration_days",
                1,
                3660,
                duration_days,
            ));
        }
        Ok(Self {
            id: PlanId::new(),
            name,
            price,
            monthly_points,
            duration_days,
            features: Vec::new(),
        })
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_plan_is_built() {
        let plan = SubscriptionPlan::new("Pro", 1999, 250, 30)
            .unwrap()
            .with_features(vec!["hd images".to_string()]);
        assert_eq!(plan.monthly_points, 250);
        assert_eq!(plan.features.len(), 1);
    }

    #[test]
    fn invalid_plans_are_rejected() {
        assert!(SubscriptionPlan::new("", 1, 1, 30).is_err());
        assert!(SubscriptionPlan::new("Pro", -1, 1, 30).is_err());
        assert!(SubscriptionPlan::new("Pro", 1, 0, 30).is_err());
        assert!(SubscriptionPlan::new("Pro", 1, 1, 0).is_err());
    }
}
