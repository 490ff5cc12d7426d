//! Feature price list entries and their resolution.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{FeatureCostId, TenantId, Timestamp, ValidationError};

/// Price of one invocation of a feature, optionally scoped to a tenant.
///
/// A `tenant_id` of `None` marks the global default price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCost {
    pub id: FeatureCostId,
    pub feature_key: String,
    pub tenant_id: Option<TenantId>,
    pub points_cost: i64,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl FeatureCost {
    /// Creates an active price entry.
    ///
    /// # Errors
    ///
    /// - `EmptyField` if `feature_key` is blank
    /// - `OutOfRange` if `points_cost` is not positive
    pub fn new(
        feature_key: impl Into<String>,
        tenant_id: Option<TenantId>,
        points_cost: i64,
    ) -> Result<Self, ValidationError> {
        let feature_key = feature_key.into();
        if feature_key.trim().is_empty() {
            return Err(ValidationError::empty_field("feature_key"));
        }
        validate_points_cost(points_cost)?;

        let now = Timestamp::now();
        Ok(Self {
            id: FeatureCostId::new(),
            feature_key,
            tenant_id,
            points_cost,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Changes the price in place.
    pub fn reprice(&mut self, points_cost: i64) -> Result<(), ValidationError> {
        validate_points_cost(points_cost)?;
        self.points_cost = points_cost;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Soft-disables the entry. Usage history keeps referencing it.
    pub fn disable(&mut self) {
        self.is_active = false;
        self.updated_at = Timestamp::now();
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }
}

fn validate_points_cost(points_cost: i64) -> Result<(), ValidationError> {
    if points_cost <= 0 {
        return Err(ValidationError::out_of_range(
            "points_cost",
            1,
            i64::MAX,
            points_cost,
        ));
    }
    Ok(())
}

/// Picks the applicable price for `feature_key` from `candidates`.
///
/// First match wins:
/// 1. active entry for the supplied tenant
/// 2. active global entry
/// 3. any other active entry for the key, earliest created first
///
/// The last step only exists for rows that predate tenant-scoped pricing.
pub fn resolve_cost<'a>(
    candidates: &'a [FeatureCost],
    feature_key: &str,
    tenant_id: Option<&TenantId>,
) -> Option<&'a FeatureCost> {
    let active = || {
        candidates
            .iter()
            .filter(move |c| c.is_active && c.feature_key == feature_key)
    };

    if let Some(tenant) = tenant_id {
        if let Some(hit) = active().find(|c| c.tenant_id.as_ref() == Some(tenant)) {
            return Some(hit);
        }
    }

    if let Some(global) = active().find(|c| c.is_global()) {
        return Some(global);
    }

    active().min_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    })
}
