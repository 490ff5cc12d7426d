//! Subscription aggregate.
//!
//! One row per (account, plan). Activation and renewal move `end_date`
//! forward on the same row; expiry is never written, it is evaluated as
//! `is_active && end_date > now`.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, PlanId, SubscriptionId, Timestamp};

use super::SubscriptionPlan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub account_id: AccountId,
    pub plan_id: PlanId,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub is_active: bool,
    pub auto_renew: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// How a confirmed payment changed the subscription row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// First purchase of this plan.
    Created,
    /// The previous period had lapsed; a new one starts now.
    Restarted,
    /// The running period was extended from its current end.
    Extended,
}

impl Subscription {
    /// Starts a new subscription running `plan.duration_days` from `now`.
    pub fn activate(account_id: AccountId, plan: &SubscriptionPlan, now: Timestamp) -> Self {
        Self {
            id: SubscriptionId::new(),
            account_id,
            plan_id: plan.id,
            start_date: now,
            end_date: now.add_days(plan.duration_days),
            is_active: true,
            auto_renew: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active_at(&self, now: &Timestamp) -> bool {
        self.is_active && self.end_date.is_after(now)
    }

    /// Applies one paid period.
    ///
    /// A running subscription is extended from its current `end_date`; a
    /// lapsed or deactivated one restarts at `now`.
    pub fn renew(&mut self, plan: &SubscriptionPlan, now: Timestamp) -> SubscriptionChange {
        let change = if self.is_active_at(&now) {
            self.end_date = self.end_date.add_days(plan.duration_days);
            SubscriptionChange::Extended
        } else {
            self.start_date = now;
            self.end_date = now.add_days(plan.duration_days);
            SubscriptionChange::Restarted
        };
        self.is_active = true;
        self.updated_at = now;
        change
    }
}
