//! HandleRecurringChargeHandler - Applies a renewal charge to a subscription.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::handle_confirmation::{grant_period, ReconcileOutcome};
use crate::application::handlers::ledger::lock_account;
use crate::application::notify::notify_best_effort;
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::domain::ledger::{
    CorrelationKeys, LedgerError, Transaction, TransactionKind, TransactionMetadata,
};
use crate::ports::{LedgerNotification, LedgerStore, NotificationSink};

#[derive(Debug, Clone)]
pub struct HandleRecurringChargeCommand {
    pub subscription_id: SubscriptionId,
    /// Provider id of the charge; a repeated id is a no-op.
    pub charge_id: String,
    pub payload: Option<JsonValue>,
}

/// Handler for recurring subscription charges.
///
/// Appends a COMPLETED SUBSCRIPTION row for the charge, extends the period
/// and grants the next month's points, all in one store transaction.
pub struct HandleRecurringChargeHandler {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl HandleRecurringChargeHandler {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub async fn handle(
        &self,
        cmd: HandleRecurringChargeCommand,
    ) -> Result<ReconcileOutcome, LedgerError> {
        if cmd.charge_id.trim().is_empty() {
            return Err(LedgerError::validation("charge_id", "Charge id cannot be empty"));
        }

        // Locks account, then subscription, then the charge's own correlation
        // rows. Confirmations lock their pending row before account and
        // subscription; the rows never overlap since a charge id is not a
        // checkout request id.
        let account_id = self
            .store
            .find_subscription(&cmd.subscription_id)
            .await?
            .ok_or(LedgerError::SubscriptionNotFound(cmd.subscription_id))?
            .account_id;

        let mut tx = self.store.begin().await?;
        let mut account = lock_account(tx.as_mut(), account_id).await?;
        let subscription = tx
            .lock_subscription_by_id(&cmd.subscription_id)
            .await?
            .ok_or(LedgerError::SubscriptionNotFound(cmd.subscription_id))?;

        if let Some(previous) = tx
            .lock_transaction_by_correlation(&CorrelationKeys::request(cmd.charge_id.as_str()))
            .await?
        {
            tracing::debug!(
                charge_id = %cmd.charge_id,
                transaction_id = %previous.id,
                "Recurring charge already applied"
            );
            return Ok(ReconcileOutcome::AlreadyApplied {
                transaction_id: previous.id,
                status: previous.status,
            });
        }

        let plan = tx
            .find_plan(&subscription.plan_id)
            .await?
            .ok_or(LedgerError::SubscriptionPlanNotFound(subscription.plan_id))?;

        let billing = Transaction::completed(
            account.id,
            plan.monthly_points,
            TransactionKind::Subscription,
            format!("{} renewal", plan.name),
            TransactionMetadata::new()
                .with_request_id(cmd.charge_id.as_str())
                .with_subscription(subscription.id)
                .with_plan(plan.id)
                .merge_extra(cmd.payload),
        );
        tx.insert_transaction(&billing).await?;

        let grant = grant_period(
            tx.as_mut(),
            &mut account,
            Some(subscription),
            &plan,
            billing.id,
            Timestamp::now(),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            account_id = %account.id,
            subscription_id = %grant.subscription.id,
            transaction_id = %billing.id,
            charge_id = %cmd.charge_id,
            month = grant.month,
            new_balance = grant.new_balance,
            "Recurring charge applied"
        );

        notify_best_effort(
            self.notifier.as_ref(),
            LedgerNotification::PaymentCompleted {
                account_id: account.id,
                transaction_id: billing.id,
                kind: billing.kind,
                points_credited: plan.monthly_points,
                new_balance: grant.new_balance,
            },
        )
        .await;
        notify_best_effort(
            self.notifier.as_ref(),
            LedgerNotification::SubscriptionRenewed {
                account_id: account.id,
                subscription_id: grant.subscription.id,
                month: grant.month,
                end_date: grant.subscription.end_date,
            },
        )
        .await;

        Ok(ReconcileOutcome::SubscriptionCredited {
            transaction_id: billing.id,
            subscription: grant.subscription,
            change: grant.change,
            month: grant.month,
            new_balance: grant.new_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryLedgerStore, RecordingNotificationSink};
    use crate::domain::foundation::AccountId;
    use crate::domain::ledger::{Account, TransactionStatus};
    use crate::domain::subscription::{Subscription, SubscriptionChange, SubscriptionPlan};

    async fn subscribed(
        store: &InMemoryLedgerStore,
        last_month: Option<u32>,
    ) -> (Subscription, SubscriptionPlan) {
        let account = AccountId::new();
        store.create_account(&Account::open(account, None)).await.unwrap();
        let plan = SubscriptionPlan::new("Pro", 1999, 250, 30).unwrap();
        store.save_plan(&plan).await.unwrap();
        let subscription = Subscription::activate(account, &plan, Timestamp::now());

        let mut tx = store.begin().await.unwrap();
        tx.upsert_subscription(&subscription).await.unwrap();
        if let Some(month) = last_month {
            let mut account = tx.lock_account(&account).await.unwrap().unwrap();
            account.credit(250).unwrap();
            tx.update_account_balance(&account).await.unwrap();
            tx.insert_transaction(&Transaction::completed(
                account.id,
                250,
                TransactionKind::Earn,
                "grant",
                TransactionMetadata::new()
                    .with_subscription(subscription.id)
                    .with_month(month),
            ))
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        (subscription, plan)
    }

    fn charge(subscription: &Subscription, id: &str) -> HandleRecurringChargeCommand {
        HandleRecurringChargeCommand {
            subscription_id: subscription.id,
            charge_id: id.to_string(),
            payload: None,
        }
    }

    #[tokio::test]
    async fn renewal_extends_from_current_end_and_continues_month_counter() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let (subscription, _) = subscribed(&store, Some(4)).await;
        let handler = HandleRecurringChargeHandler::new(
            store.clone(),
            Arc::new(RecordingNotificationSink::default()),
        );

        let outcome = handler.handle(charge(&subscription, "ch_1")).await.unwrap();

        let ReconcileOutcome::SubscriptionCredited { subscription: renewed, change, month, new_balance, .. } = outcome else {
            panic!("expected a renewal");
        };
        assert_eq!(change, SubscriptionChange::Extended);
        assert_eq!(month, 5);
        assert_eq!(new_balance, 500);
        assert_eq!(renewed.end_date, subscription.end_date.add_days(30));

        let rows = store.list_transactions(&subscription.account_id).await.unwrap();
        let billing = rows
            .iter()
            .find(|t| t.kind == TransactionKind::Subscription)
            .unwrap();
        assert_eq!(billing.status, TransactionStatus::Completed);
        assert_eq!(billing.metadata.request_id.as_deref(), Some("ch_1"));
    }

    #[tokio::test]
    async fn repeated_charge_is_applied_once() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let (subscription, _) = subscribed(&store, None).await;
        let handler = HandleRecurringChargeHandler::new(
            store.clone(),
            Arc::new(RecordingNotificationSink::default()),
        );

        handler.handle(charge(&subscription, "ch_7")).await.unwrap();
        let again = handler.handle(charge(&subscription, "ch_7")).await.unwrap();

        assert!(matches!(again, ReconcileOutcome::AlreadyApplied { .. }));
        let account = store.find_account(&subscription.account_id).await.unwrap().unwrap();
        assert_eq!(account.balance, 250);
    }

    #[tokio::test]
    async fn unknown_subscription_is_not_found() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let id = SubscriptionId::new();
        let err = HandleRecurringChargeHandler::new(
            store,
            Arc::new(RecordingNotificationSink::default()),
        )
        .handle(HandleRecurringChargeCommand {
            subscription_id: id,
            charge_id: "ch_1".to_string(),
            payload: None,
        })
        .await
        .unwrap_err();
        assert_eq!(err, LedgerError::SubscriptionNotFound(id));
    }
}
