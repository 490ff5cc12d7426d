//! HandleConfirmationHandler - Idempotent reconciliation of payment outcomes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::application::handlers::ledger::{lock_account, post_transaction};
use crate::application::notify::notify_best_effort;
use crate::domain::foundation::{SubscriptionId, Timestamp, TransactionId};
use crate::domain::ledger::{
    Account, CorrelationKeys, LedgerError, Transaction, TransactionKind, TransactionMetadata,
    TransactionStatus,
};
use crate::domain::subscription::{Subscription, SubscriptionChange, SubscriptionPlan};
use crate::ports::{LedgerNotification, LedgerStore, LedgerTx, NotificationSink};

/// What the payment provider reports for a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// A confirmation event as delivered by a webhook or return callback.
#[derive(Debug, Clone)]
pub struct HandleConfirmationCommand {
    pub keys: CorrelationKeys,
    pub outcome: ConfirmationOutcome,
    /// Provider payload, kept in the transaction's extension metadata.
    pub payload: Option<JsonValue>,
}

/// How a confirmation was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No transaction carries these keys.
    Unmatched,
    /// The transaction was settled by an earlier delivery.
    AlreadyApplied {
        transaction_id: TransactionId,
        status: TransactionStatus,
    },
    ToppedUp {
        transaction_id: TransactionId,
        points: i64,
        new_balance: i64,
    },
    SubscriptionCredited {
        transaction_id: TransactionId,
        subscription: Subscription,
        change: SubscriptionChange,
        month: u32,
        new_balance: i64,
    },
    MarkedNotCompleted {
        transaction_id: TransactionId,
        status: TransactionStatus,
    },
}

/// Outcome of a subscription period grant, shared with recurring charges.
pub(super) struct PeriodGrant {
    pub subscription: Subscription,
    pub change: SubscriptionChange,
    pub month: u32,
    pub new_balance: i64,
}

/// Renews (or creates) the subscription and credits the month's points.
///
/// The caller holds the account lock and commits. The month counter
/// continues from the last recorded EARN grant so out-of-order deliveries
/// never reuse a month.
pub(super) async fn grant_period(
    tx: &mut dyn LedgerTx,
    account: &mut Account,
    subscription: Option<Subscription>,
    plan: &SubscriptionPlan,
    billing_transaction_id: TransactionId,
    now: Timestamp,
) -> Result<PeriodGrant, LedgerError> {
    let (subscription, change) = match subscription {
        Some(mut existing) => {
            let change = existing.renew(plan, now);
            (existing, change)
        }
        None => (
            Subscription::activate(account.id, plan, now),
            SubscriptionChange::Created,
        ),
    };
    tx.upsert_subscription(&subscription).await?;

    let month = next_month(tx, account, &subscription.id).await?;
    let grant = Transaction::completed(
        account.id,
        plan.monthly_points,
        TransactionKind::Earn,
        format!("{} month {} points", plan.name, month),
        TransactionMetadata::new()
            .with_subscription(subscription.id)
            .with_plan(plan.id)
            .with_month(month)
            .with_related(billing_transaction_id),
    );
    let new_balance = post_transaction(tx, account, &grant).await?;

    Ok(PeriodGrant {
        subscription,
        change,
        month,
        new_balance,
    })
}

async fn next_month(
    tx: &mut dyn LedgerTx,
    account: &Account,
    subscription_id: &SubscriptionId,
) -> Result<u32, LedgerError> {
    let last = tx.latest_month_counter(&account.id, subscription_id).await?;
    Ok(last.map_or(1, |m| m.saturating_add(1)))
}

/// Handler for payment confirmations.
///
/// The PENDING check, the status flip and every balance effect share one
/// store transaction, so however often an event is delivered its effects
/// are applied at most once. Errors roll back and leave the transaction
/// PENDING for a corrected redelivery.
pub struct HandleConfirmationHandler {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl HandleConfirmationHandler {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub async fn handle(
        &self,
        cmd: HandleConfirmationCommand,
    ) -> Result<ReconcileOutcome, LedgerError> {
        if cmd.keys.is_empty() {
            return Err(LedgerError::validation(
                "correlation_keys",
                "Confirmation carries no checkout or request id",
            ));
        }

        let mut tx = self.store.begin().await?;
        let Some(mut txn) = tx.lock_transaction_by_correlation(&cmd.keys).await? else {
            tracing::warn!(
                checkout_id = ?cmd.keys.checkout_id,
                request_id = ?cmd.keys.request_id,
                "Confirmation matched no transaction; dropped"
            );
            return Ok(ReconcileOutcome::Unmatched);
        };

        if !txn.is_pending() {
            tracing::debug!(
                transaction_id = %txn.id,
                status = txn.status.as_str(),
                "Confirmation already applied"
            );
            return Ok(ReconcileOutcome::AlreadyApplied {
                transaction_id: txn.id,
                status: txn.status,
            });
        }

        let (outcome, notifications) = match cmd.outcome {
            ConfirmationOutcome::Succeeded => match txn.kind {
                TransactionKind::Topup => self.apply_topup(tx.as_mut(), &mut txn).await?,
                TransactionKind::Subscription => {
                    self.apply_subscription(tx.as_mut(), &mut txn).await?
                }
                other => return Err(LedgerError::UnsupportedKind(other)),
            },
            ConfirmationOutcome::Failed | ConfirmationOutcome::Cancelled => {
                let status = if cmd.outcome == ConfirmationOutcome::Failed {
                    TransactionStatus::Failed
                } else {
                    TransactionStatus::Cancelled
                };
                txn.settle(status)?;
                txn.metadata = std::mem::take(&mut txn.metadata).merge_extra(cmd.payload);
                tx.update_transaction(&txn).await?;
                let notification = LedgerNotification::PaymentNotCompleted {
                    account_id: txn.account_id,
                    transaction_id: txn.id,
                    kind: txn.kind,
                    status,
                };
                (
                    ReconcileOutcome::MarkedNotCompleted {
                        transaction_id: txn.id,
                        status,
                    },
                    vec![notification],
                )
            }
        };
        tx.commit().await?;

        tracing::info!(
            transaction_id = %txn.id,
            account_id = %txn.account_id,
            kind = txn.kind.as_str(),
            status = txn.status.as_str(),
            "Payment confirmation reconciled"
        );

        for notification in notifications {
            notify_best_effort(self.notifier.as_ref(), notification).await;
        }
        Ok(outcome)
    }

    async fn apply_topup(
        &self,
        tx: &mut dyn LedgerTx,
        txn: &mut Transaction,
    ) -> Result<(ReconcileOutcome, Vec<LedgerNotification>), LedgerError> {
        let mut account = lock_account(tx, txn.account_id).await?;
        let new_balance = account.credit(txn.amount)?;
        tx.update_account_balance(&account).await?;
        txn.settle(TransactionStatus::Completed)?;
        tx.update_transaction(txn).await?;

        let notification = LedgerNotification::PaymentCompleted {
            account_id: account.id,
            transaction_id: txn.id,
            kind: txn.kind,
            points_credited: txn.amount,
            new_balance,
        };
        Ok((
            ReconcileOutcome::ToppedUp {
                transaction_id: txn.id,
                points: txn.amount,
                new_balance,
            },
            vec![notification],
        ))
    }

    async fn apply_subscription(
        &self,
        tx: &mut dyn LedgerTx,
        txn: &mut Transaction,
    ) -> Result<(ReconcileOutcome, Vec<LedgerNotification>), LedgerError> {
        let mut account = lock_account(tx, txn.account_id).await?;
        let plan_id = txn
            .metadata
            .plan_id
            .ok_or_else(|| LedgerError::validation("plan_id", "Subscription payment has no plan"))?;
        let plan = tx
            .find_plan(&plan_id)
            .await?
            .ok_or(LedgerError::SubscriptionPlanNotFound(plan_id))?;

        let existing = tx.lock_subscription(&account.id, &plan.id).await?;
        let grant = grant_period(tx, &mut account, existing, &plan, txn.id, Timestamp::now()).await?;

        txn.settle(TransactionStatus::Completed)?;
        txn.metadata.subscription_id = Some(grant.subscription.id);
        tx.update_transaction(txn).await?;

        let notifications = vec![
            LedgerNotification::PaymentCompleted {
                account_id: account.id,
                transaction_id: txn.id,
                kind: txn.kind,
                points_credited: plan.monthly_points,
                new_balance: grant.new_balance,
            },
            LedgerNotification::SubscriptionRenewed {
                account_id: account.id,
                subscription_id: grant.subscription.id,
                month: grant.month,
                end_date: grant.subscription.end_date,
            },
        ];
        Ok((
            ReconcileOutcome::SubscriptionCredited {
                transaction_id: txn.id,
                subscription: grant.subscription,
                change: grant.change,
                month: grant.month,
                new_balance: grant.new_balance,
            },
            notifications,
        ))
    }
}
