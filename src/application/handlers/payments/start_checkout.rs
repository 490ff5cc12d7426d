//! StartCheckoutHandler - Command handler for opening a hosted checkout.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::foundation::AccountId;
use crate::domain::ledger::{
    CorrelationKeys, LedgerError, Transaction, TransactionKind, TransactionMetadata,
    TransactionStatus,
};
use crate::ports::{CheckoutProvider, CheckoutRequest, CheckoutSession, LedgerStore, Purchase};

/// Command to start paying for points or a subscription.
#[derive(Debug, Clone)]
pub struct StartCheckoutCommand {
    pub account_id: AccountId,
    pub purchase: Purchase,
    pub success_url: String,
    pub cancel_url: String,
}

/// Result of a successfully opened checkout.
#[derive(Debug, Clone)]
pub struct StartCheckoutResult {
    /// The PENDING row the confirmation will settle.
    pub transaction: Transaction,
    pub checkout: CheckoutSession,
}

/// Handler for starting a checkout.
///
/// The PENDING transaction is written before the provider is called, so a
/// confirmation can never arrive for a payment the ledger does not know.
/// If the provider refuses, the row is settled FAILED.
pub struct StartCheckoutHandler {
    store: Arc<dyn LedgerStore>,
    provider: Arc<dyn CheckoutProvider>,
}

impl StartCheckoutHandler {
    pub fn new(store: Arc<dyn LedgerStore>, provider: Arc<dyn CheckoutProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn handle(&self, cmd: StartCheckoutCommand) -> Result<StartCheckoutResult, LedgerError> {
        // 1. Resolve what is being bought
        if self.store.find_account(&cmd.account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(cmd.account_id));
        }

        let request_id = Uuid::new_v4().to_string();
        let (transaction, price, description) = match &cmd.purchase {
            Purchase::Topup { points, price } => {
                if *price < 0 {
                    return Err(LedgerError::validation("price", "Price cannot be negative"));
                }
                let description = format!("Top-up {} points", points);
                let transaction = Transaction::pending(
                    cmd.account_id,
                    *points,
                    TransactionKind::Topup,
                    description.clone(),
                    TransactionMetadata::new().with_request_id(request_id.clone()),
                )?;
                (transaction, *price, description)
            }
            Purchase::Subscription { plan_id } => {
                let plan = self
                    .store
                    .find_plan(plan_id)
                    .await?
                    .ok_or(LedgerError::SubscriptionPlanNotFound(*plan_id))?;
                let description = format!("Subscription to {}", plan.name);
                let transaction = Transaction::pending(
                    cmd.account_id,
                    plan.monthly_points,
                    TransactionKind::Subscription,
                    description.clone(),
                    TransactionMetadata::new()
                        .with_request_id(request_id.clone())
                        .with_plan(plan.id),
                )?;
                (transaction, plan.price, description)
            }
        };

        // 2. Persist the PENDING row
        let mut tx = self.store.begin().await?;
        tx.insert_transaction(&transaction).await?;
        tx.commit().await?;

        // 3. Open the checkout
        let request = CheckoutRequest {
            account_id: cmd.account_id,
            request_id: request_id.clone(),
            purchase: cmd.purchase,
            price,
            description,
            success_url: cmd.success_url,
            cancel_url: cmd.cancel_url,
        };
        let checkout = match self.provider.create_checkout(&request).await {
            Ok(checkout) => checkout,
            Err(e) => {
                tracing::warn!(
                    account_id = %transaction.account_id,
                    transaction_id = %transaction.id,
                    error = %e,
                    "Checkout provider refused; settling transaction as failed"
                );
                self.fail_if_pending(&request_id).await?;
                return Err(e.into());
            }
        };

        // 4. Remember the provider's id for the confirmation lookup
        let transaction = self.record_checkout_id(&request_id, &checkout.checkout_id).await?;

        tracing::info!(
            account_id = %transaction.account_id,
            transaction_id = %transaction.id,
            kind = transaction.kind.as_str(),
            checkout_id = %checkout.checkout_id,
            request_id = %request_id,
            "Checkout started"
        );

        Ok(StartCheckoutResult {
            transaction,
            checkout,
        })
    }

    /// Sets `checkout_id` on the current version of the row.
    ///
    /// A confirmation may already have settled it while the provider call
    /// was in flight; its status and metadata are kept.
    async fn record_checkout_id(
        &self,
        request_id: &str,
        checkout_id: &str,
    ) -> Result<Transaction, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut current = tx
            .lock_transaction_by_correlation(&CorrelationKeys::request(request_id))
            .await?
            .ok_or_else(|| {
                LedgerError::infrastructure(format!(
                    "Checkout transaction for request {} disappeared",
                    request_id
                ))
            })?;
        if current.metadata.checkout_id.as_deref() != Some(checkout_id) {
            current.metadata.checkout_id = Some(checkout_id.to_string());
            tx.update_transaction(&current).await?;
        }
        tx.commit().await?;

        if !current.is_pending() {
            tracing::debug!(
                transaction_id = %current.id,
                status = current.status.as_str(),
                "Checkout confirmed before the provider call returned"
            );
        }
        Ok(current)
    }

    /// Settles the row FAILED unless a confirmation already settled it.
    async fn fail_if_pending(&self, request_id: &str) -> Result<(), LedgerError> {
        let mut tx = self.store.begin().await?;
        if let Some(mut current) = tx
            .lock_transaction_by_correlation(&CorrelationKeys::request(request_id))
            .await?
        {
            if current.is_pending() {
                current.settle(TransactionStatus::Failed)?;
                tx.update_transaction(&current).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryLedgerStore, MockCheckoutProvider, RecordingNotificationSink};
    use crate::application::handlers::payments::{
        ConfirmationOutcome, HandleConfirmationCommand, HandleConfirmationHandler, ReconcileOutcome,
    };
    use crate::domain::foundation::{DomainError, ErrorCode, PlanId};
    use crate::domain::ledger::Account;
    use crate::domain::subscription::SubscriptionPlan;
    use async_trait::async_trait;

    /// Provider whose customer pays before `create_checkout` returns.
    struct PaysImmediately {
        reconciler: HandleConfirmationHandler,
        outcome: ConfirmationOutcome,
        then_fail: bool,
    }

    #[async_trait]
    impl CheckoutProvider for PaysImmediately {
        async fn create_checkout(
            &self,
            request: &CheckoutRequest,
        ) -> Result<CheckoutSession, DomainError> {
            self.reconciler
                .handle(HandleConfirmationCommand {
                    keys: CorrelationKeys::request(request.request_id.clone()),
                    outcome: self.outcome,
                    payload: None,
                })
                .await?;
            if self.then_fail {
                return Err(DomainError::new(ErrorCode::ExternalServiceError, "timed out"));
            }
            Ok(CheckoutSession {
                checkout_id: "cs_fast_1".to_string(),
                checkout_url: "https://pay.test/cs_fast_1".to_string(),
            })
        }
    }

    fn paying_provider(
        store: &Arc<InMemoryLedgerStore>,
        outcome: ConfirmationOutcome,
        then_fail: bool,
    ) -> Arc<PaysImmediately> {
        Arc::new(PaysImmediately {
            reconciler: HandleConfirmationHandler::new(
                store.clone(),
                Arc::new(RecordingNotificationSink::new()),
            ),
            outcome,
            then_fail,
        })
    }

    async fn setup() -> (Arc<InMemoryLedgerStore>, MockCheckoutProvider, AccountId) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let account = AccountId::new();
        store.create_account(&Account::open(account, None)).await.unwrap();
        (store, MockCheckoutProvider::new(), account)
    }

    fn command(account_id: AccountId, purchase: Purchase) -> StartCheckoutCommand {
        StartCheckoutCommand {
            account_id,
            purchase,
            success_url: "https://app.test/ok".to_string(),
            cancel_url: "https://app.test/cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn topup_checkout_persists_pending_row_with_both_keys() {
        let (store, provider, account) = setup().await;
        let handler = StartCheckoutHandler::new(store.clone(), Arc::new(provider.clone()));

        let result = handler
            .handle(command(account, Purchase::Topup { points: 100, price: 500 }))
            .await
            .unwrap();

        assert_eq!(result.checkout.checkout_id, "cs_test_1");
        let rows = store.list_transactions(&account).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TransactionStatus::Pending);
        assert_eq!(rows[0].amount, 100);
        assert_eq!(rows[0].metadata.checkout_id.as_deref(), Some("cs_test_1"));

        let sent = provider.requests();
        assert_eq!(rows[0].metadata.request_id.as_deref(), Some(sent[0].request_id.as_str()));
        assert_eq!(sent[0].price, 500);
        assert_eq!(store.find_account(&account).await.unwrap().unwrap().balance, 0);
    }

    #[tokio::test]
    async fn subscription_checkout_records_plan() {
        let (store, provider, account) = setup().await;
        let plan = SubscriptionPlan::new("Pro", 1999, 250, 30).unwrap();
        store.save_plan(&plan).await.unwrap();

        let result = StartCheckoutHandler::new(store, Arc::new(provider.clone()))
            .handle(command(account, Purchase::Subscription { plan_id: plan.id }))
            .await
            .unwrap();

        assert_eq!(result.transaction.kind, TransactionKind::Subscription);
        assert_eq!(result.transaction.metadata.plan_id, Some(plan.id));
        assert_eq!(provider.requests()[0].price, 1999);
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected_before_any_write() {
        let (store, provider, account) = setup().await;
        let plan_id = PlanId::new();

        let err = StartCheckoutHandler::new(store.clone(), Arc::new(provider.clone()))
            .handle(command(account, Purchase::Subscription { plan_id }))
            .await
            .unwrap_err();

        assert_eq!(err, LedgerError::SubscriptionPlanNotFound(plan_id));
        assert!(store.list_transactions(&account).await.unwrap().is_empty());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_settles_row_as_failed() {
        let (store, provider, account) = setup().await;
        provider.set_error(DomainError::new(ErrorCode::ExternalServiceError, "down"));

        let result = StartCheckoutHandler::new(store.clone(), Arc::new(provider))
            .handle(command(account, Purchase::Topup { points: 100, price: 500 }))
            .await;

        assert!(result.is_err());
        let rows = store.list_transactions(&account).await.unwrap();
        assert_eq!(rows[0].status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn non_positive_points_are_rejected() {
        let (store, provider, account) = setup().await;
        let err = StartCheckoutHandler::new(store, Arc::new(provider))
            .handle(command(account, Purchase::Topup { points: 0, price: 0 }))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidAmount(0));
    }

    #[tokio::test]
    async fn confirmation_during_provider_call_is_not_undone() {
        let (store, _, account) = setup().await;
        let provider = paying_provider(&store, ConfirmationOutcome::Succeeded, false);

        let result = StartCheckoutHandler::new(store.clone(), provider)
            .handle(command(account, Purchase::Topup { points: 100, price: 500 }))
            .await
            .unwrap();

        assert_eq!(result.transaction.status, TransactionStatus::Completed);
        let rows = store.list_transactions(&account).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TransactionStatus::Completed);
        assert_eq!(rows[0].metadata.checkout_id.as_deref(), Some("cs_fast_1"));
        assert_eq!(store.find_account(&account).await.unwrap().unwrap().balance, 100);

        let redelivered = HandleConfirmationHandler::new(
            store.clone(),
            Arc::new(RecordingNotificationSink::new()),
        )
        .handle(HandleConfirmationCommand {
            keys: CorrelationKeys::checkout("cs_fast_1"),
            outcome: ConfirmationOutcome::Succeeded,
            payload: None,
        })
        .await
        .unwrap();

        assert!(matches!(redelivered, ReconcileOutcome::AlreadyApplied { .. }));
        assert_eq!(store.find_account(&account).await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn early_subscription_confirmation_keeps_subscription_id() {
        let (store, _, account) = setup().await;
        let plan = SubscriptionPlan::new("Pro", 1999, 250, 30).unwrap();
        store.save_plan(&plan).await.unwrap();
        let provider = paying_provider(&store, ConfirmationOutcome::Succeeded, false);

        let result = StartCheckoutHandler::new(store.clone(), provider)
            .handle(command(account, Purchase::Subscription { plan_id: plan.id }))
            .await
            .unwrap();

        let subscription = store
            .find_subscription_for_plan(&account, &plan.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.transaction.status, TransactionStatus::Completed);
        assert_eq!(result.transaction.metadata.subscription_id, Some(subscription.id));
        assert_eq!(result.transaction.metadata.checkout_id.as_deref(), Some("cs_fast_1"));
        assert_eq!(store.find_account(&account).await.unwrap().unwrap().balance, 250);
    }

    #[tokio::test]
    async fn provider_error_after_settlement_keeps_settled_status() {
        let (store, _, account) = setup().await;
        let provider = paying_provider(&store, ConfirmationOutcome::Cancelled, true);

        let result = StartCheckoutHandler::new(store.clone(), provider)
            .handle(command(account, Purchase::Topup { points: 100, price: 500 }))
            .await;

        assert!(result.is_err());
        let rows = store.list_transactions(&account).await.unwrap();
        assert_eq!(rows[0].status, TransactionStatus::Cancelled);
    }
}
