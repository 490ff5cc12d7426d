//! Concurrency guarantees of the ledger handlers.
//!
//! - Parallel debits on one account never overdraw it
//! - A confirmation delivered many times at once is applied once
//! - A renewal charge and a top-up confirmation on one account both land
//! - A task whose backend always fails retries exactly `max_attempts` times

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use points_ledger::adapters::{
    InMemoryLedgerStore, RecordingNotificationSink, RecordingTaskDispatcher,
};
use points_ledger::application::{
    AuditAccountHandler, AuditAccountQuery, ConfirmationOutcome, CreateTaskCommand,
    CreateTaskHandler, ExecuteTaskHandler, ExecuteTaskResult, HandleConfirmationCommand,
    HandleConfirmationHandler, HandleRecurringChargeCommand, HandleRecurringChargeHandler,
    ReconcileOutcome, RefundTaskCommand, RefundTaskHandler,
    RefundTaskResult, UseFeatureCommand, UseFeatureHandler,
};
use points_ledger::domain::foundation::{AccountId, Timestamp};
use points_ledger::domain::ledger::{
    Account, CorrelationKeys, LedgerError, Transaction, TransactionKind, TransactionMetadata,
};
use points_ledger::domain::subscription::{Subscription, SubscriptionPlan};
use points_ledger::domain::task::{BackoffPolicy, ExecutionError, TaskStatus};
use points_ledger::ports::{LedgerNotification, LedgerStore, TaskHandler, TaskHandlerRegistry};

struct AlwaysUnavailable {
    calls: AtomicU32,
}

#[async_trait]
impl TaskHandler for AlwaysUnavailable {
    async fn invoke(&self, _: &str, _: &JsonValue) -> Result<JsonValue, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExecutionError::from_http_status(503, "overloaded"))
    }
}

async fn funded_account(store: &InMemoryLedgerStore, balance: i64) -> AccountId {
    let id = AccountId::new();
    let mut account = Account::open(id, None);
    account.credit(balance).unwrap();
    store.create_account(&account).await.unwrap();
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_debits_never_overdraw() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let account = funded_account(&store, 10).await;
    store.upsert_feature_cost("image", None, 3).await.unwrap();
    let handler = Arc::new(UseFeatureHandler::new(store.clone()));

    let attempts: Vec<_> = (0..20)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler
                    .handle(UseFeatureCommand {
                        account_id: account,
                        feature_key: "image".to_string(),
                        tenant_id: None,
                        metadata: None,
                    })
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, LedgerError::InsufficientBalance { .. })),
        }
    }

    assert_eq!(succeeded, 3);
    let balance = store.find_account(&account).await.unwrap().unwrap().balance;
    assert_eq!(balance, 1);
    assert_eq!(store.list_feature_usages(&account).await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_confirmations_apply_once() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let account = funded_account(&store, 5).await;
    let pending = Transaction::pending(
        account,
        100,
        TransactionKind::Topup,
        "Top-up 100 points",
        TransactionMetadata::new()
            .with_checkout_id("cs_dup")
            .with_request_id("req_dup"),
    )
    .unwrap();
    let mut tx = store.begin().await.unwrap();
    tx.insert_transaction(&pending).await.unwrap();
    tx.commit().await.unwrap();

    let sink = RecordingNotificationSink::default();
    let handler = Arc::new(HandleConfirmationHandler::new(store.clone(), Arc::new(sink.clone())));

    let deliveries: Vec<_> = (0..10)
        .map(|i| {
            let handler = handler.clone();
            // Alternate between the two correlation keys the provider may send.
            let keys = if i % 2 == 0 {
                CorrelationKeys::checkout("cs_dup")
            } else {
                CorrelationKeys::request("req_dup")
            };
            tokio::spawn(async move {
                handler
                    .handle(HandleConfirmationCommand {
                        keys,
                        outcome: ConfirmationOutcome::Succeeded,
                        payload: None,
                    })
                    .await
            })
        })
        .collect();

    let mut applied = 0;
    for delivery in deliveries {
        match delivery.await.unwrap().unwrap() {
            ReconcileOutcome::ToppedUp { .. } => applied += 1,
            ReconcileOutcome::AlreadyApplied { .. } => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(store.find_account(&account).await.unwrap().unwrap().balance, 105);
    assert_eq!(sink.notifications().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn renewal_and_topup_confirmation_on_one_account_both_apply() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let account = funded_account(&store, 5).await;
    let plan = SubscriptionPlan::new("Pro", 1999, 250, 30).unwrap();
    store.save_plan(&plan).await.unwrap();
    let subscription = Subscription::activate(account, &plan, Timestamp::now());
    let topup = Transaction::pending(
        account,
        100,
        TransactionKind::Topup,
        "Top-up 100 points",
        TransactionMetadata::new().with_request_id("req_topup"),
    )
    .unwrap();
    let mut tx = store.begin().await.unwrap();
    tx.upsert_subscription(&subscription).await.unwrap();
    tx.insert_transaction(&topup).await.unwrap();
    tx.commit().await.unwrap();

    let sink = RecordingNotificationSink::default();
    let renewals = HandleRecurringChargeHandler::new(store.clone(), Arc::new(sink.clone()));
    let confirmations = HandleConfirmationHandler::new(store.clone(), Arc::new(sink.clone()));

    let renewal = tokio::spawn(async move {
        renewals
            .handle(HandleRecurringChargeCommand {
                subscription_id: subscription.id,
                charge_id: "ch_renew_1".to_string(),
                payload: None,
            })
            .await
    });
    let confirmation = tokio::spawn(async move {
        confirmations
            .handle(HandleConfirmationCommand {
                keys: CorrelationKeys::request("req_topup"),
                outcome: ConfirmationOutcome::Succeeded,
                payload: None,
            })
            .await
    });

    let renewed = tokio::time::timeout(Duration::from_secs(5), renewal)
        .await
        .expect("renewal finished")
        .unwrap()
        .unwrap();
    let confirmed = tokio::time::timeout(Duration::from_secs(5), confirmation)
        .await
        .expect("confirmation finished")
        .unwrap()
        .unwrap();

    assert!(matches!(renewed, ReconcileOutcome::SubscriptionCredited { .. }));
    assert!(matches!(confirmed, ReconcileOutcome::ToppedUp { .. }));
    assert_eq!(store.find_account(&account).await.unwrap().unwrap().balance, 355);
}

#[tokio::test]
async fn always_failing_task_stops_at_max_attempts_and_can_be_refunded() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let account = funded_account(&store, 10).await;
    store.upsert_feature_cost("image", None, 4).await.unwrap();

    let dispatcher = RecordingTaskDispatcher::new();
    let created = CreateTaskHandler::new(store.clone(), Arc::new(dispatcher.clone()), 3)
        .handle(CreateTaskCommand {
            account_id: account,
            task_type: "image".to_string(),
            input: json!({ "prompt": "a storm" }),
            max_attempts: None,
            tenant_id: None,
        })
        .await
        .unwrap();

    let backend = Arc::new(AlwaysUnavailable {
        calls: AtomicU32::new(0),
    });
    let sink = RecordingNotificationSink::default();
    let executor = ExecuteTaskHandler::new(
        store.clone(),
        TaskHandlerRegistry::new().register("image", backend.clone()),
        Arc::new(dispatcher.clone()),
        Arc::new(sink.clone()),
        BackoffPolicy::new(Duration::ZERO, Duration::ZERO),
        Duration::from_secs(5),
    );

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        outcomes.push(executor.handle(created.task.id).await.unwrap());
    }

    assert!(matches!(outcomes[0], ExecuteTaskResult::Retrying { .. }));
    assert!(matches!(outcomes[1], ExecuteTaskResult::Retrying { .. }));
    assert!(matches!(outcomes[2], ExecuteTaskResult::Failed { .. }));
    assert_eq!(outcomes[3], ExecuteTaskResult::Skipped);
    assert_eq!(outcomes[4], ExecuteTaskResult::Skipped);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);

    let task = store.find_task(&created.task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 3);
    assert!(matches!(
        sink.notifications().last(),
        Some(LedgerNotification::TaskFailed { .. })
    ));

    let refund = RefundTaskHandler::new(store.clone())
        .handle(RefundTaskCommand {
            task_id: task.id,
            reason: "generation unavailable".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(refund, RefundTaskResult::Refunded { new_balance: 10, .. }));

    let audit = AuditAccountHandler::new(store.clone())
        .handle(AuditAccountQuery { account_id: account })
        .await
        .unwrap();
    assert_eq!(audit.balance, 10);
}
