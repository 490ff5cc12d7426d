//! UseFeatureHandler - Charge for one synchronous feature invocation.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::application::handlers::ledger::{lock_account, post_transaction};
use crate::domain::foundation::{AccountId, TenantId};
use crate::domain::ledger::{Account, LedgerError, Transaction, TransactionKind, TransactionMetadata};
use crate::domain::pricing::{resolve_cost, FeatureUsage};
use crate::ports::LedgerStore;

/// Command to spend points on a feature.
#[derive(Debug, Clone)]
pub struct UseFeatureCommand {
    pub account_id: AccountId,
    pub feature_key: String,
    /// Pricing scope. Defaults to the account's own tenant.
    pub tenant_id: Option<TenantId>,
    pub metadata: Option<JsonValue>,
}

/// Everything the charge produced.
#[derive(Debug, Clone)]
pub struct UseFeatureResult {
    pub account: Account,
    pub usage: FeatureUsage,
    pub transaction: Transaction,
}

/// Handler for metered feature use.
///
/// Cost resolution, the REDEEM debit and the usage row share one store
/// transaction: a failure at any step leaves no trace.
pub struct UseFeatureHandler {
    store: Arc<dyn LedgerStore>,
}

impl UseFeatureHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: UseFeatureCommand) -> Result<UseFeatureResult, LedgerError> {
        let feature_key = cmd.feature_key.trim();
        if feature_key.is_empty() {
            return Err(LedgerError::validation("feature_key", "Feature key is required"));
        }

        let mut tx = self.store.begin().await?;
        let costs = tx.active_feature_costs(feature_key).await?;
        // An unpriced feature is rejected before the account row is locked.
        if resolve_cost(&costs, feature_key, cmd.tenant_id.as_ref()).is_none() {
            return Err(LedgerError::feature_unavailable(feature_key));
        }

        let mut account = lock_account(tx.as_mut(), cmd.account_id).await?;
        let tenant = cmd.tenant_id.or_else(|| account.tenant_id.clone());
        let cost = resolve_cost(&costs, feature_key, tenant.as_ref())
            .cloned()
            .ok_or_else(|| LedgerError::feature_unavailable(feature_key))?;

        let transaction = Transaction::completed(
            account.id,
            cost.points_cost,
            TransactionKind::Redeem,
            format!("Use {}", feature_key),
            TransactionMetadata::new()
                .with_feature_key(feature_key)
                .merge_extra(cmd.metadata.clone()),
        );
        post_transaction(tx.as_mut(), &mut account, &transaction).await?;

        let usage = FeatureUsage::record(account.id, &cost, transaction.id, cmd.metadata);
        tx.insert_feature_usage(&usage).await?;
        tx.commit().await?;

        tracing::info!(
            account_id = %account.id,
            feature_key,
            points = cost.points_cost,
            new_balance = account.balance,
            transaction_id = %transaction.id,
            "Feature charged"
        );

        Ok(UseFeatureResult {
            account,
            usage,
            transaction,
        })
    }
}
