//! AuditAccountHandler - Query comparing a balance with its transaction trail.

use std::sync::Arc;

use crate::domain::foundation::AccountId;
use crate::domain::ledger::{LedgerAudit, LedgerError};
use crate::ports::LedgerStore;

#[derive(Debug, Clone)]
pub struct AuditAccountQuery {
    pub account_id: AccountId,
}

pub struct AuditAccountHandler {
    store: Arc<dyn LedgerStore>,
}

impl AuditAccountHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: AuditAccountQuery) -> Result<LedgerAudit, LedgerError> {
        let account = self
            .store
            .find_account(&query.account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(query.account_id))?;
        let transactions = self.store.list_transactions(&query.account_id).await?;

        let audit = LedgerAudit::of(account.id, account.balance, &transactions);
        if !audit.is_consistent() {
            tracing::error!(
                account_id = %account.id,
                balance = audit.balance,
                derived_balance = audit.derived_balance,
                "Balance does not match transaction trail"
            );
        }
        Ok(audit)
    }
}
