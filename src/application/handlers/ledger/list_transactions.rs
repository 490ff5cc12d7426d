//! ListTransactionsHandler - Query for an account's transaction history.

use std::sync::Arc;

use crate::domain::foundation::AccountId;
use crate::domain::ledger::{LedgerError, Transaction};
use crate::ports::LedgerStore;

#[derive(Debug, Clone)]
pub struct ListTransactionsQuery {
    pub account_id: AccountId,
    /// Keep only the newest `limit` rows.
    pub limit: Option<usize>,
}

pub struct ListTransactionsHandler {
    store: Arc<dyn LedgerStore>,
}

impl ListTransactionsHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Newest first.
    pub async fn handle(
        &self,
        query: ListTransactionsQuery,
    ) -> Result<Vec<Transaction>, LedgerError> {
        if self.store.find_account(&query.account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(query.account_id));
        }
        let mut transactions = self.store.list_transactions(&query.account_id).await?;
        if let Some(limit) = query.limit {
            transactions.truncate(limit);
        }
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedgerStore;
    use crate::application::handlers::ledger::{ApplyDeltaCommand, ApplyDeltaHandler};
    use crate::domain::ledger::{Account, TransactionKind};

    #[tokio::test]
    async fn newest_first_with_limit() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let id = AccountId::new();
        store.create_account(&Account::open(id, None)).await.unwrap();
        let deltas = ApplyDeltaHandler::new(store.clone());
        for description in ["first", "second", "third"] {
            deltas
                .handle(
                    ApplyDeltaCommand::new(id, 1, TransactionKind::Earn)
                        .with_description(description),
                )
                .await
                .unwrap();
        }

        let rows = ListTransactionsHandler::new(store)
            .handle(ListTransactionsQuery {
                account_id: id,
                limit: Some(2),
            })
            .await
            .unwrap();

        let descriptions: Vec<_> = rows.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descriptions, vec!["third", "second"]);
    }
}
