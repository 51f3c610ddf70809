use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use super::domain::{
    RelatedEntity, TransactionId, WalletBalance, WalletTransaction, WalletTransactionKind,
};
use super::repository::{RepositoryError, WalletStore};

/// House income ledger: append-only log plus a cached balance projection.
#[derive(Clone)]
pub struct WalletLedger {
    store: Arc<dyn WalletStore>,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("income amount {0} is negative")]
    NegativeAmount(Decimal),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// Cached balance compared against a replay of the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerReconciliation {
    pub cached_net_balance: Decimal,
    pub replayed_net_balance: Decimal,
    pub transaction_count: usize,
}

impl LedgerReconciliation {
    pub fn is_consistent(&self) -> bool {
        self.cached_net_balance == self.replayed_net_balance
    }
}

impl WalletLedger {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    pub fn record_income(
        &self,
        amount: Decimal,
        description: impl Into<String>,
        related: RelatedEntity,
        at: DateTime<Utc>,
    ) -> Result<WalletTransaction, LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(amount));
        }
        let transaction = WalletTransaction {
            id: TransactionId::generate(),
            kind: WalletTransactionKind::SubscriptionIncome,
            amount,
            description: description.into(),
            related,
            created_at: at,
            updated_at: at,
        };

        let balance = self.store.record_income(transaction.clone())?;
        info!(
            transaction_id = %transaction.id,
            %amount,
            net_balance = %balance.net_balance,
            "house income recorded"
        );
        Ok(transaction)
    }

    pub fn balance(&self) -> Result<Option<WalletBalance>, RepositoryError> {
        self.store.balance()
    }

    /// Net balance derived from the log alone.
    pub fn replay(transactions: &[WalletTransaction]) -> Decimal {
        transactions
            .iter()
            .map(|transaction| match transaction.kind {
                WalletTransactionKind::SubscriptionIncome => transaction.amount,
            })
            .sum()
    }

    pub fn reconcile(&self) -> Result<LedgerReconciliation, RepositoryError> {
        let transactions = self.store.transactions()?;
        let cached = self
            .store
            .balance()?
            .map(|balance| balance.net_balance)
            .unwrap_or(Decimal::ZERO);
        Ok(LedgerReconciliation {
            cached_net_balance: cached,
            replayed_net_balance: Self::replay(&transactions),
            transaction_count: transactions.len(),
        })
    }
}
