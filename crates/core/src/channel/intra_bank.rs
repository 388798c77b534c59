//! Book transfers between accounts of this bank.

use std::sync::Arc;

use async_trait::async_trait;

use super::ChannelProcessor;
use super::ledger::LedgerLeg;
use crate::clients::{LedgerAccount, PostingInstruction};
use crate::error::CoreError;
use crate::transaction::{
    SettlementRoute, Transaction, TransactionGuard, TransactionRegistry,
};

/// Settles a transaction with a single ledger posting.
pub struct IntraBankProcessor {
    registry: Arc<TransactionRegistry>,
    ledger: LedgerLeg,
    cash_gl: String,
}

impl IntraBankProcessor {
    pub(crate) fn new(
        registry: Arc<TransactionRegistry>,
        ledger: LedgerLeg,
        cash_gl: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            ledger,
            cash_gl: cash_gl.into(),
        }
    }

    /// The posting that settles `transaction`.
    ///
    /// Pure-credit originations are funded from the cash GL.
    #[must_use]
    pub fn posting_for(&self, transaction: &Transaction) -> PostingInstruction {
        let from = transaction.debit.as_ref().map_or_else(
            || LedgerAccount::GeneralLedger(self.cash_gl.clone()),
            |debit| LedgerAccount::Customer(debit.account_number.clone()),
        );
        PostingInstruction {
            from,
            to: LedgerAccount::Customer(transaction.credit.account_number.clone()),
            amount: transaction.amount,
            currency: transaction.currency,
            narration: transaction.narration.clone(),
            idempotency_ref: transaction.id.to_string(),
        }
    }
}

#[async_trait]
impl ChannelProcessor for IntraBankProcessor {
    fn route(&self) -> SettlementRoute {
        SettlementRoute::IntraBank
    }

    async fn settle(
        &self,
        guard: &TransactionGuard,
        transaction: Transaction,
    ) -> Result<Transaction, CoreError> {
        let instruction = self.posting_for(&transaction);
        self.ledger.settle(&self.registry, guard, &instruction).await
    }
}
