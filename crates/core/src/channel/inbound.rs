//! Credits sent to customers of this bank by other institutions.
//!
//! The switch has already debited the sending bank when the notification
//! arrives, so the only leg left is crediting the customer from the inward
//! clearing GL. A credit that cannot be posted is flagged for operations
//! instead of failed: the money is with this bank either way.

use std::sync::Arc;

use async_trait::async_trait;
use clearline_shared::types::Money;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ChannelProcessor;
use super::ledger::LedgerLeg;
use crate::clients::{LedgerAccount, PostingInstruction, PostingOutcome};
use crate::error::CoreError;
use crate::transaction::{
    Channel, ChannelDetail, NewTransaction, Party, SettlementRoute, StatusUpdate, SwitchDetail,
    Transaction, TransactionCategory, TransactionGuard, TransactionRegistry, TransactionStatus,
    codes,
};

/// Initiator recorded on inward credits.
pub const SWITCH_INITIATOR: &str = "SWITCH";

/// A credit notification pushed by the settlement gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundCreditNotification {
    /// Gateway session id. One notification per session is ever credited.
    pub session_id: String,
    /// Session id of the name enquiry the sending bank made.
    pub name_enquiry_ref: Option<String>,
    /// Account debited at the sending bank.
    pub originator: Party,
    /// Account of this bank to credit.
    pub beneficiary_account: String,
    /// Beneficiary name as resolved by the sending bank.
    pub beneficiary_name: Option<String>,
    /// Amount and currency.
    pub money: Money,
    /// Narration supplied by the sender. May be empty.
    pub narration: String,
}

impl InboundCreditNotification {
    pub(crate) fn validate(&self, own_bank_code: &str) -> Result<(), CoreError> {
        if self.session_id.trim().is_empty() {
            return Err(CoreError::Validation("session id is required".into()));
        }
        if self.originator.bank_code.is_none() || self.originator.is_local(own_bank_code) {
            return Err(CoreError::Validation(
                "originator must be an account at another bank".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn to_new_transaction(&self) -> NewTransaction {
        let mut credit = Party::local(self.beneficiary_account.trim());
        credit.account_name = self.beneficiary_name.clone();
        let narration = match self.narration.trim() {
            "" => format!(
                "Inward transfer from {}",
                self.originator
                    .account_name
                    .as_deref()
                    .unwrap_or(&self.originator.account_number)
            ),
            narration => narration.to_string(),
        };
        NewTransaction::new(
            TransactionCategory::InwardTransfer,
            Channel::InterBank,
            self.money,
            Some(self.originator.clone()),
            credit,
            narration,
            SWITCH_INITIATOR,
        )
    }

    pub(crate) fn switch_detail(&self, own_bank_code: &str) -> SwitchDetail {
        SwitchDetail {
            session_id: self.session_id.trim().to_string(),
            name_enquiry_ref: self.name_enquiry_ref.clone(),
            beneficiary_name: self.beneficiary_name.clone(),
            destination_bank_code: own_bank_code.to_string(),
        }
    }
}

/// Credits the beneficiary of an inward transfer.
pub struct InwardProcessor {
    registry: Arc<TransactionRegistry>,
    ledger: LedgerLeg,
    clearing_gl: String,
}

impl InwardProcessor {
    pub(crate) fn new(
        registry: Arc<TransactionRegistry>,
        ledger: LedgerLeg,
        clearing_gl: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            ledger,
            clearing_gl: clearing_gl.into(),
        }
    }

    /// The posting that credits the beneficiary.
    #[must_use]
    pub fn posting_for(&self, transaction: &Transaction) -> PostingInstruction {
        PostingInstruction {
            from: LedgerAccount::GeneralLedger(self.clearing_gl.clone()),
            to: LedgerAccount::Customer(transaction.credit.account_number.clone()),
            amount: transaction.amount,
            currency: transaction.currency,
            narration: transaction.narration.clone(),
            idempotency_ref: transaction.id.to_string(),
        }
    }

    /// Switch detail for a record whose receipt never wrote one.
    async fn missing_detail(
        &self,
        transaction: &Transaction,
    ) -> Result<Option<ChannelDetail>, CoreError> {
        if self.registry.channel_detail(&transaction.id).await?.is_some() {
            return Ok(None);
        }
        Ok(transaction.external_reference.clone().map(|session_id| {
            ChannelDetail::Switch(SwitchDetail {
                session_id,
                name_enquiry_ref: None,
                beneficiary_name: transaction.credit.account_name.clone(),
                destination_bank_code: self.registry.bank_code().to_string(),
            })
        }))
    }
}

#[async_trait]
impl ChannelProcessor for InwardProcessor {
    fn route(&self) -> SettlementRoute {
        SettlementRoute::InwardSwitch
    }

    async fn settle(
        &self,
        guard: &TransactionGuard,
        transaction: Transaction,
    ) -> Result<Transaction, CoreError> {
        let instruction = self.posting_for(&transaction);
        let session_id = transaction.external_reference.clone().unwrap_or_default();

        let failure = match self.ledger.post(&self.registry, guard, &instruction).await? {
            Ok(PostingOutcome::Posted) => {
                let mut update = StatusUpdate::to(TransactionStatus::Successful)
                    .with_response(codes::SUCCESS, "Approved or completed successfully");
                if let Some(detail) = self.missing_detail(&transaction).await? {
                    update = update.with_detail(detail);
                }
                let credited = self.registry.transition(guard, update).await?;
                info!(txn_id = %credited.id, session_id = %session_id, "Inward credit posted");
                return Ok(credited);
            }
            Ok(outcome) => outcome.to_string(),
            Err(err) => err.to_string(),
        };

        warn!(
            txn_id = %transaction.id,
            session_id = %session_id,
            reason = %failure,
            "Inward credit received but customer credit failed"
        );
        self.registry
            .transition(
                guard,
                StatusUpdate::to(TransactionStatus::FlaggedSuspicion).with_remark(format!(
                    "Inward credit received (session {session_id}) but customer credit failed: {failure}"
                )),
            )
            .await
    }
}
