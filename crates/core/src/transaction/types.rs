//! Transaction domain types.
//!
//! The `Transaction` record is the canonical audit trail of one money
//! movement. Identity fields never change after creation; status, response
//! fields, remarks and timestamps are only changed through the registry.

use chrono::{DateTime, Utc};
use clearline_shared::types::{BatchId, Currency, Money, StandingOrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::id::TransactionId;

/// Response codes written by the core. Upstream codes are stored verbatim.
pub mod codes {
    /// Approved or completed successfully.
    pub const SUCCESS: &str = "00";
    /// Account not found at the ledger.
    pub const ACCOUNT_NOT_FOUND: &str = "07";
    /// Insufficient funds in the debit account.
    pub const INSUFFICIENT_FUNDS: &str = "51";
    /// Destination institution or switch unavailable.
    pub const SWITCH_UNAVAILABLE: &str = "91";
    /// Generic system malfunction.
    pub const SYSTEM_MALFUNCTION: &str = "96";
    /// No answer from the external side within the deadline.
    pub const EXTERNAL_TIMEOUT: &str = "97";
}

/// Transaction status in the processing state machine.
///
/// See [`super::state::StateMachine`] for the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Created, not yet picked up by a channel processor.
    Pending,
    /// A channel processor is settling the transaction.
    Processing,
    /// A recoverable external failure occurred; another attempt follows.
    AwaitingRetry,
    /// Held by compliance before processing.
    PendingApproval,
    /// Held for manual reconciliation after an inconsistent settlement.
    FlaggedSuspicion,
    /// Settled.
    Successful,
    /// Declined or failed without moving money.
    Failed,
    /// External outcome unknown; needs reconciliation.
    Timeout,
    /// Only partly settled.
    PartiallySuccessful,
    /// Undone by a successful reversal.
    Reversed,
    /// Cancelled by a compliance action while held.
    Cancelled,
}

impl TransactionStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Pending,
        Self::Processing,
        Self::AwaitingRetry,
        Self::PendingApproval,
        Self::FlaggedSuspicion,
        Self::Successful,
        Self::Failed,
        Self::Timeout,
        Self::PartiallySuccessful,
        Self::Reversed,
        Self::Cancelled,
    ];

    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::AwaitingRetry => "AWAITING_RETRY",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::FlaggedSuspicion => "FLAGGED_SUSPICION",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
            Self::PartiallySuccessful => "PARTIALLY_SUCCESSFUL",
            Self::Reversed => "REVERSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
    }

    /// Returns true for statuses no processor will move out of on its own.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Successful
                | Self::Failed
                | Self::Timeout
                | Self::PartiallySuccessful
                | Self::Reversed
                | Self::Cancelled
        )
    }

    /// Returns true while waiting on a compliance release or cancel.
    #[must_use]
    pub fn is_held(&self) -> bool {
        matches!(self, Self::PendingApproval | Self::FlaggedSuspicion)
    }

    /// Returns true while the transaction still needs a processor to run.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::AwaitingRetry)
    }

    /// Returns true when entering this status stamps `processed_at`.
    #[must_use]
    pub fn stamps_processed_at(&self) -> bool {
        self.is_terminal() || matches!(self, Self::FlaggedSuspicion)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Returns the string representation.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Parses a value from its string representation.
            pub fn parse(s: &str) -> Option<Self> {
                match s.to_uppercase().as_str() {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Business category of a transaction.
    TransactionCategory {
        /// Account to account transfer.
        FundsTransfer => "FUNDS_TRANSFER",
        /// Payment to a biller's collection account.
        BillPayment => "BILL_PAYMENT",
        /// Loan proceeds credited to the borrower.
        LoanDisbursement => "LOAN_DISBURSEMENT",
        /// Repayment debited from the borrower.
        LoanRepayment => "LOAN_REPAYMENT",
        /// Cash paid in at a branch or agent.
        CashDeposit => "CASH_DEPOSIT",
        /// Cash paid out at a branch or agent.
        CashWithdrawal => "CASH_WITHDRAWAL",
        /// Fee charged to a customer.
        FeePosting => "FEE_POSTING",
        /// Tax charged to a customer.
        TaxPosting => "TAX_POSTING",
        /// Internal system movement.
        SystemPosting => "SYSTEM_POSTING",
        /// Occurrence of a standing order.
        StandingOrderPayment => "STANDING_ORDER_PAYMENT",
        /// One line of a bulk payment batch.
        BulkPaymentItem => "BULK_PAYMENT_ITEM",
        /// Credit sent to a customer of this bank by another institution.
        InwardTransfer => "INWARD_TRANSFER",
    }
}

string_enum! {
    /// Channel through which a transaction was originated.
    Channel {
        /// Book transfer inside this bank.
        IntraBank => "INTRA_BANK",
        /// Transfer over the inter-bank switch.
        InterBank => "INTER_BANK",
        /// USSD session.
        Ussd => "USSD",
        /// Point-of-sale terminal.
        Pos => "POS",
        /// Automated teller machine.
        Atm => "ATM",
        /// Bulk payment batch.
        Bulk => "BULK",
        /// Standing order scheduler.
        StandingOrder => "STANDING_ORDER",
        /// Branch or back-office system.
        Internal => "INTERNAL",
    }
}

/// Where a transaction is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementRoute {
    /// Both legs are accounts of this bank.
    IntraBank,
    /// One leg is at another institution, reached through the switch.
    InterBank,
    /// Credit already settled by the switch, posted from the inward clearing GL.
    InwardSwitch,
}

impl fmt::Display for SettlementRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntraBank => f.write_str("INTRA_BANK"),
            Self::InterBank => f.write_str("INTER_BANK"),
            Self::InwardSwitch => f.write_str("INWARD_SWITCH"),
        }
    }
}

/// One side of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Account number at the holding institution.
    pub account_number: String,
    /// Institution code. `None` means this bank.
    pub bank_code: Option<String>,
    /// Account holder name, when known.
    pub account_name: Option<String>,
}

impl Party {
    /// An account held at this bank.
    pub fn local(account_number: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            bank_code: None,
            account_name: None,
        }
    }

    /// An account held at the institution identified by `bank_code`.
    pub fn at_bank(account_number: impl Into<String>, bank_code: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            bank_code: Some(bank_code.into()),
            account_name: None,
        }
    }

    /// Sets the account holder name.
    #[must_use]
    pub fn with_name(mut self, account_name: impl Into<String>) -> Self {
        self.account_name = Some(account_name.into());
        self
    }

    /// Returns true if the account is held at this bank.
    pub fn is_local(&self, own_bank_code: &str) -> bool {
        self.bank_code
            .as_deref()
            .is_none_or(|code| code == own_bank_code)
    }
}

/// The canonical transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Generator-assigned id, never reused.
    pub id: TransactionId,
    /// Business category.
    pub category: TransactionCategory,
    /// Originating channel.
    pub channel: Channel,
    /// Current status.
    pub status: TransactionStatus,
    /// Principal amount, positive with at most two decimal places.
    pub amount: Decimal,
    /// Currency of `amount`, `fee_amount` and `tax_amount`.
    pub currency: Currency,
    /// Debited party. `None` for pure-credit originations.
    pub debit: Option<Party>,
    /// Credited party.
    pub credit: Party,
    /// Free text shown on statements.
    pub narration: String,
    /// User or system that requested the movement.
    pub initiated_by: String,
    /// Fee charged on top of the principal.
    pub fee_amount: Decimal,
    /// Tax charged on the fee.
    pub tax_amount: Decimal,
    /// Settlement gateway session id. Unique when present.
    pub external_reference: Option<String>,
    /// Last response code.
    pub response_code: Option<String>,
    /// Last response message.
    pub response_message: Option<String>,
    /// Append-only audit remarks.
    pub system_remarks: Option<String>,
    /// Number of recorded retry steps.
    pub retry_count: u32,
    /// True for a mirror created by the reversal coordinator.
    pub is_reversal: bool,
    /// The transaction this one reverses.
    pub original_transaction_id: Option<TransactionId>,
    /// Owning bulk batch.
    pub batch_id: Option<BatchId>,
    /// Originating standing order.
    pub standing_order_id: Option<StandingOrderId>,
    /// Creation time.
    pub initiated_at: DateTime<Utc>,
    /// When the transaction reached a terminal or suspicion status.
    pub processed_at: Option<DateTime<Utc>>,
    /// When the external reference was recorded.
    pub external_system_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Principal amount with its currency.
    #[must_use]
    pub fn money(&self) -> Money {
        Money::new(self.amount, self.currency)
    }

    /// Appends an audit remark, separated from earlier ones by `"; "`.
    pub fn append_remark(&mut self, remark: &str) {
        let remark = remark.trim();
        if remark.is_empty() {
            return;
        }
        self.system_remarks = Some(match self.system_remarks.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}; {remark}"),
            _ => remark.to_string(),
        });
    }

    /// The bank code of the party outside this bank, if any.
    ///
    /// A reversal settles back towards its debit party, so the remote party is
    /// the one it debits.
    #[must_use]
    pub fn remote_bank_code(&self, own_bank_code: &str) -> Option<&str> {
        let remote = if self.is_reversal {
            self.debit.as_ref()?
        } else {
            &self.credit
        };
        remote
            .bank_code
            .as_deref()
            .filter(|code| *code != own_bank_code)
    }

    /// Picks the settlement route for this transaction.
    #[must_use]
    pub fn settlement_route(&self, own_bank_code: &str) -> SettlementRoute {
        if self.is_inward() {
            SettlementRoute::InwardSwitch
        } else if self.remote_bank_code(own_bank_code).is_some() {
            SettlementRoute::InterBank
        } else {
            SettlementRoute::IntraBank
        }
    }

    /// Returns true for a credit received from another bank through the switch.
    #[must_use]
    pub fn is_inward(&self) -> bool {
        self.category == TransactionCategory::InwardTransfer && !self.is_reversal
    }

    /// Returns true if the gateway already accepted this transfer.
    #[must_use]
    pub fn switch_accepted(&self) -> bool {
        self.external_reference.is_some() && self.response_code.as_deref() == Some(codes::SUCCESS)
    }
}

/// Input for creating a transaction through the registry.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Business category.
    pub category: TransactionCategory,
    /// Originating channel.
    pub channel: Channel,
    /// Principal amount and currency.
    pub money: Money,
    /// Debited party.
    pub debit: Option<Party>,
    /// Credited party.
    pub credit: Party,
    /// Statement narration.
    pub narration: String,
    /// Initiator identifier.
    pub initiated_by: String,
    /// The transaction being reversed, for mirrors.
    pub reverses: Option<TransactionId>,
    /// Owning bulk batch.
    pub batch_id: Option<BatchId>,
    /// Originating standing order.
    pub standing_order_id: Option<StandingOrderId>,
}

impl NewTransaction {
    /// Creates an input with no batch, order or reversal linkage.
    pub fn new(
        category: TransactionCategory,
        channel: Channel,
        money: Money,
        debit: Option<Party>,
        credit: Party,
        narration: impl Into<String>,
        initiated_by: impl Into<String>,
    ) -> Self {
        Self {
            category,
            channel,
            money,
            debit,
            credit,
            narration: narration.into(),
            initiated_by: initiated_by.into(),
            reverses: None,
            batch_id: None,
            standing_order_id: None,
        }
    }

    /// Links the transaction to a bulk batch.
    #[must_use]
    pub fn in_batch(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    /// Links the transaction to a standing order.
    #[must_use]
    pub fn for_standing_order(mut self, order_id: StandingOrderId) -> Self {
        self.standing_order_id = Some(order_id);
        self
    }

    /// Marks the transaction as the reversal of `original`.
    #[must_use]
    pub fn reversing(mut self, original: TransactionId) -> Self {
        self.reverses = Some(original);
        self
    }
}

/// Switch settlement detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchDetail {
    /// Gateway session id of the funds transfer.
    pub session_id: String,
    /// Session id of the name enquiry that preceded it.
    pub name_enquiry_ref: Option<String>,
    /// Beneficiary name returned by the name enquiry.
    pub beneficiary_name: Option<String>,
    /// Destination institution.
    pub destination_bank_code: String,
}

/// Channel-specific record stored alongside a transaction's terminal update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelDetail {
    /// Inter-bank settlement through the switch.
    Switch(SwitchDetail),
    /// Book transfer posted to the ledger.
    Ledger {
        /// Idempotency reference the ledger posted under.
        posting_reference: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TransactionStatus::Pending, "PENDING")]
    #[case(TransactionStatus::AwaitingRetry, "AWAITING_RETRY")]
    #[case(TransactionStatus::FlaggedSuspicion, "FLAGGED_SUSPICION")]
    #[case(TransactionStatus::PartiallySuccessful, "PARTIALLY_SUCCESSFUL")]
    fn test_status_round_trips_through_str(#[case] status: TransactionStatus, #[case] text: &str) {
        assert_eq!(status.as_str(), text);
        assert_eq!(TransactionStatus::parse(text), Some(status));
        assert_eq!(TransactionStatus::parse(&text.to_lowercase()), Some(status));
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        for status in TransactionStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_status_classes_are_disjoint() {
        for status in TransactionStatus::ALL {
            let classes = [status.is_terminal(), status.is_held(), status.is_in_flight()];
            assert_eq!(classes.iter().filter(|c| **c).count(), 1, "{status}");
        }
    }

    #[test]
    fn test_category_and_channel_parse() {
        assert_eq!(
            TransactionCategory::parse("bulk_payment_item"),
            Some(TransactionCategory::BulkPaymentItem)
        );
        assert_eq!(Channel::parse("INTER_BANK"), Some(Channel::InterBank));
        assert_eq!(Channel::parse("FAX"), None);
    }

    #[test]
    fn test_party_locality() {
        assert!(Party::local("0123456789").is_local("000001"));
        assert!(Party::at_bank("0123456789", "000001").is_local("000001"));
        assert!(!Party::at_bank("0123456789", "000058").is_local("000001"));
    }

    #[test]
    fn test_channel_detail_serializes_with_kind_tag() {
        let detail = ChannelDetail::Ledger {
            posting_reference: "CLT1".into(),
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "ledger");
    }
}
