//! Contracts of the external collaborators.
//!
//! The ledger, settlement gateway, fee calculator and compliance hook are
//! black boxes reached through these traits. Every call made by the core is
//! wrapped in [`with_timeout`], so a slow collaborator surfaces as
//! [`ClientError::Timeout`] rather than a stuck transaction.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clearline_shared::types::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{Channel, Party, Transaction, TransactionCategory};

/// Failure to get an answer from a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No answer before the deadline. The call may or may not have taken effect.
    #[error("call timed out")]
    Timeout,

    /// The request was not delivered.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The request was delivered but the answer could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Returns true if the request is known not to have reached the collaborator.
    #[must_use]
    pub fn is_undelivered(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Returns true for transport failures worth retrying on an idempotent call.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// Runs `call`, failing with [`ClientError::Timeout`] after `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(ClientError::Timeout))
}

// ============================================================================
// Ledger
// ============================================================================

/// An account the ledger can post against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum LedgerAccount {
    /// Customer account number.
    Customer(String),
    /// General-ledger code.
    GeneralLedger(String),
}

/// A single double-entry movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingInstruction {
    /// Debited account.
    pub from: LedgerAccount,
    /// Credited account.
    pub to: LedgerAccount,
    /// Amount moved.
    pub amount: Decimal,
    /// Currency of the amount.
    pub currency: Currency,
    /// Statement narration.
    pub narration: String,
    /// Reference the ledger dedupes on.
    pub idempotency_ref: String,
}

/// Ledger answer to a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PostingOutcome {
    /// Posted, or already posted under the same reference.
    Posted,
    /// The debited account cannot cover the amount.
    InsufficientFunds,
    /// One of the accounts does not exist.
    AccountNotFound,
    /// The ledger failed for another reason.
    SystemError(String),
}

impl fmt::Display for PostingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posted => f.write_str("posted"),
            Self::InsufficientFunds => f.write_str("insufficient funds"),
            Self::AccountNotFound => f.write_str("account not found"),
            Self::SystemError(detail) => write!(f, "ledger system error: {detail}"),
        }
    }
}

/// Double-entry ledger poster.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Posts one movement.
    async fn post(&self, instruction: &PostingInstruction) -> Result<PostingOutcome, ClientError>;
}

// ============================================================================
// Settlement gateway
// ============================================================================

/// Answer to a name enquiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEnquiryResponse {
    /// Account holder name at the destination bank.
    pub account_name: Option<String>,
    /// Bank verification number, when disclosed.
    pub bvn: Option<String>,
    /// Switch response code.
    pub response_code: String,
    /// Session id of the enquiry.
    pub session_id: Option<String>,
}

/// Funds transfer request sent to the switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsTransferRequest {
    /// Always the transaction id.
    pub payment_reference: String,
    /// Originator.
    pub debit: Party,
    /// Beneficiary.
    pub credit: Party,
    /// Amount transferred.
    pub amount: Decimal,
    /// Currency of the amount.
    pub currency: Currency,
    /// Statement narration.
    pub narration: String,
    /// Session id of the preceding name enquiry.
    pub name_enquiry_ref: Option<String>,
}

/// Switch answer to a funds transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsTransferResponse {
    /// Switch session id.
    pub session_id: Option<String>,
    /// Switch response code.
    pub response_code: String,
    /// Switch response message.
    pub response_message: String,
}

/// Inter-bank settlement gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Resolves an account at another bank to its holder's name.
    async fn name_enquiry(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<NameEnquiryResponse, ClientError>;

    /// Moves funds to another bank. Dedupes on `payment_reference`.
    async fn funds_transfer(
        &self,
        request: &FundsTransferRequest,
    ) -> Result<FundsTransferResponse, ClientError>;
}

// ============================================================================
// Fees
// ============================================================================

/// What the fee calculator prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeContext {
    /// Business category.
    pub category: TransactionCategory,
    /// Originating channel.
    pub channel: Channel,
    /// Principal amount.
    pub amount: Decimal,
    /// Currency of the amount.
    pub currency: Currency,
    /// Debited account, if any.
    pub debit_account: Option<String>,
}

impl FeeContext {
    /// Builds the context for a transaction.
    #[must_use]
    pub fn for_transaction(transaction: &Transaction) -> Self {
        Self {
            category: transaction.category,
            channel: transaction.channel,
            amount: transaction.amount,
            currency: transaction.currency,
            debit_account: transaction
                .debit
                .as_ref()
                .map(|party| party.account_number.clone()),
        }
    }
}

/// One fee charged on a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeLine {
    /// Fee rule code.
    pub code: String,
    /// Human-readable description.
    pub description: String,
    /// Fee amount.
    pub fee: Decimal,
    /// Tax levied on the fee.
    pub tax: Decimal,
}

/// Fee and tax calculation service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeCalculator: Send + Sync {
    /// Returns the fee lines for a transaction context.
    async fn calculate(&self, context: &FeeContext) -> Result<Vec<FeeLine>, ClientError>;
}

/// Fee calculator that charges nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFees;

#[async_trait]
impl FeeCalculator for NoFees {
    async fn calculate(&self, _context: &FeeContext) -> Result<Vec<FeeLine>, ClientError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Compliance
// ============================================================================

/// Compliance screening consulted before a transaction leaves `PENDING`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComplianceHook: Send + Sync {
    /// Returns true if the transaction must wait for manual approval.
    async fn should_hold(&self, transaction: &Transaction) -> Result<bool, ClientError>;
}

/// Compliance hook that never holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverHold;

#[async_trait]
impl ComplianceHook for NeverHold {
    async fn should_hold(&self, _transaction: &Transaction) -> Result<bool, ClientError> {
        Ok(false)
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// The collaborators a processing core talks to.
#[derive(Clone)]
pub struct Clients {
    /// Ledger poster.
    pub ledger: Arc<dyn LedgerClient>,
    /// Inter-bank settlement gateway.
    pub gateway: Arc<dyn SettlementGateway>,
    /// Fee calculator.
    pub fees: Arc<dyn FeeCalculator>,
    /// Compliance screening.
    pub compliance: Arc<dyn ComplianceHook>,
}

impl Clients {
    /// Wires a ledger and gateway with no fees and no compliance holds.
    pub fn new(ledger: Arc<dyn LedgerClient>, gateway: Arc<dyn SettlementGateway>) -> Self {
        Self {
            ledger,
            gateway,
            fees: Arc::new(NoFees),
            compliance: Arc::new(NeverHold),
        }
    }

    /// Replaces the fee calculator.
    #[must_use]
    pub fn with_fees(mut self, fees: Arc<dyn FeeCalculator>) -> Self {
        self.fees = fees;
        self
    }

    /// Replaces the compliance hook.
    #[must_use]
    pub fn with_compliance(mut self, compliance: Arc<dyn ComplianceHook>) -> Self {
        self.compliance = compliance;
        self
    }
}
