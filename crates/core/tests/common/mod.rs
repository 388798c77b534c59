//! Scripted collaborators and a wired service for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clearline_core::TransactionService;
use clearline_core::clients::{
    Clients, ClientError, ComplianceHook, FeeCalculator, FeeContext, FeeLine,
    FundsTransferRequest, FundsTransferResponse, LedgerAccount, LedgerClient,
    NameEnquiryResponse, PostingInstruction, PostingOutcome, SettlementGateway,
};
use clearline_core::standing_order::FailurePolicy;
use clearline_core::store::Stores;
use clearline_core::transaction::{
    Transaction, TransactionRequest, TransactionStatus,
    request::{InterBankInstruction, RequestMeta, TransferInstruction},
};
use clearline_shared::config::ProcessingConfig;
use clearline_shared::types::Currency;
use rust_decimal::Decimal;

pub const BANK_CODE: &str = "000001";
pub const REMOTE_BANK: &str = "000058";
pub const SUSPENSE_GL: &str = "GL-SETTLEMENT-SUSPENSE";

/// Processing config with no back-off so retries run instantly.
pub fn config() -> ProcessingConfig {
    ProcessingConfig {
        bank_code: BANK_CODE.to_string(),
        retry_backoff_ms: 0,
        max_attempts: 3,
        ..ProcessingConfig::default()
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Ledger that dedupes on the idempotency reference and answers from a script.
///
/// Unscripted calls post successfully. Accounts registered with
/// [`ScriptedLedger::reject_account`] always answer with their outcome.
#[derive(Default)]
pub struct ScriptedLedger {
    script: Mutex<VecDeque<Result<PostingOutcome, ClientError>>>,
    rejections: Mutex<HashMap<String, PostingOutcome>>,
    posted_refs: Mutex<HashSet<String>>,
    postings: Mutex<Vec<PostingInstruction>>,
    calls: AtomicUsize,
}

impl ScriptedLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, answers: impl IntoIterator<Item = Result<PostingOutcome, ClientError>>) {
        self.script.lock().unwrap().extend(answers);
    }

    pub fn reject_account(&self, account: &str, outcome: PostingOutcome) {
        self.rejections
            .lock()
            .unwrap()
            .insert(account.to_string(), outcome);
    }

    /// Distinct postings that took effect.
    pub fn postings(&self) -> Vec<PostingInstruction> {
        self.postings.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn account_code(account: &LedgerAccount) -> &str {
    match account {
        LedgerAccount::Customer(code) | LedgerAccount::GeneralLedger(code) => code,
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn post(&self, instruction: &PostingInstruction) -> Result<PostingOutcome, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .posted_refs
            .lock()
            .unwrap()
            .contains(&instruction.idempotency_ref)
        {
            return Ok(PostingOutcome::Posted);
        }

        let rejected = {
            let rejections = self.rejections.lock().unwrap();
            rejections
                .get(account_code(&instruction.to))
                .or_else(|| rejections.get(account_code(&instruction.from)))
                .cloned()
        };
        let answer = match rejected {
            Some(outcome) => Ok(outcome),
            None => self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PostingOutcome::Posted)),
        };

        if answer == Ok(PostingOutcome::Posted) {
            self.posted_refs
                .lock()
                .unwrap()
                .insert(instruction.idempotency_ref.clone());
            self.postings.lock().unwrap().push(instruction.clone());
        }
        answer
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Switch that answers from scripts. Unscripted calls approve.
#[derive(Default)]
pub struct ScriptedGateway {
    enquiries: Mutex<VecDeque<Result<NameEnquiryResponse, ClientError>>>,
    transfers: Mutex<VecDeque<Result<FundsTransferResponse, ClientError>>>,
    requests: Mutex<Vec<FundsTransferRequest>>,
    enquiry_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_enquiries(
        &self,
        answers: impl IntoIterator<Item = Result<NameEnquiryResponse, ClientError>>,
    ) {
        self.enquiries.lock().unwrap().extend(answers);
    }

    pub fn script_transfers(
        &self,
        answers: impl IntoIterator<Item = Result<FundsTransferResponse, ClientError>>,
    ) {
        self.transfers.lock().unwrap().extend(answers);
    }

    /// Every funds transfer request received, including retries.
    pub fn transfer_requests(&self) -> Vec<FundsTransferRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn enquiry_calls(&self) -> usize {
        self.enquiry_calls.load(Ordering::SeqCst)
    }
}

pub fn approved_enquiry() -> NameEnquiryResponse {
    NameEnquiryResponse {
        account_name: Some("ADA OBI".into()),
        bvn: None,
        response_code: "00".into(),
        session_id: Some("NE-0001".into()),
    }
}

pub fn transfer_answer(code: &str, session_id: Option<&str>) -> FundsTransferResponse {
    FundsTransferResponse {
        session_id: session_id.map(str::to_string),
        response_code: code.to_string(),
        response_message: if code == "00" {
            "Approved".into()
        } else {
            "Declined".into()
        },
    }
}

#[async_trait]
impl SettlementGateway for ScriptedGateway {
    async fn name_enquiry(
        &self,
        _bank_code: &str,
        _account_number: &str,
    ) -> Result<NameEnquiryResponse, ClientError> {
        self.enquiry_calls.fetch_add(1, Ordering::SeqCst);
        self.enquiries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(approved_enquiry()))
    }

    async fn funds_transfer(
        &self,
        request: &FundsTransferRequest,
    ) -> Result<FundsTransferResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        self.transfers.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(transfer_answer(
                "00",
                Some(&format!("SW-{}", request.payment_reference)),
            ))
        })
    }
}

// ============================================================================
// Fees and compliance
// ============================================================================

/// Charges a flat fee with 7.5% tax on it.
pub struct FlatFee(pub Decimal);

#[async_trait]
impl FeeCalculator for FlatFee {
    async fn calculate(&self, _context: &FeeContext) -> Result<Vec<FeeLine>, ClientError> {
        Ok(vec![FeeLine {
            code: "TRF".into(),
            description: "Transfer fee".into(),
            fee: self.0,
            tax: self.0 * Decimal::new(75, 3),
        }])
    }
}

/// Holds transactions at or above a threshold.
pub struct HoldAbove(pub Decimal);

#[async_trait]
impl ComplianceHook for HoldAbove {
    async fn should_hold(&self, transaction: &Transaction) -> Result<bool, ClientError> {
        Ok(transaction.amount >= self.0)
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub service: TransactionService,
    pub ledger: Arc<ScriptedLedger>,
    pub gateway: Arc<ScriptedGateway>,
    pub stores: Stores,
}

pub fn harness() -> Harness {
    harness_with(|clients| clients, FailurePolicy::never())
}

pub fn harness_with(
    customize: impl FnOnce(Clients) -> Clients,
    policy: FailurePolicy,
) -> Harness {
    let ledger = ScriptedLedger::new();
    let gateway = ScriptedGateway::new();
    let stores = Stores::in_memory();
    let clients = customize(Clients::new(ledger.clone(), gateway.clone()));
    let service = TransactionService::new(&stores, &clients, &config(), policy);
    Harness {
        service,
        ledger,
        gateway,
        stores,
    }
}

fn meta(amount: Decimal, narration: &str) -> RequestMeta {
    RequestMeta {
        amount,
        currency: Currency::Ngn,
        narration: narration.to_string(),
        initiated_by: "teller-7".to_string(),
        channel: None,
    }
}

pub fn intra_bank(debit: &str, credit: &str, amount: Decimal) -> TransactionRequest {
    TransactionRequest::IntraBankTransfer(TransferInstruction {
        meta: meta(amount, "Transfer"),
        debit_account: debit.to_string(),
        credit_account: credit.to_string(),
    })
}

pub fn inter_bank(debit: &str, beneficiary: &str, amount: Decimal) -> TransactionRequest {
    TransactionRequest::InterBankTransfer(InterBankInstruction {
        meta: meta(amount, "Supplier payment"),
        debit_account: debit.to_string(),
        beneficiary_account: beneficiary.to_string(),
        beneficiary_bank_code: REMOTE_BANK.to_string(),
        beneficiary_name: None,
    })
}

impl Harness {
    /// Creates and processes a request, returning the settled record.
    pub async fn run(&self, request: TransactionRequest) -> Transaction {
        let created = self.service.create_transaction(request).await.unwrap();
        assert_eq!(created.status, TransactionStatus::Pending);
        self.service.process_transaction(&created.id).await.unwrap()
    }
}
