//! Tagged transaction requests accepted from the API layer.
//!
//! Each variant carries exactly the fields its movement needs and converts
//! into a [`NewTransaction`] with the matching category and channel.

use clearline_shared::types::{Currency, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{Channel, NewTransaction, Party, TransactionCategory};

/// A requested money movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionRequest {
    /// Transfer between two accounts of this bank.
    IntraBankTransfer(TransferInstruction),
    /// Transfer to an account at another bank through the switch.
    InterBankTransfer(InterBankInstruction),
    /// Cash paid into a customer account.
    CashDeposit(DepositInstruction),
    /// Cash paid out of a customer account.
    CashWithdrawal(WithdrawalInstruction),
    /// Payment to a biller's collection account.
    BillPayment(BillPaymentInstruction),
    /// Loan proceeds paid to the borrower.
    LoanDisbursement(LoanInstruction),
    /// Loan repayment collected from the borrower.
    LoanRepayment(LoanInstruction),
}

/// Common fields of every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Amount to move.
    pub amount: Decimal,
    /// Currency of the amount.
    pub currency: Currency,
    /// Statement narration.
    pub narration: String,
    /// User or system requesting the movement.
    pub initiated_by: String,
    /// Originating channel, when not the default for the request type.
    #[serde(default)]
    pub channel: Option<Channel>,
}

/// Book transfer inside this bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferInstruction {
    /// Common fields.
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Account debited.
    pub debit_account: String,
    /// Account credited.
    pub credit_account: String,
}

/// Switch transfer to another bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterBankInstruction {
    /// Common fields.
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Account debited at this bank.
    pub debit_account: String,
    /// Beneficiary account at the destination bank.
    pub beneficiary_account: String,
    /// Destination institution code.
    pub beneficiary_bank_code: String,
    /// Beneficiary name, when already resolved by the caller.
    #[serde(default)]
    pub beneficiary_name: Option<String>,
}

/// Cash deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositInstruction {
    /// Common fields.
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Account credited.
    pub account: String,
}

/// Cash withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalInstruction {
    /// Common fields.
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Account debited.
    pub account: String,
    /// Till or vault account paying out the cash.
    pub till_account: String,
}

/// Bill payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillPaymentInstruction {
    /// Common fields.
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Account debited.
    pub debit_account: String,
    /// Biller's collection account.
    pub biller_account: String,
    /// Institution holding the collection account. `None` means this bank.
    #[serde(default)]
    pub biller_bank_code: Option<String>,
    /// Customer reference at the biller.
    pub customer_reference: String,
}

/// Loan disbursement or repayment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanInstruction {
    /// Common fields.
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Borrower's account.
    pub customer_account: String,
    /// Loan account in the loan book.
    pub loan_account: String,
}

impl RequestMeta {
    fn into_new(
        self,
        category: TransactionCategory,
        default_channel: Channel,
        debit: Option<Party>,
        credit: Party,
    ) -> NewTransaction {
        NewTransaction::new(
            category,
            self.channel.unwrap_or(default_channel),
            Money::new(self.amount, self.currency),
            debit,
            credit,
            self.narration,
            self.initiated_by,
        )
    }
}

impl TransactionRequest {
    /// The category this request produces.
    #[must_use]
    pub fn category(&self) -> TransactionCategory {
        match self {
            Self::IntraBankTransfer(_) | Self::InterBankTransfer(_) => {
                TransactionCategory::FundsTransfer
            }
            Self::CashDeposit(_) => TransactionCategory::CashDeposit,
            Self::CashWithdrawal(_) => TransactionCategory::CashWithdrawal,
            Self::BillPayment(_) => TransactionCategory::BillPayment,
            Self::LoanDisbursement(_) => TransactionCategory::LoanDisbursement,
            Self::LoanRepayment(_) => TransactionCategory::LoanRepayment,
        }
    }

    /// Converts the request into registry input.
    #[must_use]
    pub fn into_new_transaction(self) -> NewTransaction {
        let category = self.category();
        match self {
            Self::IntraBankTransfer(i) => i.meta.into_new(
                category,
                Channel::IntraBank,
                Some(Party::local(i.debit_account)),
                Party::local(i.credit_account),
            ),
            Self::InterBankTransfer(i) => {
                let mut beneficiary = Party::at_bank(i.beneficiary_account, i.beneficiary_bank_code);
                beneficiary.account_name = i.beneficiary_name;
                i.meta.into_new(
                    category,
                    Channel::InterBank,
                    Some(Party::local(i.debit_account)),
                    beneficiary,
                )
            }
            Self::CashDeposit(i) => {
                i.meta
                    .into_new(category, Channel::Internal, None, Party::local(i.account))
            }
            Self::CashWithdrawal(i) => i.meta.into_new(
                category,
                Channel::Internal,
                Some(Party::local(i.account)),
                Party::local(i.till_account),
            ),
            Self::BillPayment(i) => {
                let narration = format!("{} [ref {}]", i.meta.narration, i.customer_reference);
                let biller = Party {
                    account_number: i.biller_account,
                    bank_code: i.biller_bank_code,
                    account_name: None,
                };
                let mut new = i.meta.into_new(
                    category,
                    Channel::IntraBank,
                    Some(Party::local(i.debit_account)),
                    biller,
                );
                new.narration = narration;
                new
            }
            Self::LoanDisbursement(i) => i.meta.into_new(
                category,
                Channel::Internal,
                Some(Party::local(i.loan_account)),
                Party::local(i.customer_account),
            ),
            Self::LoanRepayment(i) => i.meta.into_new(
                category,
                Channel::Internal,
                Some(Party::local(i.customer_account)),
                Party::local(i.loan_account),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn meta() -> RequestMeta {
        RequestMeta {
            amount: dec!(2500.00),
            currency: Currency::Ngn,
            narration: "Rent".into(),
            initiated_by: "teller-7".into(),
            channel: None,
        }
    }

    #[test]
    fn test_inter_bank_request_targets_destination_bank() {
        let new = TransactionRequest::InterBankTransfer(InterBankInstruction {
            meta: meta(),
            debit_account: "0011223344".into(),
            beneficiary_account: "9988776655".into(),
            beneficiary_bank_code: "000058".into(),
            beneficiary_name: Some("ADA OBI".into()),
        })
        .into_new_transaction();

        assert_eq!(new.category, TransactionCategory::FundsTransfer);
        assert_eq!(new.channel, Channel::InterBank);
        assert_eq!(new.credit.bank_code.as_deref(), Some("000058"));
        assert_eq!(new.credit.account_name.as_deref(), Some("ADA OBI"));
        assert_eq!(new.debit.unwrap().account_number, "0011223344");
    }

    #[test]
    fn test_cash_deposit_has_no_debit_party() {
        let new = TransactionRequest::CashDeposit(DepositInstruction {
            meta: meta(),
            account: "0011223344".into(),
        })
        .into_new_transaction();
        assert!(new.debit.is_none());
        assert_eq!(new.category, TransactionCategory::CashDeposit);
    }

    #[test]
    fn test_channel_override() {
        let mut meta = meta();
        meta.channel = Some(Channel::Ussd);
        let new = TransactionRequest::IntraBankTransfer(TransferInstruction {
            meta,
            debit_account: "1".into(),
            credit_account: "2".into(),
        })
        .into_new_transaction();
        assert_eq!(new.channel, Channel::Ussd);
    }

    #[test]
    fn test_bill_payment_narration_carries_reference() {
        let new = TransactionRequest::BillPayment(BillPaymentInstruction {
            meta: meta(),
            debit_account: "0011223344".into(),
            biller_account: "5000000001".into(),
            biller_bank_code: None,
            customer_reference: "METER-44".into(),
        })
        .into_new_transaction();
        assert_eq!(new.narration, "Rent [ref METER-44]");
    }

    #[test]
    fn test_request_deserializes_from_tagged_json() {
        let json = serde_json::json!({
            "type": "cash_withdrawal",
            "amount": "500.00",
            "currency": "NGN",
            "narration": "ATM",
            "initiated_by": "atm-12",
            "channel": "ATM",
            "account": "0011223344",
            "till_account": "GL-ATM-12"
        });
        let request: TransactionRequest = serde_json::from_value(json).unwrap();
        let new = request.into_new_transaction();
        assert_eq!(new.category, TransactionCategory::CashWithdrawal);
        assert_eq!(new.channel, Channel::Atm);
        assert_eq!(new.money.amount, dec!(500.00));
    }
}
