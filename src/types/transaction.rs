//! Transaction-related types for the trust ledger
//!
//! This module defines ledger entry types, their lifecycle status, the
//! immutable [`TrustTransaction`] row and the inputs the posting engine uses
//! to create one.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::{AccountId, CaseId, ClientId, UserId};
use super::error::TrustError;

/// Transaction identifier, assigned by the ledger store
///
/// Identifiers are handed out in creation order, so a lower id always means
/// an earlier-created entry.
pub type TransactionId = u64;

/// Maximum number of decimal places an amount may carry (minor currency unit)
pub const MAX_AMOUNT_SCALE: u32 = 2;

/// Ledger entry types
///
/// Credits carry a positive signed amount, debits a negative one.
/// Adjustments may carry either sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    /// Client funds received into trust
    Deposit,
    /// Client funds paid out of trust
    Withdrawal,
    /// Credit leg of a transfer between client sub-ledgers
    TransferIn,
    /// Debit leg of a transfer between client sub-ledgers
    TransferOut,
    /// Earned fees paid from trust to the firm
    FeeDisbursement,
    /// Case expenses paid from trust
    ExpenseDisbursement,
    /// Interest credited by the bank
    InterestCredit,
    /// Manual correction, including the offsetting entry of a void
    Adjustment,
}

impl TransactionType {
    /// Whether entries of this type add funds to the client
    pub fn is_credit(self) -> bool {
        matches!(
            self,
            TransactionType::Deposit | TransactionType::TransferIn | TransactionType::InterestCredit
        )
    }

    /// Whether entries of this type remove funds from the client
    pub fn is_debit(self) -> bool {
        matches!(
            self,
            TransactionType::Withdrawal
                | TransactionType::TransferOut
                | TransactionType::FeeDisbursement
                | TransactionType::ExpenseDisbursement
        )
    }
}

/// Lifecycle status of a ledger entry
///
/// `Pending → Cleared → Reconciled`; `Void` is reached only through an
/// explicit reversal and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Cleared,
    Reconciled,
    Void,
}

/// An immutable ledger entry
///
/// Once written, only `status`, `cleared_date`, `cleared_at` and
/// `reconciled_at` ever change. Reversals are new rows linked through
/// `reverses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustTransaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub case_id: Option<CaseId>,

    /// Business date of the entry
    pub date: NaiveDate,
    pub tx_type: TransactionType,

    /// Signed amount: positive credits, negative debits
    pub amount: Decimal,

    /// Client balance immediately after this entry
    pub running_balance: Decimal,

    pub reference: Option<String>,
    pub description: String,
    pub payee: Option<String>,
    pub payor: Option<String>,
    pub check_number: Option<String>,

    pub status: TransactionStatus,

    /// Date the bank cleared the entry
    pub cleared_date: Option<NaiveDate>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub reconciled_at: Option<DateTime<Utc>>,

    pub invoice_id: Option<String>,
    pub expense_id: Option<String>,

    /// Other leg of a transfer
    pub counterpart_id: Option<TransactionId>,

    /// Entry this one offsets, for void reversals
    pub reverses: Option<TransactionId>,

    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl TrustTransaction {
    /// Whether the entry currently counts towards pending balances
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }
}

/// Descriptive data and caller identity attached to a posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingMeta {
    pub date: NaiveDate,
    pub reference: Option<String>,
    pub description: String,
    pub payee: Option<String>,
    pub payor: Option<String>,
    pub check_number: Option<String>,
    pub case_id: Option<CaseId>,
    pub invoice_id: Option<String>,
    pub expense_id: Option<String>,
    pub created_by: UserId,
}

impl PostingMeta {
    /// Create metadata for a posting made by `created_by` on `date`
    pub fn new(created_by: impl Into<UserId>, date: NaiveDate) -> Self {
        PostingMeta {
            date,
            reference: None,
            description: String::new(),
            payee: None,
            payor: None,
            check_number: None,
            case_id: None,
            invoice_id: None,
            expense_id: None,
            created_by: created_by.into(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = Some(payee.into());
        self
    }

    pub fn with_payor(mut self, payor: impl Into<String>) -> Self {
        self.payor = Some(payor.into());
        self
    }

    pub fn with_check_number(mut self, check_number: impl Into<String>) -> Self {
        self.check_number = Some(check_number.into());
        self
    }

    pub fn with_case(mut self, case_id: impl Into<CaseId>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    pub fn with_invoice(mut self, invoice_id: impl Into<String>) -> Self {
        self.invoice_id = Some(invoice_id.into());
        self
    }

    pub fn with_expense(mut self, expense_id: impl Into<String>) -> Self {
        self.expense_id = Some(expense_id.into());
        self
    }
}

/// A ledger entry waiting to be appended
///
/// The store assigns the id, running balance, status and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub meta: PostingMeta,
}

impl NewEntry {
    /// Build an entry from posting metadata
    pub fn new(
        account_id: AccountId,
        client_id: impl Into<ClientId>,
        tx_type: TransactionType,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Self {
        NewEntry {
            account_id,
            client_id: client_id.into(),
            tx_type,
            amount,
            meta,
        }
    }

    /// Check the entry's shape before it reaches the store
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Validation` if:
    /// - The client id is blank
    /// - The amount is zero or uses more than `MAX_AMOUNT_SCALE` decimals
    /// - The amount's sign disagrees with the entry type
    /// - `created_by` is blank
    pub fn validate(&self) -> Result<(), TrustError> {
        if self.client_id.trim().is_empty() {
            return Err(TrustError::validation("client id is required"));
        }
        if self.meta.created_by.trim().is_empty() {
            return Err(TrustError::validation("created_by is required"));
        }
        validate_amount_scale(self.amount)?;
        if self.amount.is_zero() {
            return Err(TrustError::validation("amount must not be zero"));
        }
        if self.tx_type.is_credit() && self.amount.is_sign_negative() {
            return Err(TrustError::validation(format!(
                "{:?} entries must carry a positive amount",
                self.tx_type
            )));
        }
        if self.tx_type.is_debit() && self.amount.is_sign_positive() {
            return Err(TrustError::validation(format!(
                "{:?} entries must carry a negative amount",
                self.tx_type
            )));
        }
        Ok(())
    }
}

/// Reject amounts finer than the minor currency unit
pub fn validate_amount_scale(amount: Decimal) -> Result<(), TrustError> {
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(TrustError::validation(format!(
            "amount {} has more than {} decimal places",
            amount, MAX_AMOUNT_SCALE
        )));
    }
    Ok(())
}

/// Filter for listing an account's transactions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    pub tx_type: Option<TransactionType>,
    pub client_id: Option<ClientId>,
    pub status: Option<TransactionStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl TransactionQuery {
    /// Check whether a transaction passes this filter
    pub fn matches(&self, tx: &TrustTransaction) -> bool {
        self.tx_type.map_or(true, |t| t == tx.tx_type)
            && self.client_id.as_ref().map_or(true, |c| *c == tx.client_id)
            && self.status.map_or(true, |s| s == tx.status)
            && self.from.map_or(true, |from| tx.date >= from)
            && self.to.map_or(true, |to| tx.date <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn meta() -> PostingMeta {
        PostingMeta::new("clerk", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    #[rstest]
    #[case::deposit_positive(TransactionType::Deposit, Decimal::new(10_000, 0), true)]
    #[case::deposit_negative(TransactionType::Deposit, Decimal::new(-10_000, 0), false)]
    #[case::withdrawal_negative(TransactionType::Withdrawal, Decimal::new(-500, 0), true)]
    #[case::withdrawal_positive(TransactionType::Withdrawal, Decimal::new(500, 0), false)]
    #[case::adjustment_either(TransactionType::Adjustment, Decimal::new(-5, 0), true)]
    #[case::zero(TransactionType::Adjustment, Decimal::ZERO, false)]
    #[case::sub_cent(TransactionType::Deposit, Decimal::new(1_001, 3), false)]
    #[case::trailing_zeros_ok(TransactionType::Deposit, Decimal::new(1_000, 3), true)]
    fn test_entry_validation(
        #[case] tx_type: TransactionType,
        #[case] amount: Decimal,
        #[case] valid: bool,
    ) {
        let entry = NewEntry::new(1, "client-a", tx_type, amount, meta());
        assert_eq!(entry.validate().is_ok(), valid);
    }

    #[test]
    fn test_entry_requires_client_and_creator() {
        let entry = NewEntry::new(1, " ", TransactionType::Deposit, Decimal::ONE, meta());
        assert!(entry.validate().is_err());

        let anonymous = PostingMeta::new("", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let entry = NewEntry::new(1, "client-a", TransactionType::Deposit, Decimal::ONE, anonymous);
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_type_serializes_kebab_case() {
        let json = serde_json::to_string(&TransactionType::FeeDisbursement).unwrap();
        assert_eq!(json, "\"fee-disbursement\"");
    }

    #[test]
    fn test_meta_builder_sets_fields() {
        let meta = meta()
            .with_reference("R-1")
            .with_description("Retainer")
            .with_check_number("1001")
            .with_case("case-9")
            .with_invoice("inv-3");

        assert_eq!(meta.reference.as_deref(), Some("R-1"));
        assert_eq!(meta.description, "Retainer");
        assert_eq!(meta.check_number.as_deref(), Some("1001"));
        assert_eq!(meta.case_id.as_deref(), Some("case-9"));
        assert_eq!(meta.invoice_id.as_deref(), Some("inv-3"));
    }
}
