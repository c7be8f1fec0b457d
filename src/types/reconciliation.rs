//! Reconciliation types for the trust ledger
//!
//! [`TrustReconciliation`] is one bank-statement period review for an
//! account. [`ThreeWayReconciliation`] is an immutable point-in-time
//! comparison of bank, book and client-ledger balances.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::{AccountId, ClientId, UserId};
use super::error::TrustError;
use super::transaction::validate_amount_scale;

/// Reconciliation identifier (shared by period and three-way records)
pub type ReconciliationId = u64;

/// Status of a period reconciliation
///
/// `InProgress → Completed` requires a zero difference;
/// `InProgress → Exception` requires an explicit override. Both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    InProgress,
    Completed,
    Exception,
}

impl ReconciliationStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, ReconciliationStatus::InProgress)
    }
}

/// Which side of the reconciliation a manual adjustment corrects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentSide {
    /// Corrects the bank statement balance (e.g. a bank error)
    Bank,
    /// Corrects the book balance (e.g. a bank fee not yet booked)
    Book,
}

/// A manual correction recorded on a reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationAdjustment {
    pub side: AdjustmentSide,
    pub description: String,
    /// Signed amount added to the chosen side
    pub amount: Decimal,
    pub reference: Option<String>,
    pub added_by: UserId,
}

impl ReconciliationAdjustment {
    pub fn new(
        side: AdjustmentSide,
        amount: Decimal,
        description: impl Into<String>,
        added_by: impl Into<UserId>,
    ) -> Self {
        ReconciliationAdjustment {
            side,
            description: description.into(),
            amount,
            reference: None,
            added_by: added_by.into(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn validate(&self) -> Result<(), TrustError> {
        if self.amount.is_zero() {
            return Err(TrustError::validation("adjustment amount must not be zero"));
        }
        validate_amount_scale(self.amount)?;
        if self.description.trim().is_empty() {
            return Err(TrustError::validation("adjustment needs a description"));
        }
        Ok(())
    }
}

/// Totals derived from the ledger for one reconciliation period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTotals {
    /// Book balance as of the period end
    pub closing_balance: Decimal,
    pub cleared_deposits: Decimal,
    pub cleared_withdrawals: Decimal,
    pub outstanding_deposits: Decimal,
    pub outstanding_withdrawals: Decimal,
}

/// One bank-statement period review for one trust account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustReconciliation {
    pub id: ReconciliationId,
    pub account_id: AccountId,
    pub reconciliation_date: NaiveDate,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,

    /// Closing book balance of the previous finalized period
    pub opening_balance: Decimal,
    /// Book balance as of `period_end`
    pub closing_balance: Decimal,
    pub bank_statement_balance: Decimal,

    pub cleared_deposits: Decimal,
    pub cleared_withdrawals: Decimal,
    pub outstanding_deposits: Decimal,
    pub outstanding_withdrawals: Decimal,

    /// Adjusted bank balance minus adjusted book balance
    pub difference: Decimal,

    pub status: ReconciliationStatus,
    pub adjustments: Vec<ReconciliationAdjustment>,
    pub notes: Option<String>,

    pub started_by: UserId,
    pub started_at: DateTime<Utc>,
    pub reconciled_by: Option<UserId>,
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl TrustReconciliation {
    /// Sum of adjustments recorded against one side
    pub fn adjustment_total(&self, side: AdjustmentSide) -> Result<Decimal, TrustError> {
        self.adjustments
            .iter()
            .filter(|a| a.side == side)
            .try_fold(Decimal::ZERO, |total, a| {
                total
                    .checked_add(a.amount)
                    .ok_or_else(|| TrustError::arithmetic_overflow("adjustment_total", self.account_id))
            })
    }

    /// Overwrite the ledger-derived totals and recompute the difference
    ///
    /// difference = (bank + bank adjustments)
    ///            - (book + book adjustments - outstanding deposits + outstanding withdrawals)
    ///
    /// # Errors
    ///
    /// - `TrustError::ArithmeticOverflow` if any intermediate sum leaves the
    ///   `Decimal` range; the record is left untouched
    pub fn apply_totals(&mut self, totals: ReconciliationTotals) -> Result<(), TrustError> {
        let overflow = || TrustError::arithmetic_overflow("apply_totals", self.account_id);
        let adjusted_bank = self
            .bank_statement_balance
            .checked_add(self.adjustment_total(AdjustmentSide::Bank)?)
            .ok_or_else(overflow)?;
        let adjusted_book = totals
            .closing_balance
            .checked_add(self.adjustment_total(AdjustmentSide::Book)?)
            .and_then(|b| b.checked_sub(totals.outstanding_deposits))
            .and_then(|b| b.checked_add(totals.outstanding_withdrawals))
            .ok_or_else(overflow)?;
        let difference = adjusted_bank.checked_sub(adjusted_book).ok_or_else(overflow)?;

        self.closing_balance = totals.closing_balance;
        self.cleared_deposits = totals.cleared_deposits;
        self.cleared_withdrawals = totals.cleared_withdrawals;
        self.outstanding_deposits = totals.outstanding_deposits;
        self.outstanding_withdrawals = totals.outstanding_withdrawals;
        self.difference = difference;
        Ok(())
    }
}

/// Status of a three-way check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreeWayStatus {
    /// Bank, book and client ledgers agree
    Balanced,
    /// Book and client ledgers disagree (internal discrepancy)
    Unbalanced,
    /// Book and client ledgers agree but the bank does not
    Exception,
}

/// Per-client line of a three-way check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientBreakdownRow {
    pub client_id: ClientId,
    /// Balance stored on the client's sub-ledger row
    pub ledger_balance: Decimal,
    /// Balance attributed to the client by replaying the journal
    pub book_balance: Decimal,
    /// `ledger_balance - book_balance`
    pub difference: Decimal,
}

/// Immutable point-in-time comparison of bank, book and client ledgers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeWayReconciliation {
    pub id: ReconciliationId,
    pub account_id: AccountId,
    pub bank_balance: Decimal,
    pub book_balance: Decimal,
    pub client_ledger_total: Decimal,

    /// `bank_balance - book_balance`
    pub bank_book_difference: Decimal,
    /// `book_balance - client_ledger_total`
    pub book_client_difference: Decimal,
    /// `bank_balance - client_ledger_total`
    pub bank_client_difference: Decimal,

    pub is_balanced: bool,
    pub client_rows: Vec<ClientBreakdownRow>,
    pub status: ThreeWayStatus,
    pub verified_by: UserId,
    pub verified_at: DateTime<Utc>,
}

/// Reconciliation state of an account at a glance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationStatusInfo {
    pub account_id: AccountId,
    pub in_progress: Option<TrustReconciliation>,
    pub last_reconciliation: Option<TrustReconciliation>,
    /// Non-void entries not yet reconciled
    pub unreconciled_transactions: usize,
    /// Entries still pending at the bank
    pub uncleared_transactions: usize,
}

impl ReconciliationStatusInfo {
    pub fn has_in_progress(&self) -> bool {
        self.in_progress.is_some()
    }
}
