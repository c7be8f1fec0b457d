//! Bank statement line and match types
//!
//! Statement lines arrive already normalized from an external import
//! component; this crate only pairs them with ledger entries.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::transaction::TransactionId;

/// Statement line identifier, assigned by the import component
pub type StatementLineId = u64;

/// One normalized bank statement line
///
/// Credits to the trust account are positive, debits negative, using the
/// same sign convention as ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankStatementLine {
    pub id: StatementLineId,
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
}

/// A proposed pairing of a statement line with a ledger entry
///
/// Proposals are never applied by the matcher itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedMatch {
    pub line_id: StatementLineId,
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    /// Date the bank cleared the entry (the statement line date)
    pub line_date: NaiveDate,
    /// Absolute distance in days between line and entry dates
    pub date_distance: i64,
}

/// Outcome of matching one account's statement lines
///
/// Lines and entries that found no partner are surfaced, not dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub account_id: AccountId,
    pub matches: Vec<ProposedMatch>,
    pub unmatched_lines: Vec<BankStatementLine>,
    pub unmatched_transactions: Vec<TransactionId>,
}

impl MatchReport {
    /// Whether every line and every candidate entry found a partner
    pub fn is_fully_matched(&self) -> bool {
        self.unmatched_lines.is_empty() && self.unmatched_transactions.is_empty()
    }
}
