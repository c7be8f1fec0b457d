//! Types module
//!
//! Contains the plain data structures returned by every ledger operation.
//! This module organizes types into logical submodules:
//! - `account`: trust accounts and per-client sub-ledgers
//! - `transaction`: ledger entries, posting metadata and queries
//! - `reconciliation`: period and three-way reconciliation records
//! - `statement`: bank statement lines and match proposals
//! - `error`: error type for the trust ledger

pub mod account;
pub mod error;
pub mod reconciliation;
pub mod statement;
pub mod transaction;

pub use account::{
    AccountFilter, AccountId, AccountSpec, AccountStatus, AccountType, AccountUpdate,
    BankIdentity, CaseId, ClientId, ClientTrustBalance, TrustAccount, UserId,
};
pub use error::TrustError;
pub use reconciliation::{
    AdjustmentSide, ClientBreakdownRow, ReconciliationAdjustment, ReconciliationId,
    ReconciliationStatus, ReconciliationStatusInfo, ReconciliationTotals, ThreeWayReconciliation,
    ThreeWayStatus, TrustReconciliation,
};
pub use statement::{BankStatementLine, MatchReport, ProposedMatch, StatementLineId};
pub use transaction::{
    validate_amount_scale, NewEntry, PostingMeta, TransactionId, TransactionQuery,
    TransactionStatus, TransactionType, TrustTransaction, MAX_AMOUNT_SCALE,
};
