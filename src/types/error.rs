//! Error types for the trust ledger
//!
//! This module defines every error that can be returned by the ledger store,
//! posting engine, reconciliation engine and the CLI around them.
//!
//! # Error Categories
//!
//! - **Ledger rule violations**: validation failures, insufficient trust funds,
//!   immutable entries, illegal state transitions, non-zero balances on close,
//!   unbalanced reconciliations
//! - **Lookups**: unknown account, transaction or reconciliation
//! - **Arithmetic**: overflow in checked balance arithmetic
//! - **Boundary errors**: file I/O, CSV parsing and snapshot (de)serialization,
//!   raised only by the CLI and persistence layer
//!
//! None of these are retried or corrected automatically. Every one is returned
//! to the caller, which has to decide what to do.

use rust_decimal::Decimal;
use thiserror::Error;

use super::account::AccountId;
use super::reconciliation::ReconciliationId;
use super::transaction::TransactionId;

/// Main error type for the trust ledger
///
/// Each variant carries enough context to explain the rejection to an
/// operator without re-reading the ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrustError {
    /// Malformed input (missing bank identity, non-positive amount, bad period, ...)
    #[error("Validation failed: {message}")]
    Validation {
        /// Description of the rule that was broken
        message: String,
    },

    /// A debit would drive a client's trust balance below zero
    ///
    /// Always rejected, never auto-corrected.
    #[error(
        "Insufficient trust funds for client {client} in account {account}: balance {balance}, requested {requested}"
    )]
    InsufficientTrustFunds {
        /// Account holding the client's funds
        account: AccountId,
        /// Client whose sub-ledger would go negative
        client: String,
        /// Client balance before the rejected entry
        balance: Decimal,
        /// Amount the entry tried to debit
        requested: Decimal,
    },

    /// Attempt to void or re-open an entry that is already reconciled
    #[error("Transaction {tx} is reconciled and cannot be {operation}")]
    ImmutableEntry {
        /// The reconciled transaction
        tx: TransactionId,
        /// Operation that was refused
        operation: String,
    },

    /// Illegal state transition (clearing a void entry, finalizing twice, ...)
    #[error("Invalid state for {operation}: {message}")]
    InvalidState {
        /// Operation that was refused
        operation: String,
        /// Why the current state does not allow it
        message: String,
    },

    /// Closing an account that still holds client funds
    #[error("Account {account} cannot be closed: {clients} client balance(s) totalling {outstanding} remain")]
    NonZeroBalance {
        /// The account that was asked to close
        account: AccountId,
        /// Number of clients with a non-zero balance
        clients: usize,
        /// Sum of the outstanding client balances
        outstanding: Decimal,
    },

    /// Completing a reconciliation whose difference is not zero
    #[error("Reconciliation {reconciliation} is unbalanced by {difference}")]
    UnbalancedReconciliation {
        /// The reconciliation that could not be completed
        reconciliation: ReconciliationId,
        /// The remaining difference
        difference: Decimal,
    },

    /// Unknown trust account
    #[error("Trust account {account} not found")]
    AccountNotFound {
        /// The account id that was looked up
        account: AccountId,
    },

    /// Unknown ledger transaction
    #[error("Transaction {tx} not found for {operation}")]
    TransactionNotFound {
        /// The transaction id that was looked up
        tx: TransactionId,
        /// Operation that needed it
        operation: String,
    },

    /// Unknown reconciliation record
    #[error("Reconciliation {reconciliation} not found")]
    ReconciliationNotFound {
        /// The reconciliation id that was looked up
        reconciliation: ReconciliationId,
    },

    /// Checked decimal arithmetic overflowed
    #[error("Arithmetic overflow in {operation} on account {account}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Account whose balances were being updated
        account: AccountId,
    },

    /// I/O error while reading or writing files
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },

    /// Snapshot (de)serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error
        message: String,
    },
}

impl From<std::io::Error> for TrustError {
    fn from(error: std::io::Error) -> Self {
        TrustError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for TrustError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        TrustError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for TrustError {
    fn from(error: serde_json::Error) -> Self {
        TrustError::Serialization {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl TrustError {
    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        TrustError::Validation {
            message: message.into(),
        }
    }

    /// Create an InsufficientTrustFunds error
    pub fn insufficient_funds(
        account: AccountId,
        client: &str,
        balance: Decimal,
        requested: Decimal,
    ) -> Self {
        TrustError::InsufficientTrustFunds {
            account,
            client: client.to_string(),
            balance,
            requested,
        }
    }

    /// Create an ImmutableEntry error
    pub fn immutable_entry(tx: TransactionId, operation: &str) -> Self {
        TrustError::ImmutableEntry {
            tx,
            operation: operation.to_string(),
        }
    }

    /// Create an InvalidState error
    pub fn invalid_state(operation: &str, message: impl Into<String>) -> Self {
        TrustError::InvalidState {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Create a NonZeroBalance error
    pub fn non_zero_balance(account: AccountId, clients: usize, outstanding: Decimal) -> Self {
        TrustError::NonZeroBalance {
            account,
            clients,
            outstanding,
        }
    }

    /// Create an UnbalancedReconciliation error
    pub fn unbalanced(reconciliation: ReconciliationId, difference: Decimal) -> Self {
        TrustError::UnbalancedReconciliation {
            reconciliation,
            difference,
        }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account: AccountId) -> Self {
        TrustError::AccountNotFound { account }
    }

    /// Create a TransactionNotFound error
    pub fn transaction_not_found(tx: TransactionId, operation: &str) -> Self {
        TrustError::TransactionNotFound {
            tx,
            operation: operation.to_string(),
        }
    }

    /// Create a ReconciliationNotFound error
    pub fn reconciliation_not_found(reconciliation: ReconciliationId) -> Self {
        TrustError::ReconciliationNotFound { reconciliation }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: AccountId) -> Self {
        TrustError::ArithmeticOverflow {
            operation: operation.to_string(),
            account,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    #[rstest]
    #[case::validation(
        TrustError::validation("bank name is required"),
        "Validation failed: bank name is required"
    )]
    #[case::insufficient_funds(
        TrustError::insufficient_funds(7, "client-a", Decimal::new(1_000_000, 2), Decimal::new(1_200_000, 2)),
        "Insufficient trust funds for client client-a in account 7: balance 10000.00, requested 12000.00"
    )]
    #[case::immutable_entry(
        TrustError::immutable_entry(42, "voided"),
        "Transaction 42 is reconciled and cannot be voided"
    )]
    #[case::invalid_state(
        TrustError::invalid_state("mark_cleared", "transaction 3 is void"),
        "Invalid state for mark_cleared: transaction 3 is void"
    )]
    #[case::non_zero_balance(
        TrustError::non_zero_balance(2, 1, Decimal::new(500, 0)),
        "Account 2 cannot be closed: 1 client balance(s) totalling 500 remain"
    )]
    #[case::unbalanced(
        TrustError::unbalanced(9, Decimal::new(4_680_000, 2)),
        "Reconciliation 9 is unbalanced by 46800.00"
    )]
    #[case::account_not_found(TrustError::account_not_found(5), "Trust account 5 not found")]
    #[case::transaction_not_found(
        TrustError::transaction_not_found(99, "void"),
        "Transaction 99 not found for void"
    )]
    #[case::parse_error_with_line(
        TrustError::Parse { line: Some(12), message: "bad amount".to_string() },
        "CSV parse error at line 12: bad amount"
    )]
    #[case::parse_error_without_line(
        TrustError::Parse { line: None, message: "bad amount".to_string() },
        "CSV parse error: bad amount"
    )]
    fn test_error_display(#[case] error: TrustError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "state file missing");
        let error: TrustError = io_error.into();
        assert!(matches!(error, TrustError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: state file missing");
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse = serde_json::from_str::<u32>("not a number").unwrap_err();
        let error: TrustError = parse.into();
        assert!(matches!(error, TrustError::Serialization { .. }));
    }
}
