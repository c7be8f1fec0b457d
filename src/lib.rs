//! Trust Ledger Library
//!
//! # Overview
//!
//! Client trust accounting: per-client sub-ledgers inside pooled bank
//! accounts, an append-only posting journal, bank statement matching, period
//! reconciliation and three-way (bank vs. book vs. client ledgers)
//! verification.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (accounts, entries, reconciliations, errors)
//! - [`core`] - Business logic components:
//!   - [`core::ledger_store`] - Per-account books; the only balance mutation path
//!   - [`core::posting_engine`] - Deposits, withdrawals, transfers, disbursements, voids
//!   - [`core::matcher`] / [`core::batch_matcher`] - Statement-to-ledger matching
//!   - [`core::reconciliation_engine`] - Period reconciliation and three-way checks
//!   - [`core::reporting`] - Read-only reports
//!   - [`core::service`] - The [`TrustLedger`] façade
//! - [`io`] - Journal and statement CSV, report CSV and JSON state files
//! - [`cli`] - CLI argument parsing and subcommand runners
//! - [`config`] / [`telemetry`] - Engine tunables and logging setup
//!
//! # Invariants
//!
//! After every operation, for every account:
//! - `balance == available_balance + pending_balance`
//! - `balance` equals the sum of its client balances (no commingling)
//! - no client balance is negative
//!
//! Entries are never deleted or edited; corrections are reversal entries.

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod telemetry;
pub mod types;

pub use config::EngineConfig;
pub use core::{LedgerSnapshot, TrustLedger};
pub use types::{
    AccountId, AccountSpec, ClientId, ClientTrustBalance, ThreeWayReconciliation, TransactionId,
    TrustAccount, TrustError, TrustReconciliation, TrustTransaction,
};
