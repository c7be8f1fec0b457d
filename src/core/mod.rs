//! Core business logic module
//!
//! This module contains the trust ledger components:
//! - `ledger_store` - Per-account books and the only balance mutation path
//! - `posting_engine` - Business postings (deposits, transfers, voids, ...)
//! - `matcher` - Statement-to-ledger match proposals for one account
//! - `batch_matcher` - Concurrent matching across accounts
//! - `reconciliation_engine` - Period reconciliation and three-way checks
//! - `reporting` - Read-only reports
//! - `service` - The `TrustLedger` façade wiring everything together

pub mod batch_matcher;
pub mod ledger_store;
pub mod matcher;
pub mod posting_engine;
pub mod reconciliation_engine;
pub mod reporting;
pub mod service;

pub use batch_matcher::{AccountMatchResult, BatchMatcher};
pub use ledger_store::{AccountBook, LedgerStore, StoreSnapshot};
pub use matcher::{MatchConfig, StatementMatcher};
pub use posting_engine::PostingEngine;
pub use reconciliation_engine::{ReconciliationEngine, ReconciliationSnapshot};
pub use reporting::{AccountSummary, BalanceMatrix, ClientLedgerStatement, ReportingFacade};
pub use service::{LedgerSnapshot, TrustLedger};
