//! Concurrent statement matching across accounts
//!
//! This module provides the `BatchMatcher`, which takes a mixed batch of
//! statement lines, partitions it by account and runs one
//! `StatementMatcher::propose` per account on its own tokio task.
//!
//! # Design
//!
//! Matching is read-only, so accounts are fully independent. Each task
//! copies its account's candidate entries under the book's read lock and then
//! matches without holding any lock. At most `max_concurrent_accounts` tasks
//! are in flight at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, warn};

use crate::config::EngineConfig;
use crate::types::{
    AccountId, BankStatementLine, MatchReport, TransactionStatus, TrustError, TrustTransaction,
};

use super::{LedgerStore, StatementMatcher};

/// Result of matching one account of a batch
#[derive(Debug, Clone)]
pub struct AccountMatchResult {
    /// The account whose lines were matched
    pub account_id: AccountId,
    /// The match report, or why the account could not be matched
    pub result: Result<MatchReport, TrustError>,
}

/// Batch matcher with account-based partitioning
#[derive(Debug, Clone)]
pub struct BatchMatcher {
    store: Arc<LedgerStore>,
    matcher: StatementMatcher,
    max_concurrent_accounts: usize,
}

impl BatchMatcher {
    /// Create a new BatchMatcher
    ///
    /// # Arguments
    ///
    /// * `store` - Arc-wrapped LedgerStore to read candidate entries from
    /// * `config` - Matching window and concurrency limit
    pub fn new(store: Arc<LedgerStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            matcher: StatementMatcher::new(config.match_config()),
            max_concurrent_accounts: config.max_concurrent_accounts.max(1),
        }
    }

    /// Partition a batch of statement lines by account
    ///
    /// # Guarantees
    ///
    /// - Each line appears in exactly one partition
    /// - Lines keep their original order within a partition
    pub fn partition_by_account(
        &self,
        lines: Vec<BankStatementLine>,
    ) -> BTreeMap<AccountId, Vec<BankStatementLine>> {
        let mut partitions: BTreeMap<AccountId, Vec<BankStatementLine>> = BTreeMap::new();
        for line in lines {
            partitions.entry(line.account_id).or_default().push(line);
        }
        partitions
    }

    /// Match one account's lines against its current candidate entries
    ///
    /// # Errors
    ///
    /// Returns `TrustError::AccountNotFound` if the account does not exist.
    pub fn match_account(
        &self,
        account_id: AccountId,
        lines: &[BankStatementLine],
    ) -> Result<MatchReport, TrustError> {
        let candidates: Vec<TrustTransaction> = self.store.read_book(account_id, |book| {
            book.transactions()
                .iter()
                .filter(|tx| {
                    matches!(
                        tx.status,
                        TransactionStatus::Pending | TransactionStatus::Cleared
                    )
                })
                .cloned()
                .collect()
        })?;

        let report = self.matcher.propose(account_id, lines, &candidates);
        if !report.unmatched_lines.is_empty() || !report.unmatched_transactions.is_empty() {
            warn!(
                account = account_id,
                unmatched_lines = report.unmatched_lines.len(),
                unmatched_entries = report.unmatched_transactions.len(),
                "statement items left unmatched"
            );
        }
        Ok(report)
    }

    /// Match a mixed batch of lines, one task per account
    ///
    /// # Returns
    ///
    /// One `AccountMatchResult` per account that appears in the batch,
    /// ordered by account id. A failure for one account never stops the
    /// others.
    pub async fn match_accounts(&self, lines: Vec<BankStatementLine>) -> Vec<AccountMatchResult> {
        let partitions = self.partition_by_account(lines);

        let tasks = partitions.into_iter().map(|(account_id, lines)| {
            let this = self.clone();
            async move {
                let joined =
                    tokio::spawn(async move { this.match_account(account_id, &lines) }).await;
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        error!(account = account_id, error = %e, "matching task failed");
                        Err(TrustError::invalid_state(
                            "match",
                            format!("matching task for account {} failed: {}", account_id, e),
                        ))
                    }
                };
                AccountMatchResult { account_id, result }
            }
        });

        let mut results: Vec<AccountMatchResult> = stream::iter(tasks)
            .buffer_unordered(self.max_concurrent_accounts)
            .collect()
            .await;
        results.sort_by_key(|r| r.account_id);
        results
    }
}
