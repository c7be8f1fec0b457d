//! Bank statement matching
//!
//! This module provides the `StatementMatcher`, which proposes 1:1 pairings
//! between normalized bank statement lines and ledger entries of one account.
//!
//! # Algorithm
//!
//! 1. Keep only `pending` and `cleared` entries of the account
//! 2. Build every candidate pair with an equal signed amount and a date gap
//!    within the tolerance window
//! 3. Rank all candidates globally by (date gap, entry creation time,
//!    entry id, line id)
//! 4. Walk the ranking and accept a pair when neither side is taken yet
//!
//! The matcher is read-only: it never clears anything. Whatever is left on
//! either side is reported, so nothing disappears silently.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::types::{
    AccountId, BankStatementLine, MatchReport, ProposedMatch, StatementLineId, TransactionId,
    TransactionStatus, TrustTransaction,
};

/// Default matching window, in days either side of the statement date
pub const DEFAULT_DATE_TOLERANCE_DAYS: i64 = 5;

/// Matching parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConfig {
    /// Largest accepted gap between line date and entry date, in days
    pub date_tolerance_days: i64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            date_tolerance_days: DEFAULT_DATE_TOLERANCE_DAYS,
        }
    }
}

/// A pairing that passed the amount and date filters, with its rank key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    date_distance: i64,
    created_at: DateTime<Utc>,
    transaction_id: TransactionId,
    line_id: StatementLineId,
    line_idx: usize,
    tx_idx: usize,
}

/// Side-effect-free proposer of statement-to-ledger matches
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementMatcher {
    config: MatchConfig,
}

impl StatementMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> MatchConfig {
        self.config
    }

    /// Propose matches between one account's statement lines and entries
    ///
    /// # Arguments
    ///
    /// * `account_id` - The account being matched
    /// * `lines` - Statement lines; lines of other accounts never match
    /// * `transactions` - Ledger entries; only the account's `pending` and
    ///   `cleared` entries are candidates
    ///
    /// # Returns
    ///
    /// A `MatchReport` with matches ordered by line id, unmatched lines in
    /// input order and unmatched candidate entries ordered by id.
    pub fn propose(
        &self,
        account_id: AccountId,
        lines: &[BankStatementLine],
        transactions: &[TrustTransaction],
    ) -> MatchReport {
        let candidates_txs: Vec<&TrustTransaction> = transactions
            .iter()
            .filter(|tx| tx.account_id == account_id)
            .filter(|tx| {
                matches!(
                    tx.status,
                    TransactionStatus::Pending | TransactionStatus::Cleared
                )
            })
            .collect();

        let mut by_amount: HashMap<Decimal, Vec<usize>> = HashMap::new();
        for (idx, tx) in candidates_txs.iter().enumerate() {
            by_amount.entry(tx.amount).or_default().push(idx);
        }

        let tolerance = self.config.date_tolerance_days;
        let mut candidates = Vec::new();
        for (line_idx, line) in lines.iter().enumerate() {
            if line.account_id != account_id {
                continue;
            }
            let Some(same_amount) = by_amount.get(&line.amount) else {
                continue;
            };
            for &tx_idx in same_amount {
                let tx = candidates_txs[tx_idx];
                let date_distance = (line.date - tx.date).num_days().abs();
                if date_distance <= tolerance {
                    candidates.push(Candidate {
                        date_distance,
                        created_at: tx.created_at,
                        transaction_id: tx.id,
                        line_id: line.id,
                        line_idx,
                        tx_idx,
                    });
                }
            }
        }
        candidates.sort();
        debug!(
            account = account_id,
            lines = lines.len(),
            entries = candidates_txs.len(),
            candidates = candidates.len(),
            "ranked match candidates"
        );

        let mut used_lines = HashSet::new();
        let mut used_txs = HashSet::new();
        let mut matches = Vec::new();
        for candidate in candidates {
            if used_lines.contains(&candidate.line_idx) || used_txs.contains(&candidate.tx_idx) {
                continue;
            }
            used_lines.insert(candidate.line_idx);
            used_txs.insert(candidate.tx_idx);
            let line = &lines[candidate.line_idx];
            matches.push(ProposedMatch {
                line_id: line.id,
                transaction_id: candidate.transaction_id,
                amount: line.amount,
                line_date: line.date,
                date_distance: candidate.date_distance,
            });
        }
        matches.sort_by_key(|m| (m.line_id, m.transaction_id));

        let unmatched_lines = lines
            .iter()
            .enumerate()
            .filter(|(idx, _)| !used_lines.contains(idx))
            .map(|(_, line)| line.clone())
            .collect();
        let mut unmatched_transactions: Vec<TransactionId> = candidates_txs
            .iter()
            .enumerate()
            .filter(|(idx, _)| !used_txs.contains(idx))
            .map(|(_, tx)| tx.id)
            .collect();
        unmatched_transactions.sort_unstable();

        MatchReport {
            account_id,
            matches,
            unmatched_lines,
            unmatched_transactions,
        }
    }
}
