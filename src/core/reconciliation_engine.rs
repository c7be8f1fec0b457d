//! Reconciliation state machine and three-way checks
//!
//! This module provides the `ReconciliationEngine`, which manages
//! bank-statement period reconciliations and produces immutable three-way
//! snapshots.
//!
//! # State Machine
//!
//! ```text
//! in_progress ──(difference == 0)──────────▶ completed
//!      │
//!      └──(explicit override, difference ≠ 0)──▶ exception
//! ```
//!
//! Both final states are terminal.
//!
//! # Concurrency
//!
//! Every operation that touches a period reconciliation holds that account's
//! reconciliation mutex for its whole duration, so `start` and `complete` on
//! the same account never interleave. `complete` additionally recomputes and
//! transitions entries under one book write lock, so no posting can slip in
//! between the final difference check and the `cleared → reconciled` sweep.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{
    validate_amount_scale, AccountId, ClientBreakdownRow, MatchReport, ReconciliationAdjustment,
    ReconciliationId, ReconciliationStatus, ReconciliationStatusInfo, ReconciliationTotals,
    ThreeWayReconciliation, ThreeWayStatus, TransactionStatus, TrustError, TrustReconciliation,
    TrustTransaction,
};

use super::ledger_store::{AccountBook, StoreSnapshot};
use super::LedgerStore;

/// Serializable image of the engine's records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSnapshot {
    pub reconciliations: Vec<TrustReconciliation>,
    pub three_way: Vec<ThreeWayReconciliation>,
    pub next_id: ReconciliationId,
}

/// Manages period reconciliations and three-way snapshots
#[derive(Debug)]
pub struct ReconciliationEngine {
    store: Arc<LedgerStore>,
    reconciliations: DashMap<ReconciliationId, TrustReconciliation>,
    /// Three-way snapshots per account, oldest first
    three_way: DashMap<AccountId, Vec<ThreeWayReconciliation>>,
    account_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    /// Read-held by every record mutation, write-held while a snapshot is taken
    gate: RwLock<()>,
    next_id: AtomicU64,
}

impl ReconciliationEngine {
    /// Create a new ReconciliationEngine
    ///
    /// # Arguments
    ///
    /// * `store` - Arc-wrapped LedgerStore shared with the posting engine
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self {
            store,
            reconciliations: DashMap::new(),
            three_way: DashMap::new(),
            account_locks: DashMap::new(),
            gate: RwLock::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Rebuild an engine from stored records
    pub fn from_snapshot(store: Arc<LedgerStore>, snapshot: ReconciliationSnapshot) -> Self {
        let engine = Self::new(store);
        let mut max_id = 0;
        for record in snapshot.reconciliations {
            max_id = max_id.max(record.id);
            engine.reconciliations.insert(record.id, record);
        }
        for check in snapshot.three_way {
            max_id = max_id.max(check.id);
            engine
                .three_way
                .entry(check.account_id)
                .or_default()
                .push(check);
        }
        for mut history in engine.three_way.iter_mut() {
            history.sort_by_key(|c| (c.verified_at, c.id));
        }
        engine
            .next_id
            .store(snapshot.next_id.max(max_id + 1), Ordering::SeqCst);
        engine
    }

    /// Capture every record
    pub fn snapshot(&self) -> ReconciliationSnapshot {
        let _gate = self.gate.write();
        self.records_snapshot()
    }

    /// Capture the store and every record at the same point in time
    ///
    /// No reconciliation operation runs while both are taken, so a
    /// `complete` is either fully visible (record and reconciled entries)
    /// or not at all.
    pub fn snapshot_with_store(&self) -> (StoreSnapshot, ReconciliationSnapshot) {
        let _gate = self.gate.write();
        (self.store.snapshot(), self.records_snapshot())
    }

    fn records_snapshot(&self) -> ReconciliationSnapshot {
        let mut reconciliations: Vec<TrustReconciliation> = self
            .reconciliations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        reconciliations.sort_by_key(|r| r.id);
        let mut three_way: Vec<ThreeWayReconciliation> = self
            .three_way
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        three_way.sort_by_key(|c| c.id);
        ReconciliationSnapshot {
            reconciliations,
            three_way,
            next_id: self.next_id.load(Ordering::SeqCst),
        }
    }

    fn account_lock(&self, account_id: AccountId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.account_locks
                .entry(account_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn record(&self, id: ReconciliationId) -> Result<TrustReconciliation, TrustError> {
        self.reconciliations
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TrustError::reconciliation_not_found(id))
    }

    fn records_for(&self, account_id: AccountId) -> Vec<TrustReconciliation> {
        let mut records: Vec<TrustReconciliation> = self
            .reconciliations
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| (r.period_end, r.id));
        records
    }

    fn latest_finalized(&self, account_id: AccountId) -> Option<TrustReconciliation> {
        self.records_for(account_id)
            .into_iter()
            .filter(|r| r.status.is_final())
            .last()
    }

    /// Open a reconciliation for one bank statement period
    ///
    /// The opening balance is the closing book balance of the latest
    /// finalized period, or zero for an account's first period.
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` if `period_start > period_end`, or the
    ///   period starts on or before the end of the latest finalized period
    /// - `TrustError::InvalidState` if the account already has an
    ///   in-progress reconciliation
    /// - `TrustError::AccountNotFound` for an unknown account
    pub fn start_reconciliation(
        &self,
        account_id: AccountId,
        period_start: NaiveDate,
        period_end: NaiveDate,
        bank_statement_balance: Decimal,
        started_by: &str,
    ) -> Result<TrustReconciliation, TrustError> {
        if period_start > period_end {
            return Err(TrustError::validation(format!(
                "period start {} is after period end {}",
                period_start, period_end
            )));
        }
        validate_amount_scale(bank_statement_balance)?;
        self.store.get_account(account_id)?;

        let _gate = self.gate.read();
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();

        let records = self.records_for(account_id);
        if let Some(open) = records
            .iter()
            .find(|r| r.status == ReconciliationStatus::InProgress)
        {
            return Err(TrustError::invalid_state(
                "start_reconciliation",
                format!(
                    "reconciliation {} is already in progress for account {}",
                    open.id, account_id
                ),
            ));
        }
        let previous = records.iter().filter(|r| r.status.is_final()).last();
        if let Some(previous) = previous {
            if period_start <= previous.period_end {
                return Err(TrustError::validation(format!(
                    "period must start after {}, the end of reconciliation {}",
                    previous.period_end, previous.id
                )));
            }
        }

        let now = Utc::now();
        let mut record = TrustReconciliation {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            account_id,
            reconciliation_date: now.date_naive(),
            period_start,
            period_end,
            opening_balance: previous.map_or(Decimal::ZERO, |p| p.closing_balance),
            closing_balance: Decimal::ZERO,
            bank_statement_balance,
            cleared_deposits: Decimal::ZERO,
            cleared_withdrawals: Decimal::ZERO,
            outstanding_deposits: Decimal::ZERO,
            outstanding_withdrawals: Decimal::ZERO,
            difference: Decimal::ZERO,
            status: ReconciliationStatus::InProgress,
            adjustments: Vec::new(),
            notes: None,
            started_by: started_by.to_string(),
            started_at: now,
            reconciled_by: None,
            reconciled_at: None,
        };
        let totals = self
            .store
            .read_book(account_id, |book| period_totals(book, period_start, period_end))??;
        record.apply_totals(totals)?;

        info!(
            reconciliation = record.id,
            account = account_id,
            %period_start,
            %period_end,
            difference = %record.difference,
            "reconciliation started"
        );
        self.reconciliations.insert(record.id, record.clone());
        Ok(record)
    }

    /// Recalculate the totals and difference from the current ledger
    ///
    /// Safe to repeat. On a completed or exception record it returns the
    /// stored record unchanged.
    pub fn recompute(&self, id: ReconciliationId) -> Result<TrustReconciliation, TrustError> {
        let account_id = self.record(id)?.account_id;
        let _gate = self.gate.read();
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();
        self.recompute_locked(id)
    }

    fn recompute_locked(&self, id: ReconciliationId) -> Result<TrustReconciliation, TrustError> {
        let mut record = self.record(id)?;
        if record.status.is_final() {
            return Ok(record);
        }
        let (start, end) = (record.period_start, record.period_end);
        let totals = self
            .store
            .read_book(record.account_id, |book| period_totals(book, start, end))??;
        record.apply_totals(totals)?;
        self.reconciliations.insert(id, record.clone());
        Ok(record)
    }

    /// Record a manual correction and recompute
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` for a zero or over-precise amount, or a
    ///   blank description
    /// - `TrustError::InvalidState` if the reconciliation is finalized
    pub fn add_adjustment(
        &self,
        id: ReconciliationId,
        adjustment: ReconciliationAdjustment,
    ) -> Result<TrustReconciliation, TrustError> {
        adjustment.validate()?;
        let account_id = self.record(id)?.account_id;
        let _gate = self.gate.read();
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();

        let mut record = self.record(id)?;
        require_in_progress(&record, "add_adjustment")?;
        info!(
            reconciliation = id,
            side = ?adjustment.side,
            amount = %adjustment.amount,
            "reconciliation adjustment added"
        );
        record.adjustments.push(adjustment);
        self.reconciliations.insert(id, record);
        self.recompute_locked(id)
    }

    /// Finalize a balanced reconciliation
    ///
    /// Recomputes one last time and, if the difference is zero, moves every
    /// entry cleared inside the period to `reconciled`. The account's
    /// `last_reconciled_balance` and `last_reconciled_date` are updated.
    ///
    /// # Errors
    ///
    /// - `TrustError::UnbalancedReconciliation` if the difference is not zero
    /// - `TrustError::InvalidState` if the reconciliation is already final
    pub fn complete(
        &self,
        id: ReconciliationId,
        notes: Option<String>,
        reconciled_by: &str,
    ) -> Result<TrustReconciliation, TrustError> {
        let account_id = self.record(id)?.account_id;
        let _gate = self.gate.read();
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();

        let mut record = self.record(id)?;
        require_in_progress(&record, "complete")?;

        let now = Utc::now();
        let (record, transitioned) = self.store.write_book(account_id, |book| {
            let totals = period_totals(book, record.period_start, record.period_end)?;
            record.apply_totals(totals)?;
            if !record.difference.is_zero() {
                return Err(TrustError::unbalanced(id, record.difference));
            }
            let transitioned = book.reconcile_cleared(record.period_start, record.period_end, now);
            book.record_reconciled(record.bank_statement_balance, record.period_end);

            record.status = ReconciliationStatus::Completed;
            record.notes = notes;
            record.reconciled_by = Some(reconciled_by.to_string());
            record.reconciled_at = Some(now);
            Ok((record, transitioned))
        })?;

        info!(
            reconciliation = id,
            account = account_id,
            reconciled_entries = transitioned,
            "reconciliation completed"
        );
        self.reconciliations.insert(id, record.clone());
        Ok(record)
    }

    /// Finalize an unbalanced reconciliation as an audited exception
    ///
    /// Cleared entries stay `cleared`.
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` if no notes explain the override
    /// - `TrustError::InvalidState` if the difference is zero (use
    ///   `complete`) or the reconciliation is already final
    pub fn force_exception(
        &self,
        id: ReconciliationId,
        notes: &str,
        reconciled_by: &str,
    ) -> Result<TrustReconciliation, TrustError> {
        if notes.trim().is_empty() {
            return Err(TrustError::validation(
                "an exception needs notes explaining the accepted difference",
            ));
        }
        let account_id = self.record(id)?.account_id;
        let _gate = self.gate.read();
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();

        require_in_progress(&self.record(id)?, "force_exception")?;
        let mut record = self.recompute_locked(id)?;
        if record.difference.is_zero() {
            return Err(TrustError::invalid_state(
                "force_exception",
                format!("reconciliation {} is balanced; complete it instead", id),
            ));
        }

        record.status = ReconciliationStatus::Exception;
        record.notes = Some(notes.to_string());
        record.reconciled_by = Some(reconciled_by.to_string());
        record.reconciled_at = Some(Utc::now());
        info!(
            reconciliation = id,
            account = account_id,
            difference = %record.difference,
            "reconciliation finalized as exception"
        );
        self.reconciliations.insert(id, record.clone());
        Ok(record)
    }

    /// Compare bank, book and client-ledger balances for one account
    ///
    /// Each run stores a new immutable snapshot. When the snapshot is not
    /// balanced, one row is emitted for each client whose stored balance
    /// differs from the balance replayed from their journal entries, which
    /// localizes a ledger edited outside the posting path.
    pub fn run_three_way_check(
        &self,
        account_id: AccountId,
        bank_balance: Decimal,
        verified_by: &str,
    ) -> Result<ThreeWayReconciliation, TrustError> {
        validate_amount_scale(bank_balance)?;
        let _gate = self.gate.read();
        let (book_balance, client_ledger_total, client_rows) =
            self.store.read_book(account_id, |book| {
                let book_balance = book.account().balance;
                let client_total = book.client_ledger_total()?;
                Ok::<_, TrustError>((book_balance, client_total, client_discrepancies(book)?))
            })??;

        let is_balanced = bank_balance == book_balance && book_balance == client_ledger_total;
        let status = if is_balanced {
            ThreeWayStatus::Balanced
        } else if book_balance != client_ledger_total {
            ThreeWayStatus::Unbalanced
        } else {
            ThreeWayStatus::Exception
        };

        let overflow = || TrustError::arithmetic_overflow("three_way_check", account_id);
        let bank_book_difference = bank_balance.checked_sub(book_balance).ok_or_else(overflow)?;
        let book_client_difference = book_balance
            .checked_sub(client_ledger_total)
            .ok_or_else(overflow)?;
        let bank_client_difference = bank_balance
            .checked_sub(client_ledger_total)
            .ok_or_else(overflow)?;

        let check = ThreeWayReconciliation {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            account_id,
            bank_balance,
            book_balance,
            client_ledger_total,
            bank_book_difference,
            book_client_difference,
            bank_client_difference,
            is_balanced,
            client_rows: if is_balanced { Vec::new() } else { client_rows },
            status,
            verified_by: verified_by.to_string(),
            verified_at: Utc::now(),
        };
        info!(
            check = check.id,
            account = account_id,
            status = ?check.status,
            flagged_clients = check.client_rows.len(),
            "three-way check recorded"
        );
        self.three_way
            .entry(account_id)
            .or_default()
            .push(check.clone());
        Ok(check)
    }

    /// Apply reviewed match proposals by clearing the matched entries
    ///
    /// Each entry is cleared with its statement line's date. Clearing is
    /// idempotent, so a partially applied report can be confirmed again.
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` if a proposal points at another account's
    ///   entry or its amount no longer agrees
    /// - Any `mark_cleared` error, such as a proposal for an entry voided
    ///   since matching
    pub fn confirm_matches(
        &self,
        report: &MatchReport,
    ) -> Result<Vec<TrustTransaction>, TrustError> {
        let mut cleared = Vec::with_capacity(report.matches.len());
        for proposal in &report.matches {
            let tx = self.store.get_transaction(proposal.transaction_id)?;
            if tx.account_id != report.account_id || tx.amount != proposal.amount {
                return Err(TrustError::validation(format!(
                    "proposal for line {} does not fit transaction {}",
                    proposal.line_id, tx.id
                )));
            }
            cleared.push(self.store.mark_cleared(tx.id, proposal.line_date)?);
        }
        info!(
            account = report.account_id,
            cleared = cleared.len(),
            "match proposals confirmed"
        );
        Ok(cleared)
    }

    pub fn get_reconciliation(
        &self,
        id: ReconciliationId,
    ) -> Result<TrustReconciliation, TrustError> {
        self.record(id)
    }

    /// All reconciliations of an account ordered by period end
    pub fn list_reconciliations(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TrustReconciliation>, TrustError> {
        self.store.get_account(account_id)?;
        Ok(self.records_for(account_id))
    }

    /// Three-way snapshots of an account, oldest first
    pub fn three_way_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<ThreeWayReconciliation>, TrustError> {
        self.store.get_account(account_id)?;
        Ok(self
            .three_way
            .get(&account_id)
            .map(|history| history.value().clone())
            .unwrap_or_default())
    }

    /// Reconciliation state of an account at a glance
    pub fn status_info(&self, account_id: AccountId) -> Result<ReconciliationStatusInfo, TrustError> {
        let (unreconciled, uncleared) = self.store.read_book(account_id, |book| {
            let txs = book.transactions();
            let unreconciled = txs
                .iter()
                .filter(|tx| {
                    !matches!(
                        tx.status,
                        TransactionStatus::Reconciled | TransactionStatus::Void
                    )
                })
                .count();
            let uncleared = txs.iter().filter(|tx| tx.is_pending()).count();
            (unreconciled, uncleared)
        })?;

        let records = self.records_for(account_id);
        Ok(ReconciliationStatusInfo {
            account_id,
            in_progress: records
                .iter()
                .find(|r| r.status == ReconciliationStatus::InProgress)
                .cloned(),
            last_reconciliation: self.latest_finalized(account_id),
            unreconciled_transactions: unreconciled,
            uncleared_transactions: uncleared,
        })
    }
}

fn require_in_progress(record: &TrustReconciliation, operation: &str) -> Result<(), TrustError> {
    if record.status.is_final() {
        return Err(TrustError::invalid_state(
            operation,
            format!("reconciliation {} is {:?}", record.id, record.status),
        ));
    }
    Ok(())
}

/// Ledger-derived totals for one period
///
/// - closing balance: every entry dated on or before `period_end`
/// - cleared totals: entries whose bank clearing date falls inside the period
/// - outstanding totals: entries still `pending` dated on or before `period_end`
///
/// Credits and debits split on the sign of the amount; debit totals are
/// reported as positive magnitudes.
fn period_totals(
    book: &AccountBook,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Result<ReconciliationTotals, TrustError> {
    let account_id = book.account().id;
    let overflow = || TrustError::arithmetic_overflow("recompute", account_id);
    let mut totals = ReconciliationTotals::default();

    for tx in book.transactions() {
        let magnitude = tx.amount.abs();
        let is_credit = tx.amount.is_sign_positive();

        if tx.date <= period_end {
            totals.closing_balance = totals
                .closing_balance
                .checked_add(tx.amount)
                .ok_or_else(overflow)?;
        }

        let cleared_in_period = tx
            .cleared_date
            .is_some_and(|d| d >= period_start && d <= period_end);
        if cleared_in_period {
            let bucket = if is_credit {
                &mut totals.cleared_deposits
            } else {
                &mut totals.cleared_withdrawals
            };
            *bucket = bucket.checked_add(magnitude).ok_or_else(overflow)?;
        }

        if tx.status == TransactionStatus::Pending && tx.date <= period_end {
            let bucket = if is_credit {
                &mut totals.outstanding_deposits
            } else {
                &mut totals.outstanding_withdrawals
            };
            *bucket = bucket.checked_add(magnitude).ok_or_else(overflow)?;
        }
    }
    Ok(totals)
}

/// Clients whose stored balance disagrees with their journal replay
fn client_discrepancies(book: &AccountBook) -> Result<Vec<ClientBreakdownRow>, TrustError> {
    let replayed = book.replay_client_balances()?;
    let clients: BTreeSet<&String> = book
        .client_balances()
        .map(|c| &c.client_id)
        .chain(replayed.keys())
        .collect();

    let mut rows = Vec::new();
    for client_id in clients {
        let ledger_balance = book
            .client_balance(client_id)
            .map_or(Decimal::ZERO, |c| c.balance);
        let book_balance = replayed.get(client_id).copied().unwrap_or(Decimal::ZERO);
        if ledger_balance != book_balance {
            let difference = ledger_balance.checked_sub(book_balance).ok_or_else(|| {
                TrustError::arithmetic_overflow("three_way_check", book.account().id)
            })?;
            rows.push(ClientBreakdownRow {
                client_id: client_id.clone(),
                ledger_balance,
                book_balance,
                difference,
            });
        }
    }
    Ok(rows)
}
