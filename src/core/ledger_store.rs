//! Ledger storage for trust accounts
//!
//! This module provides the `LedgerStore`, the single source of truth for
//! trust accounts, client sub-ledgers and ledger entries. Every balance change
//! goes through it, and it enforces the accounting invariants:
//! - No commingling: an account's balance equals the sum of its client balances
//! - No negative client balance, ever
//! - Append-only entries: only status and clearing/reconciliation timestamps change
//!
//! # Design
//!
//! Each account is one `AccountBook` aggregate (the account row, its client
//! rows and its entries) behind a `parking_lot::RwLock`. Books are registered
//! in a `DashMap`, so postings to different accounts never contend.
//!
//! Every mutation follows the same two steps while holding the book's write
//! lock:
//! 1. **Plan**: validate and compute every new value without touching the book
//! 2. **Commit**: write the planned values, which cannot fail
//!
//! A rejected operation therefore leaves no trace: no orphan entry, no
//! partial balance update, not even a consumed transaction id.
//!
//! # Lock Ordering
//!
//! Operations spanning several books (transfers, cross-account reads,
//! snapshots) lock them in ascending `AccountId` order. The `DashMap` guard is
//! always released before a book lock is taken.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    AccountFilter, AccountId, AccountSpec, AccountStatus, AccountUpdate, ClientId,
    ClientTrustBalance, NewEntry, PostingMeta, TransactionId, TransactionQuery,
    TransactionStatus, TransactionType, TrustAccount, TrustError, TrustTransaction,
};

/// Balance buckets shared by accounts and client sub-ledgers
///
/// `balance == available + pending` holds for every value built through
/// these methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Buckets {
    balance: Decimal,
    available: Decimal,
    pending: Decimal,
}

impl Buckets {
    fn of_account(account: &TrustAccount) -> Self {
        Buckets {
            balance: account.balance,
            available: account.available_balance,
            pending: account.pending_balance,
        }
    }

    fn of_client(client: &ClientTrustBalance) -> Self {
        Buckets {
            balance: client.balance,
            available: client.available_balance,
            pending: client.pending_balance,
        }
    }

    fn write_account(self, account: &mut TrustAccount) {
        account.balance = self.balance;
        account.available_balance = self.available;
        account.pending_balance = self.pending;
    }

    fn write_client(self, client: &mut ClientTrustBalance) {
        client.balance = self.balance;
        client.available_balance = self.available;
        client.pending_balance = self.pending;
    }

    /// Add a new entry in the given status
    fn post(self, amount: Decimal, status: TransactionStatus) -> Option<Self> {
        let balance = self.balance.checked_add(amount)?;
        if status == TransactionStatus::Pending {
            Some(Buckets {
                balance,
                available: self.available,
                pending: self.pending.checked_add(amount)?,
            })
        } else {
            Some(Buckets {
                balance,
                available: self.available.checked_add(amount)?,
                pending: self.pending,
            })
        }
    }

    /// Move an entry's amount from pending to available
    fn clear(self, amount: Decimal) -> Option<Self> {
        Some(Buckets {
            balance: self.balance,
            available: self.available.checked_add(amount)?,
            pending: self.pending.checked_sub(amount)?,
        })
    }

    /// Move an entry's amount from available back to pending
    fn unclear(self, amount: Decimal) -> Option<Self> {
        Some(Buckets {
            balance: self.balance,
            available: self.available.checked_sub(amount)?,
            pending: self.pending.checked_add(amount)?,
        })
    }
}

/// An entry whose effects have been computed but not yet written
#[derive(Debug, Clone)]
struct PlannedEntry {
    tx: TrustTransaction,
    client: ClientTrustBalance,
    account: Buckets,
}

/// A void whose offsetting entry has been planned but not yet written
#[derive(Debug, Clone)]
struct PlannedVoid {
    /// The original as it will be stored, already marked `void`
    voided: TrustTransaction,
    reversal: PlannedEntry,
}

/// One account aggregate: the account row, its client rows and its entries
#[derive(Debug, Clone)]
pub struct AccountBook {
    account: TrustAccount,
    balances: BTreeMap<ClientId, ClientTrustBalance>,
    /// Entries in id (creation) order
    transactions: Vec<TrustTransaction>,
    positions: HashMap<TransactionId, usize>,
}

impl AccountBook {
    fn new(account: TrustAccount) -> Self {
        AccountBook {
            account,
            balances: BTreeMap::new(),
            transactions: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn account(&self) -> &TrustAccount {
        &self.account
    }

    /// All entries, oldest first
    pub fn transactions(&self) -> &[TrustTransaction] {
        &self.transactions
    }

    /// Client rows ordered by client id
    pub fn client_balances(&self) -> impl Iterator<Item = &ClientTrustBalance> {
        self.balances.values()
    }

    pub fn client_balance(&self, client_id: &str) -> Option<&ClientTrustBalance> {
        self.balances.get(client_id)
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&TrustTransaction> {
        self.positions.get(&id).map(|&pos| &self.transactions[pos])
    }

    /// Sum of the stored client balances
    pub fn client_ledger_total(&self) -> Result<Decimal, TrustError> {
        self.balances
            .values()
            .try_fold(Decimal::ZERO, |total, c| total.checked_add(c.balance))
            .ok_or_else(|| TrustError::arithmetic_overflow("client_ledger_total", self.account.id))
    }

    /// Client balances re-derived from the journal
    pub fn replay_client_balances(&self) -> Result<BTreeMap<ClientId, Decimal>, TrustError> {
        let mut replayed: BTreeMap<ClientId, Decimal> = BTreeMap::new();
        for tx in &self.transactions {
            let balance = replayed.entry(tx.client_id.clone()).or_default();
            *balance = balance.checked_add(tx.amount).ok_or_else(|| {
                TrustError::arithmetic_overflow("replay_client_balances", self.account.id)
            })?;
        }
        Ok(replayed)
    }

    fn require_active(&self, operation: &str) -> Result<(), TrustError> {
        match self.account.status {
            AccountStatus::Active => Ok(()),
            status => Err(TrustError::invalid_state(
                operation,
                format!("account {} is {:?}", self.account.id, status),
            )),
        }
    }

    fn transaction_mut(&mut self, id: TransactionId) -> Option<&mut TrustTransaction> {
        match self.positions.get(&id) {
            Some(&pos) => Some(&mut self.transactions[pos]),
            None => None,
        }
    }

    /// Compute the effects of appending `entry` in `status`
    ///
    /// `account` carries the account buckets to start from, so that two legs
    /// planned against the same book see each other's effect. `client`
    /// overrides the stored client row when the caller has already moved it.
    fn plan_entry(
        &self,
        entry: &NewEntry,
        status: TransactionStatus,
        account: Buckets,
        client: Option<ClientTrustBalance>,
        now: DateTime<Utc>,
    ) -> Result<PlannedEntry, TrustError> {
        let account_id = self.account.id;
        let stored = client.or_else(|| self.balances.get(&entry.client_id).cloned());
        let mut client = match stored {
            Some(existing) => existing,
            None if entry.amount.is_sign_positive() => ClientTrustBalance::new(
                entry.client_id.clone(),
                account_id,
                entry.meta.case_id.clone(),
            ),
            None => {
                return Err(TrustError::insufficient_funds(
                    account_id,
                    &entry.client_id,
                    Decimal::ZERO,
                    entry.amount.abs(),
                ))
            }
        };

        let current = Buckets::of_client(&client);
        let next_client = current
            .post(entry.amount, status)
            .ok_or_else(|| TrustError::arithmetic_overflow("append_transaction", account_id))?;
        if next_client.balance < Decimal::ZERO {
            return Err(TrustError::insufficient_funds(
                account_id,
                &entry.client_id,
                current.balance,
                entry.amount.abs(),
            ));
        }
        let next_account = account
            .post(entry.amount, status)
            .ok_or_else(|| TrustError::arithmetic_overflow("append_transaction", account_id))?;

        next_client.write_client(&mut client);
        client.last_transaction_date = Some(entry.meta.date);

        let meta = &entry.meta;
        let tx = TrustTransaction {
            id: 0,
            account_id,
            client_id: entry.client_id.clone(),
            case_id: meta.case_id.clone(),
            date: meta.date,
            tx_type: entry.tx_type,
            amount: entry.amount,
            running_balance: next_client.balance,
            reference: meta.reference.clone(),
            description: meta.description.clone(),
            payee: meta.payee.clone(),
            payor: meta.payor.clone(),
            check_number: meta.check_number.clone(),
            status,
            cleared_date: None,
            cleared_at: None,
            reconciled_at: None,
            invoice_id: meta.invoice_id.clone(),
            expense_id: meta.expense_id.clone(),
            counterpart_id: None,
            reverses: None,
            created_by: meta.created_by.clone(),
            created_at: now,
        };

        Ok(PlannedEntry {
            tx,
            client,
            account: next_account,
        })
    }

    /// Write a planned entry; cannot fail
    fn commit(&mut self, mut planned: PlannedEntry, id: TransactionId) -> TrustTransaction {
        planned.tx.id = id;
        planned.client.last_transaction_id = Some(id);
        planned.account.write_account(&mut self.account);
        self.balances
            .insert(planned.client.client_id.clone(), planned.client);
        self.positions.insert(id, self.transactions.len());
        self.transactions.push(planned.tx.clone());
        planned.tx
    }

    /// The stored entry, if this book may void it
    fn voidable(&self, tx_id: TransactionId) -> Result<TrustTransaction, TrustError> {
        let original = self
            .transaction(tx_id)
            .cloned()
            .ok_or_else(|| TrustError::transaction_not_found(tx_id, "void"))?;
        match original.status {
            TransactionStatus::Reconciled => {
                return Err(TrustError::immutable_entry(tx_id, "voided"))
            }
            TransactionStatus::Void => {
                return Err(TrustError::invalid_state(
                    "void",
                    format!("transaction {} is already void", tx_id),
                ))
            }
            TransactionStatus::Pending | TransactionStatus::Cleared => {}
        }
        if original.reverses.is_some() {
            return Err(TrustError::invalid_state(
                "void",
                format!("transaction {} is itself a reversal", tx_id),
            ));
        }
        self.require_active("void")?;
        Ok(original)
    }

    /// Plan the offsetting entry for `original`, starting from `account`
    fn plan_void(
        &self,
        original: &TrustTransaction,
        reason: &str,
        voided_by: &str,
        date: NaiveDate,
        mut account: Buckets,
        now: DateTime<Utc>,
    ) -> Result<PlannedVoid, TrustError> {
        let account_id = self.account.id;
        let was_pending = original.is_pending();

        // Leaving `pending` moves the original's amount into `available`.
        let mut client_start = self
            .balances
            .get(&original.client_id)
            .cloned()
            .ok_or_else(|| TrustError::transaction_not_found(original.id, "void"))?;
        if was_pending {
            account = account
                .clear(original.amount)
                .ok_or_else(|| TrustError::arithmetic_overflow("void", account_id))?;
            Buckets::of_client(&client_start)
                .clear(original.amount)
                .ok_or_else(|| TrustError::arithmetic_overflow("void", account_id))?
                .write_client(&mut client_start);
        }

        let mut meta = PostingMeta::new(voided_by, date).with_description(reason);
        meta.reference = original.reference.clone();
        meta.case_id = original.case_id.clone();
        let entry = NewEntry::new(
            account_id,
            original.client_id.clone(),
            TransactionType::Adjustment,
            -original.amount,
            meta,
        );
        entry.validate()?;

        let status = if was_pending {
            TransactionStatus::Void
        } else {
            TransactionStatus::Pending
        };
        let mut reversal = self.plan_entry(&entry, status, account, Some(client_start), now)?;
        reversal.tx.reverses = Some(original.id);

        let mut voided = original.clone();
        voided.status = TransactionStatus::Void;
        Ok(PlannedVoid { voided, reversal })
    }

    /// Write a planned void; cannot fail
    fn commit_void(
        &mut self,
        planned: PlannedVoid,
        id: TransactionId,
    ) -> (TrustTransaction, TrustTransaction) {
        if let Some(stored) = self.transaction_mut(planned.voided.id) {
            stored.status = TransactionStatus::Void;
        }
        let reversal = self.commit(planned.reversal, id);
        (planned.voided, reversal)
    }

    /// Transition `cleared` entries whose clearing date falls in the period
    /// to `reconciled`, returning how many were transitioned
    pub(crate) fn reconcile_cleared(
        &mut self,
        period_start: NaiveDate,
        period_end: NaiveDate,
        at: DateTime<Utc>,
    ) -> usize {
        let mut count = 0;
        for tx in self.transactions.iter_mut() {
            let in_period = tx
                .cleared_date
                .is_some_and(|d| d >= period_start && d <= period_end);
            if tx.status == TransactionStatus::Cleared && in_period {
                tx.status = TransactionStatus::Reconciled;
                tx.reconciled_at = Some(at);
                count += 1;
            }
        }
        count
    }

    pub(crate) fn record_reconciled(&mut self, balance: Decimal, date: NaiveDate) {
        self.account.last_reconciled_balance = Some(balance);
        self.account.last_reconciled_date = Some(date);
    }
}

/// Serializable image of one account book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub account: TrustAccount,
    pub balances: Vec<ClientTrustBalance>,
    pub transactions: Vec<TrustTransaction>,
}

/// Serializable image of the whole store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub books: Vec<BookSnapshot>,
    pub next_account_id: AccountId,
    pub next_transaction_id: TransactionId,
}

/// Thread-safe store of trust account books
///
/// All methods take `&self`; wrap the store in an `Arc` to share it between
/// the posting, reconciliation and reporting components.
#[derive(Debug)]
pub struct LedgerStore {
    books: DashMap<AccountId, Arc<RwLock<AccountBook>>>,
    /// Which book holds each transaction
    tx_index: DashMap<TransactionId, AccountId>,
    next_account_id: AtomicU32,
    next_transaction_id: AtomicU64,
}

impl LedgerStore {
    /// Create an empty store
    pub fn new() -> Self {
        LedgerStore {
            books: DashMap::new(),
            tx_index: DashMap::new(),
            next_account_id: AtomicU32::new(1),
            next_transaction_id: AtomicU64::new(1),
        }
    }

    fn book(&self, account_id: AccountId) -> Result<Arc<RwLock<AccountBook>>, TrustError> {
        self.books
            .get(&account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TrustError::account_not_found(account_id))
    }

    fn account_of(&self, tx_id: TransactionId, operation: &str) -> Result<AccountId, TrustError> {
        self.tx_index
            .get(&tx_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| TrustError::transaction_not_found(tx_id, operation))
    }

    fn book_of(
        &self,
        tx_id: TransactionId,
        operation: &str,
    ) -> Result<Arc<RwLock<AccountBook>>, TrustError> {
        self.book(self.account_of(tx_id, operation)?)
    }

    fn sorted_books(&self) -> Vec<(AccountId, Arc<RwLock<AccountBook>>)> {
        let mut books: Vec<_> = self
            .books
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        books.sort_by_key(|(id, _)| *id);
        books
    }

    fn next_tx_id(&self) -> TransactionId {
        self.next_transaction_id.fetch_add(1, Ordering::SeqCst)
    }

    fn index(&self, tx: &TrustTransaction) {
        self.tx_index.insert(tx.id, tx.account_id);
    }

    /// Run a read-only closure against one book under its read lock
    pub(crate) fn read_book<R>(
        &self,
        account_id: AccountId,
        f: impl FnOnce(&AccountBook) -> R,
    ) -> Result<R, TrustError> {
        let book = self.book(account_id)?;
        let guard = book.read();
        Ok(f(&guard))
    }

    /// Run a closure against one book under its write lock
    ///
    /// The closure must validate before it writes; the store does not roll
    /// back on its behalf.
    pub(crate) fn write_book<R>(
        &self,
        account_id: AccountId,
        f: impl FnOnce(&mut AccountBook) -> Result<R, TrustError>,
    ) -> Result<R, TrustError> {
        let book = self.book(account_id)?;
        let mut guard = book.write();
        f(&mut guard)
    }

    /// Run a read-only closure against every book at one point in time
    ///
    /// Read locks are taken in ascending account order and held together, so
    /// the closure never observes half of a transfer.
    pub(crate) fn read_all<R>(&self, f: impl FnOnce(&[&AccountBook]) -> R) -> R {
        let books = self.sorted_books();
        let guards: Vec<RwLockReadGuard<'_, AccountBook>> =
            books.iter().map(|(_, book)| book.read()).collect();
        let refs: Vec<&AccountBook> = guards.iter().map(|guard| &**guard).collect();
        f(&refs)
    }

    /// Create a trust account with zero balances
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Validation` if the spec is incomplete, in
    /// particular when the bank identity is missing a field.
    pub fn create_account(&self, spec: AccountSpec) -> Result<TrustAccount, TrustError> {
        spec.validate()?;
        let id = self.next_account_id.fetch_add(1, Ordering::SeqCst);
        let is_default = spec.is_default;
        let account = TrustAccount::new(id, spec, Utc::now());
        self.books
            .insert(id, Arc::new(RwLock::new(AccountBook::new(account.clone()))));
        if is_default {
            self.clear_default_except(id);
        }
        debug!(account = id, "trust account created");
        Ok(account)
    }

    fn clear_default_except(&self, keep: AccountId) {
        for (id, book) in self.sorted_books() {
            if id != keep {
                book.write().account.is_default = false;
            }
        }
    }

    pub fn get_account(&self, account_id: AccountId) -> Result<TrustAccount, TrustError> {
        self.read_book(account_id, |book| book.account.clone())
    }

    /// List accounts passing the filter, ordered by id
    pub fn list_accounts(&self, filter: &AccountFilter) -> Vec<TrustAccount> {
        self.read_all(|books| {
            books
                .iter()
                .map(|book| &book.account)
                .filter(|account| filter.matches(account))
                .cloned()
                .collect()
        })
    }

    /// Edit an account's descriptive fields
    pub fn update_account(
        &self,
        account_id: AccountId,
        update: AccountUpdate,
    ) -> Result<TrustAccount, TrustError> {
        let becomes_default = update.is_default == Some(true);
        let account = self.write_book(account_id, |book| {
            if book.account.status == AccountStatus::Closed {
                return Err(TrustError::invalid_state(
                    "update_account",
                    format!("account {} is closed", account_id),
                ));
            }
            book.account.apply_update(update)?;
            Ok(book.account.clone())
        })?;
        if becomes_default {
            self.clear_default_except(account_id);
        }
        Ok(account)
    }

    /// Activate or deactivate an account
    ///
    /// `Closed` is reachable only through `close_account`, and a closed
    /// account cannot be reopened.
    pub fn set_account_status(
        &self,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<TrustAccount, TrustError> {
        if status == AccountStatus::Closed {
            return Err(TrustError::validation(
                "accounts are closed through close_account",
            ));
        }
        self.write_book(account_id, |book| {
            if book.account.status == AccountStatus::Closed {
                return Err(TrustError::invalid_state(
                    "set_account_status",
                    format!("account {} is closed", account_id),
                ));
            }
            book.account.status = status;
            Ok(book.account.clone())
        })
    }

    /// Close an account whose client balances are all exactly zero
    ///
    /// # Errors
    ///
    /// - `TrustError::NonZeroBalance` if any client still holds funds
    /// - `TrustError::InvalidState` if the account is already closed
    /// - `TrustError::Validation` if no reason is given
    pub fn close_account(
        &self,
        account_id: AccountId,
        reason: &str,
        closed_by: &str,
    ) -> Result<TrustAccount, TrustError> {
        if reason.trim().is_empty() {
            return Err(TrustError::validation("a closing reason is required"));
        }
        self.write_book(account_id, |book| {
            if book.account.status == AccountStatus::Closed {
                return Err(TrustError::invalid_state(
                    "close_account",
                    format!("account {} is already closed", account_id),
                ));
            }
            let outstanding: Vec<Decimal> = book
                .balances
                .values()
                .map(|c| c.balance)
                .filter(|b| !b.is_zero())
                .collect();
            if !outstanding.is_empty() {
                let total = outstanding
                    .iter()
                    .try_fold(Decimal::ZERO, |total, b| total.checked_add(*b))
                    .ok_or_else(|| TrustError::arithmetic_overflow("close_account", account_id))?;
                return Err(TrustError::non_zero_balance(
                    account_id,
                    outstanding.len(),
                    total,
                ));
            }
            book.account.status = AccountStatus::Closed;
            book.account.closed_at = Some(Utc::now());
            book.account.closed_by = Some(closed_by.to_string());
            book.account.close_reason = Some(reason.to_string());
            Ok(book.account.clone())
        })
    }

    /// Append one entry to its account's book
    ///
    /// This is the only path by which balances change. Within one critical
    /// section it:
    /// 1. Checks the account is active
    /// 2. Computes the client's new balance
    /// 3. Rejects the entry if that balance would be negative
    /// 4. Writes the entry with its running balance
    /// 5. Moves the account balance by the same signed amount
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` for a malformed entry
    /// - `TrustError::AccountNotFound` / `TrustError::InvalidState` for a
    ///   missing or non-active account
    /// - `TrustError::InsufficientTrustFunds` if the client would go negative
    pub fn append_transaction(&self, entry: NewEntry) -> Result<TrustTransaction, TrustError> {
        entry.validate()?;
        let book = self.book(entry.account_id)?;
        let mut book = book.write();
        book.require_active("append_transaction")?;

        let start = Buckets::of_account(&book.account);
        let planned =
            book.plan_entry(&entry, TransactionStatus::Pending, start, None, Utc::now())?;
        let tx = book.commit(planned, self.next_tx_id());
        self.index(&tx);
        Ok(tx)
    }

    /// Append the two legs of a transfer as one indivisible unit
    ///
    /// Both books are write-locked (in account order) and both legs are
    /// planned before either is written; if either leg fails, neither is
    /// applied. The committed legs reference each other through
    /// `counterpart_id`.
    pub fn append_transfer(
        &self,
        out_leg: NewEntry,
        in_leg: NewEntry,
    ) -> Result<(TrustTransaction, TrustTransaction), TrustError> {
        out_leg.validate()?;
        in_leg.validate()?;
        if out_leg.tx_type != TransactionType::TransferOut
            || in_leg.tx_type != TransactionType::TransferIn
        {
            return Err(TrustError::validation(
                "a transfer needs one transfer-out and one transfer-in leg",
            ));
        }
        if out_leg.amount != -in_leg.amount {
            return Err(TrustError::validation("transfer legs must offset each other"));
        }
        if out_leg.account_id == in_leg.account_id && out_leg.client_id == in_leg.client_id {
            return Err(TrustError::validation(
                "cannot transfer funds to the same client sub-ledger",
            ));
        }

        let now = Utc::now();
        let out_book = self.book(out_leg.account_id)?;

        if out_leg.account_id == in_leg.account_id {
            let mut book = out_book.write();
            book.require_active("transfer")?;
            let start = Buckets::of_account(&book.account);
            let out_plan =
                book.plan_entry(&out_leg, TransactionStatus::Pending, start, None, now)?;
            // in leg starts from the account buckets the out leg leaves behind
            let in_plan = book.plan_entry(
                &in_leg,
                TransactionStatus::Pending,
                out_plan.account,
                None,
                now,
            )?;

            let (out_id, in_id) = (self.next_tx_id(), self.next_tx_id());
            let (out_plan, in_plan) = link_legs(out_plan, in_plan, out_id, in_id);
            let out_tx = book.commit(out_plan, out_id);
            let in_tx = book.commit(in_plan, in_id);
            self.index(&out_tx);
            self.index(&in_tx);
            return Ok((out_tx, in_tx));
        }

        let in_book = self.book(in_leg.account_id)?;
        let (mut out_guard, mut in_guard) = if out_leg.account_id < in_leg.account_id {
            let out_guard = out_book.write();
            let in_guard = in_book.write();
            (out_guard, in_guard)
        } else {
            let in_guard = in_book.write();
            let out_guard = out_book.write();
            (out_guard, in_guard)
        };

        out_guard.require_active("transfer")?;
        in_guard.require_active("transfer")?;
        if out_guard.account.currency != in_guard.account.currency {
            return Err(TrustError::validation(format!(
                "cannot transfer between {} and {} accounts",
                out_guard.account.currency, in_guard.account.currency
            )));
        }

        let out_plan = out_guard.plan_entry(
            &out_leg,
            TransactionStatus::Pending,
            Buckets::of_account(&out_guard.account),
            None,
            now,
        )?;
        let in_plan = in_guard.plan_entry(
            &in_leg,
            TransactionStatus::Pending,
            Buckets::of_account(&in_guard.account),
            None,
            now,
        )?;

        let (out_id, in_id) = (self.next_tx_id(), self.next_tx_id());
        let (out_plan, in_plan) = link_legs(out_plan, in_plan, out_id, in_id);
        let out_tx = out_guard.commit(out_plan, out_id);
        let in_tx = in_guard.commit(in_plan, in_id);
        self.index(&out_tx);
        self.index(&in_tx);
        Ok((out_tx, in_tx))
    }

    /// Void an entry by appending an offsetting entry
    ///
    /// The original is marked `void`; the offsetting `adjustment` entry
    /// carries the inverse amount and `reverses = original.id`. An original
    /// that never reached the bank (`pending`) gets an offsetting entry that
    /// is born `void`, so the pair drops out of bank matching. A `cleared`
    /// original gets a `pending` offsetting entry that must clear at the bank.
    ///
    /// Voiding either leg of a transfer voids both legs as one unit, so the
    /// funds return to the source client and leave the destination client.
    ///
    /// Returns `(original, reversal)` for the requested entry as stored
    /// after the void.
    ///
    /// # Errors
    ///
    /// - `TrustError::ImmutableEntry` for a reconciled entry or transfer leg
    /// - `TrustError::InvalidState` for a void entry or a reversal entry
    /// - `TrustError::InsufficientTrustFunds` if the client already spent
    ///   the funds being reversed
    pub fn void_transaction(
        &self,
        tx_id: TransactionId,
        reason: &str,
        voided_by: &str,
        date: NaiveDate,
    ) -> Result<(TrustTransaction, TrustTransaction), TrustError> {
        if reason.trim().is_empty() {
            return Err(TrustError::validation("a void reason is required"));
        }
        let book = self.book_of(tx_id, "void")?;
        let counterpart = book.read().transaction(tx_id).and_then(|tx| tx.counterpart_id);
        if let Some(counterpart_id) = counterpart {
            return self.void_transfer(tx_id, counterpart_id, reason, voided_by, date);
        }

        let mut book = book.write();
        let original = book.voidable(tx_id)?;
        let start = Buckets::of_account(&book.account);
        let planned = book.plan_void(&original, reason, voided_by, date, start, Utc::now())?;
        let (voided, reversal) = book.commit_void(planned, self.next_tx_id());
        self.index(&reversal);
        Ok((voided, reversal))
    }

    /// Void both legs of a transfer under both book locks
    fn void_transfer(
        &self,
        tx_id: TransactionId,
        counterpart_id: TransactionId,
        reason: &str,
        voided_by: &str,
        date: NaiveDate,
    ) -> Result<(TrustTransaction, TrustTransaction), TrustError> {
        let account_id = self.account_of(tx_id, "void")?;
        let other_id = self.account_of(counterpart_id, "void")?;
        let now = Utc::now();
        let book = self.book(account_id)?;

        if account_id == other_id {
            let mut book = book.write();
            let original = book.voidable(tx_id)?;
            let counterpart = book.voidable(counterpart_id)?;
            let start = Buckets::of_account(&book.account);
            let planned = book.plan_void(&original, reason, voided_by, date, start, now)?;
            // second leg starts from the account buckets the first leaves behind
            let after = planned.reversal.account;
            let planned_other = book.plan_void(&counterpart, reason, voided_by, date, after, now)?;

            let (id, other_rev_id) = (self.next_tx_id(), self.next_tx_id());
            let (planned, planned_other) = link_voids(planned, planned_other, id, other_rev_id);
            let (voided, reversal) = book.commit_void(planned, id);
            let (_, other_reversal) = book.commit_void(planned_other, other_rev_id);
            self.index(&reversal);
            self.index(&other_reversal);
            return Ok((voided, reversal));
        }

        let other = self.book(other_id)?;
        let (mut guard, mut other_guard) = if account_id < other_id {
            let guard = book.write();
            let other_guard = other.write();
            (guard, other_guard)
        } else {
            let other_guard = other.write();
            let guard = book.write();
            (guard, other_guard)
        };

        let original = guard.voidable(tx_id)?;
        let counterpart = other_guard.voidable(counterpart_id)?;
        let planned = guard.plan_void(
            &original,
            reason,
            voided_by,
            date,
            Buckets::of_account(&guard.account),
            now,
        )?;
        let planned_other = other_guard.plan_void(
            &counterpart,
            reason,
            voided_by,
            date,
            Buckets::of_account(&other_guard.account),
            now,
        )?;

        let (id, other_rev_id) = (self.next_tx_id(), self.next_tx_id());
        let (planned, planned_other) = link_voids(planned, planned_other, id, other_rev_id);
        let (voided, reversal) = guard.commit_void(planned, id);
        let (_, other_reversal) = other_guard.commit_void(planned_other, other_rev_id);
        self.index(&reversal);
        self.index(&other_reversal);
        Ok((voided, reversal))
    }

    /// Mark an entry as cleared by the bank
    ///
    /// `pending → cleared`; calling it on an already-cleared entry returns
    /// the entry unchanged.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::InvalidState` for void or reconciled entries.
    pub fn mark_cleared(
        &self,
        tx_id: TransactionId,
        cleared_date: NaiveDate,
    ) -> Result<TrustTransaction, TrustError> {
        let book = self.book_of(tx_id, "mark_cleared")?;
        let mut book = book.write();
        let tx = book
            .transaction(tx_id)
            .cloned()
            .ok_or_else(|| TrustError::transaction_not_found(tx_id, "mark_cleared"))?;

        match tx.status {
            TransactionStatus::Cleared => return Ok(tx),
            TransactionStatus::Void | TransactionStatus::Reconciled => {
                return Err(TrustError::invalid_state(
                    "mark_cleared",
                    format!("transaction {} is {:?}", tx_id, tx.status),
                ))
            }
            TransactionStatus::Pending => {}
        }

        let account_id = book.account.id;
        let account = Buckets::of_account(&book.account)
            .clear(tx.amount)
            .ok_or_else(|| TrustError::arithmetic_overflow("mark_cleared", account_id))?;
        let client_row = book
            .balances
            .get(&tx.client_id)
            .ok_or_else(|| TrustError::transaction_not_found(tx_id, "mark_cleared"))?;
        let client = Buckets::of_client(client_row)
            .clear(tx.amount)
            .ok_or_else(|| TrustError::arithmetic_overflow("mark_cleared", account_id))?;

        account.write_account(&mut book.account);
        if let Some(row) = book.balances.get_mut(&tx.client_id) {
            client.write_client(row);
        }
        let now = Utc::now();
        match book.transaction_mut(tx_id) {
            Some(stored) => {
                stored.status = TransactionStatus::Cleared;
                stored.cleared_date = Some(cleared_date);
                stored.cleared_at = Some(now);
                Ok(stored.clone())
            }
            None => Err(TrustError::transaction_not_found(tx_id, "mark_cleared")),
        }
    }

    /// Undo a clearing that has not been reconciled yet
    ///
    /// `cleared → pending`; calling it on a pending entry returns the entry
    /// unchanged.
    ///
    /// # Errors
    ///
    /// - `TrustError::ImmutableEntry` for a reconciled entry
    /// - `TrustError::InvalidState` for a void entry
    pub fn mark_uncleared(&self, tx_id: TransactionId) -> Result<TrustTransaction, TrustError> {
        let book = self.book_of(tx_id, "mark_uncleared")?;
        let mut book = book.write();
        let tx = book
            .transaction(tx_id)
            .cloned()
            .ok_or_else(|| TrustError::transaction_not_found(tx_id, "mark_uncleared"))?;

        match tx.status {
            TransactionStatus::Pending => return Ok(tx),
            TransactionStatus::Reconciled => {
                return Err(TrustError::immutable_entry(tx_id, "uncleared"))
            }
            TransactionStatus::Void => {
                return Err(TrustError::invalid_state(
                    "mark_uncleared",
                    format!("transaction {} is void", tx_id),
                ))
            }
            TransactionStatus::Cleared => {}
        }

        let account_id = book.account.id;
        let account = Buckets::of_account(&book.account)
            .unclear(tx.amount)
            .ok_or_else(|| TrustError::arithmetic_overflow("mark_uncleared", account_id))?;
        let client_row = book
            .balances
            .get(&tx.client_id)
            .ok_or_else(|| TrustError::transaction_not_found(tx_id, "mark_uncleared"))?;
        let client = Buckets::of_client(client_row)
            .unclear(tx.amount)
            .ok_or_else(|| TrustError::arithmetic_overflow("mark_uncleared", account_id))?;

        account.write_account(&mut book.account);
        if let Some(row) = book.balances.get_mut(&tx.client_id) {
            client.write_client(row);
        }
        match book.transaction_mut(tx_id) {
            Some(stored) => {
                stored.status = TransactionStatus::Pending;
                stored.cleared_date = None;
                stored.cleared_at = None;
                Ok(stored.clone())
            }
            None => Err(TrustError::transaction_not_found(tx_id, "mark_uncleared")),
        }
    }

    pub fn get_transaction(&self, tx_id: TransactionId) -> Result<TrustTransaction, TrustError> {
        let book = self.book_of(tx_id, "get_transaction")?;
        let guard = book.read();
        guard
            .transaction(tx_id)
            .cloned()
            .ok_or_else(|| TrustError::transaction_not_found(tx_id, "get_transaction"))
    }

    /// A client's sub-ledger row, if the client ever held funds in the account
    pub fn get_client_balance(
        &self,
        account_id: AccountId,
        client_id: &str,
    ) -> Result<Option<ClientTrustBalance>, TrustError> {
        self.read_book(account_id, |book| book.client_balance(client_id).cloned())
    }

    pub fn list_client_balances(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<ClientTrustBalance>, TrustError> {
        self.read_book(account_id, |book| book.client_balances().cloned().collect())
    }

    /// List an account's entries passing the query, ordered by (date, id)
    pub fn list_transactions(
        &self,
        account_id: AccountId,
        query: &TransactionQuery,
    ) -> Result<Vec<TrustTransaction>, TrustError> {
        self.read_book(account_id, |book| {
            let mut txs: Vec<TrustTransaction> = book
                .transactions
                .iter()
                .filter(|tx| query.matches(tx))
                .cloned()
                .collect();
            txs.sort_by_key(|tx| (tx.date, tx.id));
            txs
        })
    }

    /// Capture every book at one point in time
    pub fn snapshot(&self) -> StoreSnapshot {
        let books = self.read_all(|books| {
            books
                .iter()
                .map(|book| BookSnapshot {
                    account: book.account.clone(),
                    balances: book.balances.values().cloned().collect(),
                    transactions: book.transactions.clone(),
                })
                .collect()
        });
        StoreSnapshot {
            books,
            next_account_id: self.next_account_id.load(Ordering::SeqCst),
            next_transaction_id: self.next_transaction_id.load(Ordering::SeqCst),
        }
    }

    /// Rebuild a store from a snapshot, exactly as stored
    ///
    /// Balances are loaded as they are, not re-derived from the journal; the
    /// three-way check is what detects a snapshot edited out of band.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Validation` for duplicate account or transaction
    /// ids, or for an entry filed under the wrong account.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, TrustError> {
        let store = LedgerStore::new();
        let mut max_account = 0;
        let mut max_tx = 0;

        for image in snapshot.books {
            let account_id = image.account.id;
            if store.books.contains_key(&account_id) {
                return Err(TrustError::validation(format!(
                    "duplicate account {} in snapshot",
                    account_id
                )));
            }
            let mut book = AccountBook::new(image.account);
            for row in image.balances {
                book.balances.insert(row.client_id.clone(), row);
            }
            let mut transactions = image.transactions;
            transactions.sort_by_key(|tx| tx.id);
            for tx in transactions {
                if tx.account_id != account_id {
                    return Err(TrustError::validation(format!(
                        "transaction {} filed under account {}",
                        tx.id, account_id
                    )));
                }
                if store.tx_index.insert(tx.id, account_id).is_some() {
                    return Err(TrustError::validation(format!(
                        "duplicate transaction {} in snapshot",
                        tx.id
                    )));
                }
                max_tx = max_tx.max(tx.id);
                book.positions.insert(tx.id, book.transactions.len());
                book.transactions.push(tx);
            }
            max_account = max_account.max(account_id);
            store.books.insert(account_id, Arc::new(RwLock::new(book)));
        }

        store.next_account_id.store(
            snapshot.next_account_id.max(max_account + 1),
            Ordering::SeqCst,
        );
        store.next_transaction_id.store(
            snapshot.next_transaction_id.max(max_tx + 1),
            Ordering::SeqCst,
        );
        Ok(store)
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn link_legs(
    mut out_plan: PlannedEntry,
    mut in_plan: PlannedEntry,
    out_id: TransactionId,
    in_id: TransactionId,
) -> (PlannedEntry, PlannedEntry) {
    out_plan.tx.counterpart_id = Some(in_id);
    in_plan.tx.counterpart_id = Some(out_id);
    (out_plan, in_plan)
}

/// Point the two reversals of a voided transfer at each other
fn link_voids(
    mut first: PlannedVoid,
    mut second: PlannedVoid,
    first_id: TransactionId,
    second_id: TransactionId,
) -> (PlannedVoid, PlannedVoid) {
    first.reversal.tx.counterpart_id = Some(second_id);
    second.reversal.tx.counterpart_id = Some(first_id);
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountType, BankIdentity};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn spec(name: &str) -> AccountSpec {
        AccountSpec::new(
            name,
            AccountType::GeneralTrust,
            BankIdentity {
                bank_name: "First Fiduciary".to_string(),
                account_number: format!("{}-001", name),
                routing_number: Some("021000021".to_string()),
                swift_code: None,
            },
            "USD",
        )
    }

    fn entry(account: AccountId, client: &str, tx_type: TransactionType, amount: i64) -> NewEntry {
        NewEntry::new(
            account,
            client,
            tx_type,
            Decimal::from(amount),
            PostingMeta::new("clerk", day(1)),
        )
    }

    fn assert_invariants(store: &LedgerStore, account_id: AccountId) {
        store
            .read_book(account_id, |book| {
                let account = book.account();
                assert_eq!(account.balance, book.client_ledger_total().unwrap());
                assert_eq!(
                    account.balance,
                    account.available_balance + account.pending_balance
                );
                for client in book.client_balances() {
                    assert!(!client.balance.is_sign_negative() || client.balance.is_zero());
                    assert_eq!(
                        client.balance,
                        client.available_balance + client.pending_balance
                    );
                }
            })
            .unwrap();
    }

    #[test]
    fn test_create_account_rejects_incomplete_bank_identity() {
        let store = LedgerStore::new();
        let mut bad = spec("x");
        bad.bank.routing_number = None;

        let result = store.create_account(bad);
        assert!(matches!(result, Err(TrustError::Validation { .. })));
        assert!(store.list_accounts(&AccountFilter::default()).is_empty());
    }

    #[test]
    fn test_default_flag_is_exclusive() {
        let store = LedgerStore::new();
        let mut first = spec("a");
        first.is_default = true;
        let a = store.create_account(first).unwrap();
        let mut second = spec("b");
        second.is_default = true;
        let b = store.create_account(second).unwrap();

        assert!(!store.get_account(a.id).unwrap().is_default);
        assert!(store.get_account(b.id).unwrap().is_default);
    }

    #[test]
    fn test_append_updates_running_and_account_balances() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();

        let first = store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 10_000))
            .unwrap();
        let second = store
            .append_transaction(entry(account.id, "alice", TransactionType::Withdrawal, -2_500))
            .unwrap();

        assert_eq!(first.running_balance, Decimal::from(10_000));
        assert_eq!(second.running_balance, Decimal::from(7_500));
        assert_eq!(first.status, TransactionStatus::Pending);

        let account = store.get_account(account.id).unwrap();
        assert_eq!(account.balance, Decimal::from(7_500));
        assert_eq!(account.pending_balance, Decimal::from(7_500));
        assert_invariants(&store, account.id);
    }

    #[test]
    fn test_rejected_append_leaves_no_trace() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 100))
            .unwrap();
        let before = store.snapshot();

        let result =
            store.append_transaction(entry(account.id, "alice", TransactionType::Withdrawal, -101));
        assert!(matches!(
            result,
            Err(TrustError::InsufficientTrustFunds { .. })
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_debit_for_unknown_client_creates_no_row() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();

        let result =
            store.append_transaction(entry(account.id, "ghost", TransactionType::Withdrawal, -1));
        assert!(matches!(
            result,
            Err(TrustError::InsufficientTrustFunds { .. })
        ));
        assert!(store.get_client_balance(account.id, "ghost").unwrap().is_none());
    }

    #[test]
    fn test_inactive_account_rejects_postings() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        store
            .set_account_status(account.id, AccountStatus::Inactive)
            .unwrap();

        let result =
            store.append_transaction(entry(account.id, "alice", TransactionType::Deposit, 5));
        assert!(matches!(result, Err(TrustError::InvalidState { .. })));

        store
            .set_account_status(account.id, AccountStatus::Active)
            .unwrap();
        assert!(store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 5))
            .is_ok());
    }

    #[test]
    fn test_close_account_requires_zero_client_balances() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 40))
            .unwrap();

        let result = store.close_account(account.id, "bank merger", "partner");
        assert!(matches!(result, Err(TrustError::NonZeroBalance { clients: 1, .. })));

        store
            .append_transaction(entry(account.id, "alice", TransactionType::Withdrawal, -40))
            .unwrap();
        let closed = store
            .close_account(account.id, "bank merger", "partner")
            .unwrap();
        assert_eq!(closed.status, AccountStatus::Closed);
        // zero-balance rows persist for audit
        assert!(store.get_client_balance(account.id, "alice").unwrap().is_some());
        assert!(store
            .set_account_status(account.id, AccountStatus::Active)
            .is_err());
    }

    #[test]
    fn test_mark_cleared_moves_pending_to_available_once() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        let tx = store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 300))
            .unwrap();

        let first = store.mark_cleared(tx.id, day(3)).unwrap();
        let after_first = store.snapshot();
        let second = store.mark_cleared(tx.id, day(9)).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.cleared_date, Some(day(3)));
        assert_eq!(store.snapshot(), after_first);
        let account = store.get_account(account.id).unwrap();
        assert_eq!(account.available_balance, Decimal::from(300));
        assert_eq!(account.pending_balance, Decimal::ZERO);
    }

    #[test]
    fn test_mark_uncleared_reverses_clearing() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        let tx = store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 300))
            .unwrap();
        store.mark_cleared(tx.id, day(3)).unwrap();

        let reopened = store.mark_uncleared(tx.id).unwrap();
        assert_eq!(reopened.status, TransactionStatus::Pending);
        assert_eq!(reopened.cleared_date, None);
        assert_eq!(
            store.get_account(account.id).unwrap().pending_balance,
            Decimal::from(300)
        );
        assert_invariants(&store, account.id);
    }

    #[test]
    fn test_void_pending_entry_creates_void_offset() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        let tx = store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 700))
            .unwrap();

        let (original, reversal) = store
            .void_transaction(tx.id, "duplicate entry", "clerk", day(2))
            .unwrap();

        assert_eq!(original.status, TransactionStatus::Void);
        assert_eq!(reversal.status, TransactionStatus::Void);
        assert_eq!(reversal.amount, Decimal::from(-700));
        assert_eq!(reversal.reverses, Some(tx.id));
        assert_eq!(reversal.running_balance, Decimal::ZERO);

        let account = store.get_account(account.id).unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.pending_balance, Decimal::ZERO);
        assert_invariants(&store, account.id);
    }

    #[test]
    fn test_void_cleared_entry_creates_pending_offset() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        let tx = store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 700))
            .unwrap();
        store.mark_cleared(tx.id, day(2)).unwrap();

        let (original, reversal) = store
            .void_transaction(tx.id, "returned item", "clerk", day(4))
            .unwrap();

        assert_eq!(original.status, TransactionStatus::Void);
        assert_eq!(original.cleared_date, Some(day(2)));
        assert_eq!(reversal.status, TransactionStatus::Pending);
        let account = store.get_account(account.id).unwrap();
        assert_eq!(account.available_balance, Decimal::from(700));
        assert_eq!(account.pending_balance, Decimal::from(-700));
        assert_invariants(&store, account.id);
    }

    #[test]
    fn test_void_rejects_spent_deposit_without_trace() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        let deposit = store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 500))
            .unwrap();
        store
            .append_transaction(entry(account.id, "alice", TransactionType::Withdrawal, -400))
            .unwrap();
        let before = store.snapshot();

        let result = store.void_transaction(deposit.id, "bounced", "clerk", day(5));
        assert!(matches!(
            result,
            Err(TrustError::InsufficientTrustFunds { .. })
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_transfer_legs_reference_each_other() {
        let store = LedgerStore::new();
        let x = store.create_account(spec("x")).unwrap();
        let y = store.create_account(spec("y")).unwrap();
        store
            .append_transaction(entry(x.id, "alice", TransactionType::Deposit, 1_000))
            .unwrap();

        let (out_tx, in_tx) = store
            .append_transfer(
                entry(x.id, "alice", TransactionType::TransferOut, -300),
                entry(y.id, "bob", TransactionType::TransferIn, 300),
            )
            .unwrap();

        assert_eq!(out_tx.counterpart_id, Some(in_tx.id));
        assert_eq!(in_tx.counterpart_id, Some(out_tx.id));
        assert_eq!(store.get_account(x.id).unwrap().balance, Decimal::from(700));
        assert_eq!(store.get_account(y.id).unwrap().balance, Decimal::from(300));
        assert_invariants(&store, x.id);
        assert_invariants(&store, y.id);
    }

    #[test]
    fn test_same_account_transfer_moves_funds_between_clients() {
        let store = LedgerStore::new();
        let x = store.create_account(spec("x")).unwrap();
        store
            .append_transaction(entry(x.id, "alice", TransactionType::Deposit, 1_000))
            .unwrap();

        store
            .append_transfer(
                entry(x.id, "alice", TransactionType::TransferOut, -250),
                entry(x.id, "bob", TransactionType::TransferIn, 250),
            )
            .unwrap();

        let alice = store.get_client_balance(x.id, "alice").unwrap().unwrap();
        let bob = store.get_client_balance(x.id, "bob").unwrap().unwrap();
        assert_eq!(alice.balance, Decimal::from(750));
        assert_eq!(bob.balance, Decimal::from(250));
        assert_eq!(store.get_account(x.id).unwrap().balance, Decimal::from(1_000));
        assert_invariants(&store, x.id);
    }

    fn transfer(
        store: &LedgerStore,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> (TrustTransaction, TrustTransaction) {
        store
            .append_transfer(
                entry(from, "alice", TransactionType::TransferOut, -amount),
                entry(to, "bob", TransactionType::TransferIn, amount),
            )
            .unwrap()
    }

    #[test]
    fn test_voiding_in_leg_voids_both_transfer_legs() {
        let store = LedgerStore::new();
        let x = store.create_account(spec("x")).unwrap();
        let y = store.create_account(spec("y")).unwrap();
        store
            .append_transaction(entry(x.id, "alice", TransactionType::Deposit, 1_000))
            .unwrap();
        let (out_tx, in_tx) = transfer(&store, x.id, y.id, 300);

        let (voided, reversal) = store
            .void_transaction(in_tx.id, "wrong matter", "clerk", day(2))
            .unwrap();

        assert_eq!(voided.id, in_tx.id);
        assert_eq!(voided.status, TransactionStatus::Void);
        assert_eq!(reversal.amount, Decimal::from(-300));
        assert_eq!(
            store.get_transaction(out_tx.id).unwrap().status,
            TransactionStatus::Void
        );
        let other = store
            .get_transaction(reversal.counterpart_id.unwrap())
            .unwrap();
        assert_eq!(other.reverses, Some(out_tx.id));
        assert_eq!(other.counterpart_id, Some(reversal.id));
        assert_eq!(other.amount, Decimal::from(300));

        assert_eq!(store.get_account(x.id).unwrap().balance, Decimal::from(1_000));
        assert_eq!(store.get_account(y.id).unwrap().balance, Decimal::ZERO);
        assert_invariants(&store, x.id);
        assert_invariants(&store, y.id);
    }

    #[test]
    fn test_voiding_same_account_transfer_restores_both_clients() {
        let store = LedgerStore::new();
        let x = store.create_account(spec("x")).unwrap();
        store
            .append_transaction(entry(x.id, "alice", TransactionType::Deposit, 1_000))
            .unwrap();
        let (out_tx, _) = transfer(&store, x.id, x.id, 250);

        store
            .void_transaction(out_tx.id, "duplicate", "clerk", day(2))
            .unwrap();

        let alice = store.get_client_balance(x.id, "alice").unwrap().unwrap();
        let bob = store.get_client_balance(x.id, "bob").unwrap().unwrap();
        assert_eq!(alice.balance, Decimal::from(1_000));
        assert_eq!(bob.balance, Decimal::ZERO);
        assert_eq!(store.get_account(x.id).unwrap().balance, Decimal::from(1_000));
        assert_invariants(&store, x.id);
    }

    #[test]
    fn test_transfer_void_rejected_when_destination_spent_funds() {
        let store = LedgerStore::new();
        let x = store.create_account(spec("x")).unwrap();
        let y = store.create_account(spec("y")).unwrap();
        store
            .append_transaction(entry(x.id, "alice", TransactionType::Deposit, 500))
            .unwrap();
        let (out_tx, _) = transfer(&store, x.id, y.id, 200);
        store
            .append_transaction(entry(y.id, "bob", TransactionType::Withdrawal, -150))
            .unwrap();
        let before = store.snapshot();

        assert!(matches!(
            store.void_transaction(out_tx.id, "wrong matter", "clerk", day(2)),
            Err(TrustError::InsufficientTrustFunds { .. })
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_transfer_void_rejected_when_other_leg_reconciled() {
        let store = LedgerStore::new();
        let x = store.create_account(spec("x")).unwrap();
        let y = store.create_account(spec("y")).unwrap();
        store
            .append_transaction(entry(x.id, "alice", TransactionType::Deposit, 500))
            .unwrap();
        let (out_tx, in_tx) = transfer(&store, x.id, y.id, 200);
        store.mark_cleared(in_tx.id, day(3)).unwrap();
        store
            .write_book(y.id, |book| Ok(book.reconcile_cleared(day(1), day(31), Utc::now())))
            .unwrap();
        let before = store.snapshot();

        assert!(matches!(
            store.void_transaction(out_tx.id, "wrong matter", "clerk", day(4)),
            Err(TrustError::ImmutableEntry { .. })
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_reconcile_cleared_only_touches_period() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        let inside = store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 10))
            .unwrap();
        let outside = store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 20))
            .unwrap();
        store.mark_cleared(inside.id, day(10)).unwrap();
        store.mark_cleared(outside.id, day(25)).unwrap();

        let count = store
            .write_book(account.id, |book| {
                Ok(book.reconcile_cleared(day(1), day(20), Utc::now()))
            })
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            store.get_transaction(inside.id).unwrap().status,
            TransactionStatus::Reconciled
        );
        assert_eq!(
            store.get_transaction(outside.id).unwrap().status,
            TransactionStatus::Cleared
        );
    }

    #[test]
    fn test_snapshot_round_trip_preserves_counters() {
        let store = LedgerStore::new();
        let account = store.create_account(spec("a")).unwrap();
        store
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 10))
            .unwrap();

        let restored = LedgerStore::from_snapshot(store.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), store.snapshot());

        let next = restored
            .append_transaction(entry(account.id, "alice", TransactionType::Deposit, 5))
            .unwrap();
        assert_eq!(next.id, 2);
        assert_eq!(restored.create_account(spec("b")).unwrap().id, 2);
    }
}
