//! Service façade for the trust ledger
//!
//! `TrustLedger` wires one shared `LedgerStore` into the posting,
//! reconciliation, matching and reporting components and exposes one method
//! per operation. The acting user is always an explicit argument.
//!
//! # Architecture
//!
//! ```text
//! TrustLedger
//!     ├── Arc<LedgerStore>           (books, client rows, entries)
//!     ├── PostingEngine              (business postings)
//!     ├── BatchMatcher               (statement matching per account)
//!     ├── Arc<ReconciliationEngine>  (period and three-way reconciliation)
//!     └── ReportingFacade            (read-only reports)
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::{
    AccountFilter, AccountId, AccountSpec, AccountStatus, AccountUpdate, BankStatementLine,
    ClientTrustBalance, MatchReport, PostingMeta, ReconciliationAdjustment, ReconciliationId,
    ReconciliationStatusInfo, ThreeWayReconciliation, TransactionId, TransactionQuery,
    TrustAccount, TrustError, TrustReconciliation, TrustTransaction,
};

use super::batch_matcher::AccountMatchResult;
use super::ledger_store::StoreSnapshot;
use super::reconciliation_engine::ReconciliationSnapshot;
use super::reporting::{AccountSummary, BalanceMatrix, ClientLedgerStatement};
use super::{
    BatchMatcher, LedgerStore, PostingEngine, ReconciliationEngine, ReportingFacade,
};

/// Everything needed to rebuild a `TrustLedger`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub ledger: StoreSnapshot,
    pub reconciliation: ReconciliationSnapshot,
}

/// The trust ledger service
#[derive(Debug)]
pub struct TrustLedger {
    config: EngineConfig,
    store: Arc<LedgerStore>,
    posting: PostingEngine,
    matcher: BatchMatcher,
    reconciliation: Arc<ReconciliationEngine>,
    reporting: ReportingFacade,
}

impl TrustLedger {
    /// Create an empty ledger
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(LedgerStore::new());
        let reconciliation = Arc::new(ReconciliationEngine::new(Arc::clone(&store)));
        Self::wire(config, store, reconciliation)
    }

    /// Rebuild a ledger from a snapshot, exactly as stored
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Validation` if the snapshot holds duplicate ids.
    pub fn restore(config: EngineConfig, snapshot: LedgerSnapshot) -> Result<Self, TrustError> {
        let store = Arc::new(LedgerStore::from_snapshot(snapshot.ledger)?);
        let reconciliation = Arc::new(ReconciliationEngine::from_snapshot(
            Arc::clone(&store),
            snapshot.reconciliation,
        ));
        Ok(Self::wire(config, store, reconciliation))
    }

    fn wire(
        config: EngineConfig,
        store: Arc<LedgerStore>,
        reconciliation: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            posting: PostingEngine::new(Arc::clone(&store)),
            matcher: BatchMatcher::new(Arc::clone(&store), &config),
            reporting: ReportingFacade::new(Arc::clone(&store), Arc::clone(&reconciliation)),
            config,
            store,
            reconciliation,
        }
    }

    /// Capture the whole ledger at one point in time
    ///
    /// Reconciliation operations wait while the snapshot is taken, so the
    /// records and the entries they reconciled always agree.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let (ledger, reconciliation) = self.reconciliation.snapshot_with_store();
        LedgerSnapshot {
            ledger,
            reconciliation,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Accounts

    pub fn create_account(&self, spec: AccountSpec) -> Result<TrustAccount, TrustError> {
        self.store.create_account(spec)
    }

    pub fn get_account(&self, account_id: AccountId) -> Result<TrustAccount, TrustError> {
        self.store.get_account(account_id)
    }

    pub fn list_accounts(&self, filter: &AccountFilter) -> Vec<TrustAccount> {
        self.store.list_accounts(filter)
    }

    pub fn update_account(
        &self,
        account_id: AccountId,
        update: AccountUpdate,
    ) -> Result<TrustAccount, TrustError> {
        self.store.update_account(account_id, update)
    }

    pub fn set_account_status(
        &self,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<TrustAccount, TrustError> {
        self.store.set_account_status(account_id, status)
    }

    pub fn close_account(
        &self,
        account_id: AccountId,
        reason: &str,
        closed_by: &str,
    ) -> Result<TrustAccount, TrustError> {
        self.store.close_account(account_id, reason, closed_by)
    }

    pub fn get_transaction(&self, tx_id: TransactionId) -> Result<TrustTransaction, TrustError> {
        self.store.get_transaction(tx_id)
    }

    pub fn get_client_balance(
        &self,
        account_id: AccountId,
        client_id: &str,
    ) -> Result<Option<ClientTrustBalance>, TrustError> {
        self.store.get_client_balance(account_id, client_id)
    }

    pub fn list_client_balances(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<ClientTrustBalance>, TrustError> {
        self.store.list_client_balances(account_id)
    }

    pub fn list_transactions(
        &self,
        account_id: AccountId,
        query: &TransactionQuery,
    ) -> Result<Vec<TrustTransaction>, TrustError> {
        self.store.list_transactions(account_id, query)
    }

    // Postings

    pub fn deposit(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        self.posting.deposit(account_id, client_id, amount, meta)
    }

    pub fn withdraw(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        self.posting.withdraw(account_id, client_id, amount, meta)
    }

    pub fn transfer(
        &self,
        from_account: AccountId,
        from_client: &str,
        to_account: AccountId,
        to_client: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<(TrustTransaction, TrustTransaction), TrustError> {
        self.posting
            .transfer(from_account, from_client, to_account, to_client, amount, meta)
    }

    pub fn disburse_fee(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        self.posting.disburse_fee(account_id, client_id, amount, meta)
    }

    pub fn disburse_expense(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        self.posting
            .disburse_expense(account_id, client_id, amount, meta)
    }

    pub fn credit_interest(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        self.posting.credit_interest(account_id, client_id, amount, meta)
    }

    pub fn post_adjustment(
        &self,
        account_id: AccountId,
        client_id: &str,
        signed_amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        self.posting
            .post_adjustment(account_id, client_id, signed_amount, meta)
    }

    pub fn void_transaction(
        &self,
        tx_id: TransactionId,
        reason: &str,
        voided_by: &str,
        date: NaiveDate,
    ) -> Result<(TrustTransaction, TrustTransaction), TrustError> {
        self.posting.void_transaction(tx_id, reason, voided_by, date)
    }

    pub fn mark_cleared(
        &self,
        tx_id: TransactionId,
        cleared_date: NaiveDate,
    ) -> Result<TrustTransaction, TrustError> {
        self.posting.mark_cleared(tx_id, cleared_date)
    }

    pub fn mark_uncleared(&self, tx_id: TransactionId) -> Result<TrustTransaction, TrustError> {
        self.posting.mark_uncleared(tx_id)
    }

    // Matching

    /// Propose matches for one account's statement lines
    pub fn propose_matches(
        &self,
        account_id: AccountId,
        lines: &[BankStatementLine],
    ) -> Result<MatchReport, TrustError> {
        self.matcher.match_account(account_id, lines)
    }

    /// Propose matches for a mixed batch, one task per account
    pub async fn match_statement(&self, lines: Vec<BankStatementLine>) -> Vec<AccountMatchResult> {
        self.matcher.match_accounts(lines).await
    }

    pub fn confirm_matches(
        &self,
        report: &MatchReport,
    ) -> Result<Vec<TrustTransaction>, TrustError> {
        self.reconciliation.confirm_matches(report)
    }

    // Reconciliation

    pub fn start_reconciliation(
        &self,
        account_id: AccountId,
        period_start: NaiveDate,
        period_end: NaiveDate,
        bank_statement_balance: Decimal,
        started_by: &str,
    ) -> Result<TrustReconciliation, TrustError> {
        self.reconciliation.start_reconciliation(
            account_id,
            period_start,
            period_end,
            bank_statement_balance,
            started_by,
        )
    }

    pub fn recompute(&self, id: ReconciliationId) -> Result<TrustReconciliation, TrustError> {
        self.reconciliation.recompute(id)
    }

    pub fn add_adjustment(
        &self,
        id: ReconciliationId,
        adjustment: ReconciliationAdjustment,
    ) -> Result<TrustReconciliation, TrustError> {
        self.reconciliation.add_adjustment(id, adjustment)
    }

    pub fn complete_reconciliation(
        &self,
        id: ReconciliationId,
        notes: Option<String>,
        reconciled_by: &str,
    ) -> Result<TrustReconciliation, TrustError> {
        self.reconciliation.complete(id, notes, reconciled_by)
    }

    pub fn force_exception(
        &self,
        id: ReconciliationId,
        notes: &str,
        reconciled_by: &str,
    ) -> Result<TrustReconciliation, TrustError> {
        self.reconciliation.force_exception(id, notes, reconciled_by)
    }

    pub fn get_reconciliation(
        &self,
        id: ReconciliationId,
    ) -> Result<TrustReconciliation, TrustError> {
        self.reconciliation.get_reconciliation(id)
    }

    pub fn reconciliation_status(
        &self,
        account_id: AccountId,
    ) -> Result<ReconciliationStatusInfo, TrustError> {
        self.reconciliation.status_info(account_id)
    }

    pub fn run_three_way_check(
        &self,
        account_id: AccountId,
        bank_balance: Decimal,
        verified_by: &str,
    ) -> Result<ThreeWayReconciliation, TrustError> {
        self.reconciliation
            .run_three_way_check(account_id, bank_balance, verified_by)
    }

    // Reports

    pub fn client_ledger_statement(
        &self,
        account_id: AccountId,
        client_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ClientLedgerStatement, TrustError> {
        self.reporting
            .client_ledger_statement(account_id, client_id, from, to)
    }

    pub fn balance_matrix(&self) -> Result<BalanceMatrix, TrustError> {
        self.reporting.balance_matrix()
    }

    pub fn reconciliation_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TrustReconciliation>, TrustError> {
        self.reporting.reconciliation_history(account_id)
    }

    pub fn three_way_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<ThreeWayReconciliation>, TrustError> {
        self.reporting.three_way_history(account_id)
    }

    pub fn account_summary(&self, account_id: AccountId) -> Result<AccountSummary, TrustError> {
        self.reporting.account_summary(account_id)
    }
}

impl Default for TrustLedger {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
