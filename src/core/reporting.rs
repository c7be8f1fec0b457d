//! Read-only reports over the trust ledger
//!
//! Every report is built while holding read locks on the books it covers, so
//! none of them can observe half of a posting or a transfer.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    AccountId, ClientId, ClientTrustBalance, ThreeWayReconciliation, TrustAccount, TrustError,
    TrustReconciliation, TrustTransaction,
};

use super::{LedgerStore, ReconciliationEngine};

/// A client's ledger statement for a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientLedgerStatement {
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Sum of the client's entries dated before `from`
    pub opening_balance: Decimal,
    /// Entries dated inside the range, ordered by (date, id)
    pub entries: Vec<TrustTransaction>,
    pub closing_balance: Decimal,
}

/// One account's row of the balance matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalances {
    pub account: TrustAccount,
    pub clients: Vec<ClientTrustBalance>,
}

/// Every account with its client balances, at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceMatrix {
    pub accounts: Vec<AccountBalances>,
    pub total_balance: Decimal,
    pub total_available: Decimal,
    pub total_pending: Decimal,
}

/// Headline figures for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub pending_balance: Decimal,
    pub total_credits: Decimal,
    /// Positive magnitude of all debit entries
    pub total_debits: Decimal,
    pub transaction_count: usize,
    pub client_count: usize,
    pub last_reconciled_date: Option<NaiveDate>,
}

/// Read-only query surface
#[derive(Debug, Clone)]
pub struct ReportingFacade {
    store: Arc<LedgerStore>,
    reconciliation: Arc<ReconciliationEngine>,
}

impl ReportingFacade {
    pub fn new(store: Arc<LedgerStore>, reconciliation: Arc<ReconciliationEngine>) -> Self {
        Self {
            store,
            reconciliation,
        }
    }

    /// Opening balance, in-range entries and closing balance for one client
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` if `from > to`
    /// - `TrustError::AccountNotFound` for an unknown account
    pub fn client_ledger_statement(
        &self,
        account_id: AccountId,
        client_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ClientLedgerStatement, TrustError> {
        if from > to {
            return Err(TrustError::validation(format!(
                "statement range {}..{} is inverted",
                from, to
            )));
        }
        self.store.read_book(account_id, |book| {
            let overflow = || TrustError::arithmetic_overflow("client_ledger_statement", account_id);
            let mut opening_balance = Decimal::ZERO;
            let mut entries = Vec::new();
            for tx in book.transactions().iter().filter(|tx| tx.client_id == client_id) {
                if tx.date < from {
                    opening_balance = opening_balance.checked_add(tx.amount).ok_or_else(overflow)?;
                } else if tx.date <= to {
                    entries.push(tx.clone());
                }
            }
            entries.sort_by_key(|tx| (tx.date, tx.id));
            let closing_balance = entries
                .iter()
                .try_fold(opening_balance, |total, tx| total.checked_add(tx.amount))
                .ok_or_else(overflow)?;

            Ok(ClientLedgerStatement {
                account_id,
                client_id: client_id.to_string(),
                from,
                to,
                opening_balance,
                entries,
                closing_balance,
            })
        })?
    }

    /// Every account and client balance, plus grand totals
    ///
    /// # Errors
    ///
    /// - `TrustError::ArithmeticOverflow` if a grand total leaves the
    ///   `Decimal` range
    pub fn balance_matrix(&self) -> Result<BalanceMatrix, TrustError> {
        self.store.read_all(|books| {
            let mut matrix = BalanceMatrix::default();
            for book in books {
                let account = book.account();
                let overflow = || TrustError::arithmetic_overflow("balance_matrix", account.id);
                matrix.total_balance = matrix
                    .total_balance
                    .checked_add(account.balance)
                    .ok_or_else(overflow)?;
                matrix.total_available = matrix
                    .total_available
                    .checked_add(account.available_balance)
                    .ok_or_else(overflow)?;
                matrix.total_pending = matrix
                    .total_pending
                    .checked_add(account.pending_balance)
                    .ok_or_else(overflow)?;
                matrix.accounts.push(AccountBalances {
                    account: account.clone(),
                    clients: book.client_balances().cloned().collect(),
                });
            }
            Ok(matrix)
        })
    }

    /// Reconciliations of an account ordered by period end
    pub fn reconciliation_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TrustReconciliation>, TrustError> {
        self.reconciliation.list_reconciliations(account_id)
    }

    /// Three-way snapshots of an account, oldest first
    pub fn three_way_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<ThreeWayReconciliation>, TrustError> {
        self.reconciliation.three_way_history(account_id)
    }

    pub fn account_summary(&self, account_id: AccountId) -> Result<AccountSummary, TrustError> {
        self.store.read_book(account_id, |book| {
            let account = book.account();
            let overflow = || TrustError::arithmetic_overflow("account_summary", account_id);
            let mut credits = Decimal::ZERO;
            let mut debits = Decimal::ZERO;
            for tx in book.transactions() {
                if tx.amount.is_sign_positive() {
                    credits = credits.checked_add(tx.amount).ok_or_else(overflow)?;
                } else {
                    debits = debits.checked_sub(tx.amount).ok_or_else(overflow)?;
                }
            }
            Ok(AccountSummary {
                account_id,
                balance: account.balance,
                available_balance: account.available_balance,
                pending_balance: account.pending_balance,
                total_credits: credits,
                total_debits: debits,
                transaction_count: book.transactions().len(),
                client_count: book.client_balances().count(),
                last_reconciled_date: account.last_reconciled_date,
            })
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PostingEngine;
    use crate::types::{AccountSpec, AccountType, BankIdentity, PostingMeta};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn setup() -> (PostingEngine, ReportingFacade, Vec<AccountId>) {
        let store = Arc::new(LedgerStore::new());
        let ids = ["Operating Trust", "Escrow"]
            .iter()
            .map(|name| {
                store
                    .create_account(AccountSpec::new(
                        *name,
                        AccountType::GeneralTrust,
                        BankIdentity {
                            bank_name: "First Fiduciary".to_string(),
                            account_number: name.to_string(),
                            routing_number: Some("021000021".to_string()),
                            swift_code: None,
                        },
                        "USD",
                    ))
                    .unwrap()
                    .id
            })
            .collect();
        let reconciliation = Arc::new(ReconciliationEngine::new(Arc::clone(&store)));
        (
            PostingEngine::new(Arc::clone(&store)),
            ReportingFacade::new(store, reconciliation),
            ids,
        )
    }

    #[test]
    fn test_client_statement_opening_and_closing() {
        let (posting, reports, ids) = setup();
        let x = ids[0];
        posting
            .deposit(x, "alice", Decimal::from(1_000), PostingMeta::new("clerk", day(2)))
            .unwrap();
        posting
            .withdraw(x, "alice", Decimal::from(300), PostingMeta::new("clerk", day(10)))
            .unwrap();
        posting
            .deposit(x, "bob", Decimal::from(50), PostingMeta::new("clerk", day(11)))
            .unwrap();
        posting
            .deposit(x, "alice", Decimal::from(20), PostingMeta::new("clerk", day(25)))
            .unwrap();

        let statement = reports
            .client_ledger_statement(x, "alice", day(5), day(20))
            .unwrap();
        assert_eq!(statement.opening_balance, Decimal::from(1_000));
        assert_eq!(statement.entries.len(), 1);
        assert_eq!(statement.closing_balance, Decimal::from(700));

        assert!(matches!(
            reports.client_ledger_statement(x, "alice", day(20), day(5)),
            Err(TrustError::Validation { .. })
        ));
    }

    #[test]
    fn test_balance_matrix_totals() {
        let (posting, reports, ids) = setup();
        posting
            .deposit(ids[0], "alice", Decimal::from(600), PostingMeta::new("clerk", day(1)))
            .unwrap();
        posting
            .transfer(
                ids[0],
                "alice",
                ids[1],
                "bob",
                Decimal::from(250),
                PostingMeta::new("clerk", day(2)),
            )
            .unwrap();

        let matrix = reports.balance_matrix().unwrap();
        assert_eq!(matrix.accounts.len(), 2);
        assert_eq!(matrix.total_balance, Decimal::from(600));
        assert_eq!(matrix.total_pending, Decimal::from(600));
        assert_eq!(matrix.accounts[1].clients[0].client_id, "bob");
    }

    #[test]
    fn test_account_summary_counts() {
        let (posting, reports, ids) = setup();
        posting
            .deposit(ids[0], "alice", Decimal::from(600), PostingMeta::new("clerk", day(1)))
            .unwrap();
        posting
            .deposit(ids[0], "bob", Decimal::from(100), PostingMeta::new("clerk", day(1)))
            .unwrap();
        posting
            .disburse_fee(ids[0], "alice", Decimal::from(150), PostingMeta::new("clerk", day(3)))
            .unwrap();

        let summary = reports.account_summary(ids[0]).unwrap();
        assert_eq!(summary.balance, Decimal::from(550));
        assert_eq!(summary.total_credits, Decimal::from(700));
        assert_eq!(summary.total_debits, Decimal::from(150));
        assert_eq!(summary.transaction_count, 3);
        assert_eq!(summary.client_count, 2);
        assert_eq!(summary.last_reconciled_date, None);
    }

    #[test]
    fn test_account_summary_reports_overflowing_totals() {
        let (posting, reports, ids) = setup();
        let half = Decimal::MAX / Decimal::from(2);
        for d in 1..=3 {
            posting
                .deposit(ids[0], "alice", half, PostingMeta::new("clerk", day(d)))
                .unwrap();
            posting
                .withdraw(ids[0], "alice", half, PostingMeta::new("clerk", day(d)))
                .unwrap();
        }

        assert_eq!(reports.balance_matrix().unwrap().total_balance, Decimal::ZERO);
        assert!(matches!(
            reports.account_summary(ids[0]),
            Err(TrustError::ArithmeticOverflow { .. })
        ));
    }

    #[test]
    fn test_balance_matrix_reports_overflowing_grand_total() {
        let (posting, reports, ids) = setup();
        for &id in &ids {
            posting
                .deposit(id, "alice", Decimal::MAX, PostingMeta::new("clerk", day(1)))
                .unwrap();
        }

        assert!(matches!(
            reports.balance_matrix(),
            Err(TrustError::ArithmeticOverflow { .. })
        ));
        assert_eq!(reports.account_summary(ids[1]).unwrap().balance, Decimal::MAX);
    }
}
