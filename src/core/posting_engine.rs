//! Business postings on top of the ledger store
//!
//! This module provides the `PostingEngine`, which translates business
//! operations (deposits, withdrawals, transfers, disbursements, voids) into
//! ledger store entries.
//!
//! # Design
//!
//! The engine owns no state of its own. It checks the business-level rules
//! (positive amounts, distinct transfer parties), picks the entry type and
//! sign, and hands the entry to the `LedgerStore`, which enforces the balance
//! invariants inside its critical section.
//!
//! # Architecture
//!
//! ```text
//! PostingEngine
//!     └── Arc<LedgerStore>  (per-account locked books)
//! ```
//!
//! # Thread Safety
//!
//! The engine is cheap to clone and can be shared across threads and async
//! tasks; every clone posts into the same store.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use crate::types::{
    AccountId, NewEntry, PostingMeta, TransactionId, TransactionType, TrustError,
    TrustTransaction,
};

use super::LedgerStore;

/// Posting orchestrator for trust ledger operations
///
/// Amounts passed to the engine are always positive magnitudes, except for
/// `post_adjustment`; the engine applies the sign that matches the entry type.
#[derive(Debug, Clone)]
pub struct PostingEngine {
    /// Shared ledger store
    store: Arc<LedgerStore>,
}

impl PostingEngine {
    /// Create a new PostingEngine
    ///
    /// # Arguments
    ///
    /// * `store` - Arc-wrapped LedgerStore shared with the other components
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Deposit client funds into a trust account
    ///
    /// Appends one `deposit` entry in `pending` status. The client's
    /// sub-ledger row is created on their first deposit into the account.
    ///
    /// # Arguments
    ///
    /// * `account_id` - The receiving trust account
    /// * `client_id` - The client whose funds are received
    /// * `amount` - Amount received (must be positive)
    /// * `meta` - Date, reference, payor and the acting user
    ///
    /// # Returns
    ///
    /// The stored entry, including its running balance.
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` if the amount is not positive or has more
    ///   than two decimal places
    /// - `TrustError::AccountNotFound` / `TrustError::InvalidState` if the
    ///   account is missing or not active
    pub fn deposit(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        require_positive(amount, "deposit")?;
        self.post(account_id, client_id, TransactionType::Deposit, amount, meta)
    }

    /// Withdraw client funds from a trust account
    ///
    /// # Arguments
    ///
    /// * `account_id` - The paying trust account
    /// * `client_id` - The client whose funds are paid out
    /// * `amount` - Amount paid out (must be positive)
    /// * `meta` - Date, reference, payee, check number and the acting user
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` if the amount is not positive
    /// - `TrustError::InsufficientTrustFunds` if the client's balance would
    ///   become negative; balances are left unchanged
    pub fn withdraw(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        require_positive(amount, "withdrawal")?;
        self.post(account_id, client_id, TransactionType::Withdrawal, -amount, meta)
    }

    /// Move funds between two client sub-ledgers
    ///
    /// Appends a `transfer-out` entry on the source and a `transfer-in` entry
    /// on the destination as one indivisible unit. The source and destination
    /// may be the same account (client-to-client) or different accounts of the
    /// same currency.
    ///
    /// # Arguments
    ///
    /// * `from_account`, `from_client` - The debited sub-ledger
    /// * `to_account`, `to_client` - The credited sub-ledger
    /// * `amount` - Amount moved (must be positive)
    /// * `meta` - Shared metadata for both legs
    ///
    /// # Returns
    ///
    /// `(out_leg, in_leg)`, each referencing the other through `counterpart_id`.
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` for a non-positive amount, a transfer to the
    ///   same sub-ledger, or accounts of different currencies
    /// - `TrustError::InsufficientTrustFunds` if the source client would go
    ///   negative
    /// - `TrustError::InvalidState` if either account is not active
    ///
    /// On any error neither leg is applied.
    pub fn transfer(
        &self,
        from_account: AccountId,
        from_client: &str,
        to_account: AccountId,
        to_client: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<(TrustTransaction, TrustTransaction), TrustError> {
        require_positive(amount, "transfer")?;
        let out_leg = NewEntry::new(
            from_account,
            from_client,
            TransactionType::TransferOut,
            -amount,
            meta.clone(),
        );
        let in_leg = NewEntry::new(
            to_account,
            to_client,
            TransactionType::TransferIn,
            amount,
            meta,
        );

        let (out_tx, in_tx) = self.store.append_transfer(out_leg, in_leg)?;
        info!(
            out_tx = out_tx.id,
            in_tx = in_tx.id,
            from_account,
            to_account,
            %amount,
            "transfer posted"
        );
        Ok((out_tx, in_tx))
    }

    /// Pay earned fees from a client's trust funds to the firm
    ///
    /// `meta.invoice_id` links the disbursement to the invoice it settles.
    pub fn disburse_fee(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        require_positive(amount, "fee disbursement")?;
        self.post(
            account_id,
            client_id,
            TransactionType::FeeDisbursement,
            -amount,
            meta,
        )
    }

    /// Pay a case expense from a client's trust funds
    ///
    /// `meta.expense_id` links the disbursement to the expense record.
    pub fn disburse_expense(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        require_positive(amount, "expense disbursement")?;
        self.post(
            account_id,
            client_id,
            TransactionType::ExpenseDisbursement,
            -amount,
            meta,
        )
    }

    /// Credit bank interest to a client's sub-ledger
    pub fn credit_interest(
        &self,
        account_id: AccountId,
        client_id: &str,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        require_positive(amount, "interest credit")?;
        self.post(
            account_id,
            client_id,
            TransactionType::InterestCredit,
            amount,
            meta,
        )
    }

    /// Post a manual correction with a signed amount
    ///
    /// A negative adjustment is held to the same non-negative rule as any
    /// other debit.
    ///
    /// # Errors
    ///
    /// - `TrustError::Validation` for a zero amount
    /// - `TrustError::InsufficientTrustFunds` if a negative adjustment would
    ///   overdraw the client
    pub fn post_adjustment(
        &self,
        account_id: AccountId,
        client_id: &str,
        signed_amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        self.post(
            account_id,
            client_id,
            TransactionType::Adjustment,
            signed_amount,
            meta,
        )
    }

    /// Reverse an entry that has not been reconciled
    ///
    /// The original is marked `void` and a new offsetting `adjustment` entry
    /// is appended; nothing is deleted. A transfer leg takes its counterpart
    /// with it.
    ///
    /// # Arguments
    ///
    /// * `tx_id` - The entry to void
    /// * `reason` - Why the entry is voided; becomes the offset's description
    /// * `voided_by` - The acting user
    /// * `date` - Business date of the offsetting entry
    ///
    /// # Returns
    ///
    /// `(original, offset)` as stored after the void.
    ///
    /// # Errors
    ///
    /// - `TrustError::ImmutableEntry` if the entry, or the other leg of a
    ///   transfer, is reconciled
    /// - `TrustError::InvalidState` if it is already void
    /// - `TrustError::InsufficientTrustFunds` if the client already spent the
    ///   funds a voided credit brought in
    pub fn void_transaction(
        &self,
        tx_id: TransactionId,
        reason: &str,
        voided_by: &str,
        date: NaiveDate,
    ) -> Result<(TrustTransaction, TrustTransaction), TrustError> {
        let (original, offset) = self
            .store
            .void_transaction(tx_id, reason, voided_by, date)?;
        info!(
            tx = original.id,
            offset = offset.id,
            account = original.account_id,
            reason,
            "transaction voided"
        );
        Ok((original, offset))
    }

    /// Mark an entry as cleared by the bank on `cleared_date`
    ///
    /// Idempotent: clearing an already-cleared entry returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::InvalidState` for void or reconciled entries.
    pub fn mark_cleared(
        &self,
        tx_id: TransactionId,
        cleared_date: NaiveDate,
    ) -> Result<TrustTransaction, TrustError> {
        self.store.mark_cleared(tx_id, cleared_date)
    }

    /// Undo a mistaken clearing before the entry is reconciled
    pub fn mark_uncleared(&self, tx_id: TransactionId) -> Result<TrustTransaction, TrustError> {
        self.store.mark_uncleared(tx_id)
    }

    fn post(
        &self,
        account_id: AccountId,
        client_id: &str,
        tx_type: TransactionType,
        amount: Decimal,
        meta: PostingMeta,
    ) -> Result<TrustTransaction, TrustError> {
        let entry = NewEntry::new(account_id, client_id, tx_type, amount, meta);
        let tx = self.store.append_transaction(entry)?;
        info!(
            tx = tx.id,
            account = account_id,
            client = client_id,
            tx_type = ?tx_type,
            %amount,
            running_balance = %tx.running_balance,
            "entry posted"
        );
        Ok(tx)
    }
}

fn require_positive(amount: Decimal, operation: &str) -> Result<(), TrustError> {
    if amount <= Decimal::ZERO {
        return Err(TrustError::validation(format!(
            "{} amount must be positive, got {}",
            operation, amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountSpec, AccountStatus, AccountType, BankIdentity, TransactionStatus};
    use rstest::rstest;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn meta() -> PostingMeta {
        PostingMeta::new("clerk", date(1))
    }

    fn setup(currencies: &[&str]) -> (PostingEngine, Arc<LedgerStore>, Vec<AccountId>) {
        let store = Arc::new(LedgerStore::new());
        let ids = currencies
            .iter()
            .enumerate()
            .map(|(i, currency)| {
                let bank = BankIdentity {
                    bank_name: "First Fiduciary".to_string(),
                    account_number: format!("ACC-{}", i),
                    routing_number: None,
                    swift_code: Some("FFIDUS33".to_string()),
                };
                store
                    .create_account(AccountSpec::new(
                        format!("Trust {}", i),
                        AccountType::GeneralTrust,
                        bank,
                        *currency,
                    ))
                    .unwrap()
                    .id
            })
            .collect();
        (PostingEngine::new(Arc::clone(&store)), store, ids)
    }

    #[rstest]
    #[case::zero(Decimal::ZERO)]
    #[case::negative(Decimal::from(-10))]
    fn test_non_positive_amounts_are_rejected(#[case] amount: Decimal) {
        let (engine, _, ids) = setup(&["USD"]);
        let account = ids[0];

        assert!(matches!(
            engine.deposit(account, "alice", amount, meta()),
            Err(TrustError::Validation { .. })
        ));
        assert!(matches!(
            engine.withdraw(account, "alice", amount, meta()),
            Err(TrustError::Validation { .. })
        ));
        assert!(matches!(
            engine.credit_interest(account, "alice", amount, meta()),
            Err(TrustError::Validation { .. })
        ));
    }

    #[test]
    fn test_deposit_then_overdraw_is_rejected() {
        let (engine, store, ids) = setup(&["USD"]);
        let account = ids[0];

        engine
            .deposit(account, "alice", Decimal::from(10_000), meta())
            .unwrap();
        let result = engine.withdraw(account, "alice", Decimal::from(12_000), meta());

        match result {
            Err(TrustError::InsufficientTrustFunds {
                balance, requested, ..
            }) => {
                assert_eq!(balance, Decimal::from(10_000));
                assert_eq!(requested, Decimal::from(12_000));
            }
            other => panic!("expected insufficient funds, got {:?}", other),
        }
        assert_eq!(
            store.get_account(account).unwrap().balance,
            Decimal::from(10_000)
        );
    }

    #[test]
    fn test_disbursements_carry_links_and_sign() {
        let (engine, _, ids) = setup(&["USD"]);
        let account = ids[0];
        engine
            .deposit(account, "alice", Decimal::from(1_000), meta())
            .unwrap();

        let fee = engine
            .disburse_fee(account, "alice", Decimal::from(300), meta().with_invoice("INV-7"))
            .unwrap();
        let expense = engine
            .disburse_expense(account, "alice", Decimal::from(200), meta().with_expense("EXP-2"))
            .unwrap();

        assert_eq!(fee.tx_type, TransactionType::FeeDisbursement);
        assert_eq!(fee.amount, Decimal::from(-300));
        assert_eq!(fee.invoice_id.as_deref(), Some("INV-7"));
        assert_eq!(expense.amount, Decimal::from(-200));
        assert_eq!(expense.expense_id.as_deref(), Some("EXP-2"));
        assert_eq!(expense.running_balance, Decimal::from(500));
    }

    #[test]
    fn test_negative_adjustment_respects_client_balance() {
        let (engine, _, ids) = setup(&["USD"]);
        let account = ids[0];
        engine
            .deposit(account, "alice", Decimal::from(50), meta())
            .unwrap();

        assert!(matches!(
            engine.post_adjustment(account, "alice", Decimal::from(-60), meta()),
            Err(TrustError::InsufficientTrustFunds { .. })
        ));
        assert!(matches!(
            engine.post_adjustment(account, "alice", Decimal::ZERO, meta()),
            Err(TrustError::Validation { .. })
        ));
        let tx = engine
            .post_adjustment(account, "alice", Decimal::new(-2_550, 2), meta())
            .unwrap();
        assert_eq!(tx.running_balance, Decimal::new(2_450, 2));
    }

    #[test]
    fn test_transfer_between_accounts() {
        let (engine, store, ids) = setup(&["USD", "USD"]);
        let (x, y) = (ids[0], ids[1]);
        engine.deposit(x, "alice", Decimal::from(5_000), meta()).unwrap();

        let (out_tx, in_tx) = engine
            .transfer(x, "alice", y, "bob", Decimal::from(3_000), meta())
            .unwrap();

        assert_eq!(out_tx.tx_type, TransactionType::TransferOut);
        assert_eq!(in_tx.tx_type, TransactionType::TransferIn);
        assert_eq!(out_tx.counterpart_id, Some(in_tx.id));
        assert_eq!(store.get_account(x).unwrap().balance, Decimal::from(2_000));
        assert_eq!(store.get_account(y).unwrap().balance, Decimal::from(3_000));
    }

    #[rstest]
    #[case::destination_inactive(AccountStatus::Inactive)]
    #[case::destination_closed(AccountStatus::Closed)]
    fn test_failed_destination_leaves_source_unposted(#[case] status: AccountStatus) {
        let (engine, store, ids) = setup(&["USD", "USD"]);
        let (x, y) = (ids[0], ids[1]);
        engine.deposit(x, "alice", Decimal::from(5_000), meta()).unwrap();
        if status == AccountStatus::Closed {
            store.close_account(y, "merged", "partner").unwrap();
        } else {
            store.set_account_status(y, status).unwrap();
        }
        let before = store.snapshot();

        let result = engine.transfer(x, "alice", y, "bob", Decimal::from(3_000), meta());

        assert!(matches!(result, Err(TrustError::InvalidState { .. })));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_transfer_rejects_currency_mismatch_and_self_transfer() {
        let (engine, _, ids) = setup(&["USD", "EUR"]);
        let (x, y) = (ids[0], ids[1]);
        engine.deposit(x, "alice", Decimal::from(100), meta()).unwrap();

        assert!(matches!(
            engine.transfer(x, "alice", y, "bob", Decimal::from(10), meta()),
            Err(TrustError::Validation { .. })
        ));
        assert!(matches!(
            engine.transfer(x, "alice", x, "alice", Decimal::from(10), meta()),
            Err(TrustError::Validation { .. })
        ));
    }

    #[rstest]
    #[case::out_leg(true)]
    #[case::in_leg(false)]
    fn test_voiding_either_transfer_leg_reverses_the_transfer(#[case] void_out_leg: bool) {
        let (engine, store, ids) = setup(&["USD", "USD"]);
        let (x, y) = (ids[0], ids[1]);
        engine.deposit(x, "alice", Decimal::from(500), meta()).unwrap();
        let (out_tx, in_tx) = engine
            .transfer(x, "alice", y, "bob", Decimal::from(200), meta())
            .unwrap();
        let target = if void_out_leg { out_tx.id } else { in_tx.id };

        engine
            .void_transaction(target, "keyed against wrong client", "clerk", date(2))
            .unwrap();

        for leg in [out_tx.id, in_tx.id] {
            assert_eq!(
                store.get_transaction(leg).unwrap().status,
                TransactionStatus::Void
            );
        }
        assert_eq!(store.get_account(x).unwrap().balance, Decimal::from(500));
        assert_eq!(store.get_account(y).unwrap().balance, Decimal::ZERO);
        assert_eq!(
            store.get_client_balance(y, "bob").unwrap().unwrap().balance,
            Decimal::ZERO
        );
        assert!(matches!(
            engine.void_transaction(out_tx.id, "again", "clerk", date(3)),
            Err(TrustError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_void_twice_is_invalid_state() {
        let (engine, _, ids) = setup(&["USD"]);
        let tx = engine
            .deposit(ids[0], "alice", Decimal::from(90), meta())
            .unwrap();
        engine
            .void_transaction(tx.id, "duplicate", "clerk", date(2))
            .unwrap();

        assert!(matches!(
            engine.void_transaction(tx.id, "duplicate", "clerk", date(2)),
            Err(TrustError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_clearing_a_void_entry_is_invalid_state() {
        let (engine, _, ids) = setup(&["USD"]);
        let tx = engine
            .deposit(ids[0], "alice", Decimal::from(90), meta())
            .unwrap();
        engine
            .void_transaction(tx.id, "duplicate", "clerk", date(2))
            .unwrap();

        assert!(matches!(
            engine.mark_cleared(tx.id, date(3)),
            Err(TrustError::InvalidState { .. })
        ));
    }
}
