//! Account-related types for the trust ledger
//!
//! This module defines the pooled [`TrustAccount`], the per-client
//! [`ClientTrustBalance`] sub-ledger held inside it, and the inputs used to
//! create, update and filter accounts.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::TrustError;
use super::transaction::TransactionId;

/// Trust account identifier, assigned by the ledger store
pub type AccountId = u32;

/// Client identifier, owned by the CRM
pub type ClientId = String;

/// Case (matter) identifier, owned by the CRM
pub type CaseId = String;

/// Identity of the authenticated caller performing an operation
pub type UserId = String;

/// Kind of pooled trust account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// General client trust (IOLTA-style) account
    GeneralTrust,
    /// Escrow account held for a specific transaction
    Escrow,
    /// Account holding advance fee retainers
    Retainer,
}

/// Lifecycle status of a trust account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Accepts postings
    Active,
    /// Temporarily frozen; rejects postings but can be re-activated
    Inactive,
    /// Terminal; reachable only through `close_account`
    Closed,
}

/// Bank-side identity of a trust account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankIdentity {
    /// Name of the holding bank
    pub bank_name: String,
    /// Bank account number
    pub account_number: String,
    /// Domestic routing number, if any
    pub routing_number: Option<String>,
    /// SWIFT/BIC code, if any
    pub swift_code: Option<String>,
}

impl BankIdentity {
    /// Check that the identity is complete enough to receive deposits
    ///
    /// Bank name and account number are required, plus at least one of the
    /// routing number or SWIFT code.
    pub fn validate(&self) -> Result<(), TrustError> {
        if self.bank_name.trim().is_empty() {
            return Err(TrustError::validation("bank name is required"));
        }
        if self.account_number.trim().is_empty() {
            return Err(TrustError::validation("bank account number is required"));
        }
        let has_routing = self
            .routing_number
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        let has_swift = self
            .swift_code
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if !has_routing && !has_swift {
            return Err(TrustError::validation(
                "either a routing number or a SWIFT code is required",
            ));
        }
        Ok(())
    }
}

/// Input for creating a trust account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSpec {
    /// Display name of the account
    pub name: String,
    /// Kind of trust account
    pub account_type: AccountType,
    /// Holding bank identity
    pub bank: BankIdentity,
    /// ISO 4217 currency code
    pub currency: String,
    /// Whether the bank pays interest on the pooled balance
    pub interest_bearing: bool,
    /// Annual interest rate, required iff `interest_bearing`
    pub interest_rate: Option<Decimal>,
    /// Whether this is the firm's default trust account
    pub is_default: bool,
}

impl AccountSpec {
    /// Create a spec for a non-interest-bearing, non-default account
    pub fn new(
        name: impl Into<String>,
        account_type: AccountType,
        bank: BankIdentity,
        currency: impl Into<String>,
    ) -> Self {
        AccountSpec {
            name: name.into(),
            account_type,
            bank,
            currency: currency.into(),
            interest_bearing: false,
            interest_rate: None,
            is_default: false,
        }
    }

    /// Validate the spec before an account is created from it
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Validation` if:
    /// - The account name is blank
    /// - The bank identity is incomplete
    /// - The currency is not a three-letter uppercase code
    /// - The interest terms are inconsistent with `interest_bearing`
    pub fn validate(&self) -> Result<(), TrustError> {
        if self.name.trim().is_empty() {
            return Err(TrustError::validation("account name is required"));
        }
        self.bank.validate()?;
        validate_currency(&self.currency)?;
        validate_interest(self.interest_bearing, self.interest_rate)
    }
}

/// Descriptive fields of an account that may be edited after creation
///
/// Balances are never part of an update; they only move through postings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub bank: Option<BankIdentity>,
    pub interest_bearing: Option<bool>,
    pub interest_rate: Option<Option<Decimal>>,
    pub is_default: Option<bool>,
}

/// Filter for listing accounts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountFilter {
    pub account_type: Option<AccountType>,
    pub status: Option<AccountStatus>,
}

impl AccountFilter {
    /// Check whether an account passes this filter
    pub fn matches(&self, account: &TrustAccount) -> bool {
        self.account_type.map_or(true, |t| t == account.account_type)
            && self.status.map_or(true, |s| s == account.status)
    }
}

/// A pooled bank account holding several clients' funds
///
/// Invariants maintained by the ledger store:
/// - `balance == available_balance + pending_balance`
/// - `balance` equals the sum of the account's client balances (no commingling)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAccount {
    pub id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub bank: BankIdentity,
    pub currency: String,

    /// Book total of all postings
    pub balance: Decimal,

    /// Portion of `balance` from entries the bank has cleared
    pub available_balance: Decimal,

    /// Portion of `balance` from entries still pending at the bank
    pub pending_balance: Decimal,

    pub status: AccountStatus,
    pub interest_bearing: bool,
    pub interest_rate: Option<Decimal>,
    pub is_default: bool,

    /// Bank statement balance of the latest completed reconciliation
    pub last_reconciled_balance: Option<Decimal>,

    /// Period end of the latest completed reconciliation
    pub last_reconciled_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<UserId>,
    pub close_reason: Option<String>,
}

impl TrustAccount {
    /// Create an active account with zero balances from a validated spec
    pub fn new(id: AccountId, spec: AccountSpec, created_at: DateTime<Utc>) -> Self {
        TrustAccount {
            id,
            name: spec.name,
            account_type: spec.account_type,
            bank: spec.bank,
            currency: spec.currency,
            balance: Decimal::ZERO,
            available_balance: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            status: AccountStatus::Active,
            interest_bearing: spec.interest_bearing,
            interest_rate: spec.interest_rate,
            is_default: spec.is_default,
            last_reconciled_balance: None,
            last_reconciled_date: None,
            created_at,
            closed_at: None,
            closed_by: None,
            close_reason: None,
        }
    }

    /// Apply an update to the descriptive fields
    ///
    /// The update is validated as a whole before anything is written, so a
    /// rejected update leaves the account untouched.
    pub fn apply_update(&mut self, update: AccountUpdate) -> Result<(), TrustError> {
        let name = update.name.unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(TrustError::validation("account name is required"));
        }
        let bank = update.bank.unwrap_or_else(|| self.bank.clone());
        bank.validate()?;
        let interest_bearing = update.interest_bearing.unwrap_or(self.interest_bearing);
        let interest_rate = update.interest_rate.unwrap_or(self.interest_rate);
        validate_interest(interest_bearing, interest_rate)?;

        self.name = name;
        self.bank = bank;
        self.interest_bearing = interest_bearing;
        self.interest_rate = interest_rate;
        if let Some(is_default) = update.is_default {
            self.is_default = is_default;
        }
        Ok(())
    }
}

/// A client's sub-ledger inside one trust account
///
/// Created lazily on the client's first deposit and never deleted; a
/// zero-balance row stays for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientTrustBalance {
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub case_id: Option<CaseId>,

    /// Never negative
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub pending_balance: Decimal,

    pub last_transaction_id: Option<TransactionId>,
    pub last_transaction_date: Option<NaiveDate>,
}

impl ClientTrustBalance {
    /// Create an empty sub-ledger for a client
    pub fn new(client_id: ClientId, account_id: AccountId, case_id: Option<CaseId>) -> Self {
        ClientTrustBalance {
            client_id,
            account_id,
            case_id,
            balance: Decimal::ZERO,
            available_balance: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            last_transaction_id: None,
            last_transaction_date: None,
        }
    }
}

fn validate_currency(currency: &str) -> Result<(), TrustError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(TrustError::validation(format!(
            "currency '{}' is not a three-letter ISO code",
            currency
        )))
    }
}

fn validate_interest(interest_bearing: bool, rate: Option<Decimal>) -> Result<(), TrustError> {
    match (interest_bearing, rate) {
        (true, Some(rate)) if rate.is_sign_negative() => Err(TrustError::validation(
            "interest rate cannot be negative",
        )),
        (true, None) => Err(TrustError::validation(
            "interest-bearing accounts need an interest rate",
        )),
        (false, Some(_)) => Err(TrustError::validation(
            "interest rate given for a non-interest-bearing account",
        )),
        _ => Ok(()),
    }
}
