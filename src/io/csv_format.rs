//! CSV formats for journals, statements and balance output
//!
//! This module centralizes all CSV format concerns, providing:
//! - `JournalRecord` / `JournalEntry` for posting journals
//! - `StatementRecord` for normalized bank statement lines
//! - Writers for the balance matrix and match reports
//!
//! Conversion functions are pure (no I/O) for easy testing.

use std::io::Write;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::core::BalanceMatrix;
use crate::types::{
    validate_amount_scale, AccountId, BankStatementLine, ClientId, MatchReport, StatementLineId,
    TrustError,
};

/// Date format used by every CSV file
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw posting journal row
///
/// Columns: `type,account,client,amount,date,reference,to_account,to_client,check_number`.
/// The last four are optional; `to_account` and `to_client` are required for
/// transfers only.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct JournalRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub account: AccountId,
    pub client: ClientId,
    pub amount: String,
    pub date: String,
    pub reference: Option<String>,
    pub to_account: Option<AccountId>,
    pub to_client: Option<ClientId>,
    pub check_number: Option<String>,
}

/// Kind of posting a journal row requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalKind {
    Deposit,
    Withdrawal,
    Transfer,
    Fee,
    Expense,
    Interest,
}

/// A validated posting journal row
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub kind: JournalKind,
    pub account: AccountId,
    pub client: ClientId,
    /// Positive magnitude; the posting engine applies the sign
    pub amount: Decimal,
    pub date: NaiveDate,
    pub reference: Option<String>,
    /// Destination `(account, client)` of a transfer
    pub destination: Option<(AccountId, ClientId)>,
    pub check_number: Option<String>,
}

/// Raw normalized statement row
///
/// Columns: `account,line,date,amount,description`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StatementRecord {
    pub account: AccountId,
    pub line: StatementLineId,
    pub date: String,
    pub amount: String,
    #[serde(default)]
    pub description: String,
}

/// Convert a journal row into a `JournalEntry`
///
/// # Errors
///
/// Returns `TrustError::Parse` if:
/// - The type is not one of `deposit|withdrawal|transfer|fee|expense|interest`
/// - The amount or date does not parse
/// - A transfer has no destination
pub fn convert_journal_record(record: JournalRecord) -> Result<JournalEntry, TrustError> {
    let kind = match record.kind.to_lowercase().as_str() {
        "deposit" => JournalKind::Deposit,
        "withdrawal" => JournalKind::Withdrawal,
        "transfer" => JournalKind::Transfer,
        "fee" => JournalKind::Fee,
        "expense" => JournalKind::Expense,
        "interest" => JournalKind::Interest,
        _ => {
            return Err(parse_error(format!(
                "invalid journal type '{}' for client {}",
                record.kind, record.client
            )))
        }
    };
    let amount = parse_amount(&record.amount)?;
    let date = parse_date(&record.date)?;

    let destination = match (kind, record.to_account, non_blank(record.to_client)) {
        (JournalKind::Transfer, Some(account), Some(client)) => Some((account, client)),
        (JournalKind::Transfer, _, _) => {
            return Err(parse_error(format!(
                "transfer for client {} needs to_account and to_client",
                record.client
            )))
        }
        _ => None,
    };

    Ok(JournalEntry {
        kind,
        account: record.account,
        client: record.client,
        amount,
        date,
        reference: non_blank(record.reference),
        destination,
        check_number: non_blank(record.check_number),
    })
}

/// Convert a statement row into a `BankStatementLine`
///
/// Amounts finer than the minor currency unit are rejected, as they are for
/// ledger entries.
pub fn convert_statement_record(record: StatementRecord) -> Result<BankStatementLine, TrustError> {
    let amount = parse_amount(&record.amount)?;
    validate_amount_scale(amount)?;
    Ok(BankStatementLine {
        id: record.line,
        account_id: record.account,
        date: parse_date(&record.date)?,
        amount,
        description: record.description,
        reference: None,
    })
}

/// Write the balance matrix as CSV
///
/// Columns: `account,client,balance,available,pending`, one row per client
/// sub-ledger, ordered by account then client.
pub fn write_balances_csv(matrix: &BalanceMatrix, output: &mut dyn Write) -> Result<(), TrustError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["account", "client", "balance", "available", "pending"])?;

    for row in &matrix.accounts {
        for client in &row.clients {
            writer.write_record(&[
                row.account.id.to_string(),
                client.client_id.clone(),
                format!("{:.2}", client.balance),
                format!("{:.2}", client.available_balance),
                format!("{:.2}", client.pending_balance),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Write match reports as CSV
///
/// Columns: `account,status,line,transaction,amount,date`. `status` is one of
/// `matched`, `unmatched_line` or `unmatched_entry`; columns that do not
/// apply are left empty.
pub fn write_match_report_csv(
    reports: &[MatchReport],
    output: &mut dyn Write,
) -> Result<(), TrustError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["account", "status", "line", "transaction", "amount", "date"])?;

    for report in reports {
        let account = report.account_id.to_string();
        for m in &report.matches {
            writer.write_record(&[
                account.clone(),
                "matched".to_string(),
                m.line_id.to_string(),
                m.transaction_id.to_string(),
                format!("{:.2}", m.amount),
                m.line_date.format(DATE_FORMAT).to_string(),
            ])?;
        }
        for line in &report.unmatched_lines {
            writer.write_record(&[
                account.clone(),
                "unmatched_line".to_string(),
                line.id.to_string(),
                String::new(),
                format!("{:.2}", line.amount),
                line.date.format(DATE_FORMAT).to_string(),
            ])?;
        }
        for tx in &report.unmatched_transactions {
            writer.write_record(&[
                account.clone(),
                "unmatched_entry".to_string(),
                String::new(),
                tx.to_string(),
                String::new(),
                String::new(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Parse a decimal amount
pub fn parse_amount(raw: &str) -> Result<Decimal, TrustError> {
    Decimal::from_str(raw.trim()).map_err(|_| parse_error(format!("invalid amount '{}'", raw)))
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> Result<NaiveDate, TrustError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| parse_error(format!("invalid date '{}'", raw)))
}

fn parse_error(message: String) -> TrustError {
    TrustError::Parse {
        line: None,
        message,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
