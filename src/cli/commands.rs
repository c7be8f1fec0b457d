//! Subcommand runners
//!
//! Every command loads the state file, acts on a `TrustLedger` and saves the
//! state back. A command that fails returns before saving, so the state file
//! only ever holds the result of whole commands.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::core::TrustLedger;
use crate::io::{
    load_snapshot, save_snapshot, write_balances_csv, write_match_report_csv, JournalEntry,
    JournalKind, JournalReader, StatementReader,
};
use crate::types::{
    AdjustmentSide, PostingMeta, ReconciliationAdjustment, TrustError, TrustReconciliation,
};

use super::args::{CliArgs, Command, ReconcileArgs};

const DEFAULT_ADJUSTMENT_NOTE: &str = "manual adjustment";

/// Run the parsed command, writing its report to `output`
pub fn run(args: &CliArgs, output: &mut dyn Write) -> Result<(), TrustError> {
    let config = args.to_engine_config();
    let ledger = open_ledger(&args.state, config)?;
    let actor = args.actor.as_str();

    let changed = match &args.command {
        Command::OpenAccount(open) => {
            let account = ledger.create_account(open.to_spec())?;
            info!(account = account.id, name = %account.name, "account opened");
            writeln!(output, "{}", account.id)?;
            true
        }
        Command::Post { journal } => {
            post_journal(&ledger, journal, actor)?;
            write_balances_csv(&ledger.balance_matrix()?, output)?;
            true
        }
        Command::Match { statement, confirm } => {
            match_statement(&ledger, statement, *confirm, output)?;
            *confirm
        }
        Command::Reconcile(reconcile) => {
            let record = reconcile_period(&ledger, reconcile, actor)?;
            write_json(&record, output)?;
            true
        }
        Command::ThreeWay {
            account,
            bank_balance,
        } => {
            let check = ledger.run_three_way_check(*account, *bank_balance, actor)?;
            write_json(&check, output)?;
            true
        }
        Command::Balances => {
            write_balances_csv(&ledger.balance_matrix()?, output)?;
            false
        }
    };

    if changed {
        save_snapshot(&args.state, &ledger.snapshot())?;
    }
    Ok(())
}

fn open_ledger(state: &Path, config: EngineConfig) -> Result<TrustLedger, TrustError> {
    match load_snapshot(state)? {
        Some(snapshot) => TrustLedger::restore(config, snapshot),
        None => {
            info!(path = %state.display(), "no state file, starting an empty ledger");
            Ok(TrustLedger::new(config))
        }
    }
}

/// Replay a posting journal, skipping rows the ledger rejects
fn post_journal(ledger: &TrustLedger, journal: &Path, actor: &str) -> Result<(), TrustError> {
    let mut posted = 0usize;
    let mut rejected = 0usize;

    for row in JournalReader::new(journal)? {
        let result = row.and_then(|entry| post_entry(ledger, entry, actor));
        match result {
            Ok(()) => posted += 1,
            Err(e) => {
                rejected += 1;
                warn!(error = %e, "journal row rejected");
            }
        }
    }

    info!(posted, rejected, journal = %journal.display(), "journal replayed");
    Ok(())
}

fn post_entry(ledger: &TrustLedger, entry: JournalEntry, actor: &str) -> Result<(), TrustError> {
    let mut meta = PostingMeta::new(actor, entry.date);
    if let Some(reference) = entry.reference {
        meta = meta.with_reference(reference);
    }
    if let Some(check_number) = entry.check_number {
        meta = meta.with_check_number(check_number);
    }

    let (account, client, amount) = (entry.account, entry.client.as_str(), entry.amount);
    match entry.kind {
        JournalKind::Deposit => ledger.deposit(account, client, amount, meta).map(drop),
        JournalKind::Withdrawal => ledger.withdraw(account, client, amount, meta).map(drop),
        JournalKind::Fee => ledger.disburse_fee(account, client, amount, meta).map(drop),
        JournalKind::Expense => ledger
            .disburse_expense(account, client, amount, meta)
            .map(drop),
        JournalKind::Interest => ledger.credit_interest(account, client, amount, meta).map(drop),
        JournalKind::Transfer => {
            let (to_account, to_client) = entry
                .destination
                .ok_or_else(|| TrustError::validation("transfer without a destination"))?;
            ledger
                .transfer(account, client, to_account, &to_client, amount, meta)
                .map(drop)
        }
    }
}

/// Match a statement file and optionally clear the matched entries
fn match_statement(
    ledger: &TrustLedger,
    statement: &Path,
    confirm: bool,
    output: &mut dyn Write,
) -> Result<(), TrustError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(ledger.config().max_concurrent_accounts)
        .build()?;

    let results = runtime.block_on(async {
        let file = tokio::fs::File::open(statement)
            .await
            .map_err(|e| TrustError::Io {
                message: format!("failed to open statement '{}': {}", statement.display(), e),
            })?;
        let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
        let lines = StatementReader::new(compat_file).read_all().await;
        Ok::<_, TrustError>(ledger.match_statement(lines).await)
    })?;

    let mut reports = Vec::with_capacity(results.len());
    for result in results {
        match result.result {
            Ok(report) => {
                if confirm {
                    let cleared = ledger.confirm_matches(&report)?;
                    info!(
                        account = result.account_id,
                        cleared = cleared.len(),
                        "matches confirmed"
                    );
                }
                reports.push(report);
            }
            Err(e) => warn!(account = result.account_id, error = %e, "account skipped"),
        }
    }

    write_match_report_csv(&reports, output)
}

/// Start or resume a reconciliation, apply adjustments and finalize it
fn reconcile_period(
    ledger: &TrustLedger,
    args: &ReconcileArgs,
    actor: &str,
) -> Result<TrustReconciliation, TrustError> {
    let mut record = match args.id {
        Some(id) => ledger.recompute(id)?,
        None => ledger.start_reconciliation(
            required(args.account, "--account")?,
            required(args.from, "--from")?,
            required(args.to, "--to")?,
            required(args.bank_balance, "--bank-balance")?,
            actor,
        )?,
    };
    let id = record.id;
    let note = args.notes.as_deref().unwrap_or(DEFAULT_ADJUSTMENT_NOTE);

    let adjustments = args
        .bank_adjustments
        .iter()
        .map(|amount| (AdjustmentSide::Bank, *amount))
        .chain(
            args.book_adjustments
                .iter()
                .map(|amount| (AdjustmentSide::Book, *amount)),
        );
    for (side, amount) in adjustments {
        record = ledger.add_adjustment(id, ReconciliationAdjustment::new(side, amount, note, actor))?;
    }

    if args.complete {
        record = ledger.complete_reconciliation(id, args.notes.clone(), actor)?;
    } else if args.force_exception {
        record = ledger.force_exception(id, args.notes.as_deref().unwrap_or_default(), actor)?;
    }
    Ok(record)
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T, TrustError> {
    value.ok_or_else(|| TrustError::validation(format!("{} is required", flag)))
}

fn write_json<T: Serialize>(value: &T, output: &mut dyn Write) -> Result<(), TrustError> {
    serde_json::to_writer_pretty(&mut *output, value)?;
    writeln!(output)?;
    Ok(())
}
