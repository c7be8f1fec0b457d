use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::types::{AccountId, AccountSpec, AccountType, BankIdentity, ReconciliationId};

/// Client trust accounting ledger with bank reconciliation
#[derive(Parser, Debug)]
#[command(name = "trust-ledger")]
#[command(about = "Client trust accounting ledger with bank reconciliation", long_about = None)]
pub struct CliArgs {
    /// JSON state file, created on first use
    #[arg(
        long = "state",
        value_name = "FILE",
        default_value = "trust-ledger.json",
        global = true
    )]
    pub state: PathBuf,

    /// Matching window in days either side of a statement line
    #[arg(
        long = "tolerance-days",
        value_name = "DAYS",
        global = true,
        help = "Statement matching window in days (default: 5)"
    )]
    pub tolerance_days: Option<i64>,

    /// Maximum number of accounts matched concurrently
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        global = true,
        help = "Maximum number of accounts matched concurrently (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,

    /// User recorded on every posting and reconciliation
    #[arg(
        long = "actor",
        value_name = "USER",
        env = "TRUST_LEDGER_ACTOR",
        default_value = "cli",
        global = true
    )]
    pub actor: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a trust account and print its id
    OpenAccount(OpenAccountArgs),

    /// Replay a posting journal CSV and print client balances
    Post {
        #[arg(value_name = "JOURNAL")]
        journal: PathBuf,
    },

    /// Match a bank statement CSV against pending and cleared entries
    Match {
        #[arg(value_name = "STATEMENT")]
        statement: PathBuf,

        /// Mark every matched entry cleared
        #[arg(long)]
        confirm: bool,
    },

    /// Start, adjust and finalize a period reconciliation
    Reconcile(ReconcileArgs),

    /// Run a three-way check of bank, book and client ledgers
    ThreeWay {
        #[arg(long, value_name = "ID")]
        account: AccountId,

        #[arg(long = "bank-balance", value_name = "AMOUNT", allow_negative_numbers = true)]
        bank_balance: Decimal,
    },

    /// Print every client balance as CSV
    Balances,
}

/// Kinds of trust account accepted on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AccountKind {
    General,
    Escrow,
    Retainer,
}

impl From<AccountKind> for AccountType {
    fn from(kind: AccountKind) -> Self {
        match kind {
            AccountKind::General => AccountType::GeneralTrust,
            AccountKind::Escrow => AccountType::Escrow,
            AccountKind::Retainer => AccountType::Retainer,
        }
    }
}

#[derive(Args, Debug)]
pub struct OpenAccountArgs {
    #[arg(long, value_name = "NAME")]
    pub name: String,

    #[arg(long = "type", value_name = "TYPE", default_value = "general")]
    pub kind: AccountKind,

    #[arg(long = "bank-name", value_name = "BANK")]
    pub bank_name: String,

    #[arg(long = "account-number", value_name = "NUMBER")]
    pub account_number: String,

    #[arg(long = "routing-number", value_name = "NUMBER")]
    pub routing_number: Option<String>,

    #[arg(long = "swift", value_name = "CODE")]
    pub swift_code: Option<String>,

    #[arg(long, value_name = "CODE", default_value = "USD")]
    pub currency: String,

    /// Annual interest rate; makes the account interest bearing
    #[arg(long = "interest-rate", value_name = "RATE")]
    pub interest_rate: Option<Decimal>,

    #[arg(long = "default")]
    pub is_default: bool,
}

impl OpenAccountArgs {
    pub fn to_spec(&self) -> AccountSpec {
        let mut spec = AccountSpec::new(
            self.name.clone(),
            self.kind.into(),
            BankIdentity {
                bank_name: self.bank_name.clone(),
                account_number: self.account_number.clone(),
                routing_number: self.routing_number.clone(),
                swift_code: self.swift_code.clone(),
            },
            self.currency.clone(),
        );
        spec.interest_bearing = self.interest_rate.is_some();
        spec.interest_rate = self.interest_rate;
        spec.is_default = self.is_default;
        spec
    }
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Continue an in-progress reconciliation instead of starting one
    #[arg(long, value_name = "ID", conflicts_with_all = ["account", "from", "to", "bank_balance"])]
    pub id: Option<ReconciliationId>,

    #[arg(long, value_name = "ID", required_unless_present = "id")]
    pub account: Option<AccountId>,

    /// First day of the period (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", required_unless_present = "id")]
    pub from: Option<NaiveDate>,

    /// Last day of the period (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", required_unless_present = "id")]
    pub to: Option<NaiveDate>,

    /// Ending balance on the bank statement
    #[arg(
        long = "bank-balance",
        value_name = "AMOUNT",
        required_unless_present = "id",
        allow_negative_numbers = true
    )]
    pub bank_balance: Option<Decimal>,

    /// Signed correction to the bank side; repeatable
    #[arg(long = "bank-adjustment", value_name = "AMOUNT", allow_negative_numbers = true)]
    pub bank_adjustments: Vec<Decimal>,

    /// Signed correction to the book side; repeatable
    #[arg(long = "book-adjustment", value_name = "AMOUNT", allow_negative_numbers = true)]
    pub book_adjustments: Vec<Decimal>,

    /// Notes recorded on the adjustments and on completion
    #[arg(long, value_name = "TEXT")]
    pub notes: Option<String>,

    /// Complete the reconciliation; fails while the difference is non-zero
    #[arg(long, conflicts_with = "force_exception")]
    pub complete: bool,

    /// Close the reconciliation as an exception; requires --notes
    #[arg(long = "force-exception", requires = "notes")]
    pub force_exception: bool,
}

impl CliArgs {
    /// Build an EngineConfig from the flags, falling back to defaults
    pub fn to_engine_config(&self) -> EngineConfig {
        if self.tolerance_days.is_some() || self.max_concurrent.is_some() {
            let default = EngineConfig::default();
            EngineConfig::new(
                self.tolerance_days.unwrap_or(default.date_tolerance_days),
                self.max_concurrent
                    .unwrap_or(default.max_concurrent_accounts),
            )
        } else {
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_global_defaults() {
        let parsed = CliArgs::try_parse_from(["trust-ledger", "balances"]).unwrap();
        assert_eq!(parsed.state, PathBuf::from("trust-ledger.json"));
        assert!(matches!(parsed.command, Command::Balances));
        assert_eq!(parsed.to_engine_config(), EngineConfig::default());
    }

    #[rstest]
    #[case::tolerance(&["trust-ledger", "--tolerance-days", "2", "balances"], 2, num_cpus::get())]
    #[case::workers(&["trust-ledger", "balances", "--max-concurrent", "3"], 5, 3)]
    #[case::negative_tolerance_falls_back(&["trust-ledger", "--tolerance-days=-1", "balances"], 5, num_cpus::get())]
    #[case::zero_workers_falls_back(&["trust-ledger", "--max-concurrent", "0", "balances"], 5, num_cpus::get())]
    fn test_engine_config_conversion(
        #[case] args: &[&str],
        #[case] tolerance: i64,
        #[case] workers: usize,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_engine_config();
        assert_eq!(config.date_tolerance_days, tolerance);
        assert_eq!(config.max_concurrent_accounts, workers);
    }

    #[test]
    fn test_open_account_spec() {
        let parsed = CliArgs::try_parse_from([
            "trust-ledger",
            "--actor",
            "controller",
            "open-account",
            "--name",
            "Escrow 7",
            "--type",
            "escrow",
            "--bank-name",
            "First Fiduciary",
            "--account-number",
            "7",
            "--swift",
            "FFIDUS33",
            "--interest-rate",
            "0.015",
        ])
        .unwrap();
        assert_eq!(parsed.actor, "controller");

        let Command::OpenAccount(open) = parsed.command else {
            panic!("expected open-account");
        };
        let spec = open.to_spec();
        assert_eq!(spec.account_type, AccountType::Escrow);
        assert_eq!(spec.currency, "USD");
        assert!(spec.interest_bearing);
        assert_eq!(spec.interest_rate, Some(Decimal::new(15, 3)));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_reconcile_args() {
        let parsed = CliArgs::try_parse_from([
            "trust-ledger",
            "reconcile",
            "--account",
            "1",
            "--from",
            "2024-01-01",
            "--to",
            "2024-01-31",
            "--bank-balance",
            "478350.00",
            "--bank-adjustment",
            "-46800",
            "--notes",
            "deposit in transit",
            "--complete",
        ])
        .unwrap();

        let Command::Reconcile(reconcile) = parsed.command else {
            panic!("expected reconcile");
        };
        assert_eq!(reconcile.account, Some(1));
        assert_eq!(reconcile.to, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(reconcile.bank_adjustments, vec![Decimal::from(-46_800)]);
        assert!(reconcile.complete);
    }

    #[rstest]
    #[case::missing_subcommand(&["trust-ledger"])]
    #[case::post_without_journal(&["trust-ledger", "post"])]
    #[case::reconcile_without_period(&["trust-ledger", "reconcile", "--account", "1"])]
    #[case::resume_with_period(&["trust-ledger", "reconcile", "--id", "3", "--account", "1"])]
    #[case::exception_without_notes(&["trust-ledger", "reconcile", "--id", "3", "--force-exception"])]
    #[case::complete_and_exception(&["trust-ledger", "reconcile", "--id", "3", "--complete", "--force-exception", "--notes", "x"])]
    #[case::bad_account_type(&["trust-ledger", "open-account", "--name", "n", "--type", "savings", "--bank-name", "b", "--account-number", "1"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}
