//! Trust ledger CLI
//!
//! Command-line interface over a JSON state file.
//!
//! # Usage
//!
//! ```bash
//! trust-ledger open-account --name "Client Trust" --bank-name "First Fiduciary" \
//!     --account-number 0001 --routing-number 021000021
//! trust-ledger post journal.csv > balances.csv
//! trust-ledger match --confirm statement.csv > matches.csv
//! trust-ledger reconcile --account 1 --from 2024-01-01 --to 2024-01-31 \
//!     --bank-balance 431550.00 --complete
//! trust-ledger three-way --account 1 --bank-balance 431550.00
//! trust-ledger balances
//! ```
//!
//! Reports go to stdout, logs go to stderr (filtered by `RUST_LOG`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (unreadable state or input file, rejected operation, etc.)

use std::process;

use trust_ledger::{cli, telemetry};

fn main() {
    telemetry::init();

    let args = cli::parse_args();

    let mut output = std::io::stdout();
    if let Err(e) = cli::run(&args, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
