//! I/O module
//!
//! Handles CSV parsing, CSV output and state persistence.
//!
//! # Components
//!
//! - `csv_format` - Journal and statement record conversion, report writers
//! - `sync_reader` - Streaming posting journal reader
//! - `async_reader` - Batched bank statement reader
//! - `snapshot` - JSON ledger state files

pub mod async_reader;
pub mod csv_format;
pub mod snapshot;
pub mod sync_reader;

pub use async_reader::StatementReader;
pub use csv_format::{
    convert_journal_record, convert_statement_record, write_balances_csv, write_match_report_csv,
    JournalEntry, JournalKind, JournalRecord, StatementRecord,
};
pub use snapshot::{load_snapshot, save_snapshot};
pub use sync_reader::JournalReader;
