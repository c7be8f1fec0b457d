//! Synchronous posting journal reader
//!
//! Provides a streaming iterator over journal rows from a CSV file.
//! Delegates CSV format concerns to the csv_format module.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual row errors are yielded as `TrustError::Parse` carrying the
//!   1-based file line (the header is line 1), so a caller can log and skip
//!   the row and keep going
//!
//! ```no_run
//! use trust_ledger::io::JournalReader;
//! use std::path::Path;
//!
//! let reader = JournalReader::new(Path::new("journal.csv")).unwrap();
//! let entries: Vec<_> = reader.filter_map(Result::ok).collect();
//! println!("parsed {} journal rows", entries.len());
//! ```

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::io::csv_format::{convert_journal_record, JournalEntry, JournalRecord};
use crate::types::TrustError;

/// Streaming reader over a posting journal
///
/// Reads one row at a time; memory use does not grow with the file.
#[derive(Debug)]
pub struct JournalReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl JournalReader {
    /// Open a journal file
    ///
    /// Fields are trimmed and rows may omit trailing optional columns.
    pub fn new(path: &Path) -> Result<Self, TrustError> {
        let file = File::open(path).map_err(|e| TrustError::Io {
            message: format!("failed to open journal '{}': {}", path.display(), e),
        })?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 1,
        })
    }
}

impl Iterator for JournalReader {
    type Item = Result<JournalEntry, TrustError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rows = self.reader.deserialize::<JournalRecord>();
        let row = rows.next()?;
        self.line_num += 1;
        let line = self.line_num;

        Some(
            row.map_err(TrustError::from)
                .and_then(convert_journal_record)
                .map_err(|e| at_line(e, line)),
        )
    }
}

/// Attach a file line to a parse error that does not carry one yet
pub(crate) fn at_line(error: TrustError, line: u64) -> TrustError {
    match error {
        TrustError::Parse { line: None, message } => TrustError::Parse {
            line: Some(line),
            message,
        },
        other => other,
    }
}
