//! Asynchronous bank statement reader
//!
//! Reads normalized statement lines (`account,line,date,amount,description`)
//! in batches, feeding the concurrent matcher.
//!
//! ```text
//! statement.csv → StatementReader → Vec<BankStatementLine> → BatchMatcher
//!                        ↓
//!                 csv_format module
//!       (StatementRecord, convert_statement_record)
//! ```

use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

use crate::io::csv_format::{convert_statement_record, StatementRecord};
use crate::types::BankStatementLine;

/// Asynchronous statement reader
///
/// Invalid rows are logged and skipped.
pub struct StatementReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> StatementReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read up to `batch_size` statement lines
    ///
    /// Returns an empty vector once the input is exhausted.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<BankStatementLine> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<StatementRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(record)) => match convert_statement_record(record) {
                    Ok(line) => batch.push(line),
                    Err(e) => warn!(error = %e, "skipping statement line"),
                },
                Some(Err(e)) => warn!(error = %e, "skipping unreadable statement row"),
                None => break,
            }
        }

        batch
    }

    /// Read every remaining statement line
    pub async fn read_all(&mut self) -> Vec<BankStatementLine> {
        const BATCH_SIZE: usize = 1024;

        let mut lines = Vec::new();
        loop {
            let batch = self.read_batch(BATCH_SIZE).await;
            if batch.is_empty() {
                break;
            }
            lines.extend(batch);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;
    use rust_decimal::Decimal;

    const HEADER: &str = "account,line,date,amount,description\n";

    fn reader(body: &str) -> StatementReader<Cursor<Vec<u8>>> {
        StatementReader::new(Cursor::new(format!("{}{}", HEADER, body).into_bytes()))
    }

    #[tokio::test]
    async fn test_statement_reader_read_batch() {
        let mut statement = reader(
            "1,10,2024-02-01,500.00,DEPOSIT\n\
             1,11,2024-02-03,-120.00,CHECK 1001\n\
             2,12,2024-02-04,75.25,WIRE IN\n",
        );

        let batch = statement.read_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, 10);
        assert_eq!(batch[1].amount, Decimal::from(-120));

        let batch = statement.read_batch(2).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].account_id, 2);
        assert_eq!(batch[0].description, "WIRE IN");

        assert!(statement.read_batch(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_statement_reader_skips_invalid_rows() {
        let mut statement = reader(
            "1,10,yesterday,500.00,DEPOSIT\n\
             x,11,2024-02-03,-120.00,CHECK\n\
             1,13,2024-02-03,12.345,WIRE IN\n\
             1,12,2024-02-04,10.00,FEE REFUND\n",
        );

        let lines = statement.read_all().await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id, 12);
    }

    #[tokio::test]
    async fn test_statement_reader_missing_description() {
        let mut statement = reader(" 3 , 1 , 2024-02-09 , 9.99\n");

        let lines = statement.read_all().await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].account_id, 3);
        assert_eq!(lines[0].description, "");
    }
}
