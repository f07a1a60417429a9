//! Observer printing action results as JSON lines.

use std::io::{self, Write};

use sqlaction_core::{
    AccessResult, DataRow, OperationObserver, Report, ReportContext, ResultIterator, ResultRows,
};

/// Writes every row as one JSON object per line. Update counts and generated keys go to
/// the log.
///
/// Write failures stop the output; the first one is kept and returned by
/// [`JsonLinesObserver::finish`].
pub struct JsonLinesObserver<W: Write> {
    out: W,
    stream: bool,
    rows_written: usize,
    failure: Option<io::Error>,
}

impl<W: Write> JsonLinesObserver<W> {
    /// `stream` asks actions for live iterators instead of materialized row lists.
    pub fn new(out: W, stream: bool) -> Self {
        Self {
            out,
            stream,
            rows_written: 0,
            failure: None,
        }
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flushes the output and returns the writer.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_row(&mut self, row: &DataRow) {
        if self.failure.is_some() {
            return;
        }
        let line = row.to_json().to_string();
        match writeln!(self.out, "{}", line) {
            Ok(()) => self.rows_written += 1,
            Err(e) => self.failure = Some(e),
        }
    }
}

impl<W: Write> OperationObserver for JsonLinesObserver<W> {
    fn is_iterated_result(&self) -> bool {
        self.stream
    }

    fn next(&mut self, context: &ReportContext<'_>, report: Report) -> AccessResult<()> {
        match report {
            Report::Rows(ResultRows::Materialized(rows)) => {
                for row in &rows {
                    self.write_row(row);
                }
            }
            Report::Rows(ResultRows::Iterated(iterator)) => {
                let mut rows = iterator.into_rows();
                for row in rows.by_ref() {
                    self.write_row(&row?);
                }
                rows.close()?;
            }
            Report::Count(count) => {
                tracing::info!("{}: {} row(s) affected", context.kind, count);
            }
            Report::BatchCount(counts) => {
                tracing::info!("{}: {:?} row(s) affected", context.kind, counts);
            }
            Report::GeneratedRows { keys, ids } => {
                for (key, id) in keys.iter().zip(&ids) {
                    tracing::info!("Generated key for {}: {}", id, key.to_json());
                }
            }
        }
        Ok(())
    }
}
