//! Reporting protocol between actions and their callers.
//!
//! Actions report through [`OperationObserver::next`] with one [`Report`] per event, in
//! the order the driver produced them. Before delivering rows an action asks
//! [`OperationObserver::is_iterated_result`] whether to hand out a live iterator or a
//! materialized list.

use std::fmt;

use serde::Serialize;

use crate::entity::ObjectId;
use crate::error::AccessResult;
use crate::iterator::{BoxedRowIterator, ResultIterator};
use crate::row::DataRow;

/// Which action produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Select,
    Batch,
    Procedure,
    Template,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Select => "select",
            ActionKind::Batch => "batch",
            ActionKind::Procedure => "procedure",
            ActionKind::Template => "template",
        };
        f.write_str(s)
    }
}

/// The query a report belongs to
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    pub kind: ActionKind,
    /// Query name from its metadata
    pub name: Option<&'a str>,
    /// SQL of the statement that produced the report
    pub sql: &'a str,
}

/// Rows of one result set
pub enum ResultRows {
    Materialized(Vec<DataRow>),
    /// Live iterator; the receiver must close it, dropping it closes it too
    Iterated(BoxedRowIterator),
}

impl ResultRows {
    /// All rows, draining and closing an iterated result.
    pub fn into_vec(self) -> AccessResult<Vec<DataRow>> {
        match self {
            ResultRows::Materialized(rows) => Ok(rows),
            ResultRows::Iterated(mut it) => {
                let rows = it.all_rows();
                let closed = it.close();
                let rows = rows?;
                closed?;
                Ok(rows)
            }
        }
    }
}

impl fmt::Debug for ResultRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultRows::Materialized(rows) => f.debug_tuple("Materialized").field(rows).finish(),
            ResultRows::Iterated(_) => f.write_str("Iterated(..)"),
        }
    }
}

/// One event reported by an action
#[derive(Debug)]
pub enum Report {
    Rows(ResultRows),
    Count(i64),
    BatchCount(Vec<i64>),
    /// Keys generated by an insert, with the identities of the rows they belong to in
    /// submission order
    GeneratedRows {
        keys: Vec<DataRow>,
        ids: Vec<ObjectId>,
    },
}

/// Receives the results of an action
pub trait OperationObserver {
    /// `true` to receive result sets as live iterators.
    fn is_iterated_result(&self) -> bool;

    fn next(&mut self, context: &ReportContext<'_>, report: Report) -> AccessResult<()>;
}

/// One materialized event recorded by [`ResultCollector`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectedReport {
    Rows { rows: Vec<DataRow> },
    Count { count: i64 },
    BatchCount { counts: Vec<i64> },
    GeneratedRows { keys: Vec<DataRow>, ids: Vec<ObjectId> },
}

/// Observer that materializes every report, keeping arrival order.
#[derive(Debug, Default)]
pub struct ResultCollector {
    reports: Vec<CollectedReport>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> &[CollectedReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<CollectedReport> {
        self.reports
    }

    /// Row sets in arrival order.
    pub fn row_sets(&self) -> Vec<&[DataRow]> {
        self.reports
            .iter()
            .filter_map(|r| match r {
                CollectedReport::Rows { rows } => Some(rows.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Rows of the first row set, empty if there was none.
    pub fn first_rows(&self) -> &[DataRow] {
        self.row_sets().first().copied().unwrap_or(&[])
    }

    pub fn counts(&self) -> Vec<i64> {
        self.reports
            .iter()
            .filter_map(|r| match r {
                CollectedReport::Count { count } => Some(*count),
                _ => None,
            })
            .collect()
    }

    pub fn batch_counts(&self) -> Vec<&[i64]> {
        self.reports
            .iter()
            .filter_map(|r| match r {
                CollectedReport::BatchCount { counts } => Some(counts.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn generated(&self) -> Vec<(&[DataRow], &[ObjectId])> {
        self.reports
            .iter()
            .filter_map(|r| match r {
                CollectedReport::GeneratedRows { keys, ids } => {
                    Some((keys.as_slice(), ids.as_slice()))
                }
                _ => None,
            })
            .collect()
    }
}

impl OperationObserver for ResultCollector {
    fn is_iterated_result(&self) -> bool {
        false
    }

    fn next(&mut self, _context: &ReportContext<'_>, report: Report) -> AccessResult<()> {
        let collected = match report {
            Report::Rows(rows) => CollectedReport::Rows {
                rows: rows.into_vec()?,
            },
            Report::Count(count) => CollectedReport::Count { count },
            Report::BatchCount(counts) => CollectedReport::BatchCount { counts },
            Report::GeneratedRows { keys, ids } => CollectedReport::GeneratedRows { keys, ids },
        };
        self.reports.push(collected);
        Ok(())
    }
}

/// Observer that asks for live iterators and keeps them for the caller.
///
/// Everything else is recorded the way [`ResultCollector`] records it.
#[derive(Default)]
pub struct StreamingCollector {
    iterators: Vec<BoxedRowIterator>,
    others: ResultCollector,
}

impl StreamingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the first received iterator; the caller owns closing it.
    pub fn take_iterator(&mut self) -> Option<BoxedRowIterator> {
        if self.iterators.is_empty() {
            None
        } else {
            Some(self.iterators.remove(0))
        }
    }

    pub fn iterator_count(&self) -> usize {
        self.iterators.len()
    }

    /// Reports other than streamed row sets.
    pub fn reports(&self) -> &[CollectedReport] {
        self.others.reports()
    }

    pub fn counts(&self) -> Vec<i64> {
        self.others.counts()
    }
}

impl fmt::Debug for StreamingCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingCollector")
            .field("iterators", &self.iterators.len())
            .field("others", &self.others)
            .finish()
    }
}

impl OperationObserver for StreamingCollector {
    fn is_iterated_result(&self) -> bool {
        true
    }

    fn next(&mut self, context: &ReportContext<'_>, report: Report) -> AccessResult<()> {
        match report {
            Report::Rows(ResultRows::Iterated(it)) => {
                self.iterators.push(it);
                Ok(())
            }
            other => self.others.next(context, other),
        }
    }
}
