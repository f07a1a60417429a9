use std::collections::HashSet;

use super::{close_on_drop, ensure_open, ResultIterator};
use crate::error::{AccessError, AccessResult};
use crate::row::DataRow;
use crate::types::Value;

/// How two rows are compared for duplicate suppression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistinctMode {
    /// Every column takes part, used when joins make each column meaningful
    FullRow,
    /// Only the named primary key columns of the root entity
    PrimaryKey(Vec<String>),
}

/// Drops rows whose comparison key was already seen, keeping first-occurrence order.
pub struct DistinctResultIterator<I: ResultIterator> {
    inner: I,
    mode: DistinctMode,
    seen: HashSet<Vec<Value>>,
    next: Option<DataRow>,
    primed: bool,
    closed: bool,
}

impl<I: ResultIterator> DistinctResultIterator<I> {
    pub fn new(inner: I, mode: DistinctMode) -> AccessResult<Self> {
        if let DistinctMode::PrimaryKey(columns) = &mode {
            if columns.is_empty() {
                return Err(AccessError::configuration(
                    "primary key distinct suppression needs at least one key column",
                ));
            }
        }
        Ok(Self {
            inner,
            mode,
            seen: HashSet::new(),
            next: None,
            primed: false,
            closed: false,
        })
    }

    pub fn mode(&self) -> &DistinctMode {
        &self.mode
    }

    fn key(&self, row: &DataRow) -> AccessResult<Vec<Value>> {
        match &self.mode {
            DistinctMode::FullRow => Ok(row.values().to_vec()),
            DistinctMode::PrimaryKey(columns) => columns
                .iter()
                .map(|c| {
                    row.get(c).cloned().ok_or_else(|| {
                        AccessError::Configuration(format!(
                            "primary key column '{}' is not in the result",
                            c
                        ))
                    })
                })
                .collect(),
        }
    }

    /// Buffers the next unseen row, if any.
    fn prime(&mut self) -> AccessResult<()> {
        ensure_open(self.closed)?;
        if self.primed {
            return Ok(());
        }
        while let Some(row) = self.inner.next_row()? {
            let key = self.key(&row)?;
            if self.seen.insert(key) {
                self.next = Some(row);
                break;
            }
        }
        self.primed = true;
        Ok(())
    }
}

impl<I: ResultIterator> ResultIterator for DistinctResultIterator<I> {
    fn has_next_row(&mut self) -> AccessResult<bool> {
        self.prime()?;
        Ok(self.next.is_some())
    }

    fn next_row(&mut self) -> AccessResult<Option<DataRow>> {
        self.prime()?;
        self.primed = false;
        Ok(self.next.take())
    }

    fn close(&mut self) -> AccessResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.next = None;
        self.seen.clear();
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<I: ResultIterator> Drop for DistinctResultIterator<I> {
    fn drop(&mut self) {
        close_on_drop(self, "distinct result iterator");
    }
}
