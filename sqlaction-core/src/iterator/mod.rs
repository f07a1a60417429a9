//! Result iterator chain.
//!
//! A driver cursor is read by a [`CursorResultIterator`] and optionally wrapped, innermost
//! first, in a [`DistinctResultIterator`], a [`LimitResultIterator`] and a
//! [`ConnectionAwareResultIterator`]. Every wrapper owns the iterator beneath it and
//! forwards `close` down the chain. Closing twice is a no-op, reading after close fails
//! with [`AccessError::IteratorClosed`](crate::error::AccessError::IteratorClosed), and an
//! iterator dropped without being closed closes itself and logs any failure.

mod connection;
mod cursor;
mod distinct;
mod limit;

pub use connection::ConnectionAwareResultIterator;
pub use cursor::CursorResultIterator;
pub use distinct::{DistinctMode, DistinctResultIterator};
pub use limit::LimitResultIterator;

use crate::error::{AccessError, AccessResult};
use crate::row::DataRow;

/// Boxed iterator handed to observers in streaming mode
pub type BoxedRowIterator = Box<dyn ResultIterator>;

/// Forward-only, single-pass sequence of result rows
pub trait ResultIterator: Send {
    /// Whether another row is available. May fetch from the driver.
    fn has_next_row(&mut self) -> AccessResult<bool>;

    /// Next row, `None` once exhausted.
    fn next_row(&mut self) -> AccessResult<Option<DataRow>>;

    /// Advances past the next row without handing it out. Returns `false` when there
    /// was no row to skip.
    fn skip_row(&mut self) -> AccessResult<bool> {
        Ok(self.next_row()?.is_some())
    }

    /// Reads every remaining row. Does not close the iterator.
    fn all_rows(&mut self) -> AccessResult<Vec<DataRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Releases the resources held by this iterator and everything beneath it.
    fn close(&mut self) -> AccessResult<()>;

    fn is_closed(&self) -> bool;

    /// Adapts the iterator to [`std::iter::Iterator`]; the adapter stops after the first
    /// error and closes the chain when dropped.
    fn into_rows(self) -> Rows<Self>
    where
        Self: Sized,
    {
        Rows {
            inner: self,
            failed: false,
        }
    }
}

impl<T: ResultIterator + ?Sized> ResultIterator for Box<T> {
    fn has_next_row(&mut self) -> AccessResult<bool> {
        (**self).has_next_row()
    }

    fn next_row(&mut self) -> AccessResult<Option<DataRow>> {
        (**self).next_row()
    }

    fn skip_row(&mut self) -> AccessResult<bool> {
        (**self).skip_row()
    }

    fn all_rows(&mut self) -> AccessResult<Vec<DataRow>> {
        (**self).all_rows()
    }

    fn close(&mut self) -> AccessResult<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// [`Iterator`] over the rows of a [`ResultIterator`]
pub struct Rows<I: ResultIterator> {
    inner: I,
    failed: bool,
}

impl<I: ResultIterator> Rows<I> {
    pub fn close(mut self) -> AccessResult<()> {
        self.inner.close()
    }
}

impl<I: ResultIterator> Iterator for Rows<I> {
    type Item = AccessResult<DataRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.inner.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

pub(crate) fn ensure_open(closed: bool) -> AccessResult<()> {
    if closed {
        Err(AccessError::IteratorClosed)
    } else {
        Ok(())
    }
}

/// Closes an iterator that is being dropped without an explicit close.
pub(crate) fn close_on_drop<I: ResultIterator + ?Sized>(iterator: &mut I, what: &str) {
    if iterator.is_closed() {
        return;
    }
    if let Err(e) = iterator.close() {
        tracing::warn!("Error closing {} on drop: {}", what, e);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::driver::{BufferedCursor, ResultShape};
    use crate::descriptor::RowDescriptor;
    use crate::types::{TypeCode, TypeRegistry, Value};

    /// Base iterator over single-column `ID` rows.
    pub fn ids(values: &[i64]) -> CursorResultIterator {
        let shape = ResultShape::of([("ID", TypeCode::BigInt)]);
        let descriptor = RowDescriptor::new(
            shape
                .columns
                .iter()
                .map(crate::descriptor::ColumnDescriptor::from_raw)
                .collect(),
            &TypeRegistry::standard(),
        );
        let rows = values.iter().map(|v| vec![Value::Int(*v)]).collect();
        CursorResultIterator::new(Box::new(BufferedCursor::new(shape, rows)), descriptor)
    }

    pub fn read_ids<I: ResultIterator>(iterator: &mut I) -> Vec<i64> {
        iterator
            .all_rows()
            .unwrap()
            .iter()
            .map(|r| r.get("ID").and_then(Value::as_i64).unwrap())
            .collect()
    }
}
