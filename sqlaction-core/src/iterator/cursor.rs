use super::{close_on_drop, ensure_open, ResultIterator};
use crate::descriptor::RowDescriptor;
use crate::driver::{Cursor, Statement};
use crate::error::{AccessError, AccessResult};
use crate::row::DataRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookahead {
    Unknown,
    Ready,
    Exhausted,
}

/// Base of the chain: reads driver rows and materializes them through a descriptor.
///
/// Owns the cursor and, when given one, the statement that produced it. Closing releases
/// the cursor first, then the statement.
pub struct CursorResultIterator {
    cursor: Box<dyn Cursor>,
    statement: Option<Box<dyn Statement>>,
    descriptor: RowDescriptor,
    lookahead: Lookahead,
    rows_read: usize,
    closed: bool,
}

impl CursorResultIterator {
    pub fn new(cursor: Box<dyn Cursor>, descriptor: RowDescriptor) -> Self {
        Self {
            cursor,
            statement: None,
            descriptor,
            lookahead: Lookahead::Unknown,
            rows_read: 0,
            closed: false,
        }
    }

    /// Hands the producing statement to the iterator, closing it together with the cursor.
    pub fn with_statement(mut self, statement: Box<dyn Statement>) -> Self {
        self.statement = Some(statement);
        self
    }

    pub fn descriptor(&self) -> &RowDescriptor {
        &self.descriptor
    }

    /// Rows handed out or skipped so far.
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    fn check_next(&mut self) -> AccessResult<bool> {
        ensure_open(self.closed)?;
        if self.lookahead == Lookahead::Unknown {
            self.lookahead = if self.cursor.advance()? {
                Lookahead::Ready
            } else {
                Lookahead::Exhausted
            };
        }
        Ok(self.lookahead == Lookahead::Ready)
    }
}

impl ResultIterator for CursorResultIterator {
    fn has_next_row(&mut self) -> AccessResult<bool> {
        self.check_next()
    }

    fn next_row(&mut self) -> AccessResult<Option<DataRow>> {
        if !self.check_next()? {
            return Ok(None);
        }
        let row = self.descriptor.read_row(self.cursor.as_ref())?;
        self.lookahead = Lookahead::Unknown;
        self.rows_read += 1;
        Ok(Some(row))
    }

    fn skip_row(&mut self) -> AccessResult<bool> {
        if !self.check_next()? {
            return Ok(false);
        }
        self.lookahead = Lookahead::Unknown;
        self.rows_read += 1;
        Ok(true)
    }

    fn close(&mut self) -> AccessResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut failures = Vec::new();
        if let Err(e) = self.cursor.close() {
            failures.push(AccessError::from(e));
        }
        if let Some(mut statement) = self.statement.take() {
            if let Err(e) = statement.close() {
                failures.push(AccessError::from(e));
            }
        }

        match AccessError::from_close_failures(failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for CursorResultIterator {
    fn drop(&mut self) {
        close_on_drop(self, "result cursor");
    }
}
