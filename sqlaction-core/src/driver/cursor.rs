use std::collections::VecDeque;

use super::{Cursor, ResultShape};
use crate::error::{DriverError, DriverResult};
use crate::types::Value;

/// Cursor over rows already fetched into memory.
///
/// Drivers that cannot hand out a cursor detached from their statement (SQLite through
/// `rusqlite`, the scripted test driver) read the full result into one of these.
#[derive(Debug, Clone)]
pub struct BufferedCursor {
    shape: ResultShape,
    rows: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    closed: bool,
}

impl BufferedCursor {
    pub fn new(shape: ResultShape, rows: Vec<Vec<Value>>) -> Self {
        Self {
            shape,
            rows: rows.into(),
            current: None,
            closed: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Cursor for BufferedCursor {
    fn shape(&self) -> &ResultShape {
        &self.shape
    }

    fn advance(&mut self) -> DriverResult<bool> {
        if self.closed {
            return Err(DriverError::Closed("Cursor"));
        }
        self.current = self.rows.pop_front();
        Ok(self.current.is_some())
    }

    fn value(&self, index: usize) -> DriverResult<Value> {
        if self.closed {
            return Err(DriverError::Closed("Cursor"));
        }
        let row = self.current.as_ref().ok_or(DriverError::NoCurrentRow)?;
        row.get(index)
            .cloned()
            .ok_or(DriverError::InvalidColumn(index))
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.rows.clear();
        self.current = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeCode;

    #[test]
    fn test_buffered_cursor_walks_rows() {
        let shape = ResultShape::of([("A", TypeCode::Integer)]);
        let mut cursor = BufferedCursor::new(shape, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);

        assert!(matches!(cursor.value(0), Err(DriverError::NoCurrentRow)));
        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.value(0).unwrap(), Value::Int(1));
        assert!(matches!(cursor.value(3), Err(DriverError::InvalidColumn(3))));
        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.remaining(), 0);
        assert!(!cursor.advance().unwrap());
    }

    #[test]
    fn test_closed_cursor_rejects_reads() {
        let mut cursor = BufferedCursor::new(ResultShape::default(), vec![vec![]]);
        cursor.close().unwrap();
        assert!(cursor.is_closed());
        assert!(cursor.advance().is_err());
    }
}
