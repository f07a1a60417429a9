use super::{close_on_drop, ensure_open, ResultIterator};
use crate::driver::ConnectionHandle;
use crate::error::{AccessError, AccessResult};
use crate::row::DataRow;

/// Outermost wrapper of a streamed result: owns the connection and closes it after the
/// rest of the chain.
///
/// Failures closing the chain and the connection are reported together as one
/// [`AccessError::ResourceClose`].
pub struct ConnectionAwareResultIterator<I: ResultIterator> {
    inner: I,
    connection: Option<ConnectionHandle>,
    closed: bool,
}

impl<I: ResultIterator> ConnectionAwareResultIterator<I> {
    pub fn new(inner: I, connection: ConnectionHandle) -> Self {
        Self {
            inner,
            connection: Some(connection),
            closed: false,
        }
    }
}

impl<I: ResultIterator> ResultIterator for ConnectionAwareResultIterator<I> {
    fn has_next_row(&mut self) -> AccessResult<bool> {
        ensure_open(self.closed)?;
        self.inner.has_next_row()
    }

    fn next_row(&mut self) -> AccessResult<Option<DataRow>> {
        ensure_open(self.closed)?;
        self.inner.next_row()
    }

    fn skip_row(&mut self) -> AccessResult<bool> {
        ensure_open(self.closed)?;
        self.inner.skip_row()
    }

    fn close(&mut self) -> AccessResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut failures = Vec::new();
        if let Err(e) = self.inner.close() {
            failures.push(e);
        }
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close() {
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

impl<I: ResultIterator> Drop for ConnectionAwareResultIterator<I> {
    fn drop(&mut self) {
        close_on_drop(self, "connection-aware result iterator");
    }
}
