//! SQL actions.
//!
//! An action is an immutable description of work (a select, a batch of row changes, a
//! stored procedure call or a SQL template) bound to an [`ActionContext`]. Executing it
//! against a connection drives the driver and reports results to an
//! [`OperationObserver`]. All per-execution state lives inside `execute`, so one action
//! can be executed any number of times, from any number of threads, each call with its
//! own connection.

mod batch;
mod procedure;
mod select;
mod template;

pub use batch::{
    BatchAction, BatchKind, BatchQuery, BatchQueryRow, BatchTranslator, PositionalBatchTranslator,
};
pub use procedure::{
    ParameterDirection, ProcedureAction, ProcedureDescriptor, ProcedureParameter, ProcedureQuery,
    ProcedureTranslator,
};
pub use select::{SelectAction, SelectQuery};
pub use template::{TemplateAction, TemplateQuery};

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::descriptor::RowDescriptor;
use crate::driver::{ConnectionHandle, Cursor, Statement};
use crate::error::{AccessError, AccessResult, DriverError};
use crate::iterator::{
    ConnectionAwareResultIterator, CursorResultIterator, LimitResultIterator, ResultIterator,
};
use crate::logger::{QueryLogger, TracingQueryLogger};
use crate::observer::{ActionKind, OperationObserver, Report, ReportContext, ResultRows};
use crate::row::DataRow;
use crate::types::TypeRegistry;

/// What the target database can do natively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectFeatures {
    /// Dialect name, used to pick dialect specific templates
    pub name: String,
    pub supports_batch_updates: bool,
    pub supports_generated_keys: bool,
    pub supports_batch_generated_keys: bool,
    /// LIMIT is rendered into the SQL by the translator
    pub supports_native_limit: bool,
    /// OFFSET is rendered into the SQL by the translator
    pub supports_native_offset: bool,
}

impl Default for DialectFeatures {
    fn default() -> Self {
        Self {
            name: "generic".to_string(),
            supports_batch_updates: false,
            supports_generated_keys: false,
            supports_batch_generated_keys: false,
            supports_native_limit: false,
            supports_native_offset: false,
        }
    }
}

impl DialectFeatures {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_batch_updates(mut self, supported: bool) -> Self {
        self.supports_batch_updates = supported;
        self
    }

    pub fn with_generated_keys(mut self, supported: bool, in_batches: bool) -> Self {
        self.supports_generated_keys = supported;
        self.supports_batch_generated_keys = supported && in_batches;
        self
    }

    pub fn with_native_paging(mut self, limit: bool, offset: bool) -> Self {
        self.supports_native_limit = limit;
        self.supports_native_offset = offset;
        self
    }
}

/// Environment shared by all actions: dialect capabilities, converters, query logger
#[derive(Clone)]
pub struct ActionContext {
    pub features: DialectFeatures,
    pub types: Arc<TypeRegistry>,
    pub logger: Arc<dyn QueryLogger>,
}

impl ActionContext {
    /// Context using the process-wide type registry and the tracing logger.
    pub fn new(features: DialectFeatures) -> Self {
        Self {
            features,
            types: TypeRegistry::shared(),
            logger: Arc::new(TracingQueryLogger),
        }
    }

    pub fn with_types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = types;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn QueryLogger>) -> Self {
        self.logger = logger;
        self
    }
}

impl Default for ActionContext {
    fn default() -> Self {
        Self::new(DialectFeatures::default())
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("features", &self.features)
            .field("types", &self.types)
            .finish()
    }
}

/// One executable action
#[derive(Debug)]
pub enum SqlAction {
    Select(SelectAction),
    Batch(BatchAction),
    Procedure(ProcedureAction),
    Template(TemplateAction),
}

impl SqlAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            SqlAction::Select(_) => ActionKind::Select,
            SqlAction::Batch(_) => ActionKind::Batch,
            SqlAction::Procedure(_) => ActionKind::Procedure,
            SqlAction::Template(_) => ActionKind::Template,
        }
    }

    /// Runs the action on `connection`, reporting to `observer`.
    ///
    /// The connection stays open unless a streamed result was handed to the observer,
    /// in which case closing that iterator closes the connection.
    pub fn execute(
        &self,
        connection: &ConnectionHandle,
        observer: &mut dyn OperationObserver,
    ) -> AccessResult<()> {
        match self {
            SqlAction::Select(action) => action.execute(connection, observer),
            SqlAction::Batch(action) => action.execute(connection, observer),
            SqlAction::Procedure(action) => action.execute(connection, observer),
            SqlAction::Template(action) => action.execute(connection, observer),
        }
    }
}

impl From<SelectAction> for SqlAction {
    fn from(action: SelectAction) -> Self {
        SqlAction::Select(action)
    }
}

impl From<BatchAction> for SqlAction {
    fn from(action: BatchAction) -> Self {
        SqlAction::Batch(action)
    }
}

impl From<ProcedureAction> for SqlAction {
    fn from(action: ProcedureAction) -> Self {
        SqlAction::Procedure(action)
    }
}

impl From<TemplateAction> for SqlAction {
    fn from(action: TemplateAction) -> Self {
        SqlAction::Template(action)
    }
}

/// Closes a statement, surfacing the failure.
pub(crate) fn close_statement(mut statement: Box<dyn Statement>) -> AccessResult<()> {
    statement.close()?;
    Ok(())
}

/// Closes a statement while another error is already propagating; failures are logged.
pub(crate) fn close_quietly(mut statement: Box<dyn Statement>) {
    if let Err(e) = statement.close() {
        tracing::warn!("Error closing statement after failure: {}", e);
    }
}

/// Runs `work` on `statement` and closes it on every path. A close failure only
/// surfaces when `work` succeeded.
pub(crate) fn with_statement<T>(
    mut statement: Box<dyn Statement>,
    work: impl FnOnce(&mut dyn Statement) -> AccessResult<T>,
) -> AccessResult<T> {
    match work(statement.as_mut()) {
        Ok(value) => {
            close_statement(statement)?;
            Ok(value)
        }
        Err(e) => {
            close_quietly(statement);
            Err(e)
        }
    }
}

/// Like [`with_statement`], for work that may hand the statement over to a streamed
/// iterator by taking it out of the slot. A statement left in the slot is closed.
pub(crate) fn with_owned_statement<T>(
    statement: Box<dyn Statement>,
    work: impl FnOnce(&mut Option<Box<dyn Statement>>) -> AccessResult<T>,
) -> AccessResult<T> {
    let mut slot = Some(statement);
    let result = work(&mut slot);
    match (result, slot) {
        (Ok(value), Some(statement)) => {
            close_statement(statement)?;
            Ok(value)
        }
        (Err(e), Some(statement)) => {
            close_quietly(statement);
            Err(e)
        }
        (result, None) => result,
    }
}

/// The statement still owned by the action.
pub(crate) fn owned(slot: &mut Option<Box<dyn Statement>>) -> AccessResult<&mut dyn Statement> {
    match slot.as_deref_mut() {
        Some(statement) => Ok(statement),
        None => Err(AccessError::Driver(DriverError::Closed("Statement"))),
    }
}

/// Drains an iterator and closes it, whatever happens while reading.
pub(crate) fn drain<I: ResultIterator>(mut iterator: I) -> AccessResult<Vec<DataRow>> {
    let rows = iterator.all_rows();
    let closed = iterator.close();
    match (rows, closed) {
        (Ok(rows), Ok(())) => Ok(rows),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::warn!("Error closing result iterator after failure: {}", close_err);
            Err(e)
        }
    }
}

/// Hands a streamed iterator to the observer; if the observer fails the iterator is
/// closed before the error propagates.
pub(crate) fn report_iterator<I: ResultIterator + 'static>(
    iterator: I,
    context: &ReportContext<'_>,
    observer: &mut dyn OperationObserver,
) -> AccessResult<()> {
    let boxed: Box<dyn ResultIterator> = Box::new(iterator);
    let mut shared = SharedIterator(Arc::new(Mutex::new(boxed)));
    let handed = SharedIterator(shared.0.clone());
    match observer.next(context, Report::Rows(ResultRows::Iterated(Box::new(handed)))) {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Err(close_err) = shared.close() {
                tracing::warn!("Error closing result iterator after failure: {}", close_err);
            }
            Err(e)
        }
    }
}

/// Iterator handle shared between the action and the observer it was reported to.
struct SharedIterator(Arc<Mutex<Box<dyn ResultIterator>>>);

impl ResultIterator for SharedIterator {
    fn has_next_row(&mut self) -> AccessResult<bool> {
        self.0.lock().has_next_row()
    }

    fn next_row(&mut self) -> AccessResult<Option<DataRow>> {
        self.0.lock().next_row()
    }

    fn skip_row(&mut self) -> AccessResult<bool> {
        self.0.lock().skip_row()
    }

    fn close(&mut self) -> AccessResult<()> {
        self.0.lock().close()
    }

    fn is_closed(&self) -> bool {
        self.0.lock().is_closed()
    }
}

/// Reads one result set of a multi-result statement, applying in-memory paging, and
/// reports it. Used by the template and procedure actions for materialized delivery.
pub(crate) fn report_result_set(
    cursor: Box<dyn Cursor>,
    descriptor: RowDescriptor,
    (offset, limit): (usize, usize),
    started: Instant,
    context: &ReportContext<'_>,
    action: &ActionContext,
    observer: &mut dyn OperationObserver,
) -> AccessResult<()> {
    let base = CursorResultIterator::new(cursor, descriptor);
    let rows = if offset > 0 || limit > 0 {
        drain(LimitResultIterator::new(base, offset, limit)?)?
    } else {
        drain(base)?
    };
    action
        .logger
        .log_select_count(rows.len(), started.elapsed(), context.sql);
    observer.next(context, Report::Rows(ResultRows::Materialized(rows)))
}

/// Builds the streamed chain for a result set whose statement the iterator takes over.
pub(crate) fn streamed_result_set(
    cursor: Box<dyn Cursor>,
    statement: Box<dyn Statement>,
    descriptor: RowDescriptor,
    (offset, limit): (usize, usize),
    connection: &ConnectionHandle,
) -> AccessResult<ConnectionAwareResultIterator<Box<dyn ResultIterator>>> {
    let base = CursorResultIterator::new(cursor, descriptor).with_statement(statement);
    let chain: Box<dyn ResultIterator> = if offset > 0 || limit > 0 {
        Box::new(LimitResultIterator::new(base, offset, limit)?)
    } else {
        Box::new(base)
    };
    Ok(ConnectionAwareResultIterator::new(chain, connection.clone()))
}

/// Logs a failed execution through the query logger and passes the error on.
pub(crate) fn log_failure(action: &ActionContext, sql: &str, error: AccessError) -> AccessError {
    action.logger.log_query_error(sql, &error);
    error
}
