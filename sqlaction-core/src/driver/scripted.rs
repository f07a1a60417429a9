//! Scripted in-memory driver.
//!
//! Each physical execution (`execute`, `execute_query`, `execute_update`,
//! `execute_batch`) consumes the next queued [`ScriptedResponse`] and records the SQL and
//! bound values, so tests can drive actions through exact result/update-count sequences
//! and inspect what was executed and closed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{BufferedCursor, Connection, Cursor, ResultShape, Statement};
use crate::error::{DriverError, DriverResult};
use crate::types::{TypeCode, Value};

/// One result of a scripted execution
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResult {
    Rows {
        shape: ResultShape,
        rows: Vec<Vec<Value>>,
    },
    Count(i64),
}

/// What the driver answers to one physical execution
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    results: Vec<ScriptedResult>,
    generated_keys: Option<(ResultShape, Vec<Vec<Value>>)>,
    out_parameters: BTreeMap<usize, Value>,
    batch_counts: Option<Vec<i64>>,
    error: Option<DriverError>,
}

impl ScriptedResponse {
    pub fn rows(shape: ResultShape, rows: Vec<Vec<Value>>) -> Self {
        Self::default().then_rows(shape, rows)
    }

    pub fn count(count: i64) -> Self {
        Self::default().then_count(count)
    }

    /// Response to `execute_batch`; one count per queued row.
    pub fn batch(counts: Vec<i64>) -> Self {
        Self {
            batch_counts: Some(counts),
            ..Self::default()
        }
    }

    /// Response with no results at all (e.g. a procedure with only OUT parameters).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn error(error: DriverError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn then_rows(mut self, shape: ResultShape, rows: Vec<Vec<Value>>) -> Self {
        self.results.push(ScriptedResult::Rows { shape, rows });
        self
    }

    pub fn then_count(mut self, count: i64) -> Self {
        self.results.push(ScriptedResult::Count(count));
        self
    }

    pub fn with_generated_keys(mut self, shape: ResultShape, rows: Vec<Vec<Value>>) -> Self {
        self.generated_keys = Some((shape, rows));
        self
    }

    pub fn with_out_parameter(mut self, position: usize, value: Value) -> Self {
        self.out_parameters.insert(position, value);
        self
    }
}

/// Record of one physical execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub bindings: Vec<(usize, Value)>,
    /// Parameter sets of a batch execution, empty otherwise
    pub batch: Vec<Vec<(usize, Value)>>,
    pub call: bool,
    pub fetch_size: Option<usize>,
    pub timeout: Option<u32>,
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<ScriptedResponse>,
    executed: Vec<ExecutedStatement>,
    statements_prepared: usize,
    statements_closed: usize,
    cursors_opened: usize,
    cursors_closed: usize,
    connection_closes: usize,
    closed: bool,
    connection_close_error: Option<DriverError>,
    cursor_close_error: Option<DriverError>,
}

/// In-memory [`Connection`] answering with queued responses.
///
/// Clones share state: keep one clone for assertions and hand another to the action.
#[derive(Clone, Default)]
pub struct ScriptedConnection {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for the next physical execution.
    pub fn respond(&self, response: ScriptedResponse) -> &Self {
        self.state.lock().responses.push_back(response);
        self
    }

    /// Makes every later `close()` of the connection fail with `error`.
    pub fn fail_connection_close(&self, error: DriverError) {
        self.state.lock().connection_close_error = Some(error);
    }

    /// Makes every later cursor `close()` fail with `error`.
    pub fn fail_cursor_close(&self, error: DriverError) {
        self.state.lock().cursor_close_error = Some(error);
    }

    pub fn handle(&self) -> super::ConnectionHandle {
        Arc::new(self.clone())
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state.lock().executed.clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.state
            .lock()
            .executed
            .iter()
            .map(|e| e.sql.clone())
            .collect()
    }

    pub fn pending_responses(&self) -> usize {
        self.state.lock().responses.len()
    }

    pub fn statements_prepared(&self) -> usize {
        self.state.lock().statements_prepared
    }

    pub fn statements_closed(&self) -> usize {
        self.state.lock().statements_closed
    }

    pub fn cursors_opened(&self) -> usize {
        self.state.lock().cursors_opened
    }

    pub fn cursors_closed(&self) -> usize {
        self.state.lock().cursors_closed
    }

    pub fn connection_closes(&self) -> usize {
        self.state.lock().connection_closes
    }

    fn open_statement(&self, sql: &str, call: bool, return_keys: bool) -> DriverResult<Box<dyn Statement>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DriverError::Closed("Connection"));
        }
        state.statements_prepared += 1;
        drop(state);

        Ok(Box::new(ScriptedStatement {
            state: self.state.clone(),
            sql: sql.to_string(),
            call,
            return_keys,
            bindings: BTreeMap::new(),
            batch: Vec::new(),
            out_registered: BTreeSet::new(),
            out_values: BTreeMap::new(),
            pending: VecDeque::new(),
            current: None,
            generated: None,
            fetch_size: None,
            timeout: None,
            closed: false,
        }))
    }
}

impl Connection for ScriptedConnection {
    fn prepare(&self, sql: &str, return_generated_keys: bool) -> DriverResult<Box<dyn Statement>> {
        self.open_statement(sql, false, return_generated_keys)
    }

    fn prepare_call(&self, sql: &str) -> DriverResult<Box<dyn Statement>> {
        self.open_statement(sql, true, false)
    }

    fn close(&self) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.connection_closes += 1;
        state.closed = true;
        match &state.connection_close_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

struct ScriptedStatement {
    state: Arc<Mutex<ScriptState>>,
    sql: String,
    call: bool,
    return_keys: bool,
    bindings: BTreeMap<usize, Value>,
    batch: Vec<Vec<(usize, Value)>>,
    out_registered: BTreeSet<usize>,
    out_values: BTreeMap<usize, Value>,
    pending: VecDeque<ScriptedResult>,
    current: Option<ScriptedResult>,
    generated: Option<(ResultShape, Vec<Vec<Value>>)>,
    fetch_size: Option<usize>,
    timeout: Option<u32>,
    closed: bool,
}

impl ScriptedStatement {
    fn check_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::Closed("Statement"))
        } else {
            Ok(())
        }
    }

    fn next_response(&mut self, batch: Vec<Vec<(usize, Value)>>) -> DriverResult<ScriptedResponse> {
        self.check_open()?;
        let mut state = self.state.lock();
        state.executed.push(ExecutedStatement {
            sql: self.sql.clone(),
            bindings: self.bindings.iter().map(|(p, v)| (*p, v.clone())).collect(),
            batch,
            call: self.call,
            fetch_size: self.fetch_size,
            timeout: self.timeout,
        });

        let response = state.responses.pop_front().ok_or_else(|| {
            DriverError::Sql(format!("no scripted response for: {}", self.sql))
        })?;
        drop(state);

        if let Some(err) = response.error.clone() {
            return Err(err);
        }
        self.generated = response.generated_keys.clone();
        self.out_values = response.out_parameters.clone();
        Ok(response)
    }

    fn cursor(&self, shape: ResultShape, rows: Vec<Vec<Value>>) -> Box<dyn Cursor> {
        self.state.lock().cursors_opened += 1;
        Box::new(ScriptedCursor {
            inner: BufferedCursor::new(shape, rows),
            state: self.state.clone(),
        })
    }
}

impl Statement for ScriptedStatement {
    fn set_fetch_size(&mut self, rows: usize) -> DriverResult<()> {
        self.fetch_size = Some(rows);
        Ok(())
    }

    fn set_query_timeout(&mut self, seconds: u32) -> DriverResult<()> {
        self.timeout = Some(seconds);
        Ok(())
    }

    fn bind(
        &mut self,
        position: usize,
        value: Value,
        _type_code: TypeCode,
        _scale: Option<i32>,
    ) -> DriverResult<()> {
        self.check_open()?;
        if position == 0 {
            return Err(DriverError::InvalidParameter(position));
        }
        self.bindings.insert(position, value);
        Ok(())
    }

    fn register_out_parameter(
        &mut self,
        position: usize,
        _type_code: TypeCode,
        _scale: Option<i32>,
    ) -> DriverResult<()> {
        if !self.call {
            return Err(DriverError::Unsupported(
                "OUT parameters on a non-callable statement".to_string(),
            ));
        }
        self.out_registered.insert(position);
        Ok(())
    }

    fn out_parameter(&mut self, position: usize) -> DriverResult<Value> {
        if !self.out_registered.contains(&position) {
            return Err(DriverError::InvalidParameter(position));
        }
        Ok(self.out_values.get(&position).cloned().unwrap_or(Value::Null))
    }

    fn execute_query(&mut self) -> DriverResult<Box<dyn Cursor>> {
        let response = self.next_response(Vec::new())?;
        match response.results.into_iter().next() {
            Some(ScriptedResult::Rows { shape, rows }) => Ok(self.cursor(shape, rows)),
            _ => Err(DriverError::Sql(format!(
                "statement did not return a result set: {}",
                self.sql
            ))),
        }
    }

    fn execute_update(&mut self) -> DriverResult<i64> {
        let response = self.next_response(Vec::new())?;
        match response.results.into_iter().next() {
            Some(ScriptedResult::Count(count)) => Ok(count),
            None => Ok(0),
            Some(ScriptedResult::Rows { .. }) => Err(DriverError::Sql(format!(
                "statement returned a result set: {}",
                self.sql
            ))),
        }
    }

    fn execute(&mut self) -> DriverResult<bool> {
        let response = self.next_response(Vec::new())?;
        self.pending = response.results.into();
        self.current = self.pending.pop_front();
        Ok(matches!(self.current, Some(ScriptedResult::Rows { .. })))
    }

    fn result_set(&mut self) -> DriverResult<Option<Box<dyn Cursor>>> {
        self.check_open()?;
        match self.current.take() {
            Some(ScriptedResult::Rows { shape, rows }) => Ok(Some(self.cursor(shape, rows))),
            other => {
                self.current = other;
                Ok(None)
            }
        }
    }

    fn update_count(&mut self) -> DriverResult<i64> {
        self.check_open()?;
        match self.current {
            Some(ScriptedResult::Count(count)) => Ok(count),
            _ => Ok(-1),
        }
    }

    fn more_results(&mut self) -> DriverResult<bool> {
        self.check_open()?;
        self.current = self.pending.pop_front();
        Ok(matches!(self.current, Some(ScriptedResult::Rows { .. })))
    }

    fn add_batch(&mut self) -> DriverResult<()> {
        self.check_open()?;
        self.batch
            .push(self.bindings.iter().map(|(p, v)| (*p, v.clone())).collect());
        Ok(())
    }

    fn execute_batch(&mut self) -> DriverResult<Vec<i64>> {
        let batch = std::mem::take(&mut self.batch);
        let size = batch.len();
        let response = self.next_response(batch)?;
        Ok(response.batch_counts.unwrap_or_else(|| vec![1; size]))
    }

    fn generated_keys(&mut self) -> DriverResult<Option<Box<dyn Cursor>>> {
        if !self.return_keys {
            return Err(DriverError::Unsupported(
                "generated keys were not requested for this statement".to_string(),
            ));
        }
        Ok(self
            .generated
            .take()
            .map(|(shape, rows)| self.cursor(shape, rows)))
    }

    fn close(&mut self) -> DriverResult<()> {
        if !self.closed {
            self.closed = true;
            self.state.lock().statements_closed += 1;
        }
        Ok(())
    }
}

struct ScriptedCursor {
    inner: BufferedCursor,
    state: Arc<Mutex<ScriptState>>,
}

impl Cursor for ScriptedCursor {
    fn shape(&self) -> &ResultShape {
        self.inner.shape()
    }

    fn advance(&mut self) -> DriverResult<bool> {
        self.inner.advance()
    }

    fn value(&self, index: usize) -> DriverResult<Value> {
        self.inner.value(index)
    }

    fn close(&mut self) -> DriverResult<()> {
        let mut state = self.state.lock();
        if !self.inner.is_closed() {
            state.cursors_closed += 1;
        }
        self.inner.close()?;
        match &state.cursor_close_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
