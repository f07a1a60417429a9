//! Driver abstraction driven by the actions.
//!
//! The traits mirror the call/cursor surface of a relational driver: a [`Connection`]
//! prepares [`Statement`]s, statements execute and hand out [`Cursor`]s, cursors describe
//! themselves through a [`ResultShape`]. Implement these traits to run actions against
//! a database; [`ScriptedConnection`] is an in-memory implementation for tests.
//!
//! Cursors and statements are owned values (`Box<dyn ...>`) that stay valid after the
//! call that produced them returns, so result iterators can outlive the executing action.

mod cursor;
mod scripted;

pub use cursor::BufferedCursor;
pub use scripted::{ExecutedStatement, ScriptedConnection, ScriptedResponse, ScriptedResult};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, DriverResult};
use crate::types::{TypeCode, Value};

/// Shared handle to an open connection
pub type ConnectionHandle = Arc<dyn Connection>;

/// Column metadata reported by a driver cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumn {
    /// Column label (alias if the SQL gave one)
    pub label: String,
    /// Underlying column name, empty for expressions
    pub name: String,
    pub type_code: TypeCode,
    /// Driver specific type name, e.g. `VARCHAR2`
    pub type_name: Option<String>,
}

impl RawColumn {
    pub fn new(label: impl Into<String>, type_code: TypeCode) -> Self {
        let label = label.into();
        Self {
            name: label.clone(),
            label,
            type_code,
            type_name: None,
        }
    }

    /// Key under which values of this column are stored in result rows.
    pub fn row_key(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

/// Shape of a driver result set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultShape {
    pub columns: Vec<RawColumn>,
}

impl ResultShape {
    pub fn new(columns: Vec<RawColumn>) -> Self {
        Self { columns }
    }

    /// Shape from `(label, type)` pairs.
    pub fn of<S: Into<String>>(columns: impl IntoIterator<Item = (S, TypeCode)>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(label, code)| RawColumn::new(label, code))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Forward-only driver cursor
pub trait Cursor: Send {
    fn shape(&self) -> &ResultShape;

    /// Moves to the next row, `false` when exhausted.
    fn advance(&mut self) -> DriverResult<bool>;

    /// Value of the current row at a 0-based column index.
    fn value(&self, index: usize) -> DriverResult<Value>;

    fn close(&mut self) -> DriverResult<()>;

    fn is_closed(&self) -> bool;
}

/// Prepared or callable statement
pub trait Statement: Send {
    fn set_fetch_size(&mut self, rows: usize) -> DriverResult<()>;

    fn set_query_timeout(&mut self, seconds: u32) -> DriverResult<()>;

    /// Binds a parameter at a 1-based position.
    fn bind(
        &mut self,
        position: usize,
        value: Value,
        type_code: TypeCode,
        scale: Option<i32>,
    ) -> DriverResult<()>;

    fn register_out_parameter(
        &mut self,
        position: usize,
        _type_code: TypeCode,
        _scale: Option<i32>,
    ) -> DriverResult<()> {
        Err(DriverError::Unsupported(format!(
            "OUT parameter at position {}",
            position
        )))
    }

    fn out_parameter(&mut self, position: usize) -> DriverResult<Value> {
        Err(DriverError::Unsupported(format!(
            "OUT parameter at position {}",
            position
        )))
    }

    fn execute_query(&mut self) -> DriverResult<Box<dyn Cursor>>;

    fn execute_update(&mut self) -> DriverResult<i64>;

    /// Executes a statement of unknown kind. Returns `true` when the first result is a
    /// result set, `false` when it is an update count.
    fn execute(&mut self) -> DriverResult<bool>;

    /// Current result as a cursor, `None` if the current result is an update count.
    fn result_set(&mut self) -> DriverResult<Option<Box<dyn Cursor>>>;

    /// Current result as an update count, `-1` if it is a result set or no results remain.
    fn update_count(&mut self) -> DriverResult<i64>;

    /// Moves to the next result. Returns `true` when it is a result set.
    fn more_results(&mut self) -> DriverResult<bool>;

    /// Queues the currently bound parameters as one batch entry.
    fn add_batch(&mut self) -> DriverResult<()>;

    fn execute_batch(&mut self) -> DriverResult<Vec<i64>>;

    /// Keys generated by the last execution, when the statement was prepared for them.
    fn generated_keys(&mut self) -> DriverResult<Option<Box<dyn Cursor>>>;

    fn close(&mut self) -> DriverResult<()>;
}

/// Open database connection
pub trait Connection: Send + Sync {
    /// Prepares a statement; `return_generated_keys` asks the driver to keep keys
    /// generated by inserts for [`Statement::generated_keys`].
    fn prepare(&self, sql: &str, return_generated_keys: bool)
        -> DriverResult<Box<dyn Statement>>;

    /// Prepares a stored procedure call.
    fn prepare_call(&self, sql: &str) -> DriverResult<Box<dyn Statement>>;

    fn close(&self) -> DriverResult<()>;

    fn is_closed(&self) -> bool;
}
