use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlaction_core::{
    BufferedCursor, Cursor, DriverError, DriverResult, RawColumn, ResultShape, Statement,
    TypeCode, Value,
};

use super::{from_sqlite, sql_error, to_sqlite, type_code, Shared, GENERATED_KEY_COLUMN};

/// Virtual machine steps between two deadline checks
const PROGRESS_STEPS: i32 = 1000;

/// Outcome of one SQLite execution
enum Outcome {
    Rows(ResultShape, Vec<Vec<Value>>),
    Count(i64, Option<i64>),
}

/// Prepared SQLite statement.
///
/// Holds the SQL and bound values; the compiled statement lives in the connection's
/// statement cache and is looked up again for every execution.
pub struct SqliteStatement {
    shared: Arc<Shared>,
    sql: String,
    return_keys: bool,
    bindings: BTreeMap<usize, Value>,
    batch: Vec<BTreeMap<usize, Value>>,
    timeout: Option<u32>,
    current: Option<Outcome>,
    generated: Vec<i64>,
    closed: bool,
}

impl SqliteStatement {
    pub(crate) fn new(shared: Arc<Shared>, sql: &str, return_keys: bool) -> Self {
        Self {
            shared,
            sql: sql.to_string(),
            return_keys,
            bindings: BTreeMap::new(),
            batch: Vec::new(),
            timeout: None,
            current: None,
            generated: Vec::new(),
            closed: false,
        }
    }

    fn check_open(&self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::Closed("Statement"));
        }
        self.shared.check_open()
    }

    fn is_insert(&self) -> bool {
        self.sql
            .trim_start()
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
    }

    /// Runs the statement under the query timeout, if one is set. The deadline is checked
    /// by a progress handler that interrupts SQLite once it has passed, and the handler is
    /// removed again before the connection is unlocked.
    fn run(&self, bindings: &BTreeMap<usize, Value>) -> DriverResult<Outcome> {
        self.check_open()?;
        let conn = self.shared.conn.lock();

        let timeout = self.timeout.filter(|seconds| *seconds > 0);
        if let Some(seconds) = timeout {
            let deadline = Instant::now() + Duration::from_secs(u64::from(seconds));
            conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
        }
        let outcome = self.run_locked(&conn, bindings);
        if timeout.is_some() {
            conn.progress_handler(0, None::<fn() -> bool>);
        }

        outcome.map_err(|e| match timeout {
            Some(seconds) if is_interrupt(&e) => {
                tracing::warn!("SQLite statement interrupted after {}s: {}", seconds, self.sql);
                DriverError::Timeout(seconds)
            }
            _ => sql_error(e),
        })
    }

    fn run_locked(
        &self,
        conn: &rusqlite::Connection,
        bindings: &BTreeMap<usize, Value>,
    ) -> rusqlite::Result<Outcome> {
        let mut stmt = conn.prepare_cached(&self.sql)?;
        for (position, value) in bindings {
            stmt.raw_bind_parameter(*position, to_sqlite(value))?;
        }

        if stmt.column_count() > 0 {
            let shape = ResultShape::new(
                stmt.columns()
                    .iter()
                    .map(|column| RawColumn {
                        label: column.name().to_string(),
                        name: column.name().to_string(),
                        type_code: type_code(column.decl_type()),
                        type_name: column.decl_type().map(str::to_string),
                    })
                    .collect(),
            );
            let width = shape.len();

            let mut rows = Vec::new();
            let mut cursor = stmt.raw_query();
            while let Some(row) = cursor.next()? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(from_sqlite(row.get_ref(i)?));
                }
                rows.push(values);
            }
            tracing::debug!("SQLite query returned {} row(s)", rows.len());
            Ok(Outcome::Rows(shape, rows))
        } else {
            let changes = stmt.raw_execute()? as i64;
            let key = (self.return_keys && changes > 0 && self.is_insert())
                .then(|| conn.last_insert_rowid());
            Ok(Outcome::Count(changes, key))
        }
    }
}

fn is_interrupt(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::OperationInterrupted
    )
}

impl Statement for SqliteStatement {
    fn set_fetch_size(&mut self, _rows: usize) -> DriverResult<()> {
        // results are buffered whole
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

    fn execute_query(&mut self) -> DriverResult<Box<dyn Cursor>> {
        match self.run(&self.bindings)? {
            Outcome::Rows(shape, rows) => Ok(Box::new(BufferedCursor::new(shape, rows))),
            Outcome::Count(..) => Err(DriverError::Sql(format!(
                "statement did not return a result set: {}",
                self.sql
            ))),
        }
    }

    fn execute_update(&mut self) -> DriverResult<i64> {
        match self.run(&self.bindings)? {
            Outcome::Count(count, key) => {
                self.generated = key.into_iter().collect();
                Ok(count)
            }
            Outcome::Rows(..) => Err(DriverError::Sql(format!(
                "statement returned a result set: {}",
                self.sql
            ))),
        }
    }

    fn execute(&mut self) -> DriverResult<bool> {
        let outcome = self.run(&self.bindings)?;
        let is_result = matches!(outcome, Outcome::Rows(..));
        if let Outcome::Count(_, key) = &outcome {
            self.generated = key.iter().copied().collect();
        }
        self.current = Some(outcome);
        Ok(is_result)
    }

    fn result_set(&mut self) -> DriverResult<Option<Box<dyn Cursor>>> {
        self.check_open()?;
        match self.current.take() {
            Some(Outcome::Rows(shape, rows)) => Ok(Some(Box::new(BufferedCursor::new(shape, rows)))),
            other => {
                self.current = other;
                Ok(None)
            }
        }
    }

    fn update_count(&mut self) -> DriverResult<i64> {
        self.check_open()?;
        match self.current {
            Some(Outcome::Count(count, _)) => Ok(count),
            _ => Ok(-1),
        }
    }

    fn more_results(&mut self) -> DriverResult<bool> {
        // one result per execution
        self.check_open()?;
        self.current = None;
        Ok(false)
    }

    fn add_batch(&mut self) -> DriverResult<()> {
        self.check_open()?;
        self.batch.push(self.bindings.clone());
        Ok(())
    }

    fn execute_batch(&mut self) -> DriverResult<Vec<i64>> {
        let batch = std::mem::take(&mut self.batch);
        let mut counts = Vec::with_capacity(batch.len());
        let mut generated = Vec::new();
        for bindings in &batch {
            match self.run(bindings)? {
                Outcome::Count(count, key) => {
                    counts.push(count);
                    generated.extend(key);
                }
                Outcome::Rows(..) => {
                    return Err(DriverError::Sql(format!(
                        "batch statement returned a result set: {}",
                        self.sql
                    )))
                }
            }
        }
        self.generated = generated;
        Ok(counts)
    }

    fn generated_keys(&mut self) -> DriverResult<Option<Box<dyn Cursor>>> {
        if !self.return_keys {
            return Err(DriverError::Unsupported(
                "generated keys were not requested for this statement".to_string(),
            ));
        }
        if self.generated.is_empty() {
            return Ok(None);
        }
        let rows = std::mem::take(&mut self.generated)
            .into_iter()
            .map(|key| vec![Value::Int(key)])
            .collect();
        Ok(Some(Box::new(BufferedCursor::new(
            ResultShape::of([(GENERATED_KEY_COLUMN, TypeCode::BigInt)]),
            rows,
        ))))
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.current = None;
        self.bindings.clear();
        Ok(())
    }
}
