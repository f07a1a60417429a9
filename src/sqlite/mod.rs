//! SQLite driver
//!
//! Implements the core driver traits over `rusqlite`. Result sets are read fully into a
//! [`BufferedCursor`] at execution time, so cursors and statements stay valid after the
//! connection lock is released.
//!
//! SQLite has no stored procedures; [`Connection::prepare_call`] fails with
//! [`DriverError::Unsupported`].

mod statement;

pub use statement::SqliteStatement;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use sqlaction_core::{
    Connection, ConnectionHandle, DialectFeatures, DriverError, DriverResult, Statement, TypeCode,
    Value,
};

/// Dialect name used for template lookup
pub const DIALECT_NAME: &str = "sqlite";

/// Label of the generated key column
pub const GENERATED_KEY_COLUMN: &str = "GENERATED_KEY";

/// What the SQLite driver supports.
///
/// Batches run row by row inside the driver, so only single-row executions return keys.
pub fn sqlite_features() -> DialectFeatures {
    DialectFeatures::named(DIALECT_NAME)
        .with_batch_updates(true)
        .with_generated_keys(true, false)
        .with_native_paging(false, false)
}

pub(crate) struct Shared {
    pub(crate) conn: Mutex<rusqlite::Connection>,
    pub(crate) closed: AtomicBool,
}

impl Shared {
    pub(crate) fn check_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(DriverError::Closed("Connection"))
        } else {
            Ok(())
        }
    }
}

/// SQLite connection
#[derive(Clone)]
pub struct SqliteConnection {
    shared: Arc<Shared>,
}

impl SqliteConnection {
    /// Open or create a database file
    pub fn open<P: AsRef<Path>>(path: P) -> DriverResult<Self> {
        let conn = rusqlite::Connection::open(path.as_ref()).map_err(sql_error)?;
        tracing::debug!("Opened SQLite database {}", path.as_ref().display());
        Ok(Self::wrap(conn))
    }

    pub fn open_in_memory() -> DriverResult<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(sql_error)?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: rusqlite::Connection) -> Self {
        Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(conn),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        Arc::new(self.clone())
    }

    /// Runs semicolon separated statements without parameters, e.g. a schema script.
    pub fn execute_script(&self, sql: &str) -> DriverResult<()> {
        self.shared.check_open()?;
        self.shared.conn.lock().execute_batch(sql).map_err(sql_error)
    }
}

impl Connection for SqliteConnection {
    fn prepare(&self, sql: &str, return_generated_keys: bool) -> DriverResult<Box<dyn Statement>> {
        self.shared.check_open()?;
        // compile once up front so syntax errors surface at prepare time
        self.shared
            .conn
            .lock()
            .prepare_cached(sql)
            .map_err(sql_error)?;
        Ok(Box::new(SqliteStatement::new(
            self.shared.clone(),
            sql,
            return_generated_keys,
        )))
    }

    fn prepare_call(&self, sql: &str) -> DriverResult<Box<dyn Statement>> {
        Err(DriverError::Unsupported(format!(
            "stored procedures are not available in SQLite: {}",
            sql
        )))
    }

    fn close(&self) -> DriverResult<()> {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("SQLite connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

pub(crate) fn sql_error(e: rusqlite::Error) -> DriverError {
    DriverError::Sql(e.to_string())
}

/// Maps a declared column type using SQLite's affinity rules for names the core does
/// not know.
pub(crate) fn type_code(declared: Option<&str>) -> TypeCode {
    let Some(declared) = declared else {
        return TypeCode::Other;
    };
    let upper = declared.trim().to_ascii_uppercase();
    // INTEGER columns hold 64-bit values
    if upper == "INTEGER" || upper == "INT" {
        return TypeCode::BigInt;
    }
    if let Some(code) = TypeCode::from_sql_name(&upper) {
        return code;
    }
    if upper.contains("INT") {
        TypeCode::BigInt
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        TypeCode::VarChar
    } else if upper.contains("BLOB") || upper.is_empty() {
        TypeCode::Blob
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        TypeCode::Double
    } else {
        TypeCode::Numeric
    }
}

pub(crate) fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// Dates and times are stored as ISO-8601 text, decimals as their canonical text.
pub(crate) fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Decimal(s) | Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => SqlValue::Text(t.format("%H:%M:%S%.f").to_string()),
        Value::Timestamp(ts) => SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        Value::Uuid(u) => SqlValue::Text(u.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_declared_type_mapping() {
        assert_eq!(type_code(Some("INTEGER")), TypeCode::BigInt);
        assert_eq!(type_code(Some("varchar(40)")), TypeCode::VarChar);
        assert_eq!(type_code(Some("DECIMAL(10,2)")), TypeCode::Decimal);
        assert_eq!(type_code(Some("DATETIME")), TypeCode::Timestamp);
        assert_eq!(type_code(Some("UNSIGNED BIG INT")), TypeCode::BigInt);
        assert_eq!(type_code(Some("NATIVE CHARACTER(70)")), TypeCode::VarChar);
        assert_eq!(type_code(Some("")), TypeCode::Blob);
        assert_eq!(type_code(None), TypeCode::Other);
    }

    #[test]
    fn test_value_conversion() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(to_sqlite(&Value::Date(date)), SqlValue::Text("2024-03-01".to_string()));
        let ts = date.and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(
            to_sqlite(&Value::Timestamp(ts)),
            SqlValue::Text("2024-03-01 10:30:00".to_string())
        );
        assert_eq!(to_sqlite(&Value::Bool(true)), SqlValue::Integer(1));
        assert_eq!(from_sqlite(ValueRef::Text(b"abc")), Value::Text("abc".to_string()));
        assert_eq!(from_sqlite(ValueRef::Null), Value::Null);
    }

    #[test]
    fn test_closed_connection_rejects_prepare() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.prepare("SELECT 1", false),
            Err(DriverError::Closed("Connection"))
        ));
    }

    #[test]
    fn test_prepare_reports_syntax_errors() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        assert!(matches!(conn.prepare("SELEC 1", false), Err(DriverError::Sql(_))));
        assert!(matches!(
            conn.prepare_call("{call X()}"),
            Err(DriverError::Unsupported(_))
        ));
    }
}
