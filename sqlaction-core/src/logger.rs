//! Query logging.
//!
//! Actions call the [`QueryLogger`] once per physical statement execution with the SQL
//! and its bound values, then with the outcome. [`TracingQueryLogger`] writes these
//! events through `tracing`.

use std::time::Duration;

use crate::statement::ParameterBinding;
use crate::types::Value;

/// Strings and byte arrays longer than this are trimmed in logged literals.
pub const TRIM_VALUES_THRESHOLD: usize = 30;

/// Sink for SQL execution events
pub trait QueryLogger: Send + Sync {
    /// A single statement execution with its bindings.
    fn log_query(&self, sql: &str, bindings: &[ParameterBinding]);

    /// A batch execution; one binding list per queued row.
    fn log_batch(&self, sql: &str, rows: &[Vec<ParameterBinding>]);

    fn log_select_count(&self, count: usize, elapsed: Duration, sql: &str);

    fn log_update_count(&self, count: i64);

    fn log_generated_key(&self, column: &str, value: &Value);

    fn log_query_error(&self, sql: &str, error: &dyn std::fmt::Display);
}

/// Default [`QueryLogger`] writing to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingQueryLogger;

impl QueryLogger for TracingQueryLogger {
    fn log_query(&self, sql: &str, bindings: &[ParameterBinding]) {
        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!("{}", render_query(sql, bindings));
        }
    }

    fn log_batch(&self, sql: &str, rows: &[Vec<ParameterBinding>]) {
        if !tracing::enabled!(tracing::Level::INFO) {
            return;
        }
        tracing::info!("{} [batch: {} row(s)]", sql, rows.len());
        for (i, bindings) in rows.iter().enumerate() {
            tracing::debug!("batch bind {}: [{}]", i + 1, render_bindings(bindings));
        }
    }

    fn log_select_count(&self, count: usize, elapsed: Duration, sql: &str) {
        let noun = if count == 1 { "row" } else { "rows" };
        tracing::info!(
            rows = count,
            elapsed_ms = elapsed.as_millis() as u64,
            "=== returned {} {} - took {} ms.",
            count,
            noun,
            elapsed.as_millis()
        );
        tracing::trace!("select completed: {}", sql);
    }

    fn log_update_count(&self, count: i64) {
        if count < 0 {
            tracing::info!("=== updated ? rows");
        } else {
            let noun = if count == 1 { "row" } else { "rows" };
            tracing::info!("=== updated {} {}.", count, noun);
        }
    }

    fn log_generated_key(&self, column: &str, value: &Value) {
        tracing::info!("Generated PK: {} = {}", column, render_literal(value));
    }

    fn log_query_error(&self, sql: &str, error: &dyn std::fmt::Display) {
        tracing::warn!("*** error executing '{}': {}", sql, error);
    }
}

/// SQL followed by its rendered bindings, e.g. `SELECT ... WHERE ID = ? [bind: 1:42]`.
pub fn render_query(sql: &str, bindings: &[ParameterBinding]) -> String {
    if bindings.iter().all(|b| b.excluded) {
        sql.to_string()
    } else {
        format!("{} [bind: {}]", sql, render_bindings(bindings))
    }
}

fn render_bindings(bindings: &[ParameterBinding]) -> String {
    bindings
        .iter()
        .filter_map(|b| {
            b.position()
                .map(|p| format!("{}:{}", p, render_literal(&b.value)))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders a value as it appears in logged SQL.
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Text(s) => format!("'{}'", trim_text(s)),
        Value::Bytes(b) => {
            if b.len() > TRIM_VALUES_THRESHOLD {
                format!("< {}...>", hex::encode(&b[..TRIM_VALUES_THRESHOLD]))
            } else {
                format!("< {}>", hex::encode(b))
            }
        }
        Value::Date(_) | Value::Time(_) | Value::Timestamp(_) | Value::Uuid(_) => {
            format!("'{}'", value)
        }
        other => other.to_string(),
    }
}

fn trim_text(s: &str) -> String {
    let escaped = s.replace('\'', "''");
    match escaped.char_indices().nth(TRIM_VALUES_THRESHOLD) {
        Some((cut, _)) => format!("{}...", &escaped[..cut]),
        None => escaped,
    }
}
