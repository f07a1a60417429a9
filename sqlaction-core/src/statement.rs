//! Compiled statements and parameter bindings.

use serde::Serialize;

use crate::descriptor::ColumnDescriptor;
use crate::driver::Statement;
use crate::error::AccessResult;
use crate::query::QueryMetadata;
use crate::types::{TypeCode, TypeRegistry, Value, ValueType};

/// One bind value with the metadata needed to convert and bind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterBinding {
    pub value: Value,
    pub type_code: TypeCode,
    pub value_type: ValueType,
    /// Decimal scale passed to the driver, if any
    pub scale: Option<i32>,
    /// Skipped when binding, e.g. a qualifier value rendered as `IS NULL`
    pub excluded: bool,
    position: Option<usize>,
}

impl ParameterBinding {
    pub fn new(value: impl Into<Value>, type_code: TypeCode) -> Self {
        Self {
            value: value.into(),
            type_code,
            value_type: type_code.default_value_type(),
            scale: None,
            excluded: false,
            position: None,
        }
    }

    /// Binding typed after the value itself.
    pub fn inferred(value: impl Into<Value>) -> Self {
        let value = value.into();
        let type_code = TypeCode::for_value(&value);
        Self::new(value, type_code)
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    /// 1-based statement position, `None` for excluded or unassigned bindings.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Converts the value for the driver and binds it at this binding's position.
    pub fn bind(&self, statement: &mut dyn Statement, registry: &TypeRegistry) -> AccessResult<()> {
        let Some(position) = self.position else {
            return Ok(());
        };
        let value = registry
            .converter(self.value_type)
            .to_driver(&self.value, self.type_code)?;
        statement.bind(position, value, self.type_code, self.scale)?;
        Ok(())
    }
}

/// SQL text with its ordered bindings, ready to execute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStatement {
    sql: String,
    bindings: Vec<ParameterBinding>,
    result_columns: Option<Vec<ColumnDescriptor>>,
}

impl CompiledStatement {
    /// Strips line breaks from `sql` and numbers the non-excluded bindings from 1.
    pub fn new(sql: impl AsRef<str>, mut bindings: Vec<ParameterBinding>) -> Self {
        let mut position = 0;
        for binding in &mut bindings {
            if binding.excluded {
                binding.position = None;
            } else {
                position += 1;
                binding.position = Some(position);
            }
        }

        Self {
            sql: strip_line_breaks(sql.as_ref()),
            bindings,
            result_columns: None,
        }
    }

    /// Declares the result columns, taking precedence over the driver's result shape.
    pub fn with_result_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.result_columns = if columns.is_empty() { None } else { Some(columns) };
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.bindings
    }

    pub fn result_columns(&self) -> Option<&[ColumnDescriptor]> {
        self.result_columns.as_deref()
    }

    /// Bindings that are actually sent to the driver, in position order.
    pub fn bound(&self) -> impl Iterator<Item = &ParameterBinding> {
        self.bindings.iter().filter(|b| !b.excluded)
    }

    pub fn bind(&self, statement: &mut dyn Statement, registry: &TypeRegistry) -> AccessResult<()> {
        for binding in self.bound() {
            binding.bind(statement, registry)?;
        }
        Ok(())
    }
}

/// Pushes fetch size and statement timeout to the driver when they are set.
pub(crate) fn apply_metadata(
    statement: &mut dyn Statement,
    metadata: &QueryMetadata,
) -> AccessResult<()> {
    if metadata.fetch_size > 0 {
        statement.set_fetch_size(metadata.fetch_size)?;
    }
    if metadata.statement_timeout > 0 {
        statement.set_query_timeout(metadata.statement_timeout)?;
    }
    Ok(())
}

fn strip_line_breaks(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Connection, ScriptedConnection, ScriptedResponse};

    #[test]
    fn test_line_breaks_are_stripped() {
        let compiled = CompiledStatement::new("SELECT *\r\nFROM ARTIST\nWHERE ID = ?", vec![]);
        assert_eq!(compiled.sql(), "SELECT * FROM ARTIST WHERE ID = ?");
    }

    #[test]
    fn test_positions_skip_excluded_bindings() {
        let compiled = CompiledStatement::new(
            "UPDATE T SET A = ? WHERE B IS NULL AND C = ?",
            vec![
                ParameterBinding::new(1, TypeCode::Integer),
                ParameterBinding::new(Value::Null, TypeCode::VarChar).excluded(),
                ParameterBinding::new("x", TypeCode::VarChar),
            ],
        );
        let positions: Vec<Option<usize>> =
            compiled.bindings().iter().map(|b| b.position()).collect();
        assert_eq!(positions, vec![Some(1), None, Some(2)]);
        assert_eq!(compiled.bound().count(), 2);
    }

    #[test]
    fn test_bind_sends_converted_values() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::count(1));

        let id = uuid::Uuid::new_v4();
        let compiled = CompiledStatement::new(
            "UPDATE T SET A = ? WHERE K = ?",
            vec![
                ParameterBinding::new(Value::Uuid(id), TypeCode::VarChar)
                    .with_value_type(ValueType::Uuid),
                ParameterBinding::new(Value::Null, TypeCode::Integer).excluded(),
                ParameterBinding::inferred(5),
            ],
        );

        let mut stmt = conn.prepare(compiled.sql(), false).unwrap();
        compiled.bind(stmt.as_mut(), &TypeRegistry::standard()).unwrap();
        stmt.execute_update().unwrap();

        let executed = conn.executed();
        assert_eq!(
            executed[0].bindings,
            vec![(1, Value::Text(id.to_string())), (2, Value::Int(5))]
        );
    }

    #[test]
    fn test_metadata_applied_only_when_set() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::count(0));
        conn.respond(ScriptedResponse::count(0));

        let mut stmt = conn.prepare("DELETE FROM T", false).unwrap();
        apply_metadata(stmt.as_mut(), &QueryMetadata::default()).unwrap();
        stmt.execute_update().unwrap();

        let mut stmt = conn.prepare("DELETE FROM T", false).unwrap();
        apply_metadata(
            stmt.as_mut(),
            &QueryMetadata::default().with_fetch_size(50).with_timeout(3),
        )
        .unwrap();
        stmt.execute_update().unwrap();

        let executed = conn.executed();
        assert_eq!((executed[0].fetch_size, executed[0].timeout), (None, None));
        assert_eq!((executed[1].fetch_size, executed[1].timeout), (Some(50), Some(3)));
    }
}
