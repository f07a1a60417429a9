use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{
    log_failure, owned, report_iterator, report_result_set, streamed_result_set,
    with_owned_statement, ActionContext,
};
use crate::descriptor::{ColumnDescriptor, RowDescriptor, RowDescriptorBuilder};
use crate::driver::{ConnectionHandle, ResultShape, Statement};
use crate::error::{AccessError, AccessResult};
use crate::observer::{ActionKind, OperationObserver, Report, ReportContext, ResultRows};
use crate::query::QueryMetadata;
use crate::row::DataRow;
use crate::statement::{apply_metadata, CompiledStatement, ParameterBinding};
use crate::types::{TypeCode, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterDirection {
    In,
    Out,
    InOut,
}

impl ParameterDirection {
    pub fn is_in(&self) -> bool {
        matches!(self, ParameterDirection::In | ParameterDirection::InOut)
    }

    pub fn is_out(&self) -> bool {
        matches!(self, ParameterDirection::Out | ParameterDirection::InOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureParameter {
    pub name: String,
    pub direction: ParameterDirection,
    pub type_code: TypeCode,
    #[serde(default)]
    pub scale: Option<i32>,
}

impl ProcedureParameter {
    pub fn new(name: impl Into<String>, direction: ParameterDirection, type_code: TypeCode) -> Self {
        Self {
            name: name.into(),
            direction,
            type_code,
            scale: None,
        }
    }

    pub fn input(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self::new(name, ParameterDirection::In, type_code)
    }

    pub fn output(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self::new(name, ParameterDirection::Out, type_code)
    }

    pub fn in_out(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self::new(name, ParameterDirection::InOut, type_code)
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// Stored procedure signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureDescriptor {
    pub name: String,
    /// The first parameter receives the procedure's return value
    #[serde(default)]
    pub returns_value: bool,
    #[serde(default)]
    pub parameters: Vec<ProcedureParameter>,
}

impl ProcedureDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            returns_value: false,
            parameters: Vec::new(),
        }
    }

    pub fn returning(mut self, parameter: ProcedureParameter) -> Self {
        self.returns_value = true;
        self.parameters.insert(0, parameter);
        self
    }

    pub fn with_parameter(mut self, parameter: ProcedureParameter) -> Self {
        self.parameters.push(parameter);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProcedureQuery {
    pub procedure: Arc<ProcedureDescriptor>,
    /// IN values by parameter name; missing values bind NULL
    pub values: BTreeMap<String, Value>,
    /// Declared columns of each returned result set, by position
    pub result_descriptors: Vec<Vec<ColumnDescriptor>>,
    pub metadata: QueryMetadata,
}

impl ProcedureQuery {
    pub fn new(procedure: Arc<ProcedureDescriptor>) -> Self {
        Self {
            procedure,
            values: BTreeMap::new(),
            result_descriptors: Vec::new(),
            metadata: QueryMetadata::default(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_result_descriptor(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.result_descriptors.push(columns);
        self
    }

    pub fn with_metadata(mut self, metadata: QueryMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Renders the ODBC call escape for a procedure.
///
/// The compiled statement carries one binding per parameter in declaration order, OUT
/// parameters included, so binding positions match parameter positions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcedureTranslator;

impl ProcedureTranslator {
    pub fn translate(&self, query: &ProcedureQuery) -> AccessResult<CompiledStatement> {
        let procedure = &query.procedure;
        let mut parameters = procedure.parameters.iter();

        let mut sql = String::from("{");
        if procedure.returns_value {
            match parameters.next() {
                Some(p) if p.direction == ParameterDirection::Out => sql.push_str("? = "),
                _ => {
                    return Err(AccessError::Configuration(format!(
                        "procedure '{}' returns a value but its first parameter is not OUT",
                        procedure.name
                    )))
                }
            }
        }
        let placeholders = vec!["?"; parameters.len()].join(", ");
        sql.push_str(&format!("call {}({})}}", procedure.name, placeholders));

        let bindings = procedure
            .parameters
            .iter()
            .map(|p| {
                let value = if p.direction.is_in() {
                    query.values.get(&p.name).cloned().unwrap_or(Value::Null)
                } else {
                    Value::Null
                };
                let binding = ParameterBinding::new(value, p.type_code);
                match p.scale {
                    Some(scale) => binding.with_scale(scale),
                    None => binding,
                }
            })
            .collect();

        Ok(CompiledStatement::new(sql, bindings))
    }
}

/// Calls a stored procedure, reporting OUT parameters, then every result set and update
/// count in the order the driver returns them.
#[derive(Debug, Clone)]
pub struct ProcedureAction {
    query: ProcedureQuery,
    context: ActionContext,
}

impl ProcedureAction {
    pub fn new(query: ProcedureQuery, context: ActionContext) -> Self {
        Self { query, context }
    }

    pub fn query(&self) -> &ProcedureQuery {
        &self.query
    }

    pub fn execute(
        &self,
        connection: &ConnectionHandle,
        observer: &mut dyn OperationObserver,
    ) -> AccessResult<()> {
        let compiled = ProcedureTranslator.translate(&self.query)?;
        let sql = compiled.sql();
        let report_context = ReportContext {
            kind: ActionKind::Procedure,
            name: self.query.metadata.name.as_deref(),
            sql,
        };

        let inputs: Vec<ParameterBinding> = self
            .query
            .procedure
            .parameters
            .iter()
            .zip(compiled.bindings())
            .filter(|(p, _)| p.direction.is_in())
            .map(|(_, b)| b.clone())
            .collect();
        self.context.logger.log_query(sql, &inputs);

        let started = Instant::now();
        let statement = connection
            .prepare_call(sql)
            .map_err(|e| log_failure(&self.context, sql, e.into()))?;

        with_owned_statement(statement, |slot| {
            let is_result = self.start(owned(slot)?, &compiled)?;

            let out = self.read_out_parameters(owned(slot)?)?;
            if !out.is_empty() {
                observer.next(
                    &report_context,
                    Report::Rows(ResultRows::Materialized(vec![out])),
                )?;
            }

            self.read_results(is_result, slot, connection, started, &report_context, observer)
        })
        .map_err(|e| log_failure(&self.context, sql, e))
    }

    /// Registers OUT parameters, binds IN values and executes.
    fn start(&self, statement: &mut dyn Statement, compiled: &CompiledStatement) -> AccessResult<bool> {
        apply_metadata(statement, &self.query.metadata)?;
        for (parameter, binding) in self.query.procedure.parameters.iter().zip(compiled.bindings()) {
            let Some(position) = binding.position() else {
                continue;
            };
            if parameter.direction.is_out() {
                statement.register_out_parameter(position, parameter.type_code, parameter.scale)?;
            }
            if parameter.direction.is_in() {
                binding.bind(statement, &self.context.types)?;
            }
        }
        Ok(statement.execute()?)
    }

    fn read_out_parameters(&self, statement: &mut dyn Statement) -> AccessResult<DataRow> {
        let mut values = Vec::new();
        for (index, parameter) in self.query.procedure.parameters.iter().enumerate() {
            if !parameter.direction.is_out() {
                continue;
            }
            let raw = statement.out_parameter(index + 1)?;
            let value = self
                .context
                .types
                .converter(parameter.type_code.default_value_type())
                .materialize(raw, parameter.type_code)?;
            values.push((parameter.name.clone(), value));
        }
        Ok(DataRow::from_pairs(values))
    }

    fn read_results(
        &self,
        mut is_result: bool,
        slot: &mut Option<Box<dyn Statement>>,
        connection: &ConnectionHandle,
        started: Instant,
        report_context: &ReportContext<'_>,
        observer: &mut dyn OperationObserver,
    ) -> AccessResult<()> {
        let paging = (self.query.metadata.fetch_offset, self.query.metadata.fetch_limit);
        let mut result_index = 0;

        loop {
            if is_result {
                if let Some(mut cursor) = owned(slot)?.result_set()? {
                    let descriptor = match self.describe(result_index, cursor.shape()) {
                        Ok(descriptor) => descriptor,
                        Err(e) => {
                            if let Err(close_err) = cursor.close() {
                                tracing::warn!("Error closing procedure cursor: {}", close_err);
                            }
                            return Err(e);
                        }
                    };
                    result_index += 1;

                    if observer.is_iterated_result() {
                        if let Some(statement) = slot.take() {
                            let iterator = streamed_result_set(
                                cursor, statement, descriptor, paging, connection,
                            )?;
                            return report_iterator(iterator, report_context, observer);
                        }
                    }
                    report_result_set(
                        cursor,
                        descriptor,
                        paging,
                        started,
                        report_context,
                        &self.context,
                        observer,
                    )?;
                }
            } else {
                let count = owned(slot)?.update_count()?;
                if count == -1 {
                    break;
                }
                observer.next(report_context, Report::Count(count))?;
                self.context.logger.log_update_count(count);
            }
            is_result = owned(slot)?.more_results()?;
        }
        Ok(())
    }

    fn describe(&self, index: usize, shape: &ResultShape) -> AccessResult<RowDescriptor> {
        let builder = RowDescriptorBuilder::new()
            .with_shape(shape)
            .with_capitalization(self.query.metadata.capitalization)
            .validate_duplicates(true);

        let builder = if self.query.result_descriptors.is_empty() {
            builder
        } else {
            let columns = self.query.result_descriptors.get(index).ok_or_else(|| {
                AccessError::Configuration(format!(
                    "no descriptor for result set {} of procedure '{}'",
                    index, self.query.procedure.name
                ))
            })?;
            builder.with_columns(columns.clone())
        };
        builder.build(&self.context.types)
    }
}
