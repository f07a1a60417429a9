use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use super::{
    drain, log_failure, owned, report_iterator, report_result_set, streamed_result_set,
    with_owned_statement, ActionContext,
};
use crate::descriptor::{RowDescriptor, RowDescriptorBuilder};
use crate::driver::{ConnectionHandle, ResultShape, Statement};
use crate::entity::EntityDescriptor;
use crate::error::{AccessError, AccessResult};
use crate::iterator::CursorResultIterator;
use crate::observer::{ActionKind, OperationObserver, Report, ReportContext, ResultRows};
use crate::query::QueryMetadata;
use crate::row::DataRow;
use crate::statement::{apply_metadata, CompiledStatement};
use crate::template::{variable_names, TemplateParameters, TemplateProcessor, TemplateValue};
use crate::types::ValueType;

/// Raw SQL template with its parameter sets
#[derive(Debug, Clone, Default)]
pub struct TemplateQuery {
    /// Used when no template is registered for the dialect
    pub default_template: Option<String>,
    /// Templates by dialect name
    pub templates: BTreeMap<String, String>,
    /// One execution per set; no sets means one execution without parameters
    pub parameters: Vec<TemplateParameters>,
    /// Values assigned to the template's variables in order of first appearance,
    /// replacing `parameters`
    pub positional: Option<Vec<TemplateValue>>,
    /// Value types forced on result columns by name
    pub type_overrides: BTreeMap<String, ValueType>,
    pub entity: Option<Arc<EntityDescriptor>>,
    pub return_generated_keys: bool,
    pub metadata: QueryMetadata,
}

impl TemplateQuery {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            default_template: Some(template.into()),
            ..Self::default()
        }
    }

    pub fn with_dialect_template(
        mut self,
        dialect: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.templates.insert(dialect.into(), template.into());
        self
    }

    pub fn with_parameters(mut self, parameters: TemplateParameters) -> Self {
        self.parameters.push(parameters);
        self
    }

    pub fn with_positional(mut self, values: Vec<TemplateValue>) -> Self {
        self.positional = Some(values);
        self
    }

    pub fn with_type_override(mut self, column: impl Into<String>, value_type: ValueType) -> Self {
        self.type_overrides.insert(column.into(), value_type);
        self
    }

    pub fn with_entity(mut self, entity: Arc<EntityDescriptor>) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn returning_generated_keys(mut self) -> Self {
        self.return_generated_keys = true;
        self
    }

    pub fn with_metadata(mut self, metadata: QueryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Template registered for `dialect`, falling back to the default one.
    pub fn template_for(&self, dialect: &str) -> AccessResult<&str> {
        self.templates
            .get(dialect)
            .or(self.default_template.as_ref())
            .map(String::as_str)
            .ok_or_else(|| {
                AccessError::Configuration(format!("no template for dialect '{}'", dialect))
            })
    }

    fn parameter_sets(&self, template: &str) -> AccessResult<Vec<TemplateParameters>> {
        if let Some(values) = &self.positional {
            let names = variable_names(template);
            if values.len() > names.len() {
                return Err(AccessError::Configuration(format!(
                    "{} positional values for {} template variables",
                    values.len(),
                    names.len()
                )));
            }
            return Ok(vec![names.into_iter().zip(values.iter().cloned()).collect()]);
        }
        if self.parameters.is_empty() {
            return Ok(vec![TemplateParameters::new()]);
        }
        Ok(self.parameters.clone())
    }
}

/// Executes a SQL template once per parameter set.
///
/// Result sets are reported as they come. Update counts of all executions are collected
/// and reported together as one batch count at the end. Iterated results require a
/// single parameter set.
#[derive(Debug, Clone)]
pub struct TemplateAction {
    query: TemplateQuery,
    context: ActionContext,
}

impl TemplateAction {
    pub fn new(query: TemplateQuery, context: ActionContext) -> Self {
        Self { query, context }
    }

    pub fn query(&self) -> &TemplateQuery {
        &self.query
    }

    pub fn execute(
        &self,
        connection: &ConnectionHandle,
        observer: &mut dyn OperationObserver,
    ) -> AccessResult<()> {
        let template = self.query.template_for(&self.context.features.name)?;
        let mut counts = Vec::new();
        let mut last_sql = String::new();

        let parameter_sets = self.query.parameter_sets(template)?;
        // a streamed result owns the statement and connection, so nothing may run after it
        if observer.is_iterated_result() && parameter_sets.len() > 1 {
            return Err(AccessError::Configuration(format!(
                "iterated results are not allowed for a template with {} parameter sets",
                parameter_sets.len()
            )));
        }

        for parameters in parameter_sets {
            let compiled = TemplateProcessor.process(template, &parameters)?;
            if compiled.result_columns().is_some() && !self.query.type_overrides.is_empty() {
                return Err(AccessError::configuration(
                    "result type overrides cannot be combined with #result directives",
                ));
            }

            let handed_over = self.execute_one(connection, observer, &compiled, &mut counts)?;
            last_sql = compiled.sql().to_string();
            if handed_over {
                break;
            }
        }

        if !counts.is_empty() {
            let report_context = ReportContext {
                kind: ActionKind::Template,
                name: self.query.metadata.name.as_deref(),
                sql: &last_sql,
            };
            observer.next(&report_context, Report::BatchCount(counts))?;
        }
        Ok(())
    }

    /// Runs one expansion of the template. Returns `true` when a result set was handed to
    /// the observer as a live iterator, which ends the action.
    fn execute_one(
        &self,
        connection: &ConnectionHandle,
        observer: &mut dyn OperationObserver,
        compiled: &CompiledStatement,
        counts: &mut Vec<i64>,
    ) -> AccessResult<bool> {
        let sql = compiled.sql();
        let report_context = ReportContext {
            kind: ActionKind::Template,
            name: self.query.metadata.name.as_deref(),
            sql,
        };
        let return_keys =
            self.query.return_generated_keys && self.context.features.supports_generated_keys;

        self.context.logger.log_query(sql, compiled.bindings());
        let started = Instant::now();
        let statement = connection
            .prepare(sql, return_keys)
            .map_err(|e| log_failure(&self.context, sql, e.into()))?;

        with_owned_statement(statement, |slot| {
            let statement = owned(slot)?;
            apply_metadata(statement, &self.query.metadata)?;
            compiled.bind(statement, &self.context.types)?;
            let mut is_result = statement.execute()?;

            if return_keys {
                if let Some(keys) = self.read_generated_keys(owned(slot)?)? {
                    observer.next(&report_context, Report::Rows(ResultRows::Materialized(keys)))?;
                }
            }

            let paging = (self.query.metadata.fetch_offset, self.query.metadata.fetch_limit);
            loop {
                if is_result {
                    if let Some(mut cursor) = owned(slot)?.result_set()? {
                        let descriptor = match self.describe(compiled, cursor.shape()) {
                            Ok(descriptor) => descriptor,
                            Err(e) => {
                                if let Err(close_err) = cursor.close() {
                                    tracing::warn!("Error closing template cursor: {}", close_err);
                                }
                                return Err(e);
                            }
                        };

                        if observer.is_iterated_result() {
                            if let Some(statement) = slot.take() {
                                let iterator = streamed_result_set(
                                    cursor, statement, descriptor, paging, connection,
                                )?;
                                report_iterator(iterator, &report_context, observer)?;
                                return Ok(true);
                            }
                        }
                        report_result_set(
                            cursor,
                            descriptor,
                            paging,
                            started,
                            &report_context,
                            &self.context,
                            observer,
                        )?;
                    }
                } else {
                    let count = owned(slot)?.update_count()?;
                    if count == -1 {
                        break;
                    }
                    counts.push(count);
                    self.context.logger.log_update_count(count);
                }
                is_result = owned(slot)?.more_results()?;
            }
            Ok(false)
        })
        .map_err(|e| log_failure(&self.context, sql, e))
    }

    fn read_generated_keys(&self, statement: &mut dyn Statement) -> AccessResult<Option<Vec<DataRow>>> {
        let Some(mut cursor) = statement.generated_keys()? else {
            return Ok(None);
        };
        let descriptor = match RowDescriptorBuilder::new()
            .with_shape(cursor.shape())
            .build(&self.context.types)
        {
            Ok(descriptor) => descriptor,
            Err(e) => {
                if let Err(close_err) = cursor.close() {
                    tracing::warn!("Error closing generated key cursor: {}", close_err);
                }
                return Err(e);
            }
        };

        let keys = drain(CursorResultIterator::new(cursor, descriptor))?;
        for key in &keys {
            for (column, value) in key.iter() {
                self.context.logger.log_generated_key(column, value);
            }
        }
        Ok(Some(keys))
    }

    /// `#result` columns win; otherwise the driver shape is typed after the root entity
    /// and the query's type overrides.
    fn describe(&self, compiled: &CompiledStatement, shape: &ResultShape) -> AccessResult<RowDescriptor> {
        let mut builder = RowDescriptorBuilder::new()
            .with_shape(shape)
            .with_capitalization(self.query.metadata.capitalization)
            .validate_duplicates(true);

        match compiled.result_columns() {
            Some(columns) => builder = builder.with_columns(columns.to_vec()),
            None => {
                if let Some(entity) = &self.query.entity {
                    for column in &shape.columns {
                        if let Some(attribute) = entity.attribute(column.row_key()) {
                            builder = builder
                                .override_type(column.row_key(), attribute.effective_value_type());
                        }
                    }
                }
                for (column, value_type) in &self.query.type_overrides {
                    builder = builder.override_type(column.as_str(), *value_type);
                }
            }
        }

        builder.build(&self.context.types)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::RecordingLogger;
    use super::super::DialectFeatures;
    use super::*;
    use crate::driver::{ScriptedConnection, ScriptedResponse};
    use crate::entity::AttributeDescriptor;
    use crate::iterator::ResultIterator;
    use crate::observer::{CollectedReport, ResultCollector, StreamingCollector};
    use crate::types::{TypeCode, TypeRegistry, Value};

    fn shape() -> ResultShape {
        ResultShape::of([("ARTIST_ID", TypeCode::Integer), ("NAME", TypeCode::VarChar)])
    }

    fn context(features: DialectFeatures, logger: &RecordingLogger) -> ActionContext {
        ActionContext::new(features)
            .with_types(Arc::new(TypeRegistry::standard()))
            .with_logger(Arc::new(logger.clone()))
    }

    fn params(pairs: &[(&str, Value)]) -> TemplateParameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), TemplateValue::Scalar(v.clone())))
            .collect()
    }

    #[test]
    fn test_template_for_dialect() {
        let query = TemplateQuery::new("SELECT 1").with_dialect_template("oracle", "SELECT 1 FROM DUAL");
        assert_eq!(query.template_for("oracle").unwrap(), "SELECT 1 FROM DUAL");
        assert_eq!(query.template_for("sqlite").unwrap(), "SELECT 1");

        let query = TemplateQuery::default().with_dialect_template("oracle", "SELECT 1 FROM DUAL");
        assert!(matches!(
            query.template_for("sqlite"),
            Err(AccessError::Configuration(_))
        ));
    }

    #[test]
    fn test_interleaved_results_and_counts() {
        let conn = ScriptedConnection::new();
        conn.respond(
            ScriptedResponse::rows(shape(), vec![vec![Value::Int(1), Value::from("a")]])
                .then_count(4)
                .then_rows(shape(), vec![vec![Value::Int(2), Value::from("b")]])
                .then_count(-1),
        );
        let logger = RecordingLogger::default();
        let action = TemplateAction::new(
            TemplateQuery::new("EXEC REPORT"),
            context(DialectFeatures::named("test"), &logger),
        );

        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        assert_eq!(collector.row_sets().len(), 2);
        assert_eq!(collector.batch_counts(), vec![&[4][..]]);
        assert_eq!(collector.reports().len(), 3);
        assert!(matches!(
            collector.reports()[2],
            CollectedReport::BatchCount { .. }
        ));
        assert_eq!(conn.statements_closed(), 1);
        assert_eq!(conn.cursors_closed(), 2);
    }

    #[test]
    fn test_counts_collected_across_parameter_sets() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::count(1));
        conn.respond(ScriptedResponse::count(2));
        let logger = RecordingLogger::default();
        let query = TemplateQuery::new("UPDATE ARTIST SET NAME = #bind($name) WHERE ID = #bind($id)")
            .with_parameters(params(&[("name", Value::from("a")), ("id", Value::Int(1))]))
            .with_parameters(params(&[("name", Value::from("b")), ("id", Value::Int(2))]));

        let action = TemplateAction::new(query, context(DialectFeatures::named("test"), &logger));
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        assert_eq!(collector.batch_counts(), vec![&[1, 2][..]]);
        let executed = conn.executed();
        assert_eq!(executed.len(), 2);
        assert_eq!(
            executed[1].bindings,
            vec![(1, Value::from("b")), (2, Value::Int(2))]
        );
        assert_eq!(logger.queries().len(), 2);
    }

    #[test]
    fn test_positional_values_follow_variable_order() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::count(1));
        let logger = RecordingLogger::default();
        let query = TemplateQuery::new("DELETE FROM $table WHERE ID = #bind($id)")
            .with_positional(vec![TemplateValue::scalar("ARTIST"), TemplateValue::scalar(9)]);

        let action = TemplateAction::new(query, context(DialectFeatures::named("test"), &logger));
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        let executed = conn.executed();
        assert_eq!(executed[0].sql, "DELETE FROM ARTIST WHERE ID = ?");
        assert_eq!(executed[0].bindings, vec![(1, Value::Int(9))]);

        let too_many = TemplateQuery::new("SELECT $a")
            .with_positional(vec![TemplateValue::scalar(1), TemplateValue::scalar(2)]);
        let err = TemplateAction::new(too_many, context(DialectFeatures::named("test"), &logger))
            .execute(&conn.handle(), &mut collector)
            .unwrap_err();
        assert!(matches!(err, AccessError::Configuration(_)));
    }

    #[test]
    fn test_result_directive_types_columns() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(
            ResultShape::of([("id", TypeCode::Integer), ("NAME", TypeCode::VarChar)]),
            vec![vec![Value::Int(3), Value::from("Monet")]],
        ));
        let logger = RecordingLogger::default();
        let query = TemplateQuery::new(
            "SELECT #result('ARTIST_ID' 'String' 'id'), #result('NAME') FROM ARTIST",
        );

        let action = TemplateAction::new(query, context(DialectFeatures::named("test"), &logger));
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        let row = &collector.first_rows()[0];
        assert_eq!(row.get("id"), Some(&Value::from("3")));
        assert_eq!(row.get("NAME"), Some(&Value::from("Monet")));
        assert_eq!(conn.executed()[0].sql, "SELECT ARTIST_ID AS id, NAME FROM ARTIST");
    }

    #[test]
    fn test_result_directive_with_overrides_is_rejected() {
        let conn = ScriptedConnection::new();
        let logger = RecordingLogger::default();
        let query = TemplateQuery::new("SELECT #result('ID') FROM ARTIST")
            .with_type_override("ID", ValueType::Long);
        let err = TemplateAction::new(query, context(DialectFeatures::named("test"), &logger))
            .execute(&conn.handle(), &mut ResultCollector::new())
            .unwrap_err();
        assert!(matches!(err, AccessError::Configuration(_)));
        assert_eq!(conn.statements_prepared(), 0);
    }

    #[test]
    fn test_entity_and_override_types() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(
            shape(),
            vec![vec![Value::Int(3), Value::Int(42)]],
        ));
        let logger = RecordingLogger::default();
        let entity = EntityDescriptor::new("ARTIST").with_attribute(
            AttributeDescriptor::new("ARTIST_ID", TypeCode::BigInt).with_value_type(ValueType::String),
        );
        let query = TemplateQuery::new("SELECT * FROM ARTIST")
            .with_entity(Arc::new(entity))
            .with_type_override("name", ValueType::String);

        let action = TemplateAction::new(query, context(DialectFeatures::named("test"), &logger));
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        let row = &collector.first_rows()[0];
        assert_eq!(row.get("ARTIST_ID"), Some(&Value::from("3")));
        assert_eq!(row.get("NAME"), Some(&Value::from("42")));
    }

    #[test]
    fn test_generated_keys_reported_first() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::count(1).with_generated_keys(
            ResultShape::of([("ID", TypeCode::Integer)]),
            vec![vec![Value::Int(77)]],
        ));
        let logger = RecordingLogger::default();
        let query = TemplateQuery::new("INSERT INTO ARTIST (NAME) VALUES ('x')").returning_generated_keys();
        let features = DialectFeatures::named("test").with_generated_keys(true, false);

        let action = TemplateAction::new(query, context(features, &logger));
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        let reports = collector.reports();
        assert_eq!(reports.len(), 2);
        match &reports[0] {
            CollectedReport::Rows { rows } => assert_eq!(rows[0].get("ID"), Some(&Value::Int(77))),
            other => panic!("unexpected report: {:?}", other),
        }
        assert_eq!(reports[1], CollectedReport::BatchCount { counts: vec![1] });
        assert!(logger.events().contains(&"key:ID=77".to_string()));
    }

    #[test]
    fn test_iterated_template_rejects_several_parameter_sets() {
        let conn = ScriptedConnection::new();
        conn.respond(
            ScriptedResponse::rows(shape(), vec![vec![Value::Int(1), Value::from("a")]])
                .then_count(4),
        );
        conn.respond(ScriptedResponse::count(9));
        let logger = RecordingLogger::default();
        let query = TemplateQuery::new("SELECT * FROM ARTIST WHERE ID = #bind($id)")
            .with_parameters(params(&[("id", Value::Int(1))]))
            .with_parameters(params(&[("id", Value::Int(2))]));

        let action = TemplateAction::new(query, context(DialectFeatures::named("test"), &logger));
        let mut collector = StreamingCollector::new();
        let err = action.execute(&conn.handle(), &mut collector).unwrap_err();

        assert!(matches!(err, AccessError::Configuration(_)));
        assert_eq!(collector.iterator_count(), 0);
        assert!(collector.reports().is_empty());
        assert_eq!(conn.statements_prepared(), 0);
        assert_eq!(conn.pending_responses(), 2);
        assert_eq!(conn.connection_closes(), 0);
    }

    #[test]
    fn test_iterated_template_hands_over_first_result() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(
            shape(),
            vec![vec![Value::Int(1), Value::from("a")]],
        ));
        let logger = RecordingLogger::default();
        let query = TemplateQuery::new("SELECT * FROM ARTIST WHERE ID = #bind($id)")
            .with_parameters(params(&[("id", Value::Int(1))]));

        let action = TemplateAction::new(query, context(DialectFeatures::named("test"), &logger));
        let mut collector = StreamingCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        assert_eq!(collector.iterator_count(), 1);
        assert!(collector.reports().is_empty());
        assert_eq!(conn.statements_closed(), 0);

        let mut iterator = collector.take_iterator().unwrap();
        let rows = iterator.all_rows().unwrap();
        assert_eq!(rows[0].get("NAME"), Some(&Value::from("a")));
        iterator.close().unwrap();
        assert_eq!(conn.statements_closed(), 1);
        assert_eq!(conn.connection_closes(), 1);
    }

    #[test]
    fn test_failed_result_set_aborts_remaining_results() {
        let conn = ScriptedConnection::new();
        conn.respond(
            ScriptedResponse::rows(
                shape(),
                vec![
                    vec![Value::Int(1), Value::from("1840-11-14")],
                    vec![Value::Int(2), Value::from("not a date")],
                ],
            )
            .then_count(4)
            .then_rows(shape(), vec![vec![Value::Int(3), Value::from("1841-01-14")]]),
        );
        let logger = RecordingLogger::default();
        let query = TemplateQuery::new("EXEC BIRTHDAYS").with_type_override("NAME", ValueType::Date);

        let action = TemplateAction::new(query, context(DialectFeatures::named("test"), &logger));
        let mut collector = ResultCollector::new();
        let err = action.execute(&conn.handle(), &mut collector).unwrap_err();

        assert!(matches!(err, AccessError::Conversion(_)));
        assert!(collector.reports().is_empty());
        assert_eq!(conn.statements_closed(), 1);
        assert_eq!(conn.cursors_opened(), 1);
        assert_eq!(conn.cursors_closed(), 1);
        let events = logger.events();
        assert!(!events.contains(&"update:4".to_string()));
        assert!(events.iter().any(|e| e.starts_with("error:EXEC BIRTHDAYS")));
    }

    #[test]
    fn test_driver_error_is_logged_and_statement_closed() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::error(crate::error::DriverError::Sql(
            "no such table: ARTISTS".to_string(),
        )));
        let logger = RecordingLogger::default();
        let action = TemplateAction::new(
            TemplateQuery::new("SELECT * FROM ARTISTS"),
            context(DialectFeatures::named("test"), &logger),
        );
        let err = action
            .execute(&conn.handle(), &mut ResultCollector::new())
            .unwrap_err();
        assert!(matches!(err, AccessError::Driver(_)));
        assert_eq!(conn.statements_closed(), 1);
        assert!(logger
            .events()
            .iter()
            .any(|e| e.starts_with("error:SELECT * FROM ARTISTS")));
    }
}
