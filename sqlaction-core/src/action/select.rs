use std::sync::Arc;
use std::time::Instant;

use super::{close_quietly, drain, log_failure, report_iterator, ActionContext};
use crate::descriptor::{RowDescriptor, RowDescriptorBuilder};
use crate::driver::{ConnectionHandle, Cursor, ResultShape, Statement};
use crate::entity::EntityDescriptor;
use crate::error::AccessResult;
use crate::iterator::{
    ConnectionAwareResultIterator, CursorResultIterator, DistinctMode, DistinctResultIterator,
    LimitResultIterator, ResultIterator,
};
use crate::observer::{ActionKind, OperationObserver, Report, ReportContext, ResultRows};
use crate::query::QueryMetadata;
use crate::statement::{apply_metadata, CompiledStatement};

/// A translated select
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub statement: CompiledStatement,
    pub metadata: QueryMetadata,
    /// Root entity; its attribute types override driver column types
    pub entity: Option<Arc<EntityDescriptor>>,
    /// Joins in the translated SQL may repeat root rows
    pub suppress_distinct: bool,
    /// Compare whole rows instead of root primary keys when suppressing duplicates
    pub compare_full_rows: bool,
    /// The caller wants joined duplicates kept
    pub keep_duplicates: bool,
}

impl SelectQuery {
    pub fn new(statement: CompiledStatement) -> Self {
        Self {
            statement,
            metadata: QueryMetadata::default(),
            entity: None,
            suppress_distinct: false,
            compare_full_rows: false,
            keep_duplicates: false,
        }
    }

    pub fn with_metadata(mut self, metadata: QueryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_entity(mut self, entity: Arc<EntityDescriptor>) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Marks the SQL as producing duplicate root rows that must be dropped in memory.
    pub fn suppressing_distinct(mut self, compare_full_rows: bool) -> Self {
        self.suppress_distinct = true;
        self.compare_full_rows = compare_full_rows;
        self
    }

    pub fn keeping_duplicates(mut self) -> Self {
        self.keep_duplicates = true;
        self
    }

    fn distinct_mode(&self) -> Option<DistinctMode> {
        if !self.suppress_distinct || self.keep_duplicates {
            return None;
        }
        if self.compare_full_rows {
            return Some(DistinctMode::FullRow);
        }
        let keys = self
            .entity
            .as_ref()
            .map(|e| e.primary_key_names())
            .unwrap_or_default();
        Some(DistinctMode::PrimaryKey(keys))
    }
}

/// Runs a select and delivers its rows, streamed or materialized.
#[derive(Debug, Clone)]
pub struct SelectAction {
    query: SelectQuery,
    context: ActionContext,
}

impl SelectAction {
    pub fn new(query: SelectQuery, context: ActionContext) -> Self {
        Self { query, context }
    }

    pub fn query(&self) -> &SelectQuery {
        &self.query
    }

    pub fn execute(
        &self,
        connection: &ConnectionHandle,
        observer: &mut dyn OperationObserver,
    ) -> AccessResult<()> {
        let started = Instant::now();
        let compiled = &self.query.statement;
        let sql = compiled.sql();
        let report_context = ReportContext {
            kind: ActionKind::Select,
            name: self.query.metadata.name.as_deref(),
            sql,
        };

        self.context.logger.log_query(sql, compiled.bindings());
        let mut statement = connection
            .prepare(sql, false)
            .map_err(|e| log_failure(&self.context, sql, e.into()))?;
        let (cursor, descriptor) = match self.open(statement.as_mut()) {
            Ok(opened) => opened,
            Err(e) => {
                close_quietly(statement);
                return Err(log_failure(&self.context, sql, e));
            }
        };

        let base = CursorResultIterator::new(cursor, descriptor).with_statement(statement);
        let chain = self.filter(base)?;

        if observer.is_iterated_result() {
            let iterator = ConnectionAwareResultIterator::new(chain, connection.clone());
            report_iterator(iterator, &report_context, observer)
        } else {
            let rows = drain(chain)?;
            self.context
                .logger
                .log_select_count(rows.len(), started.elapsed(), sql);
            observer.next(&report_context, Report::Rows(ResultRows::Materialized(rows)))
        }
    }

    /// Binds, executes and describes the result. On failure after the cursor was opened,
    /// the cursor is closed here and the statement by the caller.
    fn open(&self, statement: &mut dyn Statement) -> AccessResult<(Box<dyn Cursor>, RowDescriptor)> {
        apply_metadata(statement, &self.query.metadata)?;
        self.query.statement.bind(statement, &self.context.types)?;
        let mut cursor = statement.execute_query()?;

        match self.describe(cursor.shape()) {
            Ok(descriptor) => Ok((cursor, descriptor)),
            Err(e) => {
                if let Err(close_err) = cursor.close() {
                    tracing::warn!("Error closing cursor after failure: {}", close_err);
                }
                Err(e)
            }
        }
    }

    fn describe(&self, shape: &ResultShape) -> AccessResult<RowDescriptor> {
        let mut builder = RowDescriptorBuilder::new()
            .with_shape(shape)
            .with_capitalization(self.query.metadata.capitalization)
            .validate_duplicates(true);

        match self.query.statement.result_columns() {
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
            }
        }

        builder.build(&self.context.types)
    }

    /// Layers duplicate suppression and in-memory paging over the base iterator.
    fn filter(&self, base: CursorResultIterator) -> AccessResult<Box<dyn ResultIterator>> {
        let mut chain: Box<dyn ResultIterator> = Box::new(base);

        let distinct = self.query.distinct_mode();
        let suppressing = distinct.is_some();
        if let Some(mode) = distinct {
            chain = Box::new(DistinctResultIterator::new(chain, mode)?);
        }

        let metadata = &self.query.metadata;
        let features = &self.context.features;
        let offset = if suppressing || !features.supports_native_offset {
            metadata.fetch_offset
        } else {
            0
        };
        let limit = if suppressing || !features.supports_native_limit {
            metadata.fetch_limit
        } else {
            0
        };
        if offset > 0 || limit > 0 {
            chain = Box::new(LimitResultIterator::new(chain, offset, limit)?);
        }

        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::RecordingLogger;
    use super::super::DialectFeatures;
    use super::*;
    use crate::descriptor::ColumnDescriptor;
    use crate::driver::{ScriptedConnection, ScriptedResponse};
    use crate::entity::AttributeDescriptor;
    use crate::error::{AccessError, DriverError};
    use crate::observer::{ResultCollector, StreamingCollector};
    use crate::query::Capitalization;
    use crate::statement::ParameterBinding;
    use crate::types::{TypeCode, TypeRegistry, Value, ValueType};

    fn shape() -> ResultShape {
        ResultShape::of([("ID", TypeCode::Integer), ("NAME", TypeCode::VarChar)])
    }

    fn rows(ids: &[i64]) -> Vec<Vec<Value>> {
        ids.iter()
            .map(|id| vec![Value::Int(*id), Value::Text(format!("artist {}", id))])
            .collect()
    }

    fn query() -> SelectQuery {
        SelectQuery::new(CompiledStatement::new(
            "SELECT ID, NAME FROM ARTIST WHERE ID > ?",
            vec![ParameterBinding::new(0, TypeCode::Integer)],
        ))
    }

    fn context(logger: &RecordingLogger) -> ActionContext {
        ActionContext::new(DialectFeatures::named("test"))
            .with_types(Arc::new(TypeRegistry::standard()))
            .with_logger(Arc::new(logger.clone()))
    }

    fn ids(rows: &[crate::row::DataRow]) -> Vec<i64> {
        rows.iter()
            .map(|r| r.get("ID").and_then(Value::as_i64).unwrap())
            .collect()
    }

    #[test]
    fn test_materialized_select_closes_statement() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(shape(), rows(&[1, 2])));
        let logger = RecordingLogger::default();

        let action = SelectAction::new(query(), context(&logger));
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        assert_eq!(ids(collector.first_rows()), vec![1, 2]);
        assert_eq!(conn.executed()[0].bindings, vec![(1, Value::Int(0))]);
        assert_eq!(conn.statements_closed(), 1);
        assert_eq!(conn.cursors_closed(), 1);
        assert_eq!(conn.connection_closes(), 0);
        assert_eq!(logger.queries().len(), 1);
        assert!(logger.events().contains(&"select:2".to_string()));
    }

    #[test]
    fn test_streamed_select_defers_close_to_iterator() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(shape(), rows(&[1, 2, 3])));
        let logger = RecordingLogger::default();

        let action = SelectAction::new(query(), context(&logger));
        let mut collector = StreamingCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();
        assert_eq!(conn.statements_closed(), 0);

        let mut it = collector.take_iterator().unwrap();
        assert_eq!(ids(&it.all_rows().unwrap()), vec![1, 2, 3]);
        it.close().unwrap();
        it.close().unwrap();
        assert_eq!(conn.statements_closed(), 1);
        assert_eq!(conn.connection_closes(), 1);
    }

    #[test]
    fn test_distinct_then_limit_in_memory() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(shape(), rows(&[1, 2, 1, 3, 2, 4])));
        let logger = RecordingLogger::default();

        let entity = Arc::new(
            EntityDescriptor::new("ARTIST")
                .with_attribute(AttributeDescriptor::new("ID", TypeCode::Integer).primary_key()),
        );
        let query = query()
            .with_entity(entity)
            .suppressing_distinct(false)
            .with_metadata(QueryMetadata::default().with_offset(1).with_limit(2));
        let mut ctx = context(&logger);
        ctx.features = ctx.features.with_native_paging(true, true);

        let mut collector = ResultCollector::new();
        SelectAction::new(query, ctx)
            .execute(&conn.handle(), &mut collector)
            .unwrap();
        assert_eq!(ids(collector.first_rows()), vec![2, 3]);
    }

    #[test]
    fn test_native_paging_skips_in_memory_filter() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(shape(), rows(&[5, 6, 7])));
        let logger = RecordingLogger::default();

        let mut ctx = context(&logger);
        ctx.features = ctx.features.with_native_paging(true, true);
        let query = query().with_metadata(QueryMetadata::default().with_offset(5).with_limit(1));

        let mut collector = ResultCollector::new();
        SelectAction::new(query, ctx)
            .execute(&conn.handle(), &mut collector)
            .unwrap();
        assert_eq!(ids(collector.first_rows()), vec![5, 6, 7]);
    }

    #[test]
    fn test_in_memory_paging_without_native_support() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(shape(), rows(&[1, 2, 3, 4, 5, 6])));
        let logger = RecordingLogger::default();

        let query = query().with_metadata(QueryMetadata::default().with_offset(2).with_limit(3));
        let mut collector = ResultCollector::new();
        SelectAction::new(query, context(&logger))
            .execute(&conn.handle(), &mut collector)
            .unwrap();
        assert_eq!(ids(collector.first_rows()), vec![3, 4, 5]);
    }

    #[test]
    fn test_entity_types_and_capitalization() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(
            ResultShape::of([("id", TypeCode::Numeric)]),
            vec![vec![Value::Decimal("7".to_string())]],
        ));
        let logger = RecordingLogger::default();

        let entity = Arc::new(EntityDescriptor::new("ARTIST").with_attribute(
            AttributeDescriptor::new("ID", TypeCode::BigInt).with_value_type(ValueType::Long),
        ));
        let query = query()
            .with_entity(entity)
            .with_metadata(QueryMetadata::default().with_capitalization(Capitalization::Upper));

        let mut collector = ResultCollector::new();
        SelectAction::new(query, context(&logger))
            .execute(&conn.handle(), &mut collector)
            .unwrap();
        let row = &collector.first_rows()[0];
        assert_eq!(row.keys(), &["ID".to_string()]);
        assert_eq!(row.get("ID"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_explicit_result_columns_win() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(shape(), rows(&[1])));
        let logger = RecordingLogger::default();

        let statement = CompiledStatement::new("SELECT ID, NAME FROM ARTIST", vec![])
            .with_result_columns(vec![
                ColumnDescriptor::new("ID", TypeCode::Integer)
                    .with_row_key("artistId")
                    .with_value_type(ValueType::String),
                ColumnDescriptor::new("NAME", TypeCode::VarChar).with_row_key("artistName"),
            ]);
        let mut collector = ResultCollector::new();
        SelectAction::new(SelectQuery::new(statement), context(&logger))
            .execute(&conn.handle(), &mut collector)
            .unwrap();
        let row = &collector.first_rows()[0];
        assert_eq!(row.get("artistId"), Some(&Value::from("1")));
        assert_eq!(row.get("artistName"), Some(&Value::from("artist 1")));
    }

    #[test]
    fn test_driver_error_closes_statement_and_propagates() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::error(DriverError::Timeout(5)));
        let logger = RecordingLogger::default();

        let query = query().with_metadata(QueryMetadata::default().with_timeout(5));
        let err = SelectAction::new(query, context(&logger))
            .execute(&conn.handle(), &mut ResultCollector::new())
            .unwrap_err();
        assert!(matches!(err, AccessError::Driver(DriverError::Timeout(5))));
        assert_eq!(conn.statements_closed(), 1);
        assert_eq!(conn.executed()[0].timeout, Some(5));
        assert!(logger.events().iter().any(|e| e.starts_with("error:")));
    }

    struct FailingObserver;

    impl OperationObserver for FailingObserver {
        fn is_iterated_result(&self) -> bool {
            true
        }

        fn next(&mut self, _context: &ReportContext<'_>, report: Report) -> AccessResult<()> {
            // keep the iterator alive so only the action can close it
            std::mem::forget(report);
            Err(AccessError::configuration("observer failed"))
        }
    }

    #[test]
    fn test_observer_failure_closes_streamed_iterator() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::rows(shape(), rows(&[1])));
        let logger = RecordingLogger::default();

        let err = SelectAction::new(query(), context(&logger))
            .execute(&conn.handle(), &mut FailingObserver)
            .unwrap_err();
        assert!(matches!(err, AccessError::Configuration(_)));
        assert_eq!(conn.statements_closed(), 1);
        assert_eq!(conn.connection_closes(), 1);
    }
}
