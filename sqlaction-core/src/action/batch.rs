use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{drain, log_failure, with_statement, ActionContext};
use crate::descriptor::{ColumnDescriptor, RowDescriptor, RowDescriptorBuilder};
use crate::driver::{ConnectionHandle, ResultShape, Statement};
use crate::entity::{AttributeDescriptor, EntityDescriptor, ObjectId};
use crate::error::{AccessError, AccessResult, OptimisticLockFailure};
use crate::iterator::CursorResultIterator;
use crate::observer::{ActionKind, OperationObserver, Report, ReportContext};
use crate::query::QueryMetadata;
use crate::row::DataRow;
use crate::statement::{apply_metadata, CompiledStatement, ParameterBinding};
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Insert,
    Update,
    Delete,
}

/// Values of one object's change
#[derive(Debug, Clone, PartialEq)]
pub struct BatchQueryRow {
    pub object_id: ObjectId,
    /// Values of the written attributes
    pub values: BTreeMap<String, Value>,
    /// Values of the WHERE clause attributes, as read when the object was fetched
    pub qualifier: BTreeMap<String, Value>,
}

impl BatchQueryRow {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            values: BTreeMap::new(),
            qualifier: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(attribute.into(), value.into());
        self
    }

    pub fn with_qualifier(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.qualifier.insert(attribute.into(), value.into());
        self
    }
}

/// A homogeneous set of row changes against one entity
#[derive(Debug, Clone)]
pub struct BatchQuery {
    pub kind: BatchKind,
    pub entity: Arc<EntityDescriptor>,
    /// Attributes written by INSERT and UPDATE, in binding order
    pub updated_attributes: Vec<String>,
    /// Attributes of the WHERE clause of UPDATE and DELETE, in binding order
    pub qualifier_attributes: Vec<String>,
    pub rows: Vec<BatchQueryRow>,
    /// Every row must change exactly one database row
    pub optimistic_locking: bool,
    pub metadata: QueryMetadata,
}

impl BatchQuery {
    fn with_kind(kind: BatchKind, entity: Arc<EntityDescriptor>) -> Self {
        Self {
            kind,
            entity,
            updated_attributes: Vec::new(),
            qualifier_attributes: Vec::new(),
            rows: Vec::new(),
            optimistic_locking: false,
            metadata: QueryMetadata::default(),
        }
    }

    pub fn insert<S: Into<String>>(
        entity: Arc<EntityDescriptor>,
        attributes: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut query = Self::with_kind(BatchKind::Insert, entity);
        query.updated_attributes = attributes.into_iter().map(Into::into).collect();
        query
    }

    pub fn update<S: Into<String>, Q: Into<String>>(
        entity: Arc<EntityDescriptor>,
        attributes: impl IntoIterator<Item = S>,
        qualifier: impl IntoIterator<Item = Q>,
    ) -> Self {
        let mut query = Self::with_kind(BatchKind::Update, entity);
        query.updated_attributes = attributes.into_iter().map(Into::into).collect();
        query.qualifier_attributes = qualifier.into_iter().map(Into::into).collect();
        query
    }

    pub fn delete<Q: Into<String>>(
        entity: Arc<EntityDescriptor>,
        qualifier: impl IntoIterator<Item = Q>,
    ) -> Self {
        let mut query = Self::with_kind(BatchKind::Delete, entity);
        query.qualifier_attributes = qualifier.into_iter().map(Into::into).collect();
        query
    }

    pub fn with_row(mut self, row: BatchQueryRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn with_optimistic_locking(mut self) -> Self {
        self.optimistic_locking = true;
        self
    }

    pub fn with_metadata(mut self, metadata: QueryMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Produces the SQL and bindings of one batch row.
pub trait BatchTranslator: Send + Sync + fmt::Debug {
    fn sql(&self, query: &BatchQuery, row: &BatchQueryRow) -> AccessResult<String>;

    fn bindings(&self, query: &BatchQuery, row: &BatchQueryRow)
        -> AccessResult<Vec<ParameterBinding>>;

    fn compile(&self, query: &BatchQuery, row: &BatchQueryRow) -> AccessResult<CompiledStatement> {
        Ok(CompiledStatement::new(
            self.sql(query, row)?,
            self.bindings(query, row)?,
        ))
    }
}

/// Renders `INSERT`, `UPDATE` and `DELETE` with `?` placeholders.
///
/// A NULL qualifier value renders as `IS NULL` and its binding is excluded, so rows with
/// different NULL patterns produce different SQL.
#[derive(Debug, Default, Clone, Copy)]
pub struct PositionalBatchTranslator;

impl PositionalBatchTranslator {
    fn attribute<'a>(query: &'a BatchQuery, name: &str) -> AccessResult<&'a AttributeDescriptor> {
        query.entity.attribute(name).ok_or_else(|| {
            AccessError::Configuration(format!(
                "entity '{}' has no attribute '{}'",
                query.entity.name, name
            ))
        })
    }

    fn where_clause(query: &BatchQuery, row: &BatchQueryRow) -> String {
        let conditions: Vec<String> = query
            .qualifier_attributes
            .iter()
            .map(|name| match row.qualifier.get(name) {
                Some(Value::Null) | None => format!("{} IS NULL", name),
                Some(_) => format!("{} = ?", name),
            })
            .collect();
        conditions.join(" AND ")
    }
}

impl BatchTranslator for PositionalBatchTranslator {
    fn sql(&self, query: &BatchQuery, row: &BatchQueryRow) -> AccessResult<String> {
        let table = &query.entity.name;
        let sql = match query.kind {
            BatchKind::Insert => {
                let placeholders = vec!["?"; query.updated_attributes.len()].join(", ");
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table,
                    query.updated_attributes.join(", "),
                    placeholders
                )
            }
            BatchKind::Update => {
                let assignments: Vec<String> = query
                    .updated_attributes
                    .iter()
                    .map(|a| format!("{} = ?", a))
                    .collect();
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    table,
                    assignments.join(", "),
                    Self::where_clause(query, row)
                )
            }
            BatchKind::Delete => {
                format!("DELETE FROM {} WHERE {}", table, Self::where_clause(query, row))
            }
        };
        Ok(sql)
    }

    fn bindings(
        &self,
        query: &BatchQuery,
        row: &BatchQueryRow,
    ) -> AccessResult<Vec<ParameterBinding>> {
        let mut bindings = Vec::new();

        if query.kind != BatchKind::Delete {
            for name in &query.updated_attributes {
                let attribute = Self::attribute(query, name)?;
                let value = row.values.get(name).cloned().unwrap_or(Value::Null);
                bindings.push(
                    ParameterBinding::new(value, attribute.type_code)
                        .with_value_type(attribute.effective_value_type()),
                );
            }
        }

        if query.kind != BatchKind::Insert {
            for name in &query.qualifier_attributes {
                let attribute = Self::attribute(query, name)?;
                let value = row.qualifier.get(name).cloned().unwrap_or(Value::Null);
                let binding = ParameterBinding::new(value, attribute.type_code)
                    .with_value_type(attribute.effective_value_type());
                bindings.push(if binding.value.is_null() {
                    binding.excluded()
                } else {
                    binding
                });
            }
        }

        Ok(bindings)
    }
}

/// Executes a batch of row changes, as one driver batch when possible and row by row
/// otherwise.
#[derive(Debug, Clone)]
pub struct BatchAction {
    query: BatchQuery,
    context: ActionContext,
    translator: Arc<dyn BatchTranslator>,
}

impl BatchAction {
    pub fn new(query: BatchQuery, context: ActionContext) -> Self {
        Self {
            query,
            context,
            translator: Arc::new(PositionalBatchTranslator),
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn BatchTranslator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn query(&self) -> &BatchQuery {
        &self.query
    }

    /// Whether inserted rows report generated keys.
    pub fn generates_keys(&self) -> bool {
        self.query.kind == BatchKind::Insert
            && self.context.features.supports_generated_keys
            && self.query.entity.has_generated_keys()
    }

    /// Whether the rows would be sent as one driver batch.
    pub fn runs_as_batch(&self) -> AccessResult<bool> {
        Ok(self.batch_eligible(&self.compile_rows()?))
    }

    fn batch_eligible(&self, compiled: &[CompiledStatement]) -> bool {
        let features = &self.context.features;
        if compiled.len() < 2 || !features.supports_batch_updates || self.query.optimistic_locking
        {
            return false;
        }
        if compiled.iter().any(|c| c.sql() != compiled[0].sql()) {
            return false;
        }
        if self.generates_keys() {
            // rows of a self-referential entity may bind keys generated for earlier rows
            return features.supports_batch_generated_keys && !self.query.entity.self_referential;
        }
        true
    }

    fn compile_rows(&self) -> AccessResult<Vec<CompiledStatement>> {
        self.query
            .rows
            .iter()
            .map(|row| self.translator.compile(&self.query, row))
            .collect()
    }

    pub fn execute(
        &self,
        connection: &ConnectionHandle,
        observer: &mut dyn OperationObserver,
    ) -> AccessResult<()> {
        let compiled = self.compile_rows()?;
        if compiled.is_empty() {
            return Ok(());
        }

        if self.batch_eligible(&compiled) {
            self.run_as_batch(connection, observer, &compiled)
        } else {
            self.run_individually(connection, observer, &compiled)
        }
    }

    fn run_as_batch(
        &self,
        connection: &ConnectionHandle,
        observer: &mut dyn OperationObserver,
        compiled: &[CompiledStatement],
    ) -> AccessResult<()> {
        let sql = compiled[0].sql();
        let report_context = ReportContext {
            kind: ActionKind::Batch,
            name: self.query.metadata.name.as_deref(),
            sql,
        };
        let generates_keys = self.generates_keys();

        let batch: Vec<Vec<ParameterBinding>> =
            compiled.iter().map(|c| c.bindings().to_vec()).collect();
        self.context.logger.log_batch(sql, &batch);

        let statement = connection
            .prepare(sql, generates_keys)
            .map_err(|e| log_failure(&self.context, sql, e.into()))?;
        let (counts, keys) = with_statement(statement, |statement| {
            apply_metadata(statement, &self.query.metadata)?;
            for row in compiled {
                row.bind(statement, &self.context.types)?;
                statement.add_batch()?;
            }
            let counts = statement.execute_batch()?;
            let keys = if generates_keys {
                self.read_generated_keys(statement)?
            } else {
                None
            };
            Ok((counts, keys))
        })
        .map_err(|e| log_failure(&self.context, sql, e))?;

        let total = if counts.iter().any(|c| *c < 0) {
            -1
        } else {
            counts.iter().sum()
        };
        observer.next(&report_context, Report::BatchCount(counts))?;
        self.context.logger.log_update_count(total);

        if let Some(keys) = keys {
            let ids = self.query.rows.iter().map(|r| r.object_id.clone()).collect();
            observer.next(&report_context, Report::GeneratedRows { keys, ids })?;
        }
        Ok(())
    }

    fn run_individually(
        &self,
        connection: &ConnectionHandle,
        observer: &mut dyn OperationObserver,
        compiled: &[CompiledStatement],
    ) -> AccessResult<()> {
        let generates_keys = self.generates_keys();

        for (row, statement_sql) in self.query.rows.iter().zip(compiled) {
            let sql = statement_sql.sql();
            let report_context = ReportContext {
                kind: ActionKind::Batch,
                name: self.query.metadata.name.as_deref(),
                sql,
            };

            self.context.logger.log_query(sql, statement_sql.bindings());
            let statement = connection
                .prepare(sql, generates_keys)
                .map_err(|e| log_failure(&self.context, sql, e.into()))?;
            let (count, keys) = with_statement(statement, |statement| {
                apply_metadata(statement, &self.query.metadata)?;
                statement_sql.bind(statement, &self.context.types)?;
                let count = statement.execute_update()?;
                let keys = if generates_keys && count > 0 {
                    self.read_generated_keys(statement)?
                } else {
                    None
                };
                Ok((count, keys))
            })
            .map_err(|e| log_failure(&self.context, sql, e))?;

            observer.next(&report_context, Report::Count(count))?;
            self.context.logger.log_update_count(count);

            if self.query.optimistic_locking && count != 1 {
                return Err(AccessError::OptimisticLock(Box::new(OptimisticLockFailure {
                    object_id: row.object_id.clone(),
                    entity: self.query.entity.name.clone(),
                    sql: sql.to_string(),
                    qualifier: row.qualifier.clone(),
                    update_count: count,
                })));
            }

            if let Some(keys) = keys {
                observer.next(
                    &report_context,
                    Report::GeneratedRows {
                        keys,
                        ids: vec![row.object_id.clone()],
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Reads the generated key cursor of the last execution, if the driver returned one.
    fn read_generated_keys(&self, statement: &mut dyn Statement) -> AccessResult<Option<Vec<DataRow>>> {
        let Some(mut cursor) = statement.generated_keys()? else {
            return Ok(None);
        };
        let descriptor = match self.key_descriptor(cursor.shape()) {
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

    /// With exactly one generated key attribute, the key column takes its name from the
    /// cursor and its types from the attribute. Otherwise the cursor is described as is.
    fn key_descriptor(&self, shape: &ResultShape) -> AccessResult<RowDescriptor> {
        let generated: Vec<&AttributeDescriptor> = self.query.entity.generated_keys().collect();
        let builder = match (generated.as_slice(), shape.columns.first()) {
            ([key], Some(raw)) => {
                let mut column = ColumnDescriptor::from_raw(raw)
                    .with_value_type(key.effective_value_type());
                column.type_code = key.type_code;
                RowDescriptorBuilder::new().with_columns(vec![column])
            }
            _ => RowDescriptorBuilder::new().with_shape(shape),
        };
        builder.build(&self.context.types)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::RecordingLogger;
    use super::super::DialectFeatures;
    use super::*;
    use crate::driver::{ScriptedConnection, ScriptedResponse};
    use crate::observer::ResultCollector;
    use crate::types::{TypeCode, TypeRegistry};

    fn artist(self_referential: bool) -> Arc<EntityDescriptor> {
        Arc::new(
            EntityDescriptor::new("ARTIST")
                .with_attribute(
                    AttributeDescriptor::new("ID", TypeCode::BigInt)
                        .primary_key()
                        .generated(),
                )
                .with_attribute(AttributeDescriptor::new("NAME", TypeCode::VarChar))
                .with_attribute(AttributeDescriptor::new("VERSION", TypeCode::Integer))
                .self_referential(self_referential),
        )
    }

    fn insert(entity: Arc<EntityDescriptor>, names: &[&str]) -> BatchQuery {
        names.iter().fold(BatchQuery::insert(entity, ["NAME"]), |q, name| {
            q.with_row(BatchQueryRow::new(ObjectId::temporary("Artist")).with_value("NAME", *name))
        })
    }

    fn features() -> DialectFeatures {
        DialectFeatures::named("test")
            .with_batch_updates(true)
            .with_generated_keys(true, true)
    }

    fn context(features: DialectFeatures, logger: &RecordingLogger) -> ActionContext {
        ActionContext::new(features)
            .with_types(Arc::new(TypeRegistry::standard()))
            .with_logger(Arc::new(logger.clone()))
    }

    fn versioned_update(rows: usize) -> BatchQuery {
        (1..=rows as i64).fold(
            BatchQuery::update(artist(false), ["NAME"], ["ID", "VERSION"]).with_optimistic_locking(),
            |q, id| {
                q.with_row(
                    BatchQueryRow::new(ObjectId::permanent("Artist", [("ID", Value::Int(id))]))
                        .with_value("NAME", format!("renamed {}", id))
                        .with_qualifier("ID", id)
                        .with_qualifier("VERSION", 1),
                )
            },
        )
    }

    #[test]
    fn test_translator_renders_statements() {
        let translator = PositionalBatchTranslator;
        let query = BatchQuery::update(artist(false), ["NAME"], ["ID", "VERSION"]);
        let row = BatchQueryRow::new(ObjectId::temporary("Artist"))
            .with_value("NAME", "x")
            .with_qualifier("ID", 1);

        let compiled = translator.compile(&query, &row).unwrap();
        assert_eq!(
            compiled.sql(),
            "UPDATE ARTIST SET NAME = ? WHERE ID = ? AND VERSION IS NULL"
        );
        assert_eq!(compiled.bound().count(), 2);

        let insert = insert(artist(false), &["a"]);
        let compiled = translator.compile(&insert, &insert.rows[0]).unwrap();
        assert_eq!(compiled.sql(), "INSERT INTO ARTIST (NAME) VALUES (?)");

        let delete = BatchQuery::delete(artist(false), ["ID"]);
        assert_eq!(
            translator.sql(&delete, &row).unwrap(),
            "DELETE FROM ARTIST WHERE ID = ?"
        );
    }

    #[test]
    fn test_unknown_attribute_is_configuration_error() {
        let query = BatchQuery::insert(artist(false), ["MISSING"])
            .with_row(BatchQueryRow::new(ObjectId::temporary("Artist")));
        let err = PositionalBatchTranslator
            .bindings(&query, &query.rows[0])
            .unwrap_err();
        assert!(matches!(err, AccessError::Configuration(_)));
    }

    #[test]
    fn test_batch_mode_selection() {
        let logger = RecordingLogger::default();

        let single = BatchAction::new(insert(artist(false), &["a"]), context(features(), &logger));
        assert!(!single.runs_as_batch().unwrap());

        let many = BatchAction::new(insert(artist(false), &["a", "b"]), context(features(), &logger));
        assert!(many.runs_as_batch().unwrap());

        let self_ref = BatchAction::new(insert(artist(true), &["a", "b"]), context(features(), &logger));
        assert!(!self_ref.runs_as_batch().unwrap());

        let no_batch_keys = BatchAction::new(
            insert(artist(false), &["a", "b"]),
            context(features().with_generated_keys(true, false), &logger),
        );
        assert!(!no_batch_keys.runs_as_batch().unwrap());

        let no_batches = BatchAction::new(
            insert(artist(false), &["a", "b"]),
            context(features().with_batch_updates(false), &logger),
        );
        assert!(!no_batches.runs_as_batch().unwrap());

        let locked = BatchAction::new(versioned_update(2), context(features(), &logger));
        assert!(!locked.runs_as_batch().unwrap());
    }

    #[test]
    fn test_rows_with_different_sql_run_individually() {
        let query = BatchQuery::delete(artist(false), ["ID", "VERSION"])
            .with_row(
                BatchQueryRow::new(ObjectId::temporary("Artist"))
                    .with_qualifier("ID", 1)
                    .with_qualifier("VERSION", 1),
            )
            .with_row(BatchQueryRow::new(ObjectId::temporary("Artist")).with_qualifier("ID", 2));
        let logger = RecordingLogger::default();
        let action = BatchAction::new(query, context(features(), &logger));
        assert!(!action.runs_as_batch().unwrap());

        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::count(1));
        conn.respond(ScriptedResponse::count(1));
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        assert_eq!(
            conn.executed_sql(),
            vec![
                "DELETE FROM ARTIST WHERE ID = ? AND VERSION = ?",
                "DELETE FROM ARTIST WHERE ID = ? AND VERSION IS NULL",
            ]
        );
        assert_eq!(collector.counts(), vec![1, 1]);
    }

    #[test]
    fn test_batch_execution_reports_counts_and_keys() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::batch(vec![1, 1]).with_generated_keys(
            ResultShape::of([("GENERATED_KEY", TypeCode::Integer)]),
            vec![vec![Value::Int(10)], vec![Value::Int(11)]],
        ));
        let logger = RecordingLogger::default();
        let query = insert(artist(false), &["a", "b"]);
        let ids: Vec<ObjectId> = query.rows.iter().map(|r| r.object_id.clone()).collect();

        let action = BatchAction::new(query, context(features(), &logger));
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        assert_eq!(collector.batch_counts(), vec![&[1, 1][..]]);
        let generated = collector.generated();
        assert_eq!(generated.len(), 1);
        let (keys, key_ids) = generated[0];
        assert_eq!(key_ids, &ids[..]);
        assert_eq!(keys[1].get("GENERATED_KEY"), Some(&Value::Int(11)));

        let executed = conn.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].batch.len(), 2);
        assert_eq!(conn.statements_closed(), 1);
        assert_eq!(conn.cursors_closed(), 1);
        assert_eq!(
            logger.events(),
            vec![
                "batch:INSERT INTO ARTIST (NAME) VALUES (?) (2)",
                "key:GENERATED_KEY=10",
                "key:GENERATED_KEY=11",
                "update:2",
            ]
        );
    }

    #[test]
    fn test_individual_inserts_report_keys_per_row() {
        let conn = ScriptedConnection::new();
        for key in [5, 6] {
            conn.respond(ScriptedResponse::count(1).with_generated_keys(
                ResultShape::of([("ID", TypeCode::Integer), ("ROWID", TypeCode::Integer)]),
                vec![vec![Value::Int(key), Value::Int(key)]],
            ));
        }
        let logger = RecordingLogger::default();
        let query = insert(artist(true), &["a", "b"]);
        let second = query.rows[1].object_id.clone();

        let action = BatchAction::new(query, context(features(), &logger));
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();

        assert_eq!(collector.counts(), vec![1, 1]);
        let generated = collector.generated();
        assert_eq!(generated.len(), 2);
        // a single generated key attribute reads only the first key column
        assert_eq!(generated[1].0[0].len(), 1);
        assert_eq!(generated[1].0[0].get("ID"), Some(&Value::Int(6)));
        assert_eq!(generated[1].1, &[second][..]);
        assert_eq!(conn.statements_closed(), 2);
    }

    #[test]
    fn test_optimistic_lock_failure_stops_batch() {
        let conn = ScriptedConnection::new();
        conn.respond(ScriptedResponse::count(1));
        conn.respond(ScriptedResponse::count(0));
        conn.respond(ScriptedResponse::count(1));
        let logger = RecordingLogger::default();

        let action = BatchAction::new(versioned_update(3), context(features(), &logger));
        let mut collector = ResultCollector::new();
        let err = action.execute(&conn.handle(), &mut collector).unwrap_err();

        match err {
            AccessError::OptimisticLock(failure) => {
                assert_eq!(failure.update_count, 0);
                assert_eq!(failure.entity, "ARTIST");
                assert_eq!(
                    failure.object_id,
                    ObjectId::permanent("Artist", [("ID", Value::Int(2))])
                );
                assert_eq!(failure.qualifier.get("VERSION"), Some(&Value::Int(1)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(collector.counts(), vec![1, 0]);
        assert_eq!(conn.executed().len(), 2);
        assert_eq!(conn.pending_responses(), 1);
        assert_eq!(conn.statements_closed(), 2);
    }

    #[test]
    fn test_empty_batch_does_nothing() {
        let conn = ScriptedConnection::new();
        let logger = RecordingLogger::default();
        let action = BatchAction::new(
            BatchQuery::insert(artist(false), ["NAME"]),
            context(features(), &logger),
        );
        let mut collector = ResultCollector::new();
        action.execute(&conn.handle(), &mut collector).unwrap();
        assert!(collector.reports().is_empty());
        assert_eq!(conn.statements_prepared(), 0);
    }
}
