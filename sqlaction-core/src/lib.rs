//! sqlaction core - SQL action execution and result streaming.
//!
//! Turns already translated queries into driver calls and delivers results to an
//! observer, either fully materialized or as live iterators that hold their database
//! resources until closed.
//!
//! # Main Components
//!
//! - **Actions**: select, batch (insert/update/delete), stored procedure and SQL template
//!   executors, all reporting through [`OperationObserver`]
//! - **Iterators**: the [`ResultIterator`] chain (cursor, duplicate suppression, in-memory
//!   paging, connection ownership)
//! - **Descriptors**: [`RowDescriptor`] and its builder, mapping driver columns to typed
//!   row values
//! - **Driver**: the [`Connection`]/[`Statement`]/[`Cursor`] traits a database adapter
//!   implements, plus [`ScriptedConnection`] for tests
//!
//! # Example
//!
//! ```rust
//! use sqlaction_core::{
//!     ActionContext, CompiledStatement, DialectFeatures, ResultCollector, ResultShape,
//!     ScriptedConnection, ScriptedResponse, SelectAction, SelectQuery, TypeCode, Value,
//! };
//!
//! let conn = ScriptedConnection::new();
//! conn.respond(ScriptedResponse::rows(
//!     ResultShape::of([("ID", TypeCode::Integer)]),
//!     vec![vec![Value::Int(1)], vec![Value::Int(2)]],
//! ));
//!
//! let query = SelectQuery::new(CompiledStatement::new("SELECT ID FROM ARTIST", vec![]));
//! let action = SelectAction::new(query, ActionContext::new(DialectFeatures::named("sqlite")));
//!
//! let mut collector = ResultCollector::new();
//! action.execute(&conn.handle(), &mut collector).unwrap();
//! assert_eq!(collector.first_rows().len(), 2);
//! ```

pub mod action;
pub mod descriptor;
pub mod driver;
pub mod entity;
pub mod error;
pub mod iterator;
pub mod logger;
pub mod observer;
pub mod query;
pub mod row;
pub mod statement;
pub mod template;
pub mod types;

// Re-export main types for convenience
pub use action::{
    ActionContext, BatchAction, BatchKind, BatchQuery, BatchQueryRow, BatchTranslator,
    DialectFeatures, ParameterDirection, PositionalBatchTranslator, ProcedureAction,
    ProcedureDescriptor, ProcedureParameter, ProcedureQuery, ProcedureTranslator, SelectAction,
    SelectQuery, SqlAction, TemplateAction, TemplateQuery,
};
pub use descriptor::{ColumnDescriptor, RowDescriptor, RowDescriptorBuilder};
pub use driver::{
    BufferedCursor, Connection, ConnectionHandle, Cursor, RawColumn, ResultShape,
    ScriptedConnection, ScriptedResponse, Statement,
};
pub use entity::{AttributeDescriptor, EntityDescriptor, ObjectId, ObjectKey};
pub use error::{AccessError, AccessResult, DriverError, DriverResult, OptimisticLockFailure};
pub use iterator::{
    BoxedRowIterator, ConnectionAwareResultIterator, CursorResultIterator, DistinctMode,
    DistinctResultIterator, LimitResultIterator, ResultIterator, Rows,
};
pub use logger::{QueryLogger, TracingQueryLogger};
pub use observer::{
    ActionKind, CollectedReport, OperationObserver, Report, ReportContext, ResultCollector,
    ResultRows, StreamingCollector,
};
pub use query::{Capitalization, QueryMetadata};
pub use row::DataRow;
pub use statement::{CompiledStatement, ParameterBinding};
pub use template::{TemplateParameters, TemplateProcessor, TemplateValue};
pub use types::{TypeCode, TypeConverter, TypeRegistry, Value, ValueType};
