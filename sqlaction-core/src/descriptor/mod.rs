//! Column and row descriptors.
//!
//! A [`RowDescriptor`] is the shape of a result row: its columns and, in parallel, the
//! converter materializing each column. Descriptors are assembled per execution by
//! [`RowDescriptorBuilder`].

mod builder;

pub use builder::RowDescriptorBuilder;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::{Cursor, RawColumn};
use crate::entity::AttributeDescriptor;
use crate::error::AccessResult;
use crate::row::DataRow;
use crate::types::{TypeCode, TypeConverter, TypeRegistry, ValueType};

/// One result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,
    /// Key of the column in result rows
    pub data_row_key: String,
    pub type_code: TypeCode,
    pub value_type: ValueType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, type_code: TypeCode) -> Self {
        let name = name.into();
        Self {
            data_row_key: name.clone(),
            name,
            type_code,
            value_type: type_code.default_value_type(),
        }
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_row_key(mut self, key: impl Into<String>) -> Self {
        self.data_row_key = key.into();
        self
    }

    /// Describes a column straight from driver metadata.
    pub fn from_raw(raw: &RawColumn) -> Self {
        Self::new(raw.row_key(), raw.type_code)
    }

    /// Describes a column from a mapped attribute, keeping its declared value type.
    pub fn from_attribute(attribute: &AttributeDescriptor) -> Self {
        Self::new(attribute.name.clone(), attribute.type_code)
            .with_value_type(attribute.effective_value_type())
    }

    /// Case-insensitive match against the column name or its row key.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.data_row_key.eq_ignore_ascii_case(name)
    }
}

/// Columns of a result row together with their converters
#[derive(Clone)]
pub struct RowDescriptor {
    columns: Vec<ColumnDescriptor>,
    converters: Vec<Arc<dyn TypeConverter>>,
    keys: Arc<[String]>,
}

impl RowDescriptor {
    /// Resolves one converter per column from `registry`.
    pub fn new(columns: Vec<ColumnDescriptor>, registry: &TypeRegistry) -> Self {
        let converters = columns
            .iter()
            .map(|c| registry.converter(c.value_type))
            .collect();
        let keys: Vec<String> = columns.iter().map(|c| c.data_row_key.clone()).collect();
        Self {
            columns,
            converters,
            keys: keys.into(),
        }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn converters(&self) -> &[Arc<dyn TypeConverter>] {
        &self.converters
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn keys(&self) -> Arc<[String]> {
        self.keys.clone()
    }

    /// Materializes the cursor's current row.
    pub fn read_row(&self, cursor: &dyn Cursor) -> AccessResult<DataRow> {
        let mut values = Vec::with_capacity(self.columns.len());
        for (i, (column, converter)) in self.columns.iter().zip(&self.converters).enumerate() {
            let raw = cursor.value(i)?;
            values.push(converter.materialize(raw, column.type_code)?);
        }
        Ok(DataRow::new(self.keys.clone(), values))
    }
}

impl fmt::Debug for RowDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowDescriptor")
            .field("columns", &self.columns)
            .finish()
    }
}
