use std::collections::HashMap;

use super::{ColumnDescriptor, RowDescriptor};
use crate::driver::ResultShape;
use crate::error::{AccessError, AccessResult};
use crate::query::Capitalization;
use crate::types::{TypeRegistry, ValueType};

/// Assembles a [`RowDescriptor`] from explicit columns, a driver result shape, or both.
///
/// When both are given, explicit columns win over the shape by case-insensitive name;
/// result columns with no explicit counterpart are described from the shape.
#[derive(Debug, Default)]
pub struct RowDescriptorBuilder<'a> {
    columns: Option<Vec<ColumnDescriptor>>,
    shape: Option<&'a ResultShape>,
    capitalization: Capitalization,
    type_overrides: HashMap<String, ValueType>,
    strict: bool,
    validate_duplicates: bool,
}

impl<'a> RowDescriptorBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit columns; an empty list counts as none.
    pub fn with_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.columns = if columns.is_empty() { None } else { Some(columns) };
        self
    }

    pub fn with_shape(mut self, shape: &'a ResultShape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_capitalization(mut self, capitalization: Capitalization) -> Self {
        self.capitalization = capitalization;
        self
    }

    /// Forces the value type of the column named `name`, matched after the case policy
    /// is applied.
    pub fn override_type(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.type_overrides
            .insert(name.into().to_lowercase(), value_type);
        self
    }

    /// Requires explicit columns and the result shape to have the same width.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Logs every duplicated column name and row key after the case policy is applied.
    pub fn validate_duplicates(mut self, validate: bool) -> Self {
        self.validate_duplicates = validate;
        self
    }

    pub fn build(self, registry: &TypeRegistry) -> AccessResult<RowDescriptor> {
        let mut columns = match (self.columns, self.shape) {
            (_, Some(shape)) if shape.is_empty() => {
                return Err(AccessError::configuration("no columns in result"));
            }
            (Some(explicit), Some(shape)) => {
                if explicit.len() == shape.len() {
                    explicit
                } else if self.strict {
                    return Err(AccessError::Configuration(format!(
                        "{} explicit result columns declared, but the result has {}",
                        explicit.len(),
                        shape.len()
                    )));
                } else {
                    merge(explicit, shape)
                }
            }
            (Some(explicit), None) => explicit,
            (None, Some(shape)) => shape.columns.iter().map(ColumnDescriptor::from_raw).collect(),
            (None, None) => {
                return Err(AccessError::configuration(
                    "cannot describe a row without explicit columns or a result shape",
                ));
            }
        };

        if self.capitalization != Capitalization::None {
            for column in &mut columns {
                column.name = self.capitalization.apply(&column.name);
                column.data_row_key = self.capitalization.apply(&column.data_row_key);
            }
        }

        if !self.type_overrides.is_empty() {
            for column in &mut columns {
                if let Some(value_type) = self.type_overrides.get(&column.name.to_lowercase()) {
                    column.value_type = *value_type;
                }
            }
        }

        if self.validate_duplicates {
            warn_duplicates(&columns);
        }

        Ok(RowDescriptor::new(columns, registry))
    }
}

fn merge(explicit: Vec<ColumnDescriptor>, shape: &ResultShape) -> Vec<ColumnDescriptor> {
    shape
        .columns
        .iter()
        .map(|raw| {
            explicit
                .iter()
                .find(|c| c.matches(raw.row_key()))
                .cloned()
                .unwrap_or_else(|| ColumnDescriptor::from_raw(raw))
        })
        .collect()
}

fn warn_duplicates(columns: &[ColumnDescriptor]) {
    for (name, count) in duplicates(columns.iter().map(|c| c.name.as_str())) {
        tracing::warn!(
            "Found duplicated column name '{}' ({} occurrences) in result",
            name,
            count
        );
    }
    // an alias can make distinct names collide in the row
    for (key, count) in duplicates(columns.iter().map(|c| c.data_row_key.as_str())) {
        tracing::warn!(
            "Found duplicated row key '{}' ({} occurrences) in result; values will shadow each other",
            key,
            count
        );
    }
}

/// Values occurring more than once, sorted, with their number of occurrences.
fn duplicates<'c>(names: impl Iterator<Item = &'c str>) -> Vec<(&'c str, usize)> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for name in names {
        *seen.entry(name).or_default() += 1;
    }
    let mut found: Vec<(&str, usize)> = seen.into_iter().filter(|(_, n)| *n > 1).collect();
    found.sort_unstable();
    found
}
