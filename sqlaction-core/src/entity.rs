//! Mapping metadata consumed by the actions.
//!
//! Only the slice of entity information the execution layer needs: attribute column
//! names and types, which attributes form the primary key, which keys the database
//! generates, and object identities used to correlate batch rows.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{TypeCode, Value, ValueType};

/// One mapped column of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Column name
    pub name: String,
    pub type_code: TypeCode,
    /// Declared value type; falls back to the type code default
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub generated: bool,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self {
            name: name.into(),
            type_code,
            value_type: None,
            primary_key: false,
            generated: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn effective_value_type(&self) -> ValueType {
        self.value_type
            .unwrap_or_else(|| self.type_code.default_value_type())
    }
}

/// Table-level metadata for the root entity of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub attributes: Vec<AttributeDescriptor>,
    /// The entity has a relationship to itself, so inserted rows may reference keys
    /// generated for earlier rows of the same batch
    #[serde(default)]
    pub self_referential: bool,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            self_referential: false,
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn self_referential(mut self, value: bool) -> Self {
        self.self_referential = value;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.iter().filter(|a| a.primary_key)
    }

    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_key().map(|a| a.name.clone()).collect()
    }

    pub fn generated_keys(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes
            .iter()
            .filter(|a| a.primary_key && a.generated)
    }

    pub fn has_generated_keys(&self) -> bool {
        self.generated_keys().next().is_some()
    }
}

/// Identity of the object a batch row was produced from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectId {
    pub entity: String,
    pub key: ObjectKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKey {
    /// Committed object, identified by its primary key values
    Permanent(BTreeMap<String, Value>),
    /// New object whose key is not known yet
    Temporary(Uuid),
}

impl ObjectId {
    pub fn permanent<K, I>(entity: impl Into<String>, key: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self {
            entity: entity.into(),
            key: ObjectKey::Permanent(key.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    pub fn temporary(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: ObjectKey::Temporary(Uuid::new_v4()),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.key, ObjectKey::Temporary(_))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            ObjectKey::Permanent(values) => {
                let parts: Vec<String> = values
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, v))
                    .collect();
                write!(f, "{}<{}>", self.entity, parts.join(","))
            }
            ObjectKey::Temporary(id) => write!(f, "{}<temp:{}>", self.entity, id),
        }
    }
}
