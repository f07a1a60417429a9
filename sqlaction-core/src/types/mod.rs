//! Value model shared by drivers, descriptors and result rows.
//!
//! - [`Value`]: a materialized column or parameter value
//! - [`TypeCode`]: the driver-level type of a column or parameter
//! - [`ValueType`]: the target type a converter materializes into
//! - [`TypeRegistry`]: process-wide converter lookup keyed by [`ValueType`]

mod registry;

pub use registry::{StandardConverter, TypeConverter, TypeRegistry, TypeRegistryBuilder};

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single value read from or bound to a driver
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Canonical decimal text, e.g. `"12.50"`
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            Value::Decimal(s) | Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(s) | Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Name of the variant, used in conversion error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
        }
    }

    /// JSON rendering used by row serialization.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Decimal(s) | Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
            Value::Date(d) => serde_json::Value::String(d.to_string()),
            Value::Time(t) => serde_json::Value::String(t.to_string()),
            Value::Timestamp(ts) => serde_json::Value::String(ts.to_string()),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
        }
    }

    /// Best-effort conversion from JSON, used for CLI and config supplied parameters.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Decimal(s) | Value::Text(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Timestamp(ts) => ts.hash(state),
            Value::Uuid(u) => u.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Decimal(s) | Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", hex::encode(b)),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Driver-level column/parameter type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeCode {
    Bit,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Numeric,
    Decimal,
    Char,
    VarChar,
    LongVarChar,
    Clob,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Date,
    Time,
    Timestamp,
    Null,
    Other,
}

impl TypeCode {
    /// Parses an SQL type name such as `VARCHAR`, `INTEGER` or `DECIMAL(10,2)`.
    pub fn from_sql_name(name: &str) -> Option<TypeCode> {
        let base = name
            .split('(')
            .next()
            .unwrap_or(name)
            .trim()
            .to_ascii_uppercase();

        let code = match base.as_str() {
            "BIT" => TypeCode::Bit,
            "BOOLEAN" | "BOOL" => TypeCode::Boolean,
            "TINYINT" => TypeCode::TinyInt,
            "SMALLINT" | "INT2" => TypeCode::SmallInt,
            "INTEGER" | "INT" | "INT4" | "MEDIUMINT" => TypeCode::Integer,
            "BIGINT" | "INT8" => TypeCode::BigInt,
            "REAL" | "FLOAT4" => TypeCode::Real,
            "FLOAT" => TypeCode::Float,
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" => TypeCode::Double,
            "NUMERIC" | "NUMBER" => TypeCode::Numeric,
            "DECIMAL" => TypeCode::Decimal,
            "CHAR" | "CHARACTER" | "NCHAR" => TypeCode::Char,
            "VARCHAR" | "NVARCHAR" | "VARCHAR2" | "CHARACTER VARYING" => TypeCode::VarChar,
            "LONGVARCHAR" | "TEXT" => TypeCode::LongVarChar,
            "CLOB" | "NCLOB" => TypeCode::Clob,
            "BINARY" => TypeCode::Binary,
            "VARBINARY" => TypeCode::VarBinary,
            "LONGVARBINARY" => TypeCode::LongVarBinary,
            "BLOB" | "BYTEA" => TypeCode::Blob,
            "DATE" => TypeCode::Date,
            "TIME" => TypeCode::Time,
            "TIMESTAMP" | "DATETIME" => TypeCode::Timestamp,
            "NULL" => TypeCode::Null,
            "OTHER" => TypeCode::Other,
            _ => return None,
        };
        Some(code)
    }

    pub fn sql_name(&self) -> &'static str {
        match self {
            TypeCode::Bit => "BIT",
            TypeCode::Boolean => "BOOLEAN",
            TypeCode::TinyInt => "TINYINT",
            TypeCode::SmallInt => "SMALLINT",
            TypeCode::Integer => "INTEGER",
            TypeCode::BigInt => "BIGINT",
            TypeCode::Real => "REAL",
            TypeCode::Float => "FLOAT",
            TypeCode::Double => "DOUBLE",
            TypeCode::Numeric => "NUMERIC",
            TypeCode::Decimal => "DECIMAL",
            TypeCode::Char => "CHAR",
            TypeCode::VarChar => "VARCHAR",
            TypeCode::LongVarChar => "LONGVARCHAR",
            TypeCode::Clob => "CLOB",
            TypeCode::Binary => "BINARY",
            TypeCode::VarBinary => "VARBINARY",
            TypeCode::LongVarBinary => "LONGVARBINARY",
            TypeCode::Blob => "BLOB",
            TypeCode::Date => "DATE",
            TypeCode::Time => "TIME",
            TypeCode::Timestamp => "TIMESTAMP",
            TypeCode::Null => "NULL",
            TypeCode::Other => "OTHER",
        }
    }

    /// The value type a column of this driver type materializes into when nothing
    /// overrides it.
    pub fn default_value_type(&self) -> ValueType {
        match self {
            TypeCode::Bit | TypeCode::Boolean => ValueType::Boolean,
            TypeCode::TinyInt | TypeCode::SmallInt => ValueType::Short,
            TypeCode::Integer => ValueType::Int,
            TypeCode::BigInt => ValueType::Long,
            TypeCode::Real | TypeCode::Float => ValueType::Float,
            TypeCode::Double => ValueType::Double,
            TypeCode::Numeric | TypeCode::Decimal => ValueType::Decimal,
            TypeCode::Char | TypeCode::VarChar | TypeCode::LongVarChar | TypeCode::Clob => {
                ValueType::String
            }
            TypeCode::Binary | TypeCode::VarBinary | TypeCode::LongVarBinary | TypeCode::Blob => {
                ValueType::Bytes
            }
            TypeCode::Date => ValueType::Date,
            TypeCode::Time => ValueType::Time,
            TypeCode::Timestamp => ValueType::Timestamp,
            TypeCode::Null | TypeCode::Other => ValueType::Object,
        }
    }

    /// Driver type to bind a value with when the caller gave none.
    pub fn for_value(value: &Value) -> TypeCode {
        match value {
            Value::Null => TypeCode::Null,
            Value::Bool(_) => TypeCode::Boolean,
            Value::Int(_) => TypeCode::BigInt,
            Value::Float(_) => TypeCode::Double,
            Value::Decimal(_) => TypeCode::Decimal,
            Value::Text(_) => TypeCode::VarChar,
            Value::Bytes(_) => TypeCode::VarBinary,
            Value::Date(_) => TypeCode::Date,
            Value::Time(_) => TypeCode::Time,
            Value::Timestamp(_) => TypeCode::Timestamp,
            Value::Uuid(_) => TypeCode::Other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeCode::TinyInt
                | TypeCode::SmallInt
                | TypeCode::Integer
                | TypeCode::BigInt
                | TypeCode::Real
                | TypeCode::Float
                | TypeCode::Double
                | TypeCode::Numeric
                | TypeCode::Decimal
        )
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Target type of a materialized value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Boolean,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    String,
    Bytes,
    Date,
    Time,
    Timestamp,
    Uuid,
    /// No conversion, the driver value is kept as is
    Object,
}

impl ValueType {
    pub const ALL: [ValueType; 14] = [
        ValueType::Boolean,
        ValueType::Short,
        ValueType::Int,
        ValueType::Long,
        ValueType::Float,
        ValueType::Double,
        ValueType::Decimal,
        ValueType::String,
        ValueType::Bytes,
        ValueType::Date,
        ValueType::Time,
        ValueType::Timestamp,
        ValueType::Uuid,
        ValueType::Object,
    ];

    /// Parses a value type name as used in `#result` directives and type overrides.
    pub fn from_name(name: &str) -> Option<ValueType> {
        let vt = match name.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => ValueType::Boolean,
            "short" | "i16" | "smallint" => ValueType::Short,
            "int" | "integer" | "i32" => ValueType::Int,
            "long" | "i64" | "bigint" => ValueType::Long,
            "float" | "f32" => ValueType::Float,
            "double" | "f64" => ValueType::Double,
            "decimal" | "numeric" | "bigdecimal" => ValueType::Decimal,
            "string" | "str" | "text" | "varchar" => ValueType::String,
            "bytes" | "binary" | "blob" | "vec<u8>" => ValueType::Bytes,
            "date" => ValueType::Date,
            "time" => ValueType::Time,
            "timestamp" | "datetime" => ValueType::Timestamp,
            "uuid" => ValueType::Uuid,
            "object" | "any" => ValueType::Object,
            _ => return None,
        };
        Some(vt)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::Short => "short",
            ValueType::Int => "int",
            ValueType::Long => "long",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Decimal => "decimal",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
            ValueType::Date => "date",
            ValueType::Time => "time",
            ValueType::Timestamp => "timestamp",
            ValueType::Uuid => "uuid",
            ValueType::Object => "object",
        }
    }

    /// Driver type used when binding a value declared with this type.
    pub fn default_type_code(&self) -> TypeCode {
        match self {
            ValueType::Boolean => TypeCode::Boolean,
            ValueType::Short => TypeCode::SmallInt,
            ValueType::Int => TypeCode::Integer,
            ValueType::Long => TypeCode::BigInt,
            ValueType::Float => TypeCode::Real,
            ValueType::Double => TypeCode::Double,
            ValueType::Decimal => TypeCode::Decimal,
            ValueType::String => TypeCode::VarChar,
            ValueType::Bytes => TypeCode::VarBinary,
            ValueType::Date => TypeCode::Date,
            ValueType::Time => TypeCode::Time,
            ValueType::Timestamp => TypeCode::Timestamp,
            ValueType::Uuid | ValueType::Object => TypeCode::Other,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_type_code_from_sql_name() {
        assert_eq!(TypeCode::from_sql_name("varchar(255)"), Some(TypeCode::VarChar));
        assert_eq!(TypeCode::from_sql_name("DECIMAL(10, 2)"), Some(TypeCode::Decimal));
        assert_eq!(TypeCode::from_sql_name(" integer "), Some(TypeCode::Integer));
        assert_eq!(TypeCode::from_sql_name("TEXT"), Some(TypeCode::LongVarChar));
        assert_eq!(TypeCode::from_sql_name("GEOMETRY"), None);
    }

    #[test]
    fn test_default_value_types() {
        assert_eq!(TypeCode::BigInt.default_value_type(), ValueType::Long);
        assert_eq!(TypeCode::Numeric.default_value_type(), ValueType::Decimal);
        assert_eq!(TypeCode::Clob.default_value_type(), ValueType::String);
        assert_eq!(TypeCode::Other.default_value_type(), ValueType::Object);
    }

    #[test]
    fn test_value_type_names_round_trip() {
        for vt in ValueType::ALL {
            assert_eq!(ValueType::from_name(vt.name()), Some(vt));
        }
        assert_eq!(ValueType::from_name("i64"), Some(ValueType::Long));
        assert_eq!(ValueType::from_name("Vec<u8>"), Some(ValueType::Bytes));
        assert_eq!(ValueType::from_name("whatever"), None);
    }

    #[test]
    fn test_float_values_hash_and_compare_by_bits() {
        let mut set = HashSet::new();
        set.insert(Value::Float(f64::NAN));
        set.insert(Value::Float(f64::NAN));
        set.insert(Value::Float(1.5));
        assert_eq!(set.len(), 2);
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_value_json_rendering() {
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
        assert_eq!(Value::Int(3).to_json(), serde_json::json!(3));
        assert_eq!(Value::Bytes(vec![0xca, 0xfe]).to_json(), serde_json::json!("cafe"));
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(Value::Date(date).to_json(), serde_json::json!("2024-02-29"));
        assert_eq!(Value::from_json(&serde_json::json!(2.5)), Value::Float(2.5));
        assert_eq!(Value::from_json(&serde_json::json!("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(Option::<i64>::None), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Text("a".to_string()));
        assert_eq!(Value::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
