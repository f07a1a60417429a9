//! Converter registry keyed by target value type.
//!
//! The registry is built once, either implicitly with the standard converters or by the
//! application through [`TypeRegistry::install`], and is read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::OnceCell;
use uuid::Uuid;

use super::{TypeCode, Value, ValueType};
use crate::error::{AccessError, AccessResult};

static GLOBAL_REGISTRY: OnceCell<Arc<TypeRegistry>> = OnceCell::new();

/// Materializes driver values into a target value type and prepares values for binding.
pub trait TypeConverter: Send + Sync {
    fn value_type(&self) -> ValueType;

    /// Converts a value read from a column of driver type `type_code`.
    fn materialize(&self, raw: Value, type_code: TypeCode) -> AccessResult<Value>;

    /// Converts a domain value into what gets handed to the driver.
    fn to_driver(&self, value: &Value, _type_code: TypeCode) -> AccessResult<Value> {
        Ok(value.clone())
    }
}

/// Built-in converter for one [`ValueType`]
#[derive(Debug, Clone, Copy)]
pub struct StandardConverter {
    target: ValueType,
}

impl StandardConverter {
    pub fn new(target: ValueType) -> Self {
        Self { target }
    }

    fn mismatch(&self, raw: &Value) -> AccessError {
        AccessError::Conversion(format!(
            "cannot convert {} value '{}' to {}",
            raw.kind(),
            raw,
            self.target
        ))
    }

    fn integer(&self, raw: Value, min: i64, max: i64) -> AccessResult<Value> {
        let i = match &raw {
            Value::Int(i) => *i,
            Value::Bool(b) => *b as i64,
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => *f as i64,
            Value::Decimal(s) | Value::Text(s) => {
                parse_integer(s).ok_or_else(|| self.mismatch(&raw))?
            }
            _ => return Err(self.mismatch(&raw)),
        };
        if i < min || i > max {
            return Err(AccessError::Conversion(format!(
                "value {} out of range for {}",
                i, self.target
            )));
        }
        Ok(Value::Int(i))
    }

    fn float(&self, raw: Value) -> AccessResult<Value> {
        match &raw {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Decimal(s) | Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.mismatch(&raw)),
            _ => Err(self.mismatch(&raw)),
        }
    }

    fn decimal(&self, raw: Value) -> AccessResult<Value> {
        if matches!(raw, Value::Decimal(_)) {
            return Ok(raw);
        }
        match &raw {
            Value::Int(i) => Ok(Value::Decimal(i.to_string())),
            Value::Float(f) if f.is_finite() => Ok(Value::Decimal(f.to_string())),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.parse::<f64>().is_ok() {
                    Ok(Value::Decimal(trimmed.to_string()))
                } else {
                    Err(self.mismatch(&raw))
                }
            }
            _ => Err(self.mismatch(&raw)),
        }
    }

    fn boolean(&self, raw: Value) -> AccessResult<Value> {
        if matches!(raw, Value::Bool(_)) {
            return Ok(raw);
        }
        match &raw {
            Value::Int(i) => Ok(Value::Bool(*i != 0)),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "y" | "1" => Ok(Value::Bool(true)),
                "false" | "f" | "n" | "0" => Ok(Value::Bool(false)),
                _ => Err(self.mismatch(&raw)),
            },
            _ => Err(self.mismatch(&raw)),
        }
    }

    fn date(&self, raw: Value) -> AccessResult<Value> {
        if matches!(raw, Value::Date(_)) {
            return Ok(raw);
        }
        match &raw {
            Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
            Value::Text(s) => parse_timestamp(s)
                .map(|ts| ts.date())
                .or_else(|| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                .map(Value::Date)
                .ok_or_else(|| self.mismatch(&raw)),
            _ => Err(self.mismatch(&raw)),
        }
    }

    fn time(&self, raw: Value) -> AccessResult<Value> {
        if matches!(raw, Value::Time(_)) {
            return Ok(raw);
        }
        match &raw {
            Value::Timestamp(ts) => Ok(Value::Time(ts.time())),
            Value::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                .map(Value::Time)
                .map_err(|_| self.mismatch(&raw)),
            _ => Err(self.mismatch(&raw)),
        }
    }

    fn timestamp(&self, raw: Value) -> AccessResult<Value> {
        if matches!(raw, Value::Timestamp(_)) {
            return Ok(raw);
        }
        match &raw {
            Value::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(Value::Timestamp)
                .ok_or_else(|| self.mismatch(&raw)),
            // epoch millis
            Value::Int(ms) => DateTime::from_timestamp_millis(*ms)
                .map(|dt| Value::Timestamp(dt.naive_utc()))
                .ok_or_else(|| self.mismatch(&raw)),
            Value::Text(s) => parse_timestamp(s)
                .or_else(|| {
                    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(Value::Timestamp)
                .ok_or_else(|| self.mismatch(&raw)),
            _ => Err(self.mismatch(&raw)),
        }
    }

    fn uuid(&self, raw: Value) -> AccessResult<Value> {
        if matches!(raw, Value::Uuid(_)) {
            return Ok(raw);
        }
        match &raw {
            Value::Text(s) => Uuid::parse_str(s.trim())
                .map(Value::Uuid)
                .map_err(|_| self.mismatch(&raw)),
            Value::Bytes(b) => Uuid::from_slice(b)
                .map(Value::Uuid)
                .map_err(|_| self.mismatch(&raw)),
            _ => Err(self.mismatch(&raw)),
        }
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    trimmed.parse::<i64>().ok().or_else(|| {
        // "12.000" style decimals coming back from NUMERIC columns
        let f = trimmed.parse::<f64>().ok()?;
        (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
    })
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

impl TypeConverter for StandardConverter {
    fn value_type(&self) -> ValueType {
        self.target
    }

    fn materialize(&self, raw: Value, _type_code: TypeCode) -> AccessResult<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }

        match self.target {
            ValueType::Boolean => self.boolean(raw),
            ValueType::Short => self.integer(raw, i16::MIN as i64, i16::MAX as i64),
            ValueType::Int => self.integer(raw, i32::MIN as i64, i32::MAX as i64),
            ValueType::Long => self.integer(raw, i64::MIN, i64::MAX),
            ValueType::Float | ValueType::Double => self.float(raw),
            ValueType::Decimal => self.decimal(raw),
            ValueType::String => Ok(match raw {
                Value::Text(_) => raw,
                Value::Bytes(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
                other => Value::Text(other.to_string()),
            }),
            ValueType::Bytes => match raw {
                Value::Bytes(_) => Ok(raw),
                Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
                other => Err(self.mismatch(&other)),
            },
            ValueType::Date => self.date(raw),
            ValueType::Time => self.time(raw),
            ValueType::Timestamp => self.timestamp(raw),
            ValueType::Uuid => self.uuid(raw),
            ValueType::Object => Ok(raw),
        }
    }

    fn to_driver(&self, value: &Value, type_code: TypeCode) -> AccessResult<Value> {
        match (self.target, value) {
            // few drivers have a native UUID type
            (ValueType::Uuid, Value::Uuid(u)) if type_code != TypeCode::Other => {
                Ok(Value::Text(u.to_string()))
            }
            _ => Ok(value.clone()),
        }
    }
}

/// Converter lookup keyed by [`ValueType`]
pub struct TypeRegistry {
    converters: HashMap<ValueType, Arc<dyn TypeConverter>>,
    fallback: Arc<dyn TypeConverter>,
}

impl TypeRegistry {
    /// Registry holding a [`StandardConverter`] for every value type.
    pub fn standard() -> Self {
        TypeRegistryBuilder::default().build()
    }

    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Installs the process-wide registry. Fails with the rejected registry if one was
    /// already installed or handed out by [`TypeRegistry::shared`].
    pub fn install(registry: TypeRegistry) -> Result<(), Arc<TypeRegistry>> {
        GLOBAL_REGISTRY.set(Arc::new(registry))
    }

    /// The process-wide registry, the standard one unless another was installed first.
    pub fn shared() -> Arc<TypeRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(TypeRegistry::standard()))
            .clone()
    }

    /// Converter for `value_type`, or the pass-through converter if none is registered.
    pub fn converter(&self, value_type: ValueType) -> Arc<dyn TypeConverter> {
        self.converters
            .get(&value_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn is_registered(&self, value_type: ValueType) -> bool {
        self.converters.contains_key(&value_type)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<&str> = self.converters.keys().map(|vt| vt.name()).collect();
        registered.sort_unstable();
        f.debug_struct("TypeRegistry")
            .field("registered", &registered)
            .finish()
    }
}

/// Builder for [`TypeRegistry`]; starts from the standard converters.
pub struct TypeRegistryBuilder {
    converters: HashMap<ValueType, Arc<dyn TypeConverter>>,
}

impl Default for TypeRegistryBuilder {
    fn default() -> Self {
        let converters = ValueType::ALL
            .iter()
            .map(|vt| {
                (
                    *vt,
                    Arc::new(StandardConverter::new(*vt)) as Arc<dyn TypeConverter>,
                )
            })
            .collect();
        Self { converters }
    }
}

impl TypeRegistryBuilder {
    /// Registers (or replaces) the converter for its value type.
    pub fn register(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converters.insert(converter.value_type(), converter);
        self
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            converters: self.converters,
            fallback: Arc::new(StandardConverter::new(ValueType::Object)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(target: ValueType, raw: Value) -> AccessResult<Value> {
        TypeRegistry::standard()
            .converter(target)
            .materialize(raw, TypeCode::Other)
    }

    #[test]
    fn test_null_passes_through_every_converter() {
        for vt in ValueType::ALL {
            assert_eq!(convert(vt, Value::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(convert(ValueType::Int, Value::Int(5)).unwrap(), Value::Int(5));
        assert_eq!(
            convert(ValueType::Long, Value::Decimal("12.000".into())).unwrap(),
            Value::Int(12)
        );
        assert_eq!(convert(ValueType::Short, Value::Float(3.0)).unwrap(), Value::Int(3));
        assert!(convert(ValueType::Short, Value::Int(70_000)).is_err());
        assert!(convert(ValueType::Int, Value::Text("abc".into())).is_err());
    }

    #[test]
    fn test_decimal_and_float_conversions() {
        assert_eq!(
            convert(ValueType::Decimal, Value::Int(10)).unwrap(),
            Value::Decimal("10".into())
        );
        assert_eq!(
            convert(ValueType::Double, Value::Text("2.5".into())).unwrap(),
            Value::Float(2.5)
        );
        assert!(convert(ValueType::Decimal, Value::Text("1,5".into())).is_err());
    }

    #[test]
    fn test_temporal_conversions() {
        let ts = convert(ValueType::Timestamp, Value::Text("2024-05-01 10:30:00".into())).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(ts, Value::Timestamp(expected));

        let date = convert(ValueType::Date, Value::Timestamp(expected)).unwrap();
        assert_eq!(date, Value::Date(expected.date()));

        let from_millis = convert(ValueType::Timestamp, Value::Int(0)).unwrap();
        assert_eq!(
            from_millis,
            Value::Timestamp(DateTime::from_timestamp(0, 0).unwrap().naive_utc())
        );
    }

    #[test]
    fn test_boolean_and_string_conversions() {
        assert_eq!(convert(ValueType::Boolean, Value::Int(0)).unwrap(), Value::Bool(false));
        assert_eq!(
            convert(ValueType::Boolean, Value::Text("TRUE".into())).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            convert(ValueType::String, Value::Int(7)).unwrap(),
            Value::Text("7".into())
        );
    }

    #[test]
    fn test_uuid_bound_as_text_for_typed_columns() {
        let id = Uuid::new_v4();
        let converter = StandardConverter::new(ValueType::Uuid);
        assert_eq!(
            converter.to_driver(&Value::Uuid(id), TypeCode::VarChar).unwrap(),
            Value::Text(id.to_string())
        );
        assert_eq!(
            converter.to_driver(&Value::Uuid(id), TypeCode::Other).unwrap(),
            Value::Uuid(id)
        );
    }

    struct UpperCaseText;

    impl TypeConverter for UpperCaseText {
        fn value_type(&self) -> ValueType {
            ValueType::String
        }

        fn materialize(&self, raw: Value, _type_code: TypeCode) -> AccessResult<Value> {
            Ok(match raw {
                Value::Text(s) => Value::Text(s.to_uppercase()),
                other => other,
            })
        }
    }

    #[test]
    fn test_custom_converter_replaces_standard() {
        let registry = TypeRegistry::builder()
            .register(Arc::new(UpperCaseText))
            .build();
        let value = registry
            .converter(ValueType::String)
            .materialize(Value::Text("abc".into()), TypeCode::VarChar)
            .unwrap();
        assert_eq!(value, Value::Text("ABC".into()));
        assert!(registry.is_registered(ValueType::Long));
    }

    #[test]
    fn test_shared_registry_is_initialized_once() {
        let a = TypeRegistry::shared();
        let b = TypeRegistry::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
