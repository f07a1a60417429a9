use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{TemplateParameters, TemplateValue};
use crate::descriptor::ColumnDescriptor;
use crate::error::{AccessError, AccessResult};
use crate::statement::{CompiledStatement, ParameterBinding};
use crate::types::{TypeCode, Value, ValueType};

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"#(?P<bind>bindNotEqual|bindEqual|bind)\(\s*\$(?P<bvar>[A-Za-z_][\w.]*)",
        r"(?:\s+'(?P<btype>[^']*)')?(?:\s+(?P<bscale>-?\d+))?\s*\)",
        r"|#result\(\s*'(?P<rcol>[^']*)'(?:\s+'(?P<rtype>[^']*)')?(?:\s+'(?P<ralias>[^']*)')?\s*\)",
        r"|\$(?P<var>[A-Za-z_][\w.]*)",
    ))
    .expect("template directive pattern")
});

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Za-z_][\w.]*)").expect("template variable pattern"));

/// Names of the `$variables` of a template in order of first appearance.
pub fn variable_names(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in VARIABLE.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Expands template directives into a [`CompiledStatement`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateProcessor;

impl TemplateProcessor {
    pub fn process(
        &self,
        template: &str,
        parameters: &TemplateParameters,
    ) -> AccessResult<CompiledStatement> {
        let mut sql = String::with_capacity(template.len());
        let mut bindings = Vec::new();
        let mut result_columns = Vec::new();
        let mut last = 0;

        for caps in DIRECTIVE.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            sql.push_str(&template[last..whole.start()]);
            last = whole.end();

            if let Some(kind) = caps.name("bind") {
                let name = &caps["bvar"];
                let value = lookup(parameters, name);
                let binding = BindDirective::parse(&caps)?;
                match kind.as_str() {
                    "bind" => binding.expand(name, value, &mut sql, &mut bindings)?,
                    "bindEqual" => binding.expand_comparison(
                        name,
                        value,
                        ("= ?", "IS NULL"),
                        &mut sql,
                        &mut bindings,
                    )?,
                    _ => binding.expand_comparison(
                        name,
                        value,
                        ("<> ?", "IS NOT NULL"),
                        &mut sql,
                        &mut bindings,
                    )?,
                }
            } else if let Some(column) = caps.name("rcol") {
                let column = column.as_str();
                let value_type = match caps.name("rtype") {
                    Some(t) => parse_value_type(t.as_str())?,
                    None => ValueType::Object,
                };
                let alias = caps.name("ralias").map(|a| a.as_str()).filter(|a| !a.is_empty());

                match alias {
                    Some(alias) => {
                        sql.push_str(column);
                        sql.push_str(" AS ");
                        sql.push_str(alias);
                    }
                    None => sql.push_str(column),
                }
                result_columns.push(
                    ColumnDescriptor::new(column, value_type.default_type_code())
                        .with_value_type(value_type)
                        .with_row_key(alias.unwrap_or(column)),
                );
            } else if let Some(var) = caps.name("var") {
                render_inline(lookup(parameters, var.as_str()), &mut sql);
            }
        }
        sql.push_str(&template[last..]);

        Ok(CompiledStatement::new(sql.trim(), bindings).with_result_columns(result_columns))
    }
}

struct BindDirective {
    type_code: Option<TypeCode>,
    scale: Option<i32>,
}

impl BindDirective {
    fn parse(caps: &Captures<'_>) -> AccessResult<Self> {
        let type_code = match caps.name("btype") {
            Some(t) => Some(TypeCode::from_sql_name(t.as_str()).ok_or_else(|| {
                AccessError::Configuration(format!("unknown type '{}' in bind directive", t.as_str()))
            })?),
            None => None,
        };
        let scale = match caps.name("bscale") {
            Some(s) => Some(s.as_str().parse::<i32>().map_err(|_| {
                AccessError::Configuration(format!("invalid scale '{}' in bind directive", s.as_str()))
            })?),
            None => None,
        };
        Ok(Self { type_code, scale })
    }

    fn binding(&self, value: Value) -> ParameterBinding {
        let type_code = self.type_code.unwrap_or_else(|| TypeCode::for_value(&value));
        let mut binding = ParameterBinding::new(value, type_code);
        if let Some(scale) = self.scale {
            binding = binding.with_scale(scale);
        }
        binding
    }

    fn expand(
        &self,
        name: &str,
        value: TemplateValue,
        sql: &mut String,
        bindings: &mut Vec<ParameterBinding>,
    ) -> AccessResult<()> {
        match value {
            TemplateValue::Scalar(v) => {
                sql.push('?');
                bindings.push(self.binding(v));
            }
            TemplateValue::List(values) => {
                if values.is_empty() {
                    return Err(AccessError::Configuration(format!(
                        "cannot bind empty list '${}'",
                        name
                    )));
                }
                let placeholders = vec!["?"; values.len()].join(",");
                sql.push_str(&placeholders);
                bindings.extend(values.into_iter().map(|v| self.binding(v)));
            }
        }
        Ok(())
    }

    fn expand_comparison(
        &self,
        name: &str,
        value: TemplateValue,
        (bound, null): (&str, &str),
        sql: &mut String,
        bindings: &mut Vec<ParameterBinding>,
    ) -> AccessResult<()> {
        match value {
            TemplateValue::Scalar(Value::Null) => sql.push_str(null),
            TemplateValue::Scalar(v) => {
                sql.push_str(bound);
                bindings.push(self.binding(v));
            }
            TemplateValue::List(_) => {
                return Err(AccessError::Configuration(format!(
                    "cannot compare against list '${}'",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn lookup(parameters: &TemplateParameters, name: &str) -> TemplateValue {
    parameters
        .get(name)
        .cloned()
        .unwrap_or(TemplateValue::Scalar(Value::Null))
}

fn render_inline(value: TemplateValue, sql: &mut String) {
    match value {
        TemplateValue::Scalar(Value::Null) => {}
        TemplateValue::Scalar(v) => sql.push_str(&v.to_string()),
        TemplateValue::List(values) => {
            let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            sql.push_str(&rendered.join(","));
        }
    }
}

/// Accepts plain value type names as well as path-qualified ones such as
/// `std::primitive::i64`.
fn parse_value_type(name: &str) -> AccessResult<ValueType> {
    let short = name.rsplit("::").next().unwrap_or(name);
    let parsed = if short.eq_ignore_ascii_case("byte[]") {
        Some(ValueType::Bytes)
    } else {
        ValueType::from_name(short)
    };
    parsed.ok_or_else(|| {
        AccessError::Configuration(format!("unknown result type '{}' in result directive", name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, TemplateValue)]) -> TemplateParameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_bind_and_inline_substitution() {
        let compiled = TemplateProcessor
            .process(
                "SELECT * FROM $table WHERE ID = #bind($id 'INTEGER') AND NAME = #bind($name)",
                &params(&[
                    ("table", TemplateValue::scalar("ARTIST")),
                    ("id", TemplateValue::scalar(5)),
                    ("name", TemplateValue::scalar("Monet")),
                ]),
            )
            .unwrap();

        assert_eq!(compiled.sql(), "SELECT * FROM ARTIST WHERE ID = ? AND NAME = ?");
        let bindings = compiled.bindings();
        assert_eq!(bindings[0].type_code, TypeCode::Integer);
        assert_eq!(bindings[0].value, Value::Int(5));
        assert_eq!(bindings[1].type_code, TypeCode::VarChar);
        assert_eq!(bindings[1].position(), Some(2));
    }

    #[test]
    fn test_list_expands_placeholders() {
        let compiled = TemplateProcessor
            .process(
                "DELETE FROM T WHERE ID IN (#bind($ids))",
                &params(&[(
                    "ids",
                    TemplateValue::from(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
                )]),
            )
            .unwrap();
        assert_eq!(compiled.sql(), "DELETE FROM T WHERE ID IN (?,?,?)");
        assert_eq!(compiled.bindings().len(), 3);
    }

    #[test]
    fn test_bind_equal_handles_null() {
        let template = "SELECT * FROM T WHERE A #bindEqual($a) AND B #bindNotEqual($b)";
        let compiled = TemplateProcessor
            .process(template, &params(&[("b", TemplateValue::scalar(2))]))
            .unwrap();
        assert_eq!(compiled.sql(), "SELECT * FROM T WHERE A IS NULL AND B <> ?");
        assert_eq!(compiled.bindings().len(), 1);

        let compiled = TemplateProcessor
            .process(
                template,
                &params(&[
                    ("a", TemplateValue::scalar(1)),
                    ("b", TemplateValue::Scalar(Value::Null)),
                ]),
            )
            .unwrap();
        assert_eq!(compiled.sql(), "SELECT * FROM T WHERE A = ? AND B IS NOT NULL");
    }

    #[test]
    fn test_result_directive_declares_columns() {
        let compiled = TemplateProcessor
            .process(
                "SELECT #result('ARTIST_ID' 'std::primitive::i64' 'id'), #result('NAME' 'String') FROM ARTIST",
                &TemplateParameters::new(),
            )
            .unwrap();
        assert_eq!(compiled.sql(), "SELECT ARTIST_ID AS id, NAME FROM ARTIST");

        let columns = compiled.result_columns().unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].data_row_key, "id");
        assert_eq!(columns[0].value_type, ValueType::Long);
        assert_eq!(columns[1].data_row_key, "NAME");
        assert_eq!(columns[1].value_type, ValueType::String);
    }

    #[test]
    fn test_scale_and_unknown_type() {
        let compiled = TemplateProcessor
            .process(
                "UPDATE T SET PRICE = #bind($p 'DECIMAL' 2)",
                &params(&[("p", TemplateValue::Scalar(Value::Decimal("9.99".into())))]),
            )
            .unwrap();
        assert_eq!(compiled.bindings()[0].scale, Some(2));

        let err = TemplateProcessor
            .process("SELECT #bind($p 'WIDGET')", &TemplateParameters::new())
            .unwrap_err();
        assert!(matches!(err, AccessError::Configuration(_)));
    }

    #[test]
    fn test_variable_names_in_first_appearance_order() {
        let names = variable_names("SELECT * FROM $t WHERE A = #bind($b) AND C = #bind($a) OR D = $b");
        assert_eq!(names, vec!["t", "b", "a"]);
    }

    #[test]
    fn test_missing_bind_parameter_binds_null() {
        let compiled = TemplateProcessor
            .process("INSERT INTO T VALUES (#bind($x))", &TemplateParameters::new())
            .unwrap();
        assert_eq!(compiled.bindings()[0].value, Value::Null);
        assert_eq!(compiled.bindings()[0].type_code, TypeCode::Null);
    }
}
