use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::faker::FakerRegistry;
use super::value::{Coercion, ParamValue};
use crate::error::{ConfigError, ConfigResult};

static CONCAT_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{@(\w+)\}").expect("valid regex"));

/// A parameter as written in a workload file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub list: Option<Vec<serde_json::Value>>,
    #[serde(default, rename = "as")]
    pub coerce: Option<Coercion>,
    #[serde(default, rename = "sqldatatype")]
    pub sql_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConcatPart {
    Literal(String),
    Reference(String),
}

/// How a compiled parameter produces its native value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    RandomInt { start: i64, end: i64 },
    RandomIntAsString { start: i64, end: i64 },
    Guid,
    Date,
    DateTime,
    DateTimeIso,
    Constant(ParamValue),
    RandomList(Vec<ParamValue>),
    RandomBool,
    Faker(String),
    Concat(Vec<ConcatPart>),
}

/// A validated parameter. `name` never carries the `@` prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ValueKind,
    pub coerce: Option<Coercion>,
    pub sql_type: Option<String>,
}

pub fn normalize_name(name: &str) -> &str {
    name.trim().trim_start_matches('@')
}

impl ParameterSpec {
    pub fn compile(&self, task: &str, faker: &FakerRegistry) -> ConfigResult<Parameter> {
        let name = normalize_name(&self.name).to_string();
        let missing = |field: &'static str| ConfigError::MissingField {
            task: task.to_string(),
            param: name.clone(),
            field,
        };
        let invalid = |message: String| ConfigError::InvalidParameter {
            task: task.to_string(),
            param: name.clone(),
            message,
        };

        if name.is_empty() {
            return Err(invalid("parameter name is empty".to_string()));
        }

        let range = || -> ConfigResult<(i64, i64)> {
            let start = self.start.ok_or_else(|| missing("start"))?;
            let end = self.end.ok_or_else(|| missing("end"))?;
            if start > end {
                return Err(invalid(format!("start {} is greater than end {}", start, end)));
            }
            Ok((start, end))
        };

        let kind_token = self.kind.trim();
        let mut coerce = self.coerce;
        let kind = match kind_token.to_ascii_lowercase().as_str() {
            "random_int" => {
                let (start, end) = range()?;
                ValueKind::RandomInt { start, end }
            }
            "random_int_as_string" => {
                let (start, end) = range()?;
                ValueKind::RandomIntAsString { start, end }
            }
            "guid" => ValueKind::Guid,
            "date" => ValueKind::Date,
            "datetime" => ValueKind::DateTime,
            "datetimeiso" => ValueKind::DateTimeIso,
            "random_bool" => ValueKind::RandomBool,
            "random_list" => {
                let list = self.list.as_ref().ok_or_else(|| missing("list"))?;
                if list.is_empty() {
                    return Err(invalid("list is empty".to_string()));
                }
                let values = list
                    .iter()
                    .map(|v| {
                        ParamValue::from_json(v)
                            .ok_or_else(|| invalid(format!("list entry {} is not a scalar", v)))
                    })
                    .collect::<ConfigResult<Vec<_>>>()?;
                ValueKind::RandomList(values)
            }
            "constant" => {
                let raw = self.value.as_ref().ok_or_else(|| missing("value"))?;
                let literal = ParamValue::from_json(raw)
                    .ok_or_else(|| invalid(format!("constant {} is not a scalar", raw)))?;
                // Constants are coerced once here instead of per call.
                let literal = match coerce.take() {
                    Some(target) => literal
                        .coerce(target, &name)
                        .map_err(|e| invalid(e.to_string()))?,
                    None => literal,
                };
                ValueKind::Constant(literal)
            }
            "constant_string" => {
                let raw = self.value.as_ref().ok_or_else(|| missing("value"))?;
                let text = match raw {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                ValueKind::Constant(ParamValue::Text(text))
            }
            "constant_int" | "constant_int64" => {
                let raw = self.value.as_ref().ok_or_else(|| missing("value"))?;
                let parsed = match raw {
                    serde_json::Value::Number(n) => n.as_i64(),
                    serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                let int = parsed.ok_or_else(|| invalid(format!("{} is not an integer", raw)))?;
                ValueKind::Constant(ParamValue::Int(int))
            }
            "concat" => {
                let template = match self.value.as_ref() {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => return Err(invalid(format!("concat template {} is not a string", other))),
                    None => return Err(missing("value")),
                };
                ValueKind::Concat(parse_concat(&template))
            }
            other => match other.strip_prefix("faker.") {
                Some(method) if faker.contains(method) => ValueKind::Faker(method.to_string()),
                Some(method) => {
                    return Err(ConfigError::UnknownFakerMethod {
                        task: task.to_string(),
                        param: name.clone(),
                        method: method.to_string(),
                    })
                }
                None => {
                    return Err(ConfigError::UnknownParameterType {
                        task: task.to_string(),
                        param: name.clone(),
                        kind: kind_token.to_string(),
                    })
                }
            },
        };

        Ok(Parameter {
            name,
            kind,
            coerce,
            sql_type: self.sql_type.clone(),
        })
    }
}

fn parse_concat(template: &str) -> Vec<ConcatPart> {
    let mut parts = Vec::new();
    let mut idx = 0;
    for caps in CONCAT_REF.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > idx {
            parts.push(ConcatPart::Literal(template[idx..whole.start()].to_string()));
        }
        parts.push(ConcatPart::Reference(caps[1].to_string()));
        idx = whole.end();
    }
    if idx < template.len() {
        parts.push(ConcatPart::Literal(template[idx..].to_string()));
    }
    parts
}

/// Compiles a command's parameter list, rejecting duplicate names.
pub fn compile_parameters(
    task: &str,
    specs: &[ParameterSpec],
    faker: &FakerRegistry,
) -> ConfigResult<Vec<Parameter>> {
    let mut compiled: Vec<Parameter> = Vec::with_capacity(specs.len());
    for spec in specs {
        let param = spec.compile(task, faker)?;
        if compiled.iter().any(|p| p.name == param.name) {
            return Err(ConfigError::DuplicateParameter {
                task: task.to_string(),
                param: param.name,
            });
        }
        compiled.push(param);
    }
    Ok(compiled)
}
