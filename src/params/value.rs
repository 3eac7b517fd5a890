use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// A materialized parameter value, ready to be bound into a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// Target representation requested by a parameter's `as` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coercion {
    String,
    Int,
    Float,
}

impl Coercion {
    fn name(self) -> &'static str {
        match self {
            Coercion::String => "string",
            Coercion::Int => "int",
            Coercion::Float => "float",
        }
    }
}

impl ParamValue {
    /// Converts a literal from a workload file. Arrays and objects have no
    /// scalar representation and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(ParamValue::Null),
            serde_json::Value::Bool(b) => Some(ParamValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(ParamValue::Int)
                .or_else(|| n.as_f64().map(ParamValue::Float)),
            serde_json::Value::String(s) => Some(ParamValue::Text(s.clone())),
            _ => None,
        }
    }

    /// JSON form used by the document and partition-aware stores. Timestamps
    /// use relaxed extended JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Null => serde_json::Value::Null,
            ParamValue::Bool(b) => serde_json::Value::Bool(*b),
            ParamValue::Int(i) => serde_json::Value::from(*i),
            ParamValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ParamValue::Text(s) => serde_json::Value::String(s.clone()),
            ParamValue::Timestamp(ts) => serde_json::json!({ "$date": ts.to_rfc3339() }),
        }
    }

    /// Inline SQL literal for ad-hoc statements.
    pub fn to_sql_literal(&self) -> String {
        match self {
            ParamValue::Null => "NULL".to_string(),
            ParamValue::Bool(true) => "1".to_string(),
            ParamValue::Bool(false) => "0".to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            ParamValue::Timestamp(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
        }
    }

    /// SQL Server type used in a prepared statement's parameter definition
    /// when the parameter does not declare one.
    pub fn inferred_sql_type(&self) -> &'static str {
        match self {
            ParamValue::Null | ParamValue::Text(_) => "NVARCHAR(MAX)",
            ParamValue::Bool(_) => "BIT",
            ParamValue::Int(_) => "BIGINT",
            ParamValue::Float(_) => "FLOAT",
            ParamValue::Timestamp(_) => "DATETIME2",
        }
    }

    pub fn coerce(self, target: Coercion, param: &str) -> Result<ParamValue, GenerationError> {
        let fail = |value: &ParamValue| GenerationError::Coercion {
            param: param.to_string(),
            value: value.to_string(),
            target: target.name(),
        };

        match (target, self) {
            (Coercion::String, ParamValue::Text(s)) => Ok(ParamValue::Text(s)),
            (Coercion::String, ParamValue::Timestamp(ts)) => Ok(ParamValue::Text(ts.to_rfc3339())),
            (Coercion::String, ParamValue::Null) => Err(fail(&ParamValue::Null)),
            (Coercion::String, other) => Ok(ParamValue::Text(other.to_string())),

            (Coercion::Int, ParamValue::Int(i)) => Ok(ParamValue::Int(i)),
            (Coercion::Int, ParamValue::Bool(b)) => Ok(ParamValue::Int(b as i64)),
            (Coercion::Int, ParamValue::Float(f))
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 =>
            {
                Ok(ParamValue::Int(f as i64))
            }
            (Coercion::Int, ParamValue::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(ParamValue::Int(i)),
                Err(_) => Err(fail(&ParamValue::Text(s))),
            },
            (Coercion::Int, ParamValue::Timestamp(ts)) => Ok(ParamValue::Int(ts.timestamp())),

            (Coercion::Float, ParamValue::Float(f)) => Ok(ParamValue::Float(f)),
            (Coercion::Float, ParamValue::Int(i)) => Ok(ParamValue::Float(i as f64)),
            (Coercion::Float, ParamValue::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Ok(ParamValue::Float(f)),
                Err(_) => Err(fail(&ParamValue::Text(s))),
            },
            (Coercion::Float, ParamValue::Timestamp(ts)) => Ok(ParamValue::Float(
                ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_micros()) / 1_000_000.0,
            )),

            (_, other) => Err(fail(&other)),
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Text(s) => write!(f, "{}", s),
            ParamValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

/// The values generated for one unit, in parameter declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParamSet {
    values: Vec<(String, ParamValue)>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
