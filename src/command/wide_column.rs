//! Wide-column strategy: CQL text with positional bind markers.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Deserialize;

use super::placeholder::{ensure_bound, rewrite_text};
use super::{invalid_command, BindCommand, BoundCommand};
use crate::error::ConfigResult;
use crate::params::{compile_parameters, FakerRegistry, ParamSet, ParamValue, Parameter, ParameterSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    One,
    Quorum,
    LocalQuorum,
    All,
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ONE" => Ok(Consistency::One),
            "QUORUM" => Ok(Consistency::Quorum),
            "LOCAL_QUORUM" => Ok(Consistency::LocalQuorum),
            "ALL" => Ok(Consistency::All),
            other => Err(format!("unknown consistency level {}", other)),
        }
    }
}

impl Display for Consistency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Consistency::One => "ONE",
            Consistency::Quorum => "QUORUM",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::All => "ALL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCqlCommand {
    definition: String,
    #[serde(default)]
    consistency_level: Option<String>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
}

/// A bound CQL statement. `consistency` of `None` leaves the session default
/// in place.
#[derive(Debug, Clone, PartialEq)]
pub struct CqlStatement {
    pub text: String,
    pub values: Vec<ParamValue>,
    pub consistency: Option<Consistency>,
}

/// `batch_size` here means concurrent individual executions, never a CQL
/// `BATCH` statement.
#[derive(Debug, Clone)]
pub struct CqlCommand {
    text: String,
    bind_order: Vec<String>,
    consistency: Option<Consistency>,
    parameters: Vec<Parameter>,
    batch_size: usize,
}

impl CqlCommand {
    pub fn compile(task: &str, raw: serde_json::Value, faker: &FakerRegistry) -> ConfigResult<Self> {
        let raw: RawCqlCommand = serde_json::from_value(raw).map_err(|e| invalid_command(task, e))?;
        let parameters = compile_parameters(task, &raw.parameters, faker)?;
        let definition = raw.definition.trim();
        if definition.is_empty() {
            return Err(invalid_command(task, "definition is empty"));
        }

        let consistency = raw
            .consistency_level
            .as_deref()
            .map(Consistency::from_str)
            .transpose()
            .map_err(|e| invalid_command(task, e))?;

        let mut bind_order = Vec::new();
        let text = rewrite_text(definition, |name| {
            bind_order.push(name.to_string());
            "?".to_string()
        });
        ensure_bound(task, &bind_order, &parameters)?;

        Ok(Self {
            text,
            bind_order,
            consistency,
            parameters,
            batch_size: raw.batch_size.unwrap_or(1),
        })
    }
}

impl BindCommand for CqlCommand {
    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn bind(&self, values: &ParamSet) -> BoundCommand {
        BoundCommand::Cql(CqlStatement {
            text: self.text.clone(),
            values: self
                .bind_order
                .iter()
                .map(|name| values.get(name).cloned().unwrap_or(ParamValue::Null))
                .collect(),
            consistency: self.consistency,
        })
    }
}
