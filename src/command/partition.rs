//! Partition-aware store strategy: point operations addressed by id and
//! partition key, plus SQL-style queries that may fan out across partitions.

use serde::Deserialize;
use serde_json::Value;

use super::placeholder::{ensure_bound, scan_json, scan_text, substitute_json};
use super::{invalid_command, BindCommand, BoundCommand};
use crate::error::{ConfigError, ConfigResult};
use crate::params::{compile_parameters, FakerRegistry, ParamSet, ParamValue, Parameter, ParameterSpec};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPartitionCommand {
    #[serde(rename = "type")]
    kind: String,
    database: String,
    container: String,
    #[serde(default)]
    document: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    partition_key: Option<Value>,
    #[serde(default)]
    partition_key_path: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartitionOp {
    /// Fails when the id already exists in the partition.
    Insert {
        document: Value,
        partition_key: Option<Value>,
    },
    Upsert {
        document: Value,
        partition_key: Option<Value>,
    },
    PointRead {
        id: Value,
        partition_key: Value,
    },
    Delete {
        id: Value,
        partition_key: Value,
    },
    /// `parameters` pairs each `@name` in the query with its bound value.
    Select {
        query: String,
        parameters: Vec<(String, Value)>,
        partition_key: Option<Value>,
        cross_partition: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionOperation {
    pub database: String,
    pub container: String,
    pub op: PartitionOp,
}

#[derive(Debug, Clone)]
pub struct PartitionCommand {
    database: String,
    container: String,
    op: PartitionOp,
    /// JSON pointer used to read the partition key out of written documents.
    partition_key_pointer: Option<String>,
    query_names: Vec<String>,
    parameters: Vec<Parameter>,
    batch_size: usize,
}

fn require(
    task: &str,
    operation: &'static str,
    field: &'static str,
    value: Option<Value>,
) -> ConfigResult<Value> {
    match value {
        Some(Value::Null) | None => Err(ConfigError::MissingPartitionField {
            task: task.to_string(),
            operation,
            field,
        }),
        Some(value) => Ok(value),
    }
}

fn written_document(task: &str, document: Option<Value>) -> ConfigResult<Value> {
    match document {
        Some(Value::Object(map)) if map.contains_key("id") => Ok(Value::Object(map)),
        Some(Value::Object(_)) => Err(invalid_command(task, "document must contain an id")),
        Some(_) => Err(invalid_command(task, "document must be an object")),
        None => Err(invalid_command(task, "document is required")),
    }
}

impl PartitionCommand {
    pub fn compile(task: &str, raw: Value, faker: &FakerRegistry) -> ConfigResult<Self> {
        let raw: RawPartitionCommand =
            serde_json::from_value(raw).map_err(|e| invalid_command(task, e))?;
        let parameters = compile_parameters(task, &raw.parameters, faker)?;
        let partition_key_pointer = raw
            .partition_key_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                if p.starts_with('/') {
                    p.to_string()
                } else {
                    format!("/{}", p)
                }
            });
        let mut query_names = Vec::new();

        let op = match raw.kind.trim().to_ascii_lowercase().as_str() {
            "insert" => PartitionOp::Insert {
                document: written_document(task, raw.document)?,
                partition_key: raw.partition_key,
            },
            "upsert" => PartitionOp::Upsert {
                document: written_document(task, raw.document)?,
                partition_key: raw.partition_key,
            },
            "point_read" => PartitionOp::PointRead {
                id: require(task, "point_read", "id", raw.id)?,
                partition_key: require(task, "point_read", "partitionKey", raw.partition_key)?,
            },
            "delete" => PartitionOp::Delete {
                id: require(task, "delete", "id", raw.id)?,
                partition_key: require(task, "delete", "partitionKey", raw.partition_key)?,
            },
            "select" => {
                let query = raw
                    .query
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .ok_or_else(|| invalid_command(task, "select requires a query"))?;
                for name in scan_text(&query) {
                    if !query_names.contains(&name) {
                        query_names.push(name);
                    }
                }
                let partition_key = raw.partition_key.filter(|v| !v.is_null());
                PartitionOp::Select {
                    query,
                    parameters: Vec::new(),
                    cross_partition: partition_key.is_none(),
                    partition_key,
                }
            }
            other => {
                return Err(invalid_command(
                    task,
                    format!("unknown partition-aware command type {}", other),
                ))
            }
        };

        ensure_bound(task, &query_names, &parameters)?;
        for template in op_templates(&op) {
            ensure_bound(task, &scan_json(template), &parameters)?;
        }

        Ok(Self {
            database: raw.database,
            container: raw.container,
            op,
            partition_key_pointer,
            query_names,
            parameters,
            batch_size: raw.batch_size.unwrap_or(1),
        })
    }

    fn partition_key_for(&self, explicit: &Option<Value>, document: &Value, values: &ParamSet) -> Option<Value> {
        match explicit {
            Some(template) => Some(substitute_json(template, values)),
            None => self
                .partition_key_pointer
                .as_deref()
                .and_then(|pointer| document.pointer(pointer))
                .cloned(),
        }
    }
}

fn op_templates(op: &PartitionOp) -> Vec<&Value> {
    match op {
        PartitionOp::Insert {
            document,
            partition_key,
        }
        | PartitionOp::Upsert {
            document,
            partition_key,
        } => std::iter::once(document).chain(partition_key.as_ref()).collect(),
        PartitionOp::PointRead { id, partition_key } | PartitionOp::Delete { id, partition_key } => {
            vec![id, partition_key]
        }
        PartitionOp::Select { partition_key, .. } => partition_key.iter().collect(),
    }
}

impl BindCommand for PartitionCommand {
    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn bind(&self, values: &ParamSet) -> BoundCommand {
        let op = match &self.op {
            PartitionOp::Insert {
                document,
                partition_key,
            } => {
                let document = substitute_json(document, values);
                PartitionOp::Insert {
                    partition_key: self.partition_key_for(partition_key, &document, values),
                    document,
                }
            }
            PartitionOp::Upsert {
                document,
                partition_key,
            } => {
                let document = substitute_json(document, values);
                PartitionOp::Upsert {
                    partition_key: self.partition_key_for(partition_key, &document, values),
                    document,
                }
            }
            PartitionOp::PointRead { id, partition_key } => PartitionOp::PointRead {
                id: substitute_json(id, values),
                partition_key: substitute_json(partition_key, values),
            },
            PartitionOp::Delete { id, partition_key } => PartitionOp::Delete {
                id: substitute_json(id, values),
                partition_key: substitute_json(partition_key, values),
            },
            PartitionOp::Select {
                query,
                partition_key,
                cross_partition,
                ..
            } => PartitionOp::Select {
                query: query.clone(),
                parameters: self
                    .query_names
                    .iter()
                    .map(|name| {
                        let value = values.get(name).map(ParamValue::to_json).unwrap_or(Value::Null);
                        (format!("@{}", name), value)
                    })
                    .collect(),
                partition_key: partition_key.as_ref().map(|pk| substitute_json(pk, values)),
                cross_partition: *cross_partition,
            },
        };

        BoundCommand::Partition(PartitionOperation {
            database: self.database.clone(),
            container: self.container.clone(),
            op,
        })
    }
}
