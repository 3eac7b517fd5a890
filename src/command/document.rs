//! Document-store strategy: CRUD and aggregation over JSON templates.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::placeholder::{ensure_bound, scan_json, substitute_json};
use super::{invalid_command, BindCommand, BoundBatch, BoundCommand};
use crate::error::ConfigResult;
use crate::params::{compile_parameters, FakerRegistry, ParamSet, Parameter, ParameterSpec};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocumentCommand {
    #[serde(rename = "type")]
    kind: String,
    database: String,
    collection: String,
    #[serde(default)]
    document: Option<Value>,
    #[serde(default)]
    filter: Option<Value>,
    #[serde(default)]
    update: Option<Value>,
    #[serde(default)]
    replacement: Option<Value>,
    #[serde(default)]
    projection: Option<Value>,
    #[serde(default)]
    sort: Option<Value>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    pipeline: Option<Vec<Value>>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
}

/// A document operation. Compiled commands hold templates with `@name`
/// leaves; bound commands hold the substituted documents.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOp {
    Insert {
        document: Value,
    },
    Replace {
        filter: Value,
        replacement: Value,
    },
    Update {
        filter: Value,
        update: Value,
    },
    Delete {
        filter: Value,
    },
    Find {
        filter: Value,
        projection: Option<Value>,
        sort: Option<Value>,
        limit: Option<i64>,
    },
    Aggregate {
        pipeline: Vec<Value>,
    },
}

impl DocumentOp {
    fn templates(&self) -> Vec<&Value> {
        match self {
            DocumentOp::Insert { document } => vec![document],
            DocumentOp::Replace {
                filter,
                replacement,
            } => vec![filter, replacement],
            DocumentOp::Update { filter, update } => vec![filter, update],
            DocumentOp::Delete { filter } => vec![filter],
            DocumentOp::Find {
                filter,
                projection,
                sort,
                ..
            } => std::iter::once(filter)
                .chain(projection.as_ref())
                .chain(sort.as_ref())
                .collect(),
            DocumentOp::Aggregate { pipeline } => pipeline.iter().collect(),
        }
    }

    fn substitute(&self, values: &ParamSet) -> DocumentOp {
        let sub = |v: &Value| substitute_json(v, values);
        match self {
            DocumentOp::Insert { document } => DocumentOp::Insert {
                document: sub(document),
            },
            DocumentOp::Replace {
                filter,
                replacement,
            } => DocumentOp::Replace {
                filter: sub(filter),
                replacement: sub(replacement),
            },
            DocumentOp::Update { filter, update } => DocumentOp::Update {
                filter: sub(filter),
                update: sub(update),
            },
            DocumentOp::Delete { filter } => DocumentOp::Delete {
                filter: sub(filter),
            },
            DocumentOp::Find {
                filter,
                projection,
                sort,
                limit,
            } => DocumentOp::Find {
                filter: sub(filter),
                projection: projection.as_ref().map(sub),
                sort: sort.as_ref().map(sub),
                limit: *limit,
            },
            DocumentOp::Aggregate { pipeline } => DocumentOp::Aggregate {
                pipeline: pipeline.iter().map(sub).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOperation {
    pub database: String,
    pub collection: String,
    pub op: DocumentOp,
}

#[derive(Debug, Clone)]
pub struct DocumentCommand {
    database: String,
    collection: String,
    op: DocumentOp,
    parameters: Vec<Parameter>,
    batch_size: usize,
}

fn require_object(task: &str, field: &str, value: Option<Value>) -> ConfigResult<Value> {
    match value {
        Some(Value::Object(map)) => Ok(Value::Object(map)),
        Some(_) => Err(invalid_command(task, format!("{} must be an object", field))),
        None => Err(invalid_command(task, format!("{} is required", field))),
    }
}

fn operator_keys(map: &Map<String, Value>) -> (usize, usize) {
    let operators = map.keys().filter(|k| k.starts_with('$')).count();
    (operators, map.len() - operators)
}

impl DocumentCommand {
    pub fn compile(task: &str, raw: Value, faker: &FakerRegistry) -> ConfigResult<Self> {
        let raw: RawDocumentCommand =
            serde_json::from_value(raw).map_err(|e| invalid_command(task, e))?;
        let parameters = compile_parameters(task, &raw.parameters, faker)?;

        let op = match raw.kind.trim().to_ascii_lowercase().as_str() {
            "insert" => DocumentOp::Insert {
                document: require_object(task, "document", raw.document)?,
            },
            "replace" => {
                let replacement = require_object(task, "replacement", raw.replacement)?;
                if let Value::Object(map) = &replacement {
                    if operator_keys(map).0 > 0 {
                        return Err(invalid_command(
                            task,
                            "replacement document must not contain update operators",
                        ));
                    }
                }
                DocumentOp::Replace {
                    filter: require_object(task, "filter", raw.filter)?,
                    replacement,
                }
            }
            "update" => {
                let update = require_object(task, "update", raw.update)?;
                if let Value::Object(map) = &update {
                    let (operators, fields) = operator_keys(map);
                    if operators == 0 || fields > 0 {
                        return Err(invalid_command(
                            task,
                            "update document must contain only update operators",
                        ));
                    }
                }
                DocumentOp::Update {
                    filter: require_object(task, "filter", raw.filter)?,
                    update,
                }
            }
            "delete" => DocumentOp::Delete {
                filter: require_object(task, "filter", raw.filter)?,
            },
            "find" => DocumentOp::Find {
                filter: require_object(
                    task,
                    "filter",
                    Some(raw.filter.unwrap_or_else(|| Value::Object(Map::new()))),
                )?,
                projection: raw.projection,
                sort: raw.sort,
                limit: raw.limit,
            },
            "aggregate" => {
                let pipeline = raw
                    .pipeline
                    .filter(|stages| !stages.is_empty())
                    .ok_or_else(|| invalid_command(task, "aggregate requires a pipeline"))?;
                if pipeline.iter().any(|stage| !stage.is_object()) {
                    return Err(invalid_command(task, "pipeline stages must be objects"));
                }
                DocumentOp::Aggregate { pipeline }
            }
            other => {
                return Err(invalid_command(
                    task,
                    format!("unknown document command type {}", other),
                ))
            }
        };

        for template in op.templates() {
            ensure_bound(task, &scan_json(template), &parameters)?;
        }

        Ok(Self {
            database: raw.database,
            collection: raw.collection,
            op,
            parameters,
            batch_size: raw.batch_size.unwrap_or(1),
        })
    }
}

impl BindCommand for DocumentCommand {
    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn bind(&self, values: &ParamSet) -> BoundCommand {
        BoundCommand::Document(DocumentOperation {
            database: self.database.clone(),
            collection: self.collection.clone(),
            op: self.op.substitute(values),
        })
    }

    fn is_batch_native(&self) -> bool {
        matches!(self.op, DocumentOp::Insert { .. })
    }

    fn bind_batch(&self, sets: &[ParamSet]) -> Option<BoundBatch> {
        let DocumentOp::Insert { document } = &self.op else {
            return None;
        };
        Some(BoundBatch::InsertMany {
            database: self.database.clone(),
            collection: self.collection.clone(),
            documents: sets
                .iter()
                .map(|set| substitute_json(document, set))
                .collect(),
        })
    }
}
