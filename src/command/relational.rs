//! Relational strategy: prepared, ad-hoc, stored procedure and bulk insert
//! commands for the SQL Server and PostgreSQL dialects.

use serde::Deserialize;

use super::placeholder::{ensure_bound, rewrite_text, scan_text};
use super::{invalid_command, BindCommand, BoundBatch, BoundCommand};
use crate::error::{ConfigError, ConfigResult};
use crate::params::{compile_parameters, FakerRegistry, ParamSet, ParamValue, Parameter, ParameterSpec};

const DEFAULT_BULK_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    SqlServer,
    Postgres,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRelationalCommand {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    definition: String,
    #[serde(default)]
    table_name: Option<String>,
    #[serde(default)]
    columns: Option<Vec<String>>,
    /// Target column ordinals, as bulk copy APIs take them.
    #[serde(default)]
    column_ids: Option<Vec<u32>>,
    #[serde(default)]
    signature: Option<Vec<String>>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    /// `bind_order` lists parameter names in the order values are sent.
    Prepared { text: String, bind_order: Vec<String> },
    AdHoc { template: String },
    StoredProcedure { name: String },
    BulkInsert {
        table: String,
        columns: Vec<String>,
        column_ids: Option<Vec<u32>>,
    },
}

/// One executable relational statement with its values bound.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlCommand {
    /// SQL Server statements keep `@name` markers and carry a parameter
    /// definition list; PostgreSQL statements use `$n` markers.
    Prepared {
        text: String,
        param_definitions: Option<String>,
        values: Vec<ParamValue>,
    },
    AdHoc {
        text: String,
    },
    StoredProcedure {
        name: String,
        values: Vec<ParamValue>,
    },
    BulkInsert {
        table: String,
        columns: Vec<String>,
        column_ids: Option<Vec<u32>>,
        row: Vec<ParamValue>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub dialect: Dialect,
    pub command: SqlCommand,
}

#[derive(Debug, Clone)]
pub struct RelationalCommand {
    dialect: Dialect,
    statement: Statement,
    parameters: Vec<Parameter>,
    batch_size: usize,
}

impl RelationalCommand {
    pub fn compile(
        dialect: Dialect,
        task: &str,
        raw: serde_json::Value,
        faker: &FakerRegistry,
    ) -> ConfigResult<Self> {
        let raw: RawRelationalCommand =
            serde_json::from_value(raw).map_err(|e| invalid_command(task, e))?;
        let parameters = compile_parameters(task, &raw.parameters, faker)?;
        let kind = raw
            .kind
            .as_deref()
            .unwrap_or("prepared")
            .trim()
            .to_ascii_lowercase();
        let definition = raw.definition.trim().to_string();

        let require_definition = || {
            if definition.is_empty() {
                Err(invalid_command(task, "definition is empty"))
            } else {
                Ok(())
            }
        };

        let statement = match kind.as_str() {
            "prepared" => {
                require_definition()?;
                let referenced = scan_text(&definition);
                ensure_bound(task, &referenced, &parameters)?;
                match dialect {
                    Dialect::SqlServer => Statement::Prepared {
                        text: definition.clone(),
                        bind_order: parameters.iter().map(|p| p.name.clone()).collect(),
                    },
                    Dialect::Postgres => {
                        let mut bind_order: Vec<String> = Vec::new();
                        let text = rewrite_text(&definition, |name| {
                            let position = match bind_order.iter().position(|n| n == name) {
                                Some(position) => position,
                                None => {
                                    bind_order.push(name.to_string());
                                    bind_order.len() - 1
                                }
                            };
                            format!("${}", position + 1)
                        });
                        Statement::Prepared { text, bind_order }
                    }
                }
            }
            "ad-hoc" | "adhoc" | "ad_hoc" => {
                require_definition()?;
                ensure_bound(task, &scan_text(&definition), &parameters)?;
                Statement::AdHoc {
                    template: definition.clone(),
                }
            }
            "stored_procedure" => {
                require_definition()?;
                if let Some(signature) = &raw.signature {
                    let expected: Vec<String> = signature
                        .iter()
                        .map(|s| crate::params::normalize_name(s).to_string())
                        .collect();
                    let actual: Vec<String> = parameters.iter().map(|p| p.name.clone()).collect();
                    if expected != actual {
                        return Err(ConfigError::SignatureMismatch {
                            task: task.to_string(),
                            expected,
                            actual,
                        });
                    }
                }
                Statement::StoredProcedure {
                    name: definition.clone(),
                }
            }
            "bulk_insert" => {
                let table = raw
                    .table_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| invalid_command(task, "bulk_insert requires tableName"))?
                    .to_string();
                if parameters.is_empty() {
                    return Err(invalid_command(task, "bulk_insert requires parameters"));
                }
                let count_mismatch = |field: &str, len: usize| {
                    invalid_command(
                        task,
                        format!(
                            "bulk_insert has {} {} but {} parameters",
                            len,
                            field,
                            parameters.len()
                        ),
                    )
                };
                let columns = match raw.columns {
                    Some(columns) if columns.len() != parameters.len() => {
                        return Err(count_mismatch("columns", columns.len()))
                    }
                    Some(columns) => columns,
                    None => parameters.iter().map(|p| p.name.clone()).collect(),
                };
                if let Some(ids) = &raw.column_ids {
                    if ids.len() != parameters.len() {
                        return Err(count_mismatch("columnIds", ids.len()));
                    }
                }
                Statement::BulkInsert {
                    table,
                    columns,
                    column_ids: raw.column_ids,
                }
            }
            other => {
                return Err(invalid_command(
                    task,
                    format!("unknown relational command type {}", other),
                ))
            }
        };

        let batch_size = match statement {
            Statement::BulkInsert { .. } => raw.batch_size.unwrap_or(DEFAULT_BULK_BATCH_SIZE),
            _ => raw.batch_size.unwrap_or(1),
        };

        Ok(Self {
            dialect,
            statement,
            parameters,
            batch_size,
        })
    }

    fn values_in_order<'a>(&self, order: impl Iterator<Item = &'a String>, values: &ParamSet) -> Vec<ParamValue> {
        // Every placeholder was checked against the parameter list at load.
        order
            .map(|name| values.get(name).cloned().unwrap_or(ParamValue::Null))
            .collect()
    }

    fn param_definitions(&self, values: &ParamSet) -> String {
        self.parameters
            .iter()
            .map(|p| {
                let sql_type = match &p.sql_type {
                    Some(t) => t.to_ascii_uppercase(),
                    None => values
                        .get(&p.name)
                        .map(ParamValue::inferred_sql_type)
                        .unwrap_or("NVARCHAR(MAX)")
                        .to_string(),
                };
                format!("@{} {}", p.name, sql_type)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn bind_sql(&self, values: &ParamSet) -> SqlCommand {
        match &self.statement {
            Statement::Prepared { text, bind_order } => SqlCommand::Prepared {
                text: text.clone(),
                param_definitions: match self.dialect {
                    Dialect::SqlServer => Some(self.param_definitions(values)),
                    Dialect::Postgres => None,
                },
                values: self.values_in_order(bind_order.iter(), values),
            },
            Statement::AdHoc { template } => SqlCommand::AdHoc {
                text: rewrite_text(template, |name| {
                    values
                        .get(name)
                        .map(ParamValue::to_sql_literal)
                        .unwrap_or_else(|| "NULL".to_string())
                }),
            },
            Statement::StoredProcedure { name } => SqlCommand::StoredProcedure {
                name: name.clone(),
                values: self.values_in_order(self.parameters.iter().map(|p| &p.name), values),
            },
            Statement::BulkInsert {
                table,
                columns,
                column_ids,
            } => SqlCommand::BulkInsert {
                table: table.clone(),
                columns: columns.clone(),
                column_ids: column_ids.clone(),
                row: self.values_in_order(self.parameters.iter().map(|p| &p.name), values),
            },
        }
    }
}

impl BindCommand for RelationalCommand {
    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn bind(&self, values: &ParamSet) -> BoundCommand {
        BoundCommand::Sql(SqlStatement {
            dialect: self.dialect,
            command: self.bind_sql(values),
        })
    }

    fn is_batch_native(&self) -> bool {
        matches!(self.statement, Statement::BulkInsert { .. })
    }

    fn bind_batch(&self, sets: &[ParamSet]) -> Option<BoundBatch> {
        let Statement::BulkInsert {
            table,
            columns,
            column_ids,
        } = &self.statement
        else {
            return None;
        };
        let rows = sets
            .iter()
            .map(|set| self.values_in_order(self.parameters.iter().map(|p| &p.name), set))
            .collect();
        Some(BoundBatch::BulkInsert {
            dialect: self.dialect,
            table: table.clone(),
            columns: columns.clone(),
            column_ids: column_ids.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(dialect: Dialect, raw: serde_json::Value) -> ConfigResult<RelationalCommand> {
        RelationalCommand::compile(dialect, "task", raw, &FakerRegistry::default())
    }

    fn values(pairs: &[(&str, ParamValue)]) -> ParamSet {
        let mut set = ParamSet::new();
        for (name, value) in pairs {
            set.insert(*name, value.clone());
        }
        set
    }

    #[test]
    fn postgres_prepared_uses_positional_markers() {
        let cmd = compile(
            Dialect::Postgres,
            json!({
                "type": "prepared",
                "definition": "SELECT * FROM t WHERE a = @a AND b = @b OR a2 = @a",
                "parameters": [
                    {"name": "@b", "type": "constant_int", "value": 2},
                    {"name": "@a", "type": "constant_int", "value": 1}
                ]
            }),
        )
        .unwrap();
        let bound = cmd.bind(&values(&[("a", ParamValue::Int(1)), ("b", ParamValue::Int(2))]));
        let BoundCommand::Sql(SqlStatement { command, .. }) = bound else {
            panic!("expected sql");
        };
        assert_eq!(
            command,
            SqlCommand::Prepared {
                text: "SELECT * FROM t WHERE a = $1 AND b = $2 OR a2 = $1".to_string(),
                param_definitions: None,
                values: vec![ParamValue::Int(1), ParamValue::Int(2)],
            }
        );
    }

    #[test]
    fn sql_server_prepared_carries_definitions() {
        let cmd = compile(
            Dialect::SqlServer,
            json!({
                "definition": "SELECT * FROM t WHERE id = @id AND name = @name",
                "parameters": [
                    {"name": "@id", "type": "random_int", "start": 1, "end": 5, "sqldatatype": "int"},
                    {"name": "@name", "type": "constant_string", "value": "x"}
                ]
            }),
        )
        .unwrap();
        let bound = cmd.bind(&values(&[
            ("id", ParamValue::Int(3)),
            ("name", ParamValue::Text("x".to_string())),
        ]));
        let BoundCommand::Sql(SqlStatement {
            command: SqlCommand::Prepared { param_definitions, .. },
            ..
        }) = bound
        else {
            panic!("expected prepared");
        };
        assert_eq!(param_definitions.as_deref(), Some("@id INT, @name NVARCHAR(MAX)"));
    }

    #[test]
    fn ad_hoc_inlines_literals() {
        let cmd = compile(
            Dialect::SqlServer,
            json!({
                "type": "ad-hoc",
                "definition": "SELECT * FROM people WHERE last = @last",
                "parameters": [{"name": "@last", "type": "constant_string", "value": "O'Hara"}]
            }),
        )
        .unwrap();
        let bound = cmd.bind(&values(&[("last", ParamValue::Text("O'Hara".to_string()))]));
        assert_eq!(
            bound,
            BoundCommand::Sql(SqlStatement {
                dialect: Dialect::SqlServer,
                command: SqlCommand::AdHoc {
                    text: "SELECT * FROM people WHERE last = 'O''Hara'".to_string()
                },
            })
        );
    }

    #[test]
    fn unbound_placeholder_is_rejected() {
        let err = compile(
            Dialect::Postgres,
            json!({"definition": "SELECT @missing", "parameters": []}),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnboundPlaceholder { ref placeholder, .. } if placeholder == "missing"));
    }

    #[test]
    fn stored_procedure_signature_must_match_order() {
        let raw = json!({
            "type": "stored_procedure",
            "definition": "dbo.PlaceOrder",
            "signature": ["@customer", "@amount"],
            "parameters": [
                {"name": "@amount", "type": "random_int", "start": 1, "end": 9},
                {"name": "@customer", "type": "guid"}
            ]
        });
        let err = compile(Dialect::SqlServer, raw).unwrap_err();
        assert!(matches!(err, ConfigError::SignatureMismatch { .. }));
    }

    #[test]
    fn stored_procedure_binds_positionally() {
        let cmd = compile(
            Dialect::SqlServer,
            json!({
                "type": "stored_procedure",
                "definition": "dbo.PlaceOrder",
                "signature": ["customer", "amount"],
                "parameters": [
                    {"name": "@customer", "type": "constant_string", "value": "c"},
                    {"name": "@amount", "type": "constant_int", "value": 4}
                ]
            }),
        )
        .unwrap();
        let bound = cmd.bind(&values(&[
            ("amount", ParamValue::Int(4)),
            ("customer", ParamValue::Text("c".to_string())),
        ]));
        let BoundCommand::Sql(SqlStatement {
            command: SqlCommand::StoredProcedure { values, .. },
            ..
        }) = bound
        else {
            panic!("expected stored procedure");
        };
        assert_eq!(values, vec![ParamValue::Text("c".to_string()), ParamValue::Int(4)]);
    }

    #[test]
    fn bulk_insert_defaults_and_batches() {
        let cmd = compile(
            Dialect::SqlServer,
            json!({
                "type": "bulk_insert",
                "tableName": "dbo.events",
                "parameters": [
                    {"name": "@id", "type": "guid"},
                    {"name": "@at", "type": "datetime"}
                ]
            }),
        )
        .unwrap();
        assert_eq!(cmd.batch_size(), 1000);
        assert!(cmd.is_batch_native());

        let sets = vec![
            values(&[("id", ParamValue::Text("a".into())), ("at", ParamValue::Int(1))]),
            values(&[("id", ParamValue::Text("b".into())), ("at", ParamValue::Int(2))]),
        ];
        let Some(BoundBatch::BulkInsert { columns, rows, .. }) = cmd.bind_batch(&sets) else {
            panic!("expected bulk batch");
        };
        assert_eq!(columns, vec!["id", "at"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], ParamValue::Text("b".into()));
    }

    #[test]
    fn bulk_insert_column_count_must_match() {
        let err = compile(
            Dialect::Postgres,
            json!({
                "type": "bulk_insert",
                "tableName": "events",
                "columns": ["a", "b"],
                "parameters": [{"name": "@a", "type": "guid"}]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCommand { .. }));
    }

    #[test]
    fn bulk_insert_accepts_column_ordinals() {
        let cmd = compile(
            Dialect::SqlServer,
            json!({
                "type": "bulk_insert",
                "tableName": "dbo.t",
                "columnIds": [1, 2],
                "batchSize": 2,
                "parameters": [
                    {"name": "@id", "type": "guid"},
                    {"name": "@qty", "type": "random_int", "start": 1, "end": 3}
                ]
            }),
        )
        .unwrap();
        let sets = vec![values(&[("id", ParamValue::Text("a".into())), ("qty", ParamValue::Int(2))])];
        let Some(BoundBatch::BulkInsert { columns, column_ids, .. }) = cmd.bind_batch(&sets) else {
            panic!("expected bulk batch");
        };
        assert_eq!(column_ids, Some(vec![1, 2]));
        assert_eq!(columns, vec!["id", "qty"]);

        let err = compile(
            Dialect::SqlServer,
            json!({
                "type": "bulk_insert",
                "tableName": "dbo.t",
                "columnIds": [1, 2, 3],
                "parameters": [{"name": "@id", "type": "guid"}]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCommand { .. }));
    }
}
