//! Backend command strategies.
//!
//! A task's command is compiled once at load into a [`CommandSpec`] variant
//! for the workload's backend. Compilation checks every required field and
//! every placeholder, so binding fresh parameter values at execution time
//! cannot fail.

mod document;
mod partition;
pub(crate) mod placeholder;
mod relational;
mod wide_column;

use std::fmt::Display;

use serde_json::Value;

pub use document::{DocumentCommand, DocumentOp, DocumentOperation};
pub use partition::{PartitionCommand, PartitionOp, PartitionOperation};
pub use relational::{Dialect, RelationalCommand, SqlCommand, SqlStatement};
pub use wide_column::{Consistency, CqlCommand, CqlStatement};

use crate::database::Backend;
use crate::error::{ConfigError, ConfigResult};
use crate::params::{FakerRegistry, ParamSet, ParamValue, Parameter};

pub(crate) fn invalid_command(task: &str, message: impl Display) -> ConfigError {
    ConfigError::InvalidCommand {
        task: task.to_string(),
        message: message.to_string(),
    }
}

/// A fully bound, backend-native unit handed to a [`crate::client::Client`].
#[derive(Debug, Clone, PartialEq)]
pub enum BoundCommand {
    Sql(SqlStatement),
    Document(DocumentOperation),
    Partition(PartitionOperation),
    Cql(CqlStatement),
}

/// A multi-row operation for backends with a native batch primitive. Row
/// `i` always corresponds to unit `i` of the dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundBatch {
    BulkInsert {
        dialect: Dialect,
        table: String,
        columns: Vec<String>,
        column_ids: Option<Vec<u32>>,
        rows: Vec<Vec<ParamValue>>,
    },
    InsertMany {
        database: String,
        collection: String,
        documents: Vec<Value>,
    },
}

impl BoundBatch {
    pub fn len(&self) -> usize {
        match self {
            BoundBatch::BulkInsert { rows, .. } => rows.len(),
            BoundBatch::InsertMany { documents, .. } => documents.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Binding capability shared by every backend strategy.
pub trait BindCommand: Send + Sync {
    fn parameters(&self) -> &[Parameter];

    fn batch_size(&self) -> usize;

    fn bind(&self, values: &ParamSet) -> BoundCommand;

    /// Whether batches go to the backend as one multi-row operation.
    fn is_batch_native(&self) -> bool {
        false
    }

    fn bind_batch(&self, _sets: &[ParamSet]) -> Option<BoundBatch> {
        None
    }
}

#[derive(Debug, Clone)]
pub enum CommandSpec {
    Relational(RelationalCommand),
    Document(DocumentCommand),
    Partition(PartitionCommand),
    WideColumn(CqlCommand),
}

impl CommandSpec {
    pub fn compile(
        backend: Backend,
        task: &str,
        raw: Value,
        faker: &FakerRegistry,
    ) -> ConfigResult<Self> {
        match backend {
            Backend::Sql => {
                RelationalCommand::compile(Dialect::SqlServer, task, raw, faker).map(CommandSpec::Relational)
            }
            Backend::Pgsql => {
                RelationalCommand::compile(Dialect::Postgres, task, raw, faker).map(CommandSpec::Relational)
            }
            Backend::MongoDb => DocumentCommand::compile(task, raw, faker).map(CommandSpec::Document),
            Backend::CosmosDb => PartitionCommand::compile(task, raw, faker).map(CommandSpec::Partition),
            Backend::Cassandra => CqlCommand::compile(task, raw, faker).map(CommandSpec::WideColumn),
        }
    }

    fn builder(&self) -> &dyn BindCommand {
        match self {
            CommandSpec::Relational(c) => c,
            CommandSpec::Document(c) => c,
            CommandSpec::Partition(c) => c,
            CommandSpec::WideColumn(c) => c,
        }
    }
}

impl BindCommand for CommandSpec {
    fn parameters(&self) -> &[Parameter] {
        self.builder().parameters()
    }

    fn batch_size(&self) -> usize {
        self.builder().batch_size()
    }

    fn bind(&self, values: &ParamSet) -> BoundCommand {
        self.builder().bind(values)
    }

    fn is_batch_native(&self) -> bool {
        self.builder().is_batch_native()
    }

    fn bind_batch(&self, sets: &[ParamSet]) -> Option<BoundBatch> {
        self.builder().bind_batch(sets)
    }
}
