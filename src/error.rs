//! Error types for loading and running workloads.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Fatal problems in a workload definition. The engine refuses to start
/// (or rejects the task) when any of these is found.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read workload file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workload file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported workload file extension: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("unknown backend type: {0}")]
    UnknownBackend(String),

    #[error("duplicate task name: {0}")]
    DuplicateTask(String),

    #[error("no task has a positive weight")]
    NoSelectableTasks,

    #[error("task {task}: invalid command: {message}")]
    InvalidCommand { task: String, message: String },

    #[error("task {task}: duplicate parameter {param}")]
    DuplicateParameter { task: String, param: String },

    #[error("task {task}, parameter {param}: unknown parameter type {kind}")]
    UnknownParameterType {
        task: String,
        param: String,
        kind: String,
    },

    #[error("task {task}, parameter {param}: missing required field {field}")]
    MissingField {
        task: String,
        param: String,
        field: &'static str,
    },

    #[error("task {task}, parameter {param}: {message}")]
    InvalidParameter {
        task: String,
        param: String,
        message: String,
    },

    #[error("task {task}, parameter {param}: unknown faker method {method}")]
    UnknownFakerMethod {
        task: String,
        param: String,
        method: String,
    },

    #[error("task {task}: placeholder @{placeholder} has no matching parameter")]
    UnboundPlaceholder { task: String, placeholder: String },

    #[error("task {task}: stored procedure parameters {actual:?} do not match signature {expected:?}")]
    SignatureMismatch {
        task: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("task {task}: {operation} requires {field}")]
    MissingPartitionField {
        task: String,
        operation: &'static str,
        field: &'static str,
    },
}

/// Per-call failures while materializing parameter values. Only the unit
/// being generated fails.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("parameter {param}: cannot coerce {value} to {target}")]
    Coercion {
        param: String,
        value: String,
        target: &'static str,
    },

    #[error("parameter {param}: unknown faker method {method}")]
    UnknownFakerMethod { param: String, method: String },

    #[error("parameter {param}: concat references unknown parameter @{reference}")]
    UnresolvedReference { param: String, reference: String },
}

/// Category of a failed unit, reported with every failure event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Generation,
    Connection,
    Timeout,
    Conflict,
    NotFound,
    Rejected,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Generation => "generation",
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Failure reported by a database capability for one command.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Attributable failure of one unit in a dispatch.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("task {task_name} unit {unit_index} failed ({kind}): {message}")]
pub struct UnitError {
    pub task_name: String,
    pub unit_index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors from engine entry points that can fail before any unit runs.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("workload has no task named {0}")]
    UnknownTask(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
