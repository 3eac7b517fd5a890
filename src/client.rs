use async_trait::async_trait;
use serde_json::Value;

use crate::command::{BoundBatch, BoundCommand};
use crate::error::ClientError;

/// What a backend returned for one successful command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Rows or documents returned, or rows affected for writes.
    pub rows: u64,
    /// Optional payload for reads, kept for debugging.
    pub payload: Option<Value>,
}

impl Response {
    pub fn ack() -> Self {
        Self {
            rows: 1,
            payload: None,
        }
    }

    pub fn rows(rows: u64) -> Self {
        Self {
            rows,
            payload: None,
        }
    }
}

/// Database capability the engine executes against. Implementations own
/// connections, authentication and retries; the engine never retries.
///
/// The dispatcher may run many units of one batch at once and assumes
/// nothing about which pooled connection each unit lands on.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Execute a single bound command
    async fn execute_one(&self, command: BoundCommand) -> Result<Response, ClientError>;

    /// Execute a multi-row operation, reporting one outcome per row in row
    /// order. An outer error means the whole batch failed.
    async fn execute_many(
        &self,
        batch: BoundBatch,
    ) -> Result<Vec<Result<Response, ClientError>>, ClientError>;

    /// Execute one raw statement from a startup script
    async fn execute_script(&self, statement: &str) -> Result<(), ClientError>;
}
