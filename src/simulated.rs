use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::trace;

use crate::client::{Client, Response};
use crate::command::{BoundBatch, BoundCommand, DocumentOp};
use crate::error::{ClientError, ErrorKind};

/// In-memory stand-in for a database: sleeps for a configured latency and
/// fails a configured fraction of calls. Every backend family is accepted.
#[derive(Debug, Default)]
pub struct SimulatedClient {
    latency: Duration,
    failure_rate: f64,
    commands: AtomicU64,
    batches: AtomicU64,
    statements: AtomicU64,
}

impl SimulatedClient {
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn statements(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    async fn wait(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn roll(&self) -> Result<(), ClientError> {
        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            Err(ClientError::new(ErrorKind::Timeout, "simulated failure"))
        } else {
            Ok(())
        }
    }
}

fn rows_for(command: &BoundCommand) -> u64 {
    match command {
        BoundCommand::Sql(_) | BoundCommand::Cql(_) | BoundCommand::Partition(_) => 1,
        BoundCommand::Document(op) => match &op.op {
            DocumentOp::Find { limit: Some(n), .. } => (*n).max(0) as u64,
            _ => 1,
        },
    }
}

#[async_trait]
impl Client for SimulatedClient {
    async fn execute_one(&self, command: BoundCommand) -> Result<Response, ClientError> {
        self.commands.fetch_add(1, Ordering::Relaxed);
        trace!(?command, "simulated execute");
        self.wait().await;
        self.roll()?;
        Ok(Response::rows(rows_for(&command)))
    }

    async fn execute_many(
        &self,
        batch: BoundBatch,
    ) -> Result<Vec<Result<Response, ClientError>>, ClientError> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.wait().await;
        Ok((0..batch.len()).map(|_| self.roll().map(|_| Response::ack())).collect())
    }

    async fn execute_script(&self, statement: &str) -> Result<(), ClientError> {
        self.statements.fetch_add(1, Ordering::Relaxed);
        trace!(statement, "simulated script statement");
        self.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CqlStatement;

    fn statement() -> BoundCommand {
        BoundCommand::Cql(CqlStatement {
            text: "SELECT 1".to_string(),
            values: Vec::new(),
            consistency: None,
        })
    }

    #[tokio::test]
    async fn never_fails_at_zero_rate() {
        let client = SimulatedClient::new(Duration::ZERO, 0.0);
        for _ in 0..100 {
            assert!(client.execute_one(statement()).await.is_ok());
        }
        assert_eq!(client.commands(), 100);
    }

    #[tokio::test]
    async fn always_fails_at_full_rate() {
        let client = SimulatedClient::new(Duration::ZERO, 1.5);
        let err = client.execute_one(statement()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(client.execute_script("CREATE TABLE t (id int)").await.is_ok());
        assert_eq!(client.statements(), 1);
    }
}
