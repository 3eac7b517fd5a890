use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use dbworkload::command::{BoundBatch, BoundCommand, SqlCommand};
use dbworkload::params::{FakerRegistry, ParamValue};
use dbworkload::{
    Client, ClientError, ConcurrentMetrics, Engine, EngineConfig, ErrorKind, Response,
    StartupOutcome, StartupRunState, Workload,
};

/// Records every call and rejects SQL commands whose first value is even.
#[derive(Default)]
struct RecordingClient {
    commands: Mutex<Vec<BoundCommand>>,
    batches: Mutex<Vec<BoundBatch>>,
    statements: Mutex<Vec<String>>,
}

fn first_int(command: &BoundCommand) -> Option<i64> {
    match command {
        BoundCommand::Sql(statement) => match &statement.command {
            SqlCommand::Prepared { values, .. } | SqlCommand::StoredProcedure { values, .. } => {
                match values.first() {
                    Some(ParamValue::Int(v)) => Some(*v),
                    _ => None,
                }
            }
            _ => None,
        },
        _ => None,
    }
}

#[async_trait]
impl Client for RecordingClient {
    async fn execute_one(&self, command: BoundCommand) -> Result<Response, ClientError> {
        let even = first_int(&command).is_some_and(|v| v % 2 == 0);
        self.commands.lock().unwrap().push(command);
        if even {
            return Err(ClientError::new(ErrorKind::Conflict, "even ids are rejected"));
        }
        Ok(Response::ack())
    }

    async fn execute_many(
        &self,
        batch: BoundBatch,
    ) -> Result<Vec<Result<Response, ClientError>>, ClientError> {
        let rows = batch.len();
        self.batches.lock().unwrap().push(batch);
        // Drop the last row's outcome to exercise missing-row accounting.
        Ok((0..rows.saturating_sub(1)).map(|_| Ok(Response::ack())).collect())
    }

    async fn execute_script(&self, statement: &str) -> Result<(), ClientError> {
        self.statements.lock().unwrap().push(statement.to_string());
        Ok(())
    }
}

fn write_workload(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("accounts.toml");
    std::fs::write(
        &path,
        r#"
type = "SQL"
startupFrequency = "Once"

[[tasks]]
taskName = "lookup"
taskWeight = 1

[tasks.command]
type = "prepared"
definition = "SELECT * FROM accounts WHERE id = @id AND region = @region"
batchSize = 40

[[tasks.command.parameters]]
name = "@id"
type = "random_int"
start = 1
end = 1000

[[tasks.command.parameters]]
name = "@region"
type = "random_list"
list = ["eu", "us"]

[[tasks]]
taskName = "load"
taskWeight = 0

[tasks.command]
type = "bulk_insert"
tableName = "accounts"
columns = ["id", "email"]
batchSize = 10

[[tasks.command.parameters]]
name = "@id"
type = "guid"

[[tasks.command.parameters]]
name = "@email"
type = "faker.email"
"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("accounts_startup.sql"),
        "-- schema\nCREATE TABLE accounts (id int);\n\nCREATE INDEX ix_region ON accounts (region);\n",
    )
    .unwrap();
    path
}

#[tokio::test]
async fn failures_are_attributed_to_their_parameter_sets() {
    let dir = tempfile::tempdir().unwrap();
    let workload = Workload::load(&write_workload(dir.path()), &FakerRegistry::default()).unwrap();
    assert_eq!(workload.name, "accounts");

    let client = Arc::new(RecordingClient::default());
    let metrics = ConcurrentMetrics::default();
    let engine = Engine::new(
        workload,
        client.clone(),
        Arc::new(metrics.clone()),
        EngineConfig {
            max_concurrency: 8,
            ..Default::default()
        },
    )
    .unwrap();

    let result = engine.step().await;
    assert_eq!(result.task_name, "lookup");
    assert_eq!(result.units.len(), 40);
    assert_eq!(result.succeeded + result.failed, 40);
    assert_eq!(client.commands.lock().unwrap().len(), 40);

    let failed: HashMap<usize, ErrorKind> = result
        .errors
        .iter()
        .map(|e| (e.unit_index, e.kind))
        .collect();
    for unit in &result.units {
        let Some(ParamValue::Int(id)) = unit.parameters.as_ref().and_then(|p| p.get("id")) else {
            panic!("unit {} has no id", unit.index);
        };
        assert!((1..=1000).contains(id));
        assert_eq!(failed.contains_key(&unit.index), id % 2 == 0, "unit {}", unit.index);
        assert_eq!(unit.result.is_err(), id % 2 == 0);
    }
    assert!(failed.values().all(|k| *k == ErrorKind::Conflict));

    let snapshot = metrics.get_metrics().await;
    assert_eq!(snapshot.total_units(), 40);
    assert_eq!(snapshot.failed("lookup"), result.failed as u64);
}

#[tokio::test]
async fn bulk_insert_goes_out_as_one_batch() {
    let dir = tempfile::tempdir().unwrap();
    let workload = Workload::load(&write_workload(dir.path()), &FakerRegistry::default()).unwrap();
    let client = Arc::new(RecordingClient::default());
    let engine = Engine::new(
        workload,
        client.clone(),
        Arc::new(ConcurrentMetrics::default()),
        EngineConfig::default(),
    )
    .unwrap();

    let result = engine.dispatch_task("load").await.unwrap();
    assert_eq!(client.batches.lock().unwrap().len(), 1);
    assert!(client.commands.lock().unwrap().is_empty());
    match &client.batches.lock().unwrap()[0] {
        BoundBatch::BulkInsert { table, columns, rows, .. } => {
            assert_eq!(table, "accounts");
            assert_eq!(columns, &vec!["id".to_string(), "email".to_string()]);
            assert_eq!(rows.len(), 10);
        }
        other => panic!("unexpected batch {:?}", other),
    }
    assert_eq!(result.succeeded, 9);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors[0].unit_index, 9);
}

#[tokio::test]
async fn startup_script_runs_once_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let workload = Workload::load(&write_workload(dir.path()), &FakerRegistry::default()).unwrap();
    let script = workload.load_startup_script(dir.path()).unwrap().unwrap();

    let client = Arc::new(RecordingClient::default());
    let engine = Engine::new(
        workload,
        client.clone(),
        Arc::new(ConcurrentMetrics::default()),
        EngineConfig::default(),
    )
    .unwrap();
    let state = StartupRunState::default();

    let first = engine.run_startup(&script, &state).await;
    let second = engine.run_startup(&script, &state).await;
    assert!(matches!(first, StartupOutcome::Ran(r) if r.executed == 2 && r.failed == 0));
    assert_eq!(second, StartupOutcome::AlreadyRan);
    assert_eq!(
        *client.statements.lock().unwrap(),
        vec![
            "CREATE TABLE accounts (id int)".to_string(),
            "CREATE INDEX ix_region ON accounts (region)".to_string()
        ]
    );
}

#[test]
fn invalid_workloads_fail_at_load() {
    let faker = FakerRegistry::default();
    let unbound = Workload::from_value(
        "bad",
        json!({
            "type": "SQL",
            "tasks": [{"taskName": "t", "command": {"definition": "SELECT @missing"}}]
        }),
        &faker,
    );
    assert!(unbound.is_err());

    let unknown_faker = Workload::from_value(
        "bad",
        json!({
            "type": "SQL",
            "tasks": [{
                "taskName": "t",
                "command": {
                    "definition": "SELECT @x",
                    "parameters": [{"name": "@x", "type": "faker.nonexistent"}]
                }
            }]
        }),
        &faker,
    );
    assert!(unknown_faker.is_err());
}
