//! Batch dispatch: expands a task into independently generated units and
//! executes them against a [`Client`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::client::{Client, Response};
use crate::command::BindCommand;
use crate::error::{ClientError, ErrorKind, UnitError};
use crate::metrics::{EventSink, UnitEvent};
use crate::params::{ParamSet, ParameterGenerator};
use crate::workload::Task;

pub const DEFAULT_MAX_CONCURRENCY: usize = 100;

/// Outcome of one unit. `parameters` is the exact set generated for the
/// unit, or `None` when generation itself failed.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub index: usize,
    pub parameters: Option<ParamSet>,
    pub latency: Duration,
    pub result: Result<Response, UnitError>,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchResult {
    pub task_name: String,
    pub succeeded: usize,
    pub failed: usize,
    /// Sorted by unit index.
    pub units: Vec<UnitOutcome>,
    /// Failed units only, sorted by unit index.
    pub errors: Vec<UnitError>,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

type Generated = (usize, Result<ParamSet, UnitError>);

pub struct Dispatcher<C: Client> {
    client: Arc<C>,
    generator: Arc<ParameterGenerator>,
    sink: Arc<dyn EventSink>,
    max_concurrency: usize,
}

impl<C: Client> Dispatcher<C> {
    pub fn new(
        client: Arc<C>,
        generator: Arc<ParameterGenerator>,
        sink: Arc<dyn EventSink>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            client,
            generator,
            sink,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn generator(&self) -> &ParameterGenerator {
        &self.generator
    }

    /// Runs `batch_size` units of `task` (at least one) and waits for all of
    /// them. Dropping the returned future aborts units still in flight.
    pub async fn dispatch(&self, task: &Task, batch_size: usize) -> DispatchResult {
        let units = batch_size.max(1);
        let generated: Vec<Generated> = (0..units)
            .map(|index| {
                let set = self
                    .generator
                    .generate_set(task.command.parameters())
                    .map_err(|e| UnitError {
                        task_name: task.name.clone(),
                        unit_index: index,
                        kind: ErrorKind::Generation,
                        message: e.to_string(),
                    });
                (index, set)
            })
            .collect();

        let outcomes = if units == 1 {
            self.run_single(task, generated).await
        } else if task.command.is_batch_native() {
            self.run_native(task, generated).await
        } else {
            self.run_concurrent(task, generated).await
        };

        self.finish(task, outcomes).await
    }

    async fn run_single(&self, task: &Task, generated: Vec<Generated>) -> Vec<UnitOutcome> {
        let mut outcomes = Vec::with_capacity(1);
        for (index, set) in generated {
            let set = match set {
                Ok(set) => set,
                Err(e) => {
                    outcomes.push(generation_failure(index, e));
                    continue;
                }
            };
            let command = task.command.bind(&set);
            debug!(task = %task.name, unit = index, ?command, "executing command");
            let start = Instant::now();
            let result = self.client.execute_one(command).await;
            outcomes.push(UnitOutcome {
                index,
                latency: start.elapsed(),
                result: result.map_err(|e| unit_error(&task.name, index, e)),
                parameters: Some(set),
            });
        }
        outcomes
    }

    async fn run_native(&self, task: &Task, generated: Vec<Generated>) -> Vec<UnitOutcome> {
        let mut outcomes = Vec::with_capacity(generated.len());
        let mut indices = Vec::with_capacity(generated.len());
        let mut sets = Vec::with_capacity(generated.len());
        for (index, set) in generated {
            match set {
                Ok(set) => {
                    indices.push(index);
                    sets.push(set);
                }
                Err(e) => outcomes.push(generation_failure(index, e)),
            }
        }
        if sets.is_empty() {
            return outcomes;
        }

        let Some(batch) = task.command.bind_batch(&sets) else {
            // Only reachable if a strategy claims native batching without
            // providing a batch form; fall back to per-unit execution.
            let generated = indices.into_iter().zip(sets.into_iter().map(Ok)).collect();
            outcomes.extend(self.run_concurrent(task, generated).await);
            return outcomes;
        };

        debug!(task = %task.name, rows = batch.len(), "executing batch");
        let start = Instant::now();
        let result = self.client.execute_many(batch).await;
        let latency = start.elapsed();

        match result {
            Ok(rows) => {
                if rows.len() > sets.len() {
                    warn!(
                        task = %task.name,
                        expected = sets.len(),
                        reported = rows.len(),
                        "backend reported more row outcomes than rows sent"
                    );
                }
                let mut rows = rows.into_iter();
                for (index, set) in indices.into_iter().zip(sets) {
                    let result = match rows.next() {
                        Some(row) => row.map_err(|e| unit_error(&task.name, index, e)),
                        None => Err(unit_error(
                            &task.name,
                            index,
                            ClientError::new(ErrorKind::Other, "backend reported no outcome for row"),
                        )),
                    };
                    outcomes.push(UnitOutcome {
                        index,
                        parameters: Some(set),
                        latency,
                        result,
                    });
                }
            }
            Err(e) => {
                for (index, set) in indices.into_iter().zip(sets) {
                    outcomes.push(UnitOutcome {
                        index,
                        parameters: Some(set),
                        latency,
                        result: Err(unit_error(&task.name, index, e.clone())),
                    });
                }
            }
        }
        outcomes
    }

    async fn run_concurrent(&self, task: &Task, generated: Vec<Generated>) -> Vec<UnitOutcome> {
        let limit = self.max_concurrency.min(generated.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut in_flight = JoinSet::new();
        let mut pending = BTreeSet::new();
        let mut outcomes = Vec::with_capacity(generated.len());

        for (index, set) in generated {
            let set = match set {
                Ok(set) => set,
                Err(e) => {
                    outcomes.push(generation_failure(index, e));
                    continue;
                }
            };
            let command = task.command.bind(&set);
            debug!(task = %task.name, unit = index, ?command, "scheduling unit");
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            pending.insert(index);
            in_flight.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let start = Instant::now();
                        let result = client.execute_one(command).await;
                        (start.elapsed(), result)
                    }
                    Err(_) => (
                        Duration::ZERO,
                        Err(ClientError::new(ErrorKind::Other, "concurrency limiter closed")),
                    ),
                };
                (index, set, result)
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((index, set, (latency, result))) => {
                    pending.remove(&index);
                    outcomes.push(UnitOutcome {
                        index,
                        parameters: Some(set),
                        latency,
                        result: result.map_err(|e| unit_error(&task.name, index, e)),
                    });
                }
                Err(e) => warn!(task = %task.name, error = %e, "unit task did not complete"),
            }
        }

        // Units whose task panicked never reported back.
        for index in pending {
            outcomes.push(UnitOutcome {
                index,
                parameters: None,
                latency: Duration::ZERO,
                result: Err(unit_error(
                    &task.name,
                    index,
                    ClientError::new(ErrorKind::Other, "unit task aborted"),
                )),
            });
        }
        outcomes
    }

    async fn finish(&self, task: &Task, mut outcomes: Vec<UnitOutcome>) -> DispatchResult {
        outcomes.sort_by_key(|o| o.index);

        let mut result = DispatchResult {
            task_name: task.name.clone(),
            ..Default::default()
        };
        for outcome in &outcomes {
            let error_kind = match &outcome.result {
                Ok(_) => {
                    result.succeeded += 1;
                    None
                }
                Err(e) => {
                    result.failed += 1;
                    warn!(
                        task = %task.name,
                        unit = outcome.index,
                        kind = %e.kind,
                        parameters = ?outcome.parameters,
                        "unit failed: {}",
                        e.message
                    );
                    result.errors.push(e.clone());
                    Some(e.kind)
                }
            };
            self.sink
                .record(UnitEvent {
                    task_name: task.name.clone(),
                    unit_index: outcome.index,
                    success: error_kind.is_none(),
                    latency: outcome.latency,
                    error_kind,
                })
                .await;
        }
        result.units = outcomes;
        result
    }
}

fn unit_error(task_name: &str, unit_index: usize, e: ClientError) -> UnitError {
    UnitError {
        task_name: task_name.to_string(),
        unit_index,
        kind: e.kind,
        message: e.message,
    }
}

fn generation_failure(index: usize, e: UnitError) -> UnitOutcome {
    UnitOutcome {
        index,
        parameters: None,
        latency: Duration::ZERO,
        result: Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::command::{BoundBatch, BoundCommand, CqlStatement};
    use crate::database::Backend;
    use crate::metrics::ConcurrentMetrics;
    use crate::params::{FakerRegistry, ParamValue};
    use crate::workload::Workload;

    /// Fails any CQL statement whose first bound value equals `fail_on`.
    #[derive(Default)]
    struct ScriptedClient {
        fail_on: Option<i64>,
        executed: Mutex<Vec<i64>>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        completed: AtomicUsize,
        row_failures: Vec<usize>,
    }

    #[async_trait]
    impl Client for ScriptedClient {
        async fn execute_one(&self, command: BoundCommand) -> Result<Response, ClientError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);

            let BoundCommand::Cql(CqlStatement { values, .. }) = command else {
                return Err(ClientError::new(ErrorKind::Rejected, "unexpected command"));
            };
            let Some(ParamValue::Int(unit)) = values.first().cloned() else {
                return Err(ClientError::new(ErrorKind::Rejected, "missing value"));
            };
            self.executed.lock().unwrap().push(unit);
            if Some(unit) == self.fail_on {
                return Err(ClientError::new(ErrorKind::Conflict, format!("unit {} rejected", unit)));
            }
            Ok(Response::ack())
        }

        async fn execute_many(
            &self,
            batch: BoundBatch,
        ) -> Result<Vec<Result<Response, ClientError>>, ClientError> {
            Ok((0..batch.len())
                .map(|row| {
                    if self.row_failures.contains(&row) {
                        Err(ClientError::new(ErrorKind::Conflict, "duplicate key"))
                    } else {
                        Ok(Response::ack())
                    }
                })
                .collect())
        }

        async fn execute_script(&self, _statement: &str) -> Result<(), ClientError> {
            Ok(())
        }
    }

    fn counter_task(batch_size: usize) -> Task {
        let workload = Workload::from_value(
            "w",
            json!({
                "type": "cassandra",
                "tasks": [{
                    "taskName": "write",
                    "command": {
                        "definition": "INSERT INTO t (id) VALUES (@id)",
                        "batchSize": batch_size,
                        "parameters": [{"name": "@id", "type": "random_int", "start": 0, "end": 1_000_000_000}]
                    }
                }]
            }),
            &FakerRegistry::default(),
        )
        .unwrap();
        assert_eq!(workload.backend, Backend::Cassandra);
        workload.tasks.into_iter().next().unwrap()
    }

    fn dispatcher(client: Arc<ScriptedClient>, metrics: ConcurrentMetrics, limit: usize) -> Dispatcher<ScriptedClient> {
        Dispatcher::new(
            client,
            Arc::new(ParameterGenerator::default()),
            Arc::new(metrics),
            limit,
        )
    }

    fn unit_value(outcome: &UnitOutcome) -> i64 {
        match outcome.parameters.as_ref().and_then(|p| p.get("id")) {
            Some(ParamValue::Int(v)) => *v,
            other => panic!("unexpected parameters {:?}", other),
        }
    }

    #[tokio::test]
    async fn single_unit_runs_inline() {
        let task = counter_task(1);
        let client = Arc::new(ScriptedClient::default());
        let metrics = ConcurrentMetrics::default();
        let result = dispatcher(client.clone(), metrics.clone(), 10).dispatch(&task, 1).await;
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.units.len(), 1);
        assert_eq!(metrics.get_metrics().await.total_units(), 1);
    }

    #[tokio::test]
    async fn batch_with_one_failing_unit() {
        let task = counter_task(8);

        // Replay the seeded stream to learn which value unit 5 will draw.
        let expected: Vec<ParamSet> = {
            let replay = ParameterGenerator::new(
                FakerRegistry::default(),
                crate::rng::RandomSource::new(Some(99)),
            );
            (0..8)
                .map(|_| replay.generate_set(task.command.parameters()).unwrap())
                .collect()
        };
        let generator = Arc::new(ParameterGenerator::new(
            FakerRegistry::default(),
            crate::rng::RandomSource::new(Some(99)),
        ));
        let Some(ParamValue::Int(fail_on)) = expected[5].get("id").cloned() else {
            panic!("expected int");
        };

        let client = Arc::new(ScriptedClient {
            fail_on: Some(fail_on),
            ..Default::default()
        });
        let metrics = ConcurrentMetrics::default();
        let dispatcher = Dispatcher::new(client.clone(), generator, Arc::new(metrics.clone()), 3);
        let result = dispatcher.dispatch(&task, 8).await;

        assert_eq!(result.succeeded, 7);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].unit_index, 5);
        assert_eq!(result.errors[0].kind, ErrorKind::Conflict);
        assert_eq!(unit_value(&result.units[5]), fail_on);

        // Every unit executed exactly once, none skipped.
        let mut executed = client.executed.lock().unwrap().clone();
        executed.sort_unstable();
        let mut generated: Vec<i64> = result.units.iter().map(unit_value).collect();
        generated.sort_unstable();
        assert_eq!(executed, generated);
        assert_eq!(result.units.iter().map(|u| u.index).collect::<Vec<_>>(), (0..8).collect::<Vec<_>>());

        let snapshot = metrics.get_metrics().await;
        assert_eq!(snapshot.succeeded("write"), 7);
        assert_eq!(snapshot.failed("write"), 1);
    }

    #[tokio::test]
    async fn units_get_distinct_parameters() {
        let task = counter_task(50);
        let client = Arc::new(ScriptedClient::default());
        let result = dispatcher(client, ConcurrentMetrics::default(), 16)
            .dispatch(&task, 50)
            .await;
        let distinct: BTreeSet<i64> = result.units.iter().map(unit_value).collect();
        // Collisions in a range of 10^9 across 50 draws are vanishingly rare.
        assert!(distinct.len() >= 49);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let task = counter_task(40);
        let client = Arc::new(ScriptedClient {
            delay: Duration::from_millis(5),
            ..Default::default()
        });
        let result = dispatcher(client.clone(), ConcurrentMetrics::default(), 4)
            .dispatch(&task, 40)
            .await;
        assert_eq!(result.succeeded, 40);
        assert!(client.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn dropping_dispatch_aborts_in_flight_units() {
        let task = counter_task(20);
        let client = Arc::new(ScriptedClient {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let dispatcher = dispatcher(client.clone(), ConcurrentMetrics::default(), 20);
        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), dispatcher.dispatch(&task, 20)).await;
        assert!(timed_out.is_err());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(client.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generation_failures_never_reach_the_client() {
        let workload = Workload::from_value(
            "w",
            json!({
                "type": "cassandra",
                "tasks": [{
                    "taskName": "write",
                    "command": {
                        "definition": "INSERT INTO t (id) VALUES (@id)",
                        "parameters": [{"name": "@id", "type": "guid", "as": "int"}]
                    }
                }]
            }),
            &FakerRegistry::default(),
        )
        .unwrap();
        let task = &workload.tasks[0];
        let client = Arc::new(ScriptedClient::default());
        let result = dispatcher(client.clone(), ConcurrentMetrics::default(), 4)
            .dispatch(task, 3)
            .await;
        assert_eq!(result.failed, 3);
        assert!(result.errors.iter().all(|e| e.kind == ErrorKind::Generation));
        assert_eq!(client.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn native_batch_surfaces_row_outcomes() {
        let workload = Workload::from_value(
            "w",
            json!({
                "type": "mongodb",
                "tasks": [{
                    "taskName": "insert",
                    "command": {
                        "type": "insert",
                        "database": "db",
                        "collection": "c",
                        "document": {"_id": "@id"},
                        "batchSize": 5,
                        "parameters": [{"name": "@id", "type": "guid"}]
                    }
                }]
            }),
            &FakerRegistry::default(),
        )
        .unwrap();
        let task = &workload.tasks[0];
        let client = Arc::new(ScriptedClient {
            row_failures: vec![1, 3],
            ..Default::default()
        });
        let result = dispatcher(client, ConcurrentMetrics::default(), 4)
            .dispatch(task, task.batch_size())
            .await;
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failed, 2);
        assert_eq!(
            result.errors.iter().map(|e| e.unit_index).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }
}
