use std::sync::Arc;

use tracing::debug;

use crate::client::Client;
use crate::dispatch::{DispatchResult, Dispatcher, DEFAULT_MAX_CONCURRENCY};
use crate::error::DispatchError;
use crate::metrics::EventSink;
use crate::params::{FakerRegistry, ParameterGenerator};
use crate::rng::RandomSource;
use crate::selector::WeightedSelector;
use crate::startup::{self, StartupOutcome, StartupRunState};
use crate::workload::{Task, Workload};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling on concurrently executing units within one dispatch.
    pub max_concurrency: usize,
    /// Seeds task selection and parameter generation when set.
    pub seed: Option<u64>,
    pub faker: FakerRegistry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            seed: None,
            faker: FakerRegistry::default(),
        }
    }
}

/// Runs one workload against one client. Share it behind an `Arc`; every
/// method takes `&self`.
pub struct Engine<C: Client> {
    workload: Workload,
    selector: WeightedSelector,
    dispatcher: Dispatcher<C>,
    client: Arc<C>,
}

impl<C: Client> Engine<C> {
    pub fn new(
        workload: Workload,
        client: Arc<C>,
        sink: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Result<Self, DispatchError> {
        // Selection and generation draw from separate streams.
        let selector = WeightedSelector::new(
            workload.tasks.iter().map(|t| t.weight),
            RandomSource::new(config.seed),
        )?;
        let generator = ParameterGenerator::new(
            config.faker,
            RandomSource::new(config.seed.map(|s| s.wrapping_add(0x9E37_79B9_7F4A_7C15))),
        );
        let dispatcher = Dispatcher::new(
            client.clone(),
            Arc::new(generator),
            sink,
            config.max_concurrency,
        );
        Ok(Self {
            workload,
            selector,
            dispatcher,
            client,
        })
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Picks the next task by weight.
    pub fn select(&self) -> &Task {
        &self.workload.tasks[self.selector.select()]
    }

    /// Dispatches `task` with its configured batch size.
    pub async fn execute(&self, task: &Task) -> DispatchResult {
        self.dispatcher.dispatch(task, task.batch_size()).await
    }

    /// Selects a task and dispatches it.
    pub async fn step(&self) -> DispatchResult {
        let task = self.select();
        debug!(workload = %self.workload.name, task = %task.name, "selected task");
        self.execute(task).await
    }

    pub async fn dispatch_task(&self, name: &str) -> Result<DispatchResult, DispatchError> {
        let task = self
            .workload
            .task(name)
            .ok_or_else(|| DispatchError::UnknownTask(name.to_string()))?;
        Ok(self.execute(task).await)
    }

    /// Runs `script` per the workload's startup frequency.
    pub async fn run_startup(&self, script: &str, state: &StartupRunState) -> StartupOutcome {
        startup::run_startup(
            self.client.as_ref(),
            &self.workload.name,
            self.workload.startup_frequency,
            script,
            state,
        )
        .await
    }
}
