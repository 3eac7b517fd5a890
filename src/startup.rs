use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::workload::StartupFrequency;

static GLOBAL_STATE: Lazy<StartupRunState> = Lazy::new(StartupRunState::default);

/// Which workloads have already had their startup script attempted.
///
/// Each workload has its own slot. The slot's lock is held for the whole
/// `Once` attempt, so concurrent callers for the same workload wait and then
/// observe it as done, while other workloads proceed independently.
#[derive(Debug, Default)]
pub struct StartupRunState {
    slots: Mutex<HashMap<String, Arc<Mutex<bool>>>>,
}

impl StartupRunState {
    /// Process-wide state shared by every engine that doesn't supply its own.
    pub fn global() -> &'static StartupRunState {
        &GLOBAL_STATE
    }

    pub async fn has_run(&self, workload: &str) -> bool {
        let slot = self.slots.lock().await.get(workload).cloned();
        match slot {
            Some(slot) => *slot.lock().await,
            None => false,
        }
    }

    async fn slot(&self, workload: &str) -> Arc<Mutex<bool>> {
        self.slots
            .lock()
            .await
            .entry(workload.to_string())
            .or_default()
            .clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptReport {
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Frequency is `Never`.
    Disabled,
    /// Frequency is `Once` and the script was already attempted.
    AlreadyRan,
    Ran(ScriptReport),
}

/// Splits a script into statements on `;`. Everything from `--` to the end
/// of a line is removed before splitting, as are lines starting with `//`.
/// Empty statements are skipped.
pub fn split_statements(script: &str) -> Vec<String> {
    let cleaned: Vec<&str> = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .map(|line| match line.find("--") {
            Some(at) => &line[..at],
            None => line,
        })
        .collect();
    cleaned
        .join("\n")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Executes every statement in order. A failing statement is logged and the
/// rest still run.
pub async fn run_script<C: Client + ?Sized>(client: &C, script: &str) -> ScriptReport {
    let mut report = ScriptReport::default();
    for (i, statement) in split_statements(script).iter().enumerate() {
        report.executed += 1;
        debug!(statement = i, "executing startup statement");
        match client.execute_script(statement).await {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                report.failed += 1;
                warn!(statement = i, error = %e, "startup statement failed: {}", statement);
            }
        }
    }
    report
}

/// Runs `script` for `workload` according to `frequency`.
pub async fn run_startup<C: Client + ?Sized>(
    client: &C,
    workload: &str,
    frequency: StartupFrequency,
    script: &str,
    state: &StartupRunState,
) -> StartupOutcome {
    let outcome = match frequency {
        StartupFrequency::Never => StartupOutcome::Disabled,
        StartupFrequency::Always => StartupOutcome::Ran(run_script(client, script).await),
        StartupFrequency::Once => {
            let slot = state.slot(workload).await;
            let mut attempted = slot.lock().await;
            if *attempted {
                StartupOutcome::AlreadyRan
            } else {
                let report = run_script(client, script).await;
                // Marked even when statements failed; the attempt counts.
                *attempted = true;
                StartupOutcome::Ran(report)
            }
        }
    };

    if let StartupOutcome::Ran(report) = outcome {
        info!(
            workload,
            executed = report.executed,
            succeeded = report.succeeded,
            failed = report.failed,
            "startup script finished"
        );
    }
    outcome
}
