// Bounded-concurrency task scheduling.
//
// Dispatches one engine run per task onto at most `concurrency` in-flight
// workers and collects an explicit outcome per task. Failures are isolated at
// task granularity; nothing a task does can cancel its siblings. Completion
// order across tasks is whatever the pool produces.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::directory::DeviceMapping;
use crate::engine::DownloadEngine;
use crate::error::EngineError;
use crate::task::DownloadTask;

/// Seam for running one task, so scheduling behavior can be tested without
/// the download stack.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(
        &self,
        task: &DownloadTask,
        mapping: &HashMap<String, DeviceMapping>,
    ) -> Result<PathBuf, EngineError>;
}

#[async_trait]
impl TaskRunner for DownloadEngine {
    async fn run_task(
        &self,
        task: &DownloadTask,
        mapping: &HashMap<String, DeviceMapping>,
    ) -> Result<PathBuf, EngineError> {
        self.run(task, mapping).await
    }
}

/// Result of one dispatched task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: DownloadTask,
    pub result: Result<PathBuf, EngineError>,
}

pub struct Scheduler {
    runner: Arc<dyn TaskRunner>,
    concurrency: usize,
    dispatch_delay: Duration,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn TaskRunner>, config: &EngineConfig) -> Self {
        Self {
            runner,
            concurrency: config.concurrency,
            dispatch_delay: config.dispatch_delay,
        }
    }

    /// Run every task to completion under the concurrency bound and return
    /// one outcome per task.
    ///
    /// Each dispatch is preceded by a small delay to avoid bursting the
    /// remote service's rate limits. A dispatched task always runs to its
    /// natural end; there is no cancellation.
    pub async fn run_all(
        &self,
        tasks: Vec<DownloadTask>,
        mapping: Arc<HashMap<String, DeviceMapping>>,
    ) -> Vec<TaskOutcome> {
        let limit = self.concurrency.max(1);
        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut in_flight: JoinSet<TaskOutcome> = JoinSet::new();

        for task in tasks {
            while in_flight.len() >= limit {
                if let Some(joined) = in_flight.join_next().await {
                    collect(joined, &mut outcomes);
                }
            }

            tokio::time::sleep(self.dispatch_delay).await;

            let runner = self.runner.clone();
            let mapping = mapping.clone();
            in_flight.spawn(async move {
                let result = runner.run_task(&task, &mapping).await;
                TaskOutcome { task, result }
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            collect(joined, &mut outcomes);
        }

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(
            total = outcomes.len(),
            succeeded = outcomes.len() - failed,
            failed,
            "scheduler run complete"
        );
        outcomes
    }
}

fn collect(
    joined: Result<TaskOutcome, tokio::task::JoinError>,
    outcomes: &mut Vec<TaskOutcome>,
) {
    match joined {
        Ok(outcome) => {
            match &outcome.result {
                Ok(artifact) => info!(
                    device_id = %outcome.task.device_id,
                    artifact = %artifact.display(),
                    "task succeeded"
                ),
                Err(e) => error!(
                    device_id = %outcome.task.device_id,
                    error = %e,
                    "task failed"
                ),
            }
            outcomes.push(outcome);
        }
        // A panicking worker loses its outcome record but must not take the
        // run down with it.
        Err(e) => error!(error = %e, "task panicked"),
    }
}
