use std::collections::BTreeMap;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use crate::{ResourceId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Waiting,
    Success,
    Failure,
    /// Dropped after a sibling replica succeeded (cancel-on-first-success only).
    Cancelled,
}

/// One row of the execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub task: TaskId,
    /// 0 for waiting records, 1.. for executions.
    pub attempt: u32,
    pub resource: Option<ResourceId>,
    pub status: AttemptStatus,
}

impl Attempt {
    pub fn waiting(task: impl Into<TaskId>) -> Self {
        Self {
            task: task.into(),
            attempt: 0,
            resource: None,
            status: AttemptStatus::Waiting,
        }
    }

    pub fn executed(
        task: impl Into<TaskId>,
        attempt: u32,
        resource: ResourceId,
        status: AttemptStatus,
    ) -> Self {
        Self {
            task: task.into(),
            attempt,
            resource: Some(resource),
            status,
        }
    }

    pub fn is_execution(&self) -> bool {
        self.status != AttemptStatus::Waiting
    }
}

/// Shared, append-only execution log.
///
/// Cloning yields another handle to the same log, so observers can take
/// snapshots while a run is in progress.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<Attempt>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, attempt: Attempt) {
        self.entries.lock().await.push(attempt);
    }

    /// Append a batch without interleaving other writers.
    pub async fn extend(&self, attempts: impl IntoIterator<Item = Attempt>) {
        self.entries.lock().await.extend(attempts);
    }

    pub async fn snapshot(&self) -> Vec<Attempt> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskResolution {
    Completed,
    Failed,
    /// Never became ready because an upstream task failed, or the run was cancelled.
    Blocked,
}

/// Immutable result of one run: the log plus final per-task states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub log: Vec<Attempt>,
    pub resolution: BTreeMap<TaskId, TaskResolution>,
    /// Tasks dispatched in each round, ascending within a round.
    pub rounds: Vec<Vec<TaskId>>,
}

impl RunReport {
    pub fn completed(&self) -> Vec<&str> {
        self.with_resolution(TaskResolution::Completed)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.with_resolution(TaskResolution::Failed)
    }

    pub fn blocked(&self) -> Vec<&str> {
        self.with_resolution(TaskResolution::Blocked)
    }

    pub fn is_success(&self) -> bool {
        self.resolution.values().all(|r| *r == TaskResolution::Completed)
    }

    pub fn attempts_for<'a>(&'a self, task: &'a str) -> impl Iterator<Item = &'a Attempt> + 'a {
        self.log.iter().filter(move |a| a.task == task)
    }

    /// Round in which `task` was dispatched, if it ever was.
    pub fn round_of(&self, task: &str) -> Option<usize> {
        self.rounds.iter().position(|round| round.iter().any(|t| t == task))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn with_resolution(&self, wanted: TaskResolution) -> Vec<&str> {
        self.resolution
            .iter()
            .filter(|(_, r)| **r == wanted)
            .map(|(task, _)| task.as_str())
            .collect()
    }
}
