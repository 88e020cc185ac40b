pub mod graph;
pub mod pool;
pub mod strategy;
pub mod retry;
pub mod runner;
pub mod log;
pub mod config;
pub mod executor;

pub use graph::{GraphError, TaskGraph};
pub use pool::{ResourceId, ResourcePool};
pub use strategy::{Replica, ReplicaOutcome, ReplicaStrategy, SimulatedStrategy};
pub use retry::{RetryPolicy, RetryExecutor};
pub use runner::{ReplicatedRunner, TaskRun};
pub use log::{Attempt, AttemptStatus, ExecutionLog, RunReport, TaskResolution};
pub use config::SchedulerConfig;
pub use executor::DagScheduler;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

pub type TaskId = String;
pub type DependencyMap = BTreeMap<TaskId, Vec<TaskId>>;
pub type CompletionSet = BTreeSet<TaskId>;
pub type BoxStrategy = Arc<dyn ReplicaStrategy>;

#[derive(Error, Debug)]
pub enum DagError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("No resource available: all {pool_size} resources are excluded")]
    NoResourceAvailable { pool_size: usize },
    #[error("Insufficient resources: replication factor {required} exceeds pool size {available}")]
    InsufficientResources { required: usize, available: usize },
    #[error("Deadlock: {} task(s) blocked by upstream failures", .0.blocked().len())]
    Deadlock(Box<RunReport>),
    #[error("Run cancelled after {} round(s)", .0.rounds.len())]
    Cancelled(Box<RunReport>),
    #[error("Malformed document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Task join error: {0}")]
    TaskJoin(String),
    #[error("Scheduler error: {0}")]
    Internal(String),
}

impl DagError {
    /// Partial report carried by run-level errors.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            DagError::Deadlock(report) | DagError::Cancelled(report) => Some(report),
            _ => None,
        }
    }
}
