use std::collections::BTreeMap;
use std::sync::Arc;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::{
    Attempt, BoxStrategy, CompletionSet, DagError, ExecutionLog, ReplicatedRunner, ResourcePool,
    RetryExecutor, RunReport, SchedulerConfig, SimulatedStrategy, TaskGraph, TaskId,
    TaskResolution, TaskRun,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Drives a [`TaskGraph`] to completion in rounds.
///
/// Every round dispatches all tasks whose dependencies have completed, runs
/// them concurrently through the [`ReplicatedRunner`], and waits for the whole
/// round before recomputing readiness. A task whose replicas all fail is
/// marked failed and its dependents never run.
pub struct DagScheduler {
    graph: TaskGraph,
    config: SchedulerConfig,
    runner: Arc<ReplicatedRunner>,
    retry: RetryExecutor,
    log: ExecutionLog,
    completed: CompletionSet,
}

impl DagScheduler {
    /// Scheduler backed by the randomized [`SimulatedStrategy`].
    pub fn new(graph: TaskGraph, config: SchedulerConfig) -> Result<Self, DagError> {
        let strategy = Arc::new(SimulatedStrategy::new(
            config.failure_probability,
            config.max_task_duration(),
        ));
        Self::with_strategy(graph, config, strategy)
    }

    /// Scheduler with a caller-supplied replica strategy.
    ///
    /// Configuration is validated here, so inconsistent pool and replication
    /// settings fail before any task runs.
    pub fn with_strategy(
        graph: TaskGraph,
        config: SchedulerConfig,
        strategy: BoxStrategy,
    ) -> Result<Self, DagError> {
        config.validate()?;

        let pool = ResourcePool::with_size(config.resource_pool_size);
        Self::with_pool(graph, config, pool, strategy)
    }

    /// Scheduler over a caller-supplied set of slots.
    ///
    /// The pool's size takes precedence over `resource_pool_size`.
    pub fn with_pool(
        graph: TaskGraph,
        mut config: SchedulerConfig,
        pool: ResourcePool,
        strategy: BoxStrategy,
    ) -> Result<Self, DagError> {
        config.resource_pool_size = pool.len();
        config.validate()?;

        let runner = ReplicatedRunner::new(Arc::new(pool), strategy, config.replication_factor)?
            .with_cancel_on_first_success(config.cancel_on_first_success)
            .with_replica_timeout(config.replica_timeout());
        let retry = RetryExecutor::new(Some(config.retry.clone()));

        Ok(Self {
            graph,
            config,
            runner: Arc::new(runner),
            retry,
            log: ExecutionLog::new(),
            completed: CompletionSet::new(),
        })
    }

    /// Parse a JSON dependency document and build a simulated scheduler for it.
    pub fn from_json(document: &str, config: SchedulerConfig) -> Result<Self, DagError> {
        Self::new(TaskGraph::from_json(document)?, config)
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Handle to the live log; snapshots may be taken while a run is in progress.
    pub fn log(&self) -> ExecutionLog {
        self.log.clone()
    }

    /// Tasks completed by the most recent run.
    pub fn completed(&self) -> &CompletionSet {
        &self.completed
    }

    pub async fn execute(&mut self, ctx: CancellationToken) -> Result<RunReport, DagError> {
        self.log.clear().await;
        self.completed.clear();

        let mut states: BTreeMap<TaskId, TaskState> = self
            .graph
            .tasks()
            .map(|name| (name.to_string(), TaskState::Pending))
            .collect();
        let mut rounds: Vec<Vec<TaskId>> = Vec::new();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks));

        tracing::info!(
            tasks = self.graph.len(),
            pool = self.config.resource_pool_size,
            replication = self.config.replication_factor,
            seed = ?self.config.seed,
            "starting run"
        );

        loop {
            let pending: Vec<TaskId> = states
                .iter()
                .filter(|(_, state)| **state == TaskState::Pending)
                .map(|(name, _)| name.clone())
                .collect();
            if pending.is_empty() {
                break;
            }

            if ctx.is_cancelled() {
                tracing::warn!(round = rounds.len(), pending = pending.len(), "run cancelled");
                let report = self.report(&states, rounds).await;
                return Err(DagError::Cancelled(Box::new(report)));
            }

            let (ready, waiting): (Vec<TaskId>, Vec<TaskId>) = pending
                .into_iter()
                .partition(|name| self.graph.is_satisfied(name, &self.completed));

            if ready.is_empty() {
                tracing::warn!(blocked = ?waiting, "no task can become ready");
                let report = self.report(&states, rounds).await;
                return Err(DagError::Deadlock(Box::new(report)));
            }

            if self.config.record_waiting {
                self.log.extend(waiting.iter().map(Attempt::waiting)).await;
            }

            tracing::debug!(round = rounds.len() + 1, ready = ?ready, "dispatching round");

            // Per-task RNGs are drawn in ascending task order so the round's
            // randomness does not depend on how the tasks interleave.
            let mut handles = Vec::with_capacity(ready.len());
            for name in &ready {
                states.insert(name.clone(), TaskState::Running);
                let task_rng = StdRng::seed_from_u64(rng.next_u64());
                let permit = acquire_permit(&semaphore).await?;
                handles.push(self.spawn_task(name.clone(), task_rng, permit));
            }

            // Every finished task is recorded before the first error, if any, is returned.
            let results = join_all(handles).await;
            let mut first_error = None;
            for (name, joined) in ready.iter().zip(results) {
                let run = match joined
                    .map_err(|e| DagError::TaskJoin(format!("Join error: {}", e)))
                    .and_then(|run| run)
                {
                    Ok(run) => run,
                    Err(err) => {
                        tracing::error!(task = %name, error = %err, "task aborted");
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                        continue;
                    }
                };
                let attempts = run.attempts.len();
                self.log.extend(run.attempts).await;

                if run.success {
                    tracing::info!(task = %name, attempts, "task completed");
                    states.insert(name.clone(), TaskState::Completed);
                    self.completed.insert(name.clone());
                } else {
                    tracing::warn!(task = %name, attempts, "task failed, all replicas exhausted");
                    states.insert(name.clone(), TaskState::Failed);
                }
            }

            if let Some(err) = first_error {
                return Err(err);
            }

            rounds.push(ready);
        }

        let report = self.report(&states, rounds).await;
        tracing::info!(
            rounds = report.rounds.len(),
            completed = report.completed().len(),
            failed = report.failed().len(),
            "run finished"
        );
        Ok(report)
    }

    fn spawn_task(
        &self,
        name: TaskId,
        mut rng: StdRng,
        permit: OwnedSemaphorePermit,
    ) -> JoinHandle<Result<TaskRun, DagError>> {
        let runner = Arc::clone(&self.runner);
        let retry = self.retry.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let factor = runner.replication_factor() as u32;

            retry
                .execute_with_retry(&name, |try_index| {
                    let planned = runner.plan(&name, try_index * factor + 1, &mut rng);
                    let runner = Arc::clone(&runner);
                    async move {
                        let replicas = planned?;
                        Ok::<_, DagError>(runner.execute(replicas).await)
                    }
                })
                .await
        })
    }

    async fn report(&self, states: &BTreeMap<TaskId, TaskState>, rounds: Vec<Vec<TaskId>>) -> RunReport {
        let resolution = states
            .iter()
            .map(|(name, state)| {
                let resolved = match state {
                    TaskState::Completed => TaskResolution::Completed,
                    TaskState::Failed => TaskResolution::Failed,
                    TaskState::Pending | TaskState::Running => TaskResolution::Blocked,
                };
                (name.clone(), resolved)
            })
            .collect();

        RunReport {
            log: self.log.snapshot().await,
            resolution,
            rounds,
        }
    }
}

async fn acquire_permit(semaphore: &Arc<Semaphore>) -> Result<OwnedSemaphorePermit, DagError> {
    Arc::clone(semaphore)
        .acquire_owned()
        .await
        .map_err(|_| DagError::Internal("task concurrency limiter was closed".to_string()))
}
