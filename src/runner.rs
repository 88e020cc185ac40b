use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::RngCore;
use rand::rngs::StdRng;
use tokio::time::timeout;
use crate::{
    Attempt, AttemptStatus, BoxStrategy, DagError, Replica, ReplicaOutcome, ResourcePool,
};

/// Outcome of one replicated run of a task.
///
/// `success` is true when at least one replica succeeded. `attempts` holds
/// one record per replica in launch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    pub success: bool,
    pub attempts: Vec<Attempt>,
}

/// Runs a single task redundantly on distinct resources.
pub struct ReplicatedRunner {
    pool: Arc<ResourcePool>,
    strategy: BoxStrategy,
    replication_factor: usize,
    cancel_on_first_success: bool,
    replica_timeout: Duration,
}

impl ReplicatedRunner {
    pub fn new(
        pool: Arc<ResourcePool>,
        strategy: BoxStrategy,
        replication_factor: usize,
    ) -> Result<Self, DagError> {
        if replication_factor == 0 {
            return Err(DagError::InvalidConfig(
                "replication factor must be at least 1".to_string(),
            ));
        }
        if pool.len() < replication_factor {
            return Err(DagError::InsufficientResources {
                required: replication_factor,
                available: pool.len(),
            });
        }

        Ok(Self {
            pool,
            strategy,
            replication_factor,
            cancel_on_first_success: false,
            replica_timeout: Duration::from_secs(60),
        })
    }

    /// Drop the remaining replicas as soon as one succeeds.
    pub fn with_cancel_on_first_success(mut self, enabled: bool) -> Self {
        self.cancel_on_first_success = enabled;
        self
    }

    /// Upper bound for a single replica; overrunning replicas count as failures.
    pub fn with_replica_timeout(mut self, limit: Duration) -> Self {
        self.replica_timeout = limit;
        self
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Choose distinct resources and per-replica seeds, numbering attempts
    /// from `first_attempt`.
    pub fn plan(
        &self,
        task: &str,
        first_attempt: u32,
        rng: &mut StdRng,
    ) -> Result<Vec<Replica>, DagError> {
        if self.pool.len() < self.replication_factor {
            return Err(DagError::InsufficientResources {
                required: self.replication_factor,
                available: self.pool.len(),
            });
        }

        let mut chosen = Vec::with_capacity(self.replication_factor);
        for _ in 0..self.replication_factor {
            let resource = self.strategy.select_resource(&self.pool, &chosen, rng)?;
            if !self.pool.resources().contains(&resource) {
                return Err(DagError::InvalidConfig(format!(
                    "strategy selected '{}' for task '{}', which is not in the resource pool",
                    resource, task
                )));
            }
            if chosen.contains(&resource) {
                return Err(DagError::InvalidConfig(format!(
                    "strategy selected '{}' twice for task '{}'",
                    resource, task
                )));
            }
            chosen.push(resource);
        }

        Ok(chosen
            .into_iter()
            .zip(first_attempt..)
            .map(|(resource, attempt)| Replica {
                task: task.to_string(),
                attempt,
                resource,
                seed: rng.next_u64(),
            })
            .collect())
    }

    /// Launch every planned replica concurrently and wait for them.
    pub async fn execute(&self, replicas: Vec<Replica>) -> TaskRun {
        let outcomes: Vec<Option<ReplicaOutcome>> = if self.cancel_on_first_success {
            self.race(&replicas).await
        } else {
            join_all(replicas.iter().map(|replica| self.launch(replica)))
                .await
                .into_iter()
                .map(Some)
                .collect()
        };

        let success = outcomes.iter().flatten().any(|outcome| outcome.is_success());
        let attempts = replicas
            .into_iter()
            .zip(outcomes)
            .map(|(replica, outcome)| {
                let status = match outcome {
                    Some(ReplicaOutcome::Success) => AttemptStatus::Success,
                    Some(ReplicaOutcome::Failure) => AttemptStatus::Failure,
                    None => AttemptStatus::Cancelled,
                };
                Attempt::executed(replica.task, replica.attempt, replica.resource, status)
            })
            .collect();

        TaskRun { success, attempts }
    }

    /// `plan` followed by `execute`.
    pub async fn run(
        &self,
        task: &str,
        first_attempt: u32,
        rng: &mut StdRng,
    ) -> Result<TaskRun, DagError> {
        let replicas = self.plan(task, first_attempt, rng)?;
        Ok(self.execute(replicas).await)
    }

    // Outcomes indexed by launch position; `None` marks replicas dropped
    // after the first success.
    async fn race(&self, replicas: &[Replica]) -> Vec<Option<ReplicaOutcome>> {
        let mut outcomes = vec![None; replicas.len()];
        let mut pending: FuturesUnordered<_> = replicas
            .iter()
            .enumerate()
            .map(|(index, replica)| async move { (index, self.launch(replica).await) })
            .collect();

        while let Some((index, outcome)) = pending.next().await {
            outcomes[index] = Some(outcome);
            if outcome.is_success() {
                break;
            }
        }

        outcomes
    }

    async fn launch(&self, replica: &Replica) -> ReplicaOutcome {
        let outcome = match timeout(self.replica_timeout, self.strategy.simulate_outcome(replica)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    task = %replica.task,
                    attempt = replica.attempt,
                    resource = %replica.resource,
                    limit_ms = self.replica_timeout.as_millis() as u64,
                    "replica exceeded its time limit"
                );
                ReplicaOutcome::Failure
            }
        };

        tracing::debug!(
            task = %replica.task,
            attempt = replica.attempt,
            resource = %replica.resource,
            outcome = ?outcome,
            "replica finished"
        );
        outcome
    }
}
