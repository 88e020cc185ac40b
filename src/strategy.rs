use std::time::Duration;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::{DagError, ResourceId, ResourcePool, TaskId};

/// One redundant execution of a task, fully planned before launch.
///
/// `seed` is the replica's private randomness; strategies that simulate
/// work should draw from it rather than from shared state so that seeded
/// runs stay reproducible under concurrency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replica {
    pub task: TaskId,
    pub attempt: u32,
    pub resource: ResourceId,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaOutcome {
    Success,
    Failure,
}

impl ReplicaOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, ReplicaOutcome::Success)
    }
}

/// Resource selection and execution of replicas.
#[async_trait]
pub trait ReplicaStrategy: Send + Sync {
    fn select_resource(
        &self,
        pool: &ResourcePool,
        excluding: &[ResourceId],
        rng: &mut StdRng,
    ) -> Result<ResourceId, DagError> {
        pool.pick(excluding, rng)
    }

    async fn simulate_outcome(&self, replica: &Replica) -> ReplicaOutcome;
}

/// Unreliable logical worker: random duration, random pass/fail.
#[derive(Debug, Clone)]
pub struct SimulatedStrategy {
    failure_probability: f64,
    max_duration: Duration,
}

impl SimulatedStrategy {
    pub fn new(failure_probability: f64, max_duration: Duration) -> Self {
        let failure_probability = if failure_probability.is_nan() {
            0.0
        } else {
            failure_probability.clamp(0.0, 1.0)
        };
        Self {
            failure_probability,
            max_duration,
        }
    }
}

#[async_trait]
impl ReplicaStrategy for SimulatedStrategy {
    async fn simulate_outcome(&self, replica: &Replica) -> ReplicaOutcome {
        let mut rng = StdRng::seed_from_u64(replica.seed);
        let max_ms = self.max_duration.as_millis().max(1) as u64;
        let duration = Duration::from_millis(rng.gen_range(0..max_ms));
        let failed = rng.gen_bool(self.failure_probability);

        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }

        if failed {
            ReplicaOutcome::Failure
        } else {
            ReplicaOutcome::Success
        }
    }
}
