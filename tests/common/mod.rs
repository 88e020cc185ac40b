#![allow(dead_code)]

use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use replicuter::{DagScheduler, Replica, ReplicaOutcome, ReplicaStrategy, SchedulerConfig, TaskGraph};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Output is captured per test; enable levels with e.g. `RUST_LOG=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

pub fn diamond() -> TaskGraph {
    TaskGraph::build([
        ("A", vec![]),
        ("B", vec!["A"]),
        ("C", vec!["A"]),
        ("D", vec!["B", "C"]),
    ])
    .unwrap()
}

/// Pool of 3, replication 2, simulated executions of at most 50ms.
pub fn config(failure_probability: f64, seed: u64) -> SchedulerConfig {
    SchedulerConfig {
        resource_pool_size: 3,
        replication_factor: 2,
        failure_probability,
        max_task_duration_ms: 50,
        seed: Some(seed),
        ..Default::default()
    }
}

pub fn simulated(graph: TaskGraph, config: SchedulerConfig) -> DagScheduler {
    init_tracing();
    DagScheduler::new(graph, config).unwrap()
}

/// Succeeds after a fixed delay and records how many replicas overlap.
#[derive(Default)]
pub struct OverlapProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl OverlapProbe {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplicaStrategy for OverlapProbe {
    async fn simulate_outcome(&self, _replica: &Replica) -> ReplicaOutcome {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        ReplicaOutcome::Success
    }
}

/// Fails only the replicas whose attempt number is listed.
pub struct FailAttempts(pub Vec<u32>);

#[async_trait]
impl ReplicaStrategy for FailAttempts {
    async fn simulate_outcome(&self, replica: &Replica) -> ReplicaOutcome {
        if self.0.contains(&replica.attempt) {
            ReplicaOutcome::Failure
        } else {
            ReplicaOutcome::Success
        }
    }
}

pub fn probe() -> Arc<OverlapProbe> {
    Arc::new(OverlapProbe::default())
}
