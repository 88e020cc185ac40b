use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use crate::{DagError, RetryPolicy};

/// Run configuration. Deserializes from camelCase JSON; every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    /// Number of logical execution slots.
    pub resource_pool_size: usize,
    /// Replicas launched per task, on distinct slots.
    pub replication_factor: usize,
    /// Per-replica chance of simulated failure.
    pub failure_probability: f64,
    /// Upper bound for a simulated execution.
    pub max_task_duration_ms: u64,
    /// Fixed seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,
    /// Tasks allowed to run at the same time within a round.
    pub max_concurrent_tasks: usize,
    pub cancel_on_first_success: bool,
    /// Emit a waiting record for every unready task in every dispatching round.
    pub record_waiting: bool,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            resource_pool_size: 3,
            replication_factor: 2,
            failure_probability: 0.2,
            max_task_duration_ms: 2_000,
            seed: None,
            max_concurrent_tasks: 1024,
            cancel_on_first_success: false,
            record_waiting: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(document: &str) -> Result<Self, DagError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DagError> {
        if self.resource_pool_size < 2 {
            return Err(DagError::InvalidConfig(format!(
                "resourcePoolSize must be >= 2 (got {})",
                self.resource_pool_size
            )));
        }
        if self.replication_factor < 2 {
            return Err(DagError::InvalidConfig(format!(
                "replicationFactor must be >= 2 (got {})",
                self.replication_factor
            )));
        }
        if self.replication_factor > self.resource_pool_size {
            return Err(DagError::InsufficientResources {
                required: self.replication_factor,
                available: self.resource_pool_size,
            });
        }
        if !(0.0..=1.0).contains(&self.failure_probability) {
            return Err(DagError::InvalidConfig(format!(
                "failureProbability must be in [0, 1] (got {})",
                self.failure_probability
            )));
        }
        if self.max_task_duration_ms == 0 {
            return Err(DagError::InvalidConfig(
                "maxTaskDurationMs must be > 0".to_string(),
            ));
        }
        if self.max_concurrent_tasks == 0 || self.max_concurrent_tasks > Semaphore::MAX_PERMITS {
            return Err(DagError::InvalidConfig(format!(
                "maxConcurrentTasks must be in [1, {}] (got {})",
                Semaphore::MAX_PERMITS,
                self.max_concurrent_tasks
            )));
        }
        if self.retry.multiplier <= 0.0 {
            return Err(DagError::InvalidConfig(format!(
                "retry.multiplier must be > 0 (got {})",
                self.retry.multiplier
            )));
        }
        Ok(())
    }

    pub fn max_task_duration(&self) -> Duration {
        Duration::from_millis(self.max_task_duration_ms)
    }

    /// Watchdog applied to each replica: twice the simulated maximum.
    pub fn replica_timeout(&self) -> Duration {
        self.max_task_duration().saturating_mul(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SchedulerConfig::default().validate().unwrap();
    }

    #[test]
    fn parses_camel_case_document() {
        let config = SchedulerConfig::from_json(
            r#"{
                "resourcePoolSize": 4,
                "replicationFactor": 3,
                "failureProbability": 0.5,
                "maxTaskDurationMs": 10,
                "seed": 99,
                "retry": { "maxRetries": 2 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.resource_pool_size, 4);
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.seed, Some(99));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.multiplier, 2.0);
        assert!(config.record_waiting);
    }

    #[test]
    fn replication_beyond_pool_is_insufficient_resources() {
        let config = SchedulerConfig {
            resource_pool_size: 2,
            replication_factor: 3,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DagError::InsufficientResources { required: 3, available: 2 })
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases = [
            SchedulerConfig { resource_pool_size: 1, ..Default::default() },
            SchedulerConfig { replication_factor: 1, ..Default::default() },
            SchedulerConfig { failure_probability: 1.5, ..Default::default() },
            SchedulerConfig { failure_probability: f64::NAN, ..Default::default() },
            SchedulerConfig { max_task_duration_ms: 0, ..Default::default() },
            SchedulerConfig { max_concurrent_tasks: 0, ..Default::default() },
            SchedulerConfig { max_concurrent_tasks: usize::MAX, ..Default::default() },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(DagError::InvalidConfig(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn unknown_json_shape_is_a_parse_error() {
        assert!(matches!(
            SchedulerConfig::from_json(r#"{"resourcePoolSize": "three"}"#),
            Err(DagError::Parse(_))
        ));
    }
}
