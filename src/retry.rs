use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use crate::{DagError, TaskRun};

/// Outer retry applied after a replicated run exhausts all of its replicas.
///
/// `max_retries = 0` (the default) means replication is the only retry
/// mechanism and an exhausted task fails immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            interval_ms: 100,
            max_interval_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: Option<RetryPolicy>) -> Self {
        let mut policy = policy.unwrap_or_default();

        if policy.multiplier <= 0.0 {
            policy.multiplier = 2.0;
        }
        if policy.max_interval_ms < policy.interval_ms {
            policy.max_interval_ms = policy.interval_ms;
        }

        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it reports success or the retry budget is spent.
    ///
    /// `operation` receives the zero-based try index. Attempts of every try
    /// are concatenated in order. Errors from `operation` abort immediately.
    pub async fn execute_with_retry<F, Fut>(
        &self,
        task_name: &str,
        mut operation: F,
    ) -> Result<TaskRun, DagError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<TaskRun, DagError>>,
    {
        let mut attempts = Vec::new();

        for try_index in 0..=self.policy.max_retries {
            let run = operation(try_index).await?;
            attempts.extend(run.attempts);

            if run.success {
                return Ok(TaskRun { success: true, attempts });
            }

            if try_index == self.policy.max_retries {
                break;
            }

            let wait_time = self.calculate_backoff(try_index + 1);
            tracing::debug!(
                task = %task_name,
                retry = try_index + 1,
                wait_ms = wait_time.as_millis() as u64,
                "replicas exhausted, retrying"
            );
            sleep(wait_time).await;
        }

        Ok(TaskRun { success: false, attempts })
    }

    fn calculate_backoff(&self, retry: u32) -> Duration {
        let backoff = self.policy.interval_ms as f64
            * self.policy.multiplier.powi(retry.saturating_sub(1) as i32);

        let result = Duration::from_millis(backoff.min(u64::MAX as f64) as u64);
        let max_interval = Duration::from_millis(self.policy.max_interval_ms);

        if result > max_interval {
            max_interval
        } else {
            result
        }
    }
}
