//! Execution and engine configuration.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Backoff behavior between retry attempts.
///
/// Delays are deterministic: no jitter, no cap. See
/// [`backoff_delay`](crate::engine::backoff_delay) for the formulas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackoffStrategy {
    #[default]
    Linear,
    Exponential,
    None,
}

impl std::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Self::Linear => "LINEAR",
            Self::Exponential => "EXPONENTIAL",
            Self::None => "NONE",
        };
        f.write_str(token)
    }
}

impl FromStr for BackoffStrategy {
    type Err = std::convert::Infallible;

    /// Unknown tokens parse as the linear default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "EXPONENTIAL" => Self::Exponential,
            "NONE" => Self::None,
            _ => Self::Linear,
        })
    }
}

/// Step-level execution parameters.
///
/// A step inherits the workflow defaults unless overridden at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Number of re-attempts after the first; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Base delay fed into the backoff formula.
    pub retry_delay_ms: u64,
    pub retry_backoff: BackoffStrategy,

    /// Per-attempt timeout; 0 falls back to the engine's default timeout.
    pub timeout_seconds: u64,

    /// Concurrency hint for parallel execution.
    pub max_concurrency: u32,

    /// When set, the step's failure does not fail the run.
    pub continue_on_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_step_id: Option<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            retry_backoff: BackoffStrategy::Linear,
            timeout_seconds: 30,
            max_concurrency: 1,
            continue_on_error: false,
            fallback_step_id: None,
        }
    }
}

/// Engine-level configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Hint for caller-implemented admission control; not enforced.
    pub max_concurrent_workflows: usize,
    /// Per-attempt timeout applied when a step's own timeout is 0.
    pub default_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 10,
            default_timeout: Duration::from_secs(300),
        }
    }
}

/// Options recognized when starting a workflow run.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Annotation used by `count_runs_by_status` for admission control.
    pub resource_id: Option<String>,
    /// Request admission-control evaluation; the policy itself is
    /// caller-implemented on top of `count_runs_by_status`.
    pub check_concurrency: bool,
    /// The run's expiration timestamp is set to `now + ttl`.
    pub ttl: Option<Duration>,
    pub tags: HashMap<String, String>,
    pub trigger_type: Option<String>,
    pub trigger_source: Option<String>,
    /// When set, `start` blocks until the run reaches a terminal state.
    pub synchronous: bool,
    /// Parent cancellation token; the engine derives a per-run child from it.
    pub cancellation: Option<CancellationToken>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_concurrency_check(mut self, check: bool) -> Self {
        self.check_concurrency = check;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_trigger(
        mut self,
        trigger_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.trigger_type = Some(trigger_type.into());
        self.trigger_source = Some(source.into());
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_config_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.retry_backoff, BackoffStrategy::Linear);
        assert_eq!(config.timeout_seconds, 30);
        assert!(!config.continue_on_error);
        assert!(config.fallback_step_id.is_none());
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_workflows, 10);
        assert_eq!(config.default_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_strategy_tokens() {
        assert_eq!(
            serde_json::to_string(&BackoffStrategy::Exponential).unwrap(),
            "\"EXPONENTIAL\""
        );
        assert_eq!(BackoffStrategy::None.to_string(), "NONE");
    }

    #[test]
    fn test_backoff_strategy_unknown_parses_linear() {
        assert_eq!(
            "EXPONENTIAL".parse::<BackoffStrategy>().unwrap(),
            BackoffStrategy::Exponential
        );
        assert_eq!(
            "FIBONACCI".parse::<BackoffStrategy>().unwrap(),
            BackoffStrategy::Linear
        );
    }

    #[test]
    fn test_start_options_builder() {
        let options = StartOptions::new()
            .with_resource_id("tenant-a")
            .with_ttl(Duration::from_secs(3600))
            .with_tag("env", "test")
            .with_trigger("api", "user-1")
            .synchronous();

        assert_eq!(options.resource_id.as_deref(), Some("tenant-a"));
        assert_eq!(options.ttl, Some(Duration::from_secs(3600)));
        assert_eq!(options.tags.get("env").map(String::as_str), Some("test"));
        assert_eq!(options.trigger_type.as_deref(), Some("api"));
        assert!(options.synchronous);
    }
}
