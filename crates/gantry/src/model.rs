//! Value types for workflow runs and step executions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StepError, WorkflowError};

/// Status of a workflow run.
///
/// Transitions follow `PENDING -> RUNNING -> {COMPLETED | FAILED |
/// CANCELLED}` with no back-edges. Terminal statuses are end states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Returns true if the status is a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(token)
    }
}

/// Status of a step execution within a run.
///
/// Transitions follow `PENDING -> RUNNING -> (RETRYING -> RUNNING)* ->
/// {COMPLETED | FAILED | SKIPPED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Retrying,
}

impl StepStatus {
    /// Returns true if the status is a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::Retrying => "RETRYING",
        };
        f.write_str(token)
    }
}

/// What initiated a workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    /// "api", "schedule", "event", ...
    #[serde(rename = "type")]
    pub trigger_type: String,
    /// User id, system name, ...
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// A single execution instance of a workflow blueprint.
///
/// The run exclusively owns its step executions, step outputs, and state
/// entries; the engine never deletes runs implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    // Identity
    pub run_id: String,
    pub workflow_id: String,
    pub workflow_version: String,

    // Status
    pub status: RunStatus,
    /// Completion ratio in [0.0, 1.0]; exactly 1.0 on `COMPLETED`.
    pub progress: f64,

    // Timing
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    // Input/output (serialized JSON bytes)
    pub input: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,

    // Metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerInfo>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,

    /// Absolute expiration timestamp derived from the start TTL option.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Record of one step's activity within a run, across all retry attempts.
///
/// One record exists per (run, step); `execution_index` stays 0 and the
/// zero-based `attempt` counter tracks retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub run_id: String,
    pub step_id: String,
    pub execution_index: u32,

    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,

    pub input: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    pub attempt: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepExecution {
    /// A fresh `PENDING` record for (run, step) carrying the input bytes.
    pub fn new(run_id: impl Into<String>, step_id: impl Into<String>, input: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            step_id: step_id.into(),
            execution_index: 0,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: 0,
            input,
            output: None,
            error: None,
            attempt: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filtering criteria for listing workflow runs. Best-effort: backends may
/// return results in any order.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub workflow_id: Option<String>,
    pub status: Option<RunStatus>,
    pub resource_id: Option<String>,
    pub limit: Option<usize>,
}

impl RunFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `run` passes every set criterion.
    pub fn matches(&self, run: &WorkflowRun) -> bool {
        if let Some(workflow_id) = &self.workflow_id {
            if &run.workflow_id != workflow_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if run.status != status {
                return false;
            }
        }
        if let Some(resource_id) = &self.resource_id {
            if run.resource_id.as_deref() != Some(resource_id.as_str()) {
                return false;
            }
        }
        true
    }
}
