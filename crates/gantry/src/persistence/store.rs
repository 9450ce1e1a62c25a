//! The `WorkflowStore` trait: the engine's only outward dependency for state.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::WorkflowError;
use crate::model::{RunFilter, RunStatus, StepExecution, WorkflowRun};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("workflow run {0} already exists")]
    RunExists(String),

    #[error("workflow run {0} not found")]
    RunNotFound(String),

    #[error("step execution {run_id}/{step_id} not found")]
    StepExecutionNotFound { run_id: String, step_id: String },

    #[error("step output {run_id}/{step_id} not found")]
    OutputNotFound { run_id: String, step_id: String },

    #[error("state key {key} not found for run {run_id}")]
    StateNotFound { run_id: String, key: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("internal store error: {0}")]
    Internal(String),
}

/// Persistence contract for runs, step executions, step outputs, and
/// run-scoped state.
///
/// Implementations must be thread-safe. The engine issues every write for a
/// given run from a single task, so no compare-and-swap is required;
/// `update_*` operations overwrite. Persistence failures surface directly
/// from engine operations — the engine does not retry store calls.
#[async_trait]
pub trait WorkflowStore: Send + Sync + 'static {
    // Workflow runs

    /// Persists a new run; fails with [`StoreError::RunExists`] on duplicate.
    async fn create_run(&self, run: &WorkflowRun) -> Result<(), StoreError>;

    /// Returns a snapshot of the run; fails if missing.
    async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, StoreError>;

    /// Overwrites the stored run; fails if missing.
    async fn update_run(&self, run: &WorkflowRun) -> Result<(), StoreError>;

    /// Convenience variant of `update_run` touching only status and error.
    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError>;

    /// Best-effort listing; may return empty and in any order.
    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, StoreError>;

    // Step executions

    async fn create_step_execution(&self, exec: &StepExecution) -> Result<(), StoreError>;

    async fn get_step_execution(
        &self,
        run_id: &str,
        step_id: &str,
    ) -> Result<StepExecution, StoreError>;

    async fn update_step_execution(&self, exec: &StepExecution) -> Result<(), StoreError>;

    /// All executions for the run, in no particular order.
    async fn list_step_executions(&self, run_id: &str) -> Result<Vec<StepExecution>, StoreError>;

    // Step outputs (inter-step communication)

    async fn save_step_output(
        &self,
        run_id: &str,
        step_id: &str,
        output: &[u8],
    ) -> Result<(), StoreError>;

    async fn load_step_output(&self, run_id: &str, step_id: &str) -> Result<Vec<u8>, StoreError>;

    // Run-scoped state

    async fn save_state(&self, run_id: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    async fn load_state(&self, run_id: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn delete_state(&self, run_id: &str, key: &str) -> Result<(), StoreError>;

    /// Full state map for the run; empty if none.
    async fn get_all_state(&self, run_id: &str) -> Result<HashMap<String, Vec<u8>>, StoreError>;

    // Queries

    /// Count of runs annotated with `resource_id` in the given status, for
    /// caller-implemented admission control.
    async fn count_runs_by_status(
        &self,
        resource_id: &str,
        status: RunStatus,
    ) -> Result<usize, StoreError>;
}
