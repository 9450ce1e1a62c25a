//! In-memory implementation of `WorkflowStore`.
//!
//! Primarily for tests and examples; provides the same semantics as the
//! Redis implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::WorkflowError;
use crate::model::{RunFilter, RunStatus, StepExecution, WorkflowRun};

use super::store::{StoreError, WorkflowStore};

/// In-memory workflow store.
///
/// # Example
///
/// ```
/// use gantry::persistence::InMemoryWorkflowStore;
///
/// let store = InMemoryWorkflowStore::new();
/// assert_eq!(store.run_count(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    runs: RwLock<HashMap<String, WorkflowRun>>,
    // run_id -> step_id -> execution
    step_executions: RwLock<HashMap<String, HashMap<String, StepExecution>>>,
    // run_id -> step_id -> output bytes
    step_outputs: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
    // run_id -> key -> value bytes
    state: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs.
    pub fn run_count(&self) -> usize {
        self.runs.read().len()
    }

    /// Clears all data (for testing).
    pub fn clear(&self) {
        self.runs.write().clear();
        self.step_executions.write().clear();
        self.step_outputs.write().clear();
        self.state.write().clear();
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_run(&self, run: &WorkflowRun) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        if runs.contains_key(&run.run_id) {
            return Err(StoreError::RunExists(run.run_id.clone()));
        }
        runs.insert(run.run_id.clone(), run.clone());

        self.step_executions
            .write()
            .insert(run.run_id.clone(), HashMap::new());
        self.step_outputs
            .write()
            .insert(run.run_id.clone(), HashMap::new());
        self.state.write().insert(run.run_id.clone(), HashMap::new());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, StoreError> {
        self.runs
            .read()
            .get(run_id)
            .cloned()
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        if !runs.contains_key(&run.run_id) {
            return Err(StoreError::RunNotFound(run.run_id.clone()));
        }
        runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        run.status = status;
        run.error = error;
        run.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, StoreError> {
        let runs = self.runs.read();
        let mut matched = Vec::new();
        for run in runs.values() {
            if !filter.matches(run) {
                continue;
            }
            matched.push(run.clone());
            if let Some(limit) = filter.limit {
                if matched.len() >= limit {
                    break;
                }
            }
        }
        Ok(matched)
    }

    async fn create_step_execution(&self, exec: &StepExecution) -> Result<(), StoreError> {
        self.step_executions
            .write()
            .entry(exec.run_id.clone())
            .or_default()
            .insert(exec.step_id.clone(), exec.clone());
        Ok(())
    }

    async fn get_step_execution(
        &self,
        run_id: &str,
        step_id: &str,
    ) -> Result<StepExecution, StoreError> {
        self.step_executions
            .read()
            .get(run_id)
            .and_then(|execs| execs.get(step_id))
            .cloned()
            .ok_or_else(|| StoreError::StepExecutionNotFound {
                run_id: run_id.to_string(),
                step_id: step_id.to_string(),
            })
    }

    async fn update_step_execution(&self, exec: &StepExecution) -> Result<(), StoreError> {
        let mut executions = self.step_executions.write();
        let run_execs =
            executions
                .get_mut(&exec.run_id)
                .ok_or_else(|| StoreError::StepExecutionNotFound {
                    run_id: exec.run_id.clone(),
                    step_id: exec.step_id.clone(),
                })?;
        run_execs.insert(exec.step_id.clone(), exec.clone());
        Ok(())
    }

    async fn list_step_executions(&self, run_id: &str) -> Result<Vec<StepExecution>, StoreError> {
        Ok(self
            .step_executions
            .read()
            .get(run_id)
            .map(|execs| execs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_step_output(
        &self,
        run_id: &str,
        step_id: &str,
        output: &[u8],
    ) -> Result<(), StoreError> {
        self.step_outputs
            .write()
            .entry(run_id.to_string())
            .or_default()
            .insert(step_id.to_string(), output.to_vec());
        Ok(())
    }

    async fn load_step_output(&self, run_id: &str, step_id: &str) -> Result<Vec<u8>, StoreError> {
        self.step_outputs
            .read()
            .get(run_id)
            .and_then(|outputs| outputs.get(step_id))
            .cloned()
            .ok_or_else(|| StoreError::OutputNotFound {
                run_id: run_id.to_string(),
                step_id: step_id.to_string(),
            })
    }

    async fn save_state(&self, run_id: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.state
            .write()
            .entry(run_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn load_state(&self, run_id: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.state
            .read()
            .get(run_id)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or_else(|| StoreError::StateNotFound {
                run_id: run_id.to_string(),
                key: key.to_string(),
            })
    }

    async fn delete_state(&self, run_id: &str, key: &str) -> Result<(), StoreError> {
        if let Some(entries) = self.state.write().get_mut(run_id) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn get_all_state(&self, run_id: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        Ok(self
            .state
            .read()
            .get(run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn count_runs_by_status(
        &self,
        resource_id: &str,
        status: RunStatus,
    ) -> Result<usize, StoreError> {
        Ok(self
            .runs
            .read()
            .values()
            .filter(|run| {
                run.resource_id.as_deref() == Some(resource_id) && run.status == status
            })
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_run(run_id: &str) -> WorkflowRun {
        let now = Utc::now();
        WorkflowRun {
            run_id: run_id.into(),
            workflow_id: "wf".into(),
            workflow_version: "1.0".into(),
            status: RunStatus::Pending,
            progress: 0.0,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            input: br#"{"query":"test"}"#.to_vec(),
            output: None,
            error: None,
            resource_id: Some("tenant-a".into()),
            trigger: None,
            tags: HashMap::new(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_run() {
        let store = InMemoryWorkflowStore::new();
        let run = sample_run("run-1");

        store.create_run(&run).await.unwrap();
        let loaded = store.get_run("run-1").await.unwrap();
        assert_eq!(loaded, run);
    }

    #[tokio::test]
    async fn test_create_duplicate_run_fails() {
        let store = InMemoryWorkflowStore::new();
        let run = sample_run("run-1");

        store.create_run(&run).await.unwrap();
        assert!(matches!(
            store.create_run(&run).await,
            Err(StoreError::RunExists(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing_run() {
        let store = InMemoryWorkflowStore::new();
        assert!(matches!(
            store.get_run("nope").await,
            Err(StoreError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_run() {
        let store = InMemoryWorkflowStore::new();
        let mut run = sample_run("run-1");
        store.create_run(&run).await.unwrap();

        run.status = RunStatus::Running;
        run.progress = 0.5;
        store.update_run(&run).await.unwrap();

        let loaded = store.get_run("run-1").await.unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.progress, 0.5);
    }

    #[tokio::test]
    async fn test_update_missing_run_fails() {
        let store = InMemoryWorkflowStore::new();
        assert!(matches!(
            store.update_run(&sample_run("ghost")).await,
            Err(StoreError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_run_status() {
        let store = InMemoryWorkflowStore::new();
        store.create_run(&sample_run("run-1")).await.unwrap();

        let error = WorkflowError::new(crate::error::ErrorCode::ExecutionFailed, "boom");
        store
            .update_run_status("run-1", RunStatus::Failed, Some(error))
            .await
            .unwrap();

        let loaded = store.get_run("run-1").await.unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert!(loaded.error.is_some());
    }

    #[tokio::test]
    async fn test_list_runs_with_filter() {
        let store = InMemoryWorkflowStore::new();
        store.create_run(&sample_run("run-1")).await.unwrap();
        let mut other = sample_run("run-2");
        other.workflow_id = "other".into();
        store.create_run(&other).await.unwrap();

        let all = store.list_runs(&RunFilter::new()).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store
            .list_runs(&RunFilter::new().with_workflow_id("other"))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].run_id, "run-2");

        let limited = store
            .list_runs(&RunFilter::new().with_limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_step_execution_lifecycle() {
        let store = InMemoryWorkflowStore::new();
        store.create_run(&sample_run("run-1")).await.unwrap();

        let mut exec = StepExecution::new("run-1", "step-1", b"null".to_vec());
        store.create_step_execution(&exec).await.unwrap();

        exec.status = crate::model::StepStatus::Completed;
        exec.attempt = 2;
        store.update_step_execution(&exec).await.unwrap();

        let loaded = store.get_step_execution("run-1", "step-1").await.unwrap();
        assert_eq!(loaded.status, crate::model::StepStatus::Completed);
        assert_eq!(loaded.attempt, 2);

        let all = store.list_step_executions("run-1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(store.list_step_executions("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_step_output_roundtrip() {
        let store = InMemoryWorkflowStore::new();
        store.create_run(&sample_run("run-1")).await.unwrap();

        store
            .save_step_output("run-1", "step-1", b"\"hello\"")
            .await
            .unwrap();
        let bytes = store.load_step_output("run-1", "step-1").await.unwrap();
        assert_eq!(bytes, b"\"hello\"");

        assert!(matches!(
            store.load_step_output("run-1", "other").await,
            Err(StoreError::OutputNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_state_roundtrip_and_delete() {
        let store = InMemoryWorkflowStore::new();
        store.create_run(&sample_run("run-1")).await.unwrap();

        store.save_state("run-1", "key", b"1").await.unwrap();
        assert_eq!(store.load_state("run-1", "key").await.unwrap(), b"1");

        store.delete_state("run-1", "key").await.unwrap();
        assert!(matches!(
            store.load_state("run-1", "key").await,
            Err(StoreError::StateNotFound { .. })
        ));

        let all = store.get_all_state("run-1").await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_count_runs_by_status() {
        let store = InMemoryWorkflowStore::new();
        store.create_run(&sample_run("run-1")).await.unwrap();
        let mut running = sample_run("run-2");
        running.status = RunStatus::Running;
        store.create_run(&running).await.unwrap();

        let count = store
            .count_runs_by_status("tenant-a", RunStatus::Running)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let none = store
            .count_runs_by_status("tenant-b", RunStatus::Running)
            .await
            .unwrap();
        assert_eq!(none, 0);
    }
}
