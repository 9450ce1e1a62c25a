//! The workflow engine: scheduler, step runner, and cancellation handler.

mod backoff;
mod executor;

pub use backoff::backoff_delay;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, StartOptions};
use crate::error::EngineError;
use crate::model::{RunFilter, RunStatus, StepExecution, TriggerInfo, WorkflowRun};
use crate::persistence::WorkflowStore;
use crate::workflow::Workflow;

/// Orchestrates workflow execution against a persistence backend.
///
/// Each run executes on a single task; the engine keeps a registry of
/// per-run cancellation tokens so [`cancel`](Engine::cancel) can interrupt
/// in-flight runs cooperatively. Multiple runs execute concurrently as
/// independent tasks with no cross-run ordering.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use gantry::prelude::*;
///
/// let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
/// let engine = Engine::new(store);
///
/// let run_id = engine.start(workflow, &input, StartOptions::new()).await?;
/// let run = engine.get_run(&run_id).await?;
/// ```
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn WorkflowStore>,
    config: EngineConfig,
    active_runs: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn WorkflowStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            active_runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The persistence backend this engine writes to.
    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Initiates a workflow run and returns its identifier.
    ///
    /// Serializes `input`, persists a `PENDING` run record, and launches
    /// execution on a background task — or inline when
    /// [`StartOptions::synchronous`] is set, in which case this returns
    /// only after the run reaches a terminal state and a `FAILED` terminal
    /// surfaces as [`EngineError::RunFailed`].
    pub async fn start<T>(
        &self,
        workflow: Arc<Workflow>,
        input: &T,
        options: StartOptions,
    ) -> Result<String, EngineError>
    where
        T: Serialize + ?Sized,
    {
        // Input serialization failure creates no records.
        let input_bytes = serde_json::to_vec(input)?;

        let run_id = Uuid::now_v7().to_string();
        let now = Utc::now();

        let run = WorkflowRun {
            run_id: run_id.clone(),
            workflow_id: workflow.id().to_string(),
            workflow_version: workflow.version().to_string(),
            status: RunStatus::Pending,
            progress: 0.0,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            input: input_bytes,
            output: None,
            error: None,
            resource_id: options.resource_id.clone(),
            trigger: Some(TriggerInfo {
                trigger_type: options.trigger_type.clone().unwrap_or_default(),
                source: options.trigger_source.clone().unwrap_or_default(),
                timestamp: now,
                metadata: HashMap::new(),
            }),
            tags: options.tags.clone(),
            expires_at: options.ttl.map(|ttl| now + ttl),
        };

        self.store.create_run(&run).await?;

        info!(
            %run_id,
            workflow_id = %workflow.id(),
            resource_id = options.resource_id.as_deref().unwrap_or(""),
            "workflow run created"
        );

        if options.check_concurrency {
            // Admission control is caller-implemented on top of
            // count_runs_by_status; the engine records the request only.
            debug!(%run_id, "admission-control evaluation requested by caller");
        }

        let token = options
            .cancellation
            .as_ref()
            .map(|parent| parent.child_token())
            .unwrap_or_default();
        self.active_runs.lock().insert(run_id.clone(), token.clone());

        if options.synchronous {
            self.clone().run_to_completion(workflow, run, token).await?;
        } else {
            let engine = self.clone();
            tokio::spawn(async move {
                let _ = engine.run_to_completion(workflow, run, token).await;
            });
        }

        Ok(run_id)
    }

    /// Retrieves a snapshot of a workflow run.
    pub async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, EngineError> {
        Ok(self.store.get_run(run_id).await?)
    }

    /// Retrieves all step executions recorded for a run.
    pub async fn list_step_executions(
        &self,
        run_id: &str,
    ) -> Result<Vec<StepExecution>, EngineError> {
        Ok(self.store.list_step_executions(run_id).await?)
    }

    /// Lists runs matching `filter`; best-effort.
    pub async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, EngineError> {
        Ok(self.store.list_runs(filter).await?)
    }

    /// Cancels a run.
    ///
    /// Terminal runs are rejected with [`EngineError::IllegalState`] and
    /// persistence is not modified. Otherwise the run is transitioned to
    /// `CANCELLED` and the run's cancellation token is triggered; the
    /// execution loop observes it between steps and in-flight attempts are
    /// interrupted at their next await point. No step is forcibly killed.
    pub async fn cancel(&self, run_id: &str) -> Result<(), EngineError> {
        let mut run = self.store.get_run(run_id).await?;

        if run.status.is_terminal() {
            return Err(EngineError::IllegalState {
                run_id: run_id.to_string(),
                status: run.status,
            });
        }

        self.cancel_run(&mut run).await?;

        if let Some(token) = self.active_runs.lock().get(run_id) {
            token.cancel();
        }

        Ok(())
    }

    /// Drives a run to a terminal state and releases its token.
    async fn run_to_completion(
        self,
        workflow: Arc<Workflow>,
        run: WorkflowRun,
        token: CancellationToken,
    ) -> Result<(), EngineError> {
        let run_id = run.run_id.clone();
        let result = self.execute_run(workflow, run, token).await;
        self.active_runs.lock().remove(&run_id);

        if let Err(error) = &result {
            warn!(%run_id, %error, "workflow run finished with error");
        }
        result
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("active_runs", &self.active_runs.lock().len())
            .finish()
    }
}
